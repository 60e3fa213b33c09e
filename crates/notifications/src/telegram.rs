use std::time::Duration;

use crate::PARSE_MODE;

/// Public Bot API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure to deliver a message, categorized by cause.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("bot was blocked by user or removed from group")]
    BotBlocked,
    #[error("invalid chat ID or bot not in group")]
    ChatNotFound,
    #[error("invalid bot token")]
    InvalidToken,
    #[error("telegram API error: {description}")]
    Provider { description: String },
    #[error("telegram API error: status {status}")]
    Status { status: u16 },
    #[error("failed to reach telegram API")]
    Transport(#[source] reqwest::Error),
}

impl DeliveryError {
    /// Stable, low-cardinality name of the failure for logs.
    pub fn category(&self) -> &'static str {
        match self {
            DeliveryError::BotBlocked => "bot_blocked",
            DeliveryError::ChatNotFound => "chat_not_found",
            DeliveryError::InvalidToken => "invalid_token",
            DeliveryError::Provider { .. } => "provider",
            DeliveryError::Status { .. } => "status",
            DeliveryError::Transport(_) => "transport",
        }
    }
}

#[derive(serde::Deserialize)]
struct ApiResponse {
    #[serde(default)]
    ok: Option<bool>,
    #[serde(default)]
    description: Option<String>,
}

/// Categorizes an unsuccessful Bot API response by its `description`,
/// falling back to the HTTP status when there is none.
pub fn categorize(status: u16, body: &[u8]) -> DeliveryError {
    let description = serde_json::from_slice::<ApiResponse>(body)
        .ok()
        .and_then(|response| response.description)
        .filter(|description| !description.is_empty());

    let Some(description) = description else {
        return DeliveryError::Status { status };
    };

    if description.contains("bot was blocked") || description.contains("bot was kicked") {
        DeliveryError::BotBlocked
    } else if description.contains("chat not found") {
        DeliveryError::ChatNotFound
    } else if description.contains("Unauthorized") {
        DeliveryError::InvalidToken
    } else {
        DeliveryError::Provider { description }
    }
}

#[derive(serde::Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

/// Client of the Telegram Bot API `sendMessage` method.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_url: String,
}

impl TelegramClient {
    pub fn new(api_url: &url::Url) -> anyhow::Result<TelegramClient> {
        let http = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(TelegramClient {
            http,
            api_url: api_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    /// Sends a pre-rendered MarkdownV2 message to a chat.
    pub async fn send_message(
        &self,
        bot_token: &str,
        chat_id: &str,
        text: &str,
    ) -> Result<(), DeliveryError> {
        let url = format!("{}/bot{bot_token}/sendMessage", self.api_url);

        // Errors carry the request url, which embeds the bot token.
        let response = self
            .http
            .post(url)
            .json(&SendMessage {
                chat_id,
                text,
                parse_mode: PARSE_MODE,
            })
            .send()
            .await
            .map_err(|err| DeliveryError::Transport(err.without_url()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| DeliveryError::Transport(err.without_url()))?;

        if status.is_success() {
            let ok = serde_json::from_slice::<ApiResponse>(&body)
                .ok()
                .and_then(|response| response.ok);
            if ok != Some(false) {
                tracing::debug!(%chat_id, "delivered telegram message");
                return Ok(());
            }
        }
        Err(categorize(status.as_u16(), &body))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_categorize() {
        let cases: [(u16, &str, &str); 7] = [
            (
                403,
                r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#,
                "bot was blocked by user or removed from group",
            ),
            (
                400,
                r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
                "invalid chat ID or bot not in group",
            ),
            (
                401,
                r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#,
                "invalid bot token",
            ),
            (
                400,
                r#"{"ok":false,"description":"Bad Request: can't parse entities"}"#,
                "telegram API error: Bad Request: can't parse entities",
            ),
            (502, "<html>Bad Gateway</html>", "telegram API error: status 502"),
            (500, r#"{"ok":false}"#, "telegram API error: status 500"),
            (429, r#"{"ok":false,"description":""}"#, "telegram API error: status 429"),
        ];

        for (status, body, expect) in cases {
            assert_eq!(categorize(status, body.as_bytes()).to_string(), expect);
        }
        assert_eq!(categorize(401, br#"{"description":"Unauthorized"}"#).category(), "invalid_token");
    }

    type Captured = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

    async fn stub_api(reply: (u16, &'static str)) -> (url::Url, Captured) {
        let captured = Captured::default();
        let sink = captured.clone();

        let app = axum::Router::new().route(
            "/{method}/sendMessage",
            axum::routing::post(
                move |axum::extract::Path(method): axum::extract::Path<String>,
                      axum::Json(body): axum::Json<serde_json::Value>| {
                    let sink = sink.clone();
                    async move {
                        sink.lock().unwrap().push((method, body));
                        (
                            axum::http::StatusCode::from_u16(reply.0).unwrap(),
                            reply.1,
                        )
                    }
                },
            ),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        (format!("http://{addr}/").parse().unwrap(), captured)
    }

    #[tokio::test]
    async fn test_send_message_posts_markdown() {
        let (api_url, captured) = stub_api((200, r#"{"ok":true,"result":{}}"#)).await;
        let client = TelegramClient::new(&api_url).unwrap();

        client
            .send_message("123:abc", "-100200", r"*hello* world\!")
            .await
            .unwrap();

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].0, "bot123:abc");
        assert_eq!(
            captured[0].1,
            serde_json::json!({
                "chat_id": "-100200",
                "text": r"*hello* world\!",
                "parse_mode": "MarkdownV2",
            })
        );
    }

    #[tokio::test]
    async fn test_send_message_maps_failures() {
        let (api_url, _captured) = stub_api((
            403,
            r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#,
        ))
        .await;
        let client = TelegramClient::new(&api_url).unwrap();

        let err = client.send_message("123:abc", "42", "hi").await.unwrap_err();
        assert!(matches!(err, DeliveryError::BotBlocked), "{err:?}");
    }

    #[tokio::test]
    async fn test_send_message_transport_error_hides_token() {
        let api_url: url::Url = "http://127.0.0.1:1/".parse().unwrap();
        let client = TelegramClient::new(&api_url).unwrap();

        let err = client.send_message("123:secret", "42", "hi").await.unwrap_err();
        assert_eq!(err.category(), "transport");
        let DeliveryError::Transport(source) = &err else {
            panic!("expected a transport error, got {err:?}");
        };
        assert!(!source.to_string().contains("secret"), "{source}");
    }
}
