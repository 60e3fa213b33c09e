//! Renders and delivers error alerts to Telegram chats.
//!
//! Messages are written in Telegram's MarkdownV2 dialect. Every value
//! interpolated into a template is escaped for the context it lands in:
//! plain text, a pre-formatted block, or a link target.

use anyhow::Context;
use chrono::{DateTime, Utc};
use handlebars::{handlebars_helper, Handlebars};
use models::{GroupId, Level, ProjectId};

mod error_alert;
mod ignored_spike;
mod telegram;
mod test_message;

pub use telegram::{categorize, DeliveryError, TelegramClient, DEFAULT_API_URL};

/// Telegram `parse_mode` of every rendered message.
pub const PARSE_MODE: &str = "MarkdownV2";

/// Number of stack lines included in an alert. The dashboard has the rest.
pub const STACK_PREVIEW_LINES: usize = 3;

/// A new or recurring error group which tripped a notification trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorAlert {
    pub project_id: ProjectId,
    pub group_id: GroupId,
    pub environment: String,
    pub message: String,
    pub level: Level,
    pub occurrence_count: i64,
    pub first_seen: DateTime<Utc>,
    pub stack: Option<String>,
    /// Set when the alert was raised by an occurrence threshold.
    pub threshold: Option<ThresholdReached>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdReached {
    pub count: i64,
    pub window_minutes: u32,
}

/// A previously ignored group whose recent rate spiked.
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeAlert {
    pub project_id: ProjectId,
    pub group_id: GroupId,
    pub environment: String,
    pub message: String,
    pub occurrence_count: i64,
    pub last_5m: i64,
    pub last_60m: i64,
    pub factor: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Confirms that a channel is set up, sent on request from the dashboard.
    Test { environment: String },
    Error(ErrorAlert),
    IgnoredSpike(SpikeAlert),
}

/// Escapes text for a plain MarkdownV2 context.
pub fn escape_markdown(text: &str) -> String {
    escape(text, |c| {
        matches!(
            c,
            '_' | '*'
                | '['
                | ']'
                | '('
                | ')'
                | '~'
                | '`'
                | '>'
                | '#'
                | '+'
                | '-'
                | '='
                | '|'
                | '{'
                | '}'
                | '.'
                | '!'
                | '\\'
        )
    })
}

/// Escapes text placed within a ``` pre-formatted block.
pub fn escape_pre(text: &str) -> String {
    escape(text, |c| matches!(c, '`' | '\\'))
}

/// Escapes the target of an inline link.
pub fn escape_link_url(text: &str) -> String {
    escape(text, |c| matches!(c, ')' | '\\'))
}

fn escape(text: &str, reserved: impl Fn(char) -> bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if reserved(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

handlebars_helper!(pre: |text: str| escape_pre(text));
handlebars_helper!(link_url: |text: str| escape_link_url(text));

pub struct Renderer {
    registry: Handlebars<'static>,
    dashboard_base_url: String,
}

impl Renderer {
    pub fn try_new(dashboard_base_url: impl Into<String>) -> anyhow::Result<Renderer> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(escape_markdown);
        // Helpers must be invoked with triple-stash so their output isn't escaped twice.
        registry.register_helper("pre", Box::new(pre));
        registry.register_helper("link_url", Box::new(link_url));

        test_message::register_templates(&mut registry)?;
        error_alert::register_templates(&mut registry)?;
        ignored_spike::register_templates(&mut registry)?;

        Ok(Renderer {
            registry,
            dashboard_base_url: dashboard_base_url.into(),
        })
    }

    /// Dashboard page of an error group.
    pub fn group_url(&self, project_id: ProjectId, group_id: GroupId) -> String {
        format!(
            "{}/projects/{project_id}/error-groups/{group_id}",
            self.dashboard_base_url.trim_end_matches('/')
        )
    }

    pub fn render(&self, notification: &Notification) -> anyhow::Result<String> {
        let (template, data) = match notification {
            Notification::Test { environment } => (
                test_message::TEMPLATE_NAME,
                serde_json::json!({ "environment": environment }),
            ),
            Notification::Error(alert) => (
                error_alert::TEMPLATE_NAME,
                error_alert::template_data(alert, self.group_url(alert.project_id, alert.group_id)),
            ),
            Notification::IgnoredSpike(alert) => (
                ignored_spike::TEMPLATE_NAME,
                ignored_spike::template_data(
                    alert,
                    self.group_url(alert.project_id, alert.group_id),
                ),
            ),
        };

        self.registry
            .render(template, &data)
            .with_context(|| format!("rendering {template} message"))
    }
}

/// Leading lines of a stack trace, as shown in alerts.
pub fn stack_preview(stack: &str) -> String {
    stack
        .lines()
        .take(STACK_PREVIEW_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_escaping() {
        assert_eq!(
            escape_markdown("Cannot read property 'x' of undefined (at app.js:1)!"),
            r"Cannot read property 'x' of undefined \(at app\.js:1\)\!"
        );
        assert_eq!(escape_markdown(r"a_b*c\d"), r"a\_b\*c\\d");
        assert_eq!(escape_pre("let s = `x` + 1; // a\\b"), "let s = \\`x\\` + 1; // a\\\\b");
        assert_eq!(
            escape_link_url("https://app.example/p/1/error-groups/2?q=(x)"),
            r"https://app.example/p/1/error-groups/2?q=(x\)"
        );
    }

    #[test]
    fn test_group_url_and_stack_preview() {
        let renderer = Renderer::try_new("https://app.example/").unwrap();
        assert_eq!(
            renderer.group_url(ProjectId::new(3), GroupId::new(41)),
            "https://app.example/projects/3/error-groups/41"
        );

        assert_eq!(stack_preview("a\nb\nc\nd\ne"), "a\nb\nc");
        assert_eq!(stack_preview("only"), "only");
    }
}
