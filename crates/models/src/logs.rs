use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{EnvironmentId, GroupId, LogId, ProjectId};

/// Severity of a reported error.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    #[default]
    Error,
    Warn,
    Info,
}

impl Level {
    pub fn name(&self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
        }
    }

    pub fn from_str(name: &str) -> Option<Level> {
        [Level::Error, Level::Warn, Level::Info]
            .into_iter()
            .find(|level| name.eq_ignore_ascii_case(level.name()))
    }
}

crate::pg_enum!(Level, "error_level");

/// Side of the application which reported the error.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Frontend,
    #[default]
    Backend,
}

impl Source {
    pub fn name(&self) -> &'static str {
        match self {
            Source::Frontend => "frontend",
            Source::Backend => "backend",
        }
    }

    pub fn from_str(name: &str) -> Option<Source> {
        [Source::Frontend, Source::Backend]
            .into_iter()
            .find(|source| name.eq_ignore_ascii_case(source.name()))
    }
}

crate::pg_enum!(Source, "error_source");

/// An error event as submitted by a client SDK.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewErrorEvent {
    #[validate(length(min = 1))]
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub level: Level,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Application-defined identifier of the affected end user.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub status_code: Option<i32>,
    #[serde(default)]
    pub extra_data: Option<serde_json::Value>,
    /// Client-reported time of the error. The receive time is used if absent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub request_body: Option<String>,
    #[serde(default)]
    pub request_headers: Option<serde_json::Value>,
    #[serde(default)]
    pub response_body: Option<String>,
    #[serde(default)]
    pub response_time_ms: Option<i32>,
}

/// A single recorded error occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx-support", derive(sqlx::FromRow))]
pub struct ErrorLog {
    pub id: LogId,
    pub project_id: ProjectId,
    pub environment_id: EnvironmentId,
    pub error_group_id: GroupId,
    pub message: String,
    pub stack: Option<String>,
    pub url: Option<String>,
    pub source: Source,
    pub level: Level,
    pub method: Option<String>,
    pub user_agent: Option<String>,
    pub user_id: Option<String>,
    pub status_code: Option<i32>,
    pub extra_data: Option<serde_json::Value>,
    pub request_body: Option<String>,
    pub request_headers: Option<serde_json::Value>,
    pub response_body: Option<String>,
    pub response_time_ms: Option<i32>,
    pub resolved: bool,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_event_defaults_and_validation() {
        let event: NewErrorEvent =
            serde_json::from_value(serde_json::json!({"message": "TypeError: x is undefined"}))
                .unwrap();

        assert_eq!(event.level, Level::Error);
        assert_eq!(event.source, Source::Backend);
        assert_eq!(event.timestamp, None);
        assert!(event.validate().is_ok());

        let empty = NewErrorEvent::default();
        assert!(empty.validate().is_err());

        // Network failures are reported without a response status.
        let network_failure: NewErrorEvent = serde_json::from_value(serde_json::json!({
            "message": "Failed to fetch",
            "status_code": 0,
            "method": "OPTIONS",
        }))
        .unwrap();
        assert!(network_failure.validate().is_ok());

        let long = NewErrorEvent {
            message: "x".repeat(20_000),
            url: Some(format!("https://shop.example/?q={}", "y".repeat(4096))),
            ..Default::default()
        };
        assert!(long.validate().is_ok());
    }

    #[test]
    fn test_event_rejects_unknown_enums() {
        let err = serde_json::from_value::<NewErrorEvent>(serde_json::json!({
            "message": "boom",
            "level": "fatal",
        }))
        .unwrap_err();
        assert!(err.to_string().contains("unknown variant `fatal`"), "{err}");

        let err = serde_json::from_value::<NewErrorEvent>(serde_json::json!({
            "message": "boom",
            "source": "mobile",
        }))
        .unwrap_err();
        assert!(err.to_string().contains("unknown variant `mobile`"), "{err}");
    }

    #[test]
    fn test_level_and_source_names() {
        assert_eq!(Level::from_str("WARN"), Some(Level::Warn));
        assert_eq!(Level::from_str("debug"), None);
        assert_eq!(Source::from_str("backend"), Some(Source::Backend));
        assert_eq!(Level::Info.to_string(), "info");
    }
}
