use derivative::Derivative;
use serde::{de::Error, Deserialize, Deserializer, Serialize};

use crate::{EnvironmentId, IngestContext, ProjectId};

/// An environment of a project, holding the API key clients ingest with and
/// its notification settings.
#[derive(Derivative, Clone, PartialEq, Serialize)]
#[derivative(Debug)]
pub struct Environment {
    pub id: EnvironmentId,
    pub project_id: ProjectId,
    pub name: String,
    #[serde(skip)]
    #[derivative(Debug = "ignore")]
    pub api_key: String,
    pub is_active: bool,
    pub settings: EnvironmentSettings,
}

impl Environment {
    /// Context which events ingested with this environment's API key are attributed to.
    pub fn context(&self) -> IngestContext {
        IngestContext {
            project_id: self.project_id,
            environment_id: self.id,
        }
    }
}

/// The free-form settings document stored with each environment.
/// Unknown keys are ignored and missing sections take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSettings {
    #[serde(default)]
    pub notifications: NotificationSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub telegram: TelegramSettings,
}

#[derive(Derivative, Clone, Default, PartialEq, Serialize, Deserialize)]
#[derivative(Debug)]
pub struct TelegramSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    #[derivative(Debug = "ignore")]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub triggers: Triggers,
}

impl TelegramSettings {
    /// The channel is usable only when enabled and fully addressed.
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.bot_token.trim().is_empty() && !self.chat_id.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Triggers {
    #[serde(default)]
    pub new_error: bool,
    #[serde(default)]
    pub threshold: ThresholdTrigger,
    #[serde(default)]
    pub spike_on_ignored: bool,
}

/// Fires once a group has at least `count` occurrences within the last `window_minutes`.
///
/// A zero or absent `window_minutes` disables the trigger. So does a zero
/// `count`, which would otherwise fire on every occurrence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTrigger {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, deserialize_with = "lenient_count")]
    pub count: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub window_minutes: u32,
}

impl ThresholdTrigger {
    pub fn is_active(&self) -> bool {
        self.enabled && self.count > 0 && self.window_minutes > 0
    }

    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.window_minutes))
    }
}

// Dashboards have stored these counts both as JSON numbers and as numeric
// strings, with an empty string meaning unset.
fn lenient_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Number(i64),
        Text(String),
        Null,
    }

    let n = match Lenient::deserialize(deserializer)? {
        Lenient::Number(n) => n,
        Lenient::Text(s) if s.trim().is_empty() => 0,
        Lenient::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|err| D::Error::custom(format!("invalid count {s:?}: {err}")))?,
        Lenient::Null => 0,
    };
    u32::try_from(n).map_err(|_| D::Error::custom(format!("count must be non-negative, got {n}")))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_settings_parsing() {
        let settings: EnvironmentSettings = serde_json::from_value(serde_json::json!({
            "notifications": {
                "telegram": {
                    "enabled": true,
                    "bot_token": "123:abc",
                    "chat_id": "-1001",
                    "triggers": {
                        "new_error": true,
                        "threshold": {"enabled": true, "count": "10", "window_minutes": 5},
                        "spike_on_ignored": true
                    }
                }
            },
            "retention_days": 30
        }))
        .unwrap();

        insta::assert_debug_snapshot!(settings, @r###"
        EnvironmentSettings {
            notifications: NotificationSettings {
                telegram: TelegramSettings {
                    enabled: true,
                    chat_id: "-1001",
                    triggers: Triggers {
                        new_error: true,
                        threshold: ThresholdTrigger {
                            enabled: true,
                            count: 10,
                            window_minutes: 5,
                        },
                        spike_on_ignored: true,
                    },
                },
            },
        }
        "###);
        assert!(settings.notifications.telegram.is_configured());
        assert!(settings.notifications.telegram.triggers.threshold.is_active());
    }

    #[test]
    fn test_settings_defaults() {
        let settings: EnvironmentSettings = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(settings, EnvironmentSettings::default());
        assert!(!settings.notifications.telegram.is_configured());

        let threshold: ThresholdTrigger = serde_json::from_value(serde_json::json!({
            "enabled": true,
            "count": "",
            "window_minutes": null,
        }))
        .unwrap();
        assert_eq!((threshold.count, threshold.window_minutes), (0, 0));
        assert!(!threshold.is_active());

        let zero_count = ThresholdTrigger {
            enabled: true,
            count: 0,
            window_minutes: 5,
        };
        assert!(!zero_count.is_active());
    }

    #[test]
    fn test_invalid_counts() {
        for count in [serde_json::json!("ten"), serde_json::json!(-3)] {
            let result = serde_json::from_value::<ThresholdTrigger>(serde_json::json!({
                "enabled": true,
                "count": count,
                "window_minutes": 5,
            }));
            assert!(result.is_err(), "{count} should be rejected");
        }
    }

    #[test]
    fn test_unaddressed_channel_is_not_configured() {
        let telegram = TelegramSettings {
            enabled: true,
            bot_token: "123:abc".to_string(),
            chat_id: "  ".to_string(),
            triggers: Triggers::default(),
        };
        assert!(!telegram.is_configured());
    }
}
