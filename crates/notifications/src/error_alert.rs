use crate::{stack_preview, ErrorAlert, STACK_PREVIEW_LINES};
use anyhow::Context;
use models::Level;

pub const TEMPLATE_NAME: &str = "error_alert";

pub fn register_templates<'a>(registry: &mut handlebars::Handlebars<'a>) -> anyhow::Result<()> {
    registry
        .register_template_string(
            TEMPLATE_NAME,
            r#"{{{icon}}} *{{kind}} ERROR* in {{environment}}

*Message:* {{message}}
*Level:* {{level}}
*Occurrences:* {{occurrence_count}}
*First seen:* {{first_seen}}
{{#if threshold}}
*Threshold reached:* {{threshold.count}} occurrences in the last {{threshold.window_minutes}} minutes
{{/if}}
{{#if stack}}

*Stack:*
```
{{{pre stack}}}
{{#if truncated}}
... (view full stack in dashboard)
{{/if}}
```
{{/if}}

[View Full Details]({{{link_url view_url}}})"#,
        )
        .context("registering error_alert template")?;

    Ok(())
}

pub fn template_data(alert: &ErrorAlert, view_url: String) -> serde_json::Value {
    let icon = match alert.level {
        Level::Warn => "🟡",
        Level::Error | Level::Info => "🔴",
    };
    let kind = if alert.occurrence_count == 1 {
        "NEW"
    } else {
        "RECURRING"
    };
    let stack = alert
        .stack
        .as_deref()
        .filter(|stack| !stack.trim().is_empty());
    let truncated = stack.map_or(false, |stack| stack.lines().count() > STACK_PREVIEW_LINES);
    let threshold = alert.threshold.map(|t| {
        serde_json::json!({
            "count": t.count,
            "window_minutes": t.window_minutes,
        })
    });

    serde_json::json!({
        "icon": icon,
        "kind": kind,
        "environment": alert.environment,
        "message": alert.message,
        "level": alert.level.name(),
        "occurrence_count": alert.occurrence_count,
        "first_seen": alert.first_seen.format("%b %-d, %-I:%M %p").to_string(),
        "threshold": threshold,
        "stack": stack.map(stack_preview),
        "truncated": truncated,
        "view_url": view_url,
    })
}
