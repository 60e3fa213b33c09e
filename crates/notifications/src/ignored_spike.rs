use crate::SpikeAlert;
use anyhow::Context;

pub const TEMPLATE_NAME: &str = "ignored_spike";

pub fn register_templates<'a>(registry: &mut handlebars::Handlebars<'a>) -> anyhow::Result<()> {
    registry
        .register_template_string(
            TEMPLATE_NAME,
            r#"⚠️ *IGNORED ERROR SPIKE* in {{environment}}

*Message:* {{message}}

This error was previously ignored but is now occurring at a much higher rate \({{factor}}x higher than normal\)\.

*Last 5 minutes:* {{last_5m}}
*Last hour:* {{last_60m}}
*Total occurrences:* {{occurrence_count}}

[View Details]({{{link_url view_url}}})"#,
        )
        .context("registering ignored_spike template")?;

    Ok(())
}

pub fn template_data(alert: &SpikeAlert, view_url: String) -> serde_json::Value {
    serde_json::json!({
        "environment": alert.environment,
        "message": alert.message,
        "factor": alert.factor,
        "last_5m": alert.last_5m,
        "last_60m": alert.last_60m,
        "occurrence_count": alert.occurrence_count,
        "view_url": view_url,
    })
}
