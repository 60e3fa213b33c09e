use anyhow::Context;

pub const TEMPLATE_NAME: &str = "test_message";

pub fn register_templates<'a>(registry: &mut handlebars::Handlebars<'a>) -> anyhow::Result<()> {
    registry
        .register_template_string(
            TEMPLATE_NAME,
            r#"🔔 *Test Notification*

Telegram alerts for *{{environment}}* are configured correctly\.

You will be notified when:
• New unique errors occur
• Error thresholds are exceeded
• Ignored errors spike

✅ Setup complete\!"#,
        )
        .context("registering test_message template")?;

    Ok(())
}

#[cfg(test)]
mod test {
    use crate::{Notification, Renderer};

    #[test]
    fn test_message_names_environment() {
        let renderer = Renderer::try_new("https://errors.example").unwrap();
        let text = renderer
            .render(&Notification::Test {
                environment: "prod_v2".to_string(),
            })
            .unwrap();

        insta::assert_snapshot!(text, @r###"
        🔔 *Test Notification*

        Telegram alerts for *prod\_v2* are configured correctly\.

        You will be notified when:
        • New unique errors occur
        • Error thresholds are exceeded
        • Ignored errors spike

        ✅ Setup complete\!
        "###);
    }
}
