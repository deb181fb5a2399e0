use crate::config::Config;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use aws_sdk_sesv2::Client as SesClient;

const SUBJECT: &str = "Verify your PataJob account";

pub fn verification_link(config: &Config, token: &str) -> String {
    format!("{}/verify-email/{}", config.frontend_url, token)
}

/// Escape text for interpolation into HTML element content or attributes.
fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// HTML and plain-text bodies of the verification mail.
fn verification_bodies(name: &str, link: &str) -> (String, String) {
    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<body style="margin:0;background:#f4f7f6;font-family:Arial,sans-serif;color:#1f2933;">
  <table role="presentation" width="100%" cellpadding="0" cellspacing="0">
    <tr><td align="center" style="padding:40px 16px;">
      <table role="presentation" width="560" cellpadding="0" cellspacing="0" style="background:#ffffff;border-radius:8px;">
        <tr><td style="padding:28px 32px;background:#0f766e;border-radius:8px 8px 0 0;color:#ffffff;font-size:22px;font-weight:bold;">PataJob</td></tr>
        <tr><td style="padding:32px;">
          <p>Hi {name},</p>
          <p>Thanks for signing up. Confirm your email address to activate your account.</p>
          <p style="text-align:center;margin:28px 0;">
            <a href="{link}" style="background:#0f766e;color:#ffffff;padding:14px 28px;border-radius:6px;text-decoration:none;">Verify Email</a>
          </p>
          <p style="font-size:13px;">Or open this link: <a href="{link}" style="color:#0f766e;word-break:break-all;">{link}</a></p>
          <p style="font-size:12px;color:#7b8794;">If you did not create a PataJob account, you can ignore this email.</p>
        </td></tr>
      </table>
      <p style="font-size:12px;color:#7b8794;">PataJob Kenya</p>
    </td></tr>
  </table>
</body>
</html>"#,
        name = escape_html(name),
        link = escape_html(link)
    );

    let text = format!(
        "PataJob\n\nHi {},\n\nThanks for signing up. Confirm your email address to activate your account:\n\n{}\n\nIf you did not create a PataJob account, you can ignore this email.",
        name, link
    );
    (html, text)
}

/// Send the account verification link via SES.
pub async fn send_verification_email(
    ses_client: &SesClient,
    config: &Config,
    to_email: &str,
    name: &str,
    token: &str,
) -> Result<(), String> {
    let link = verification_link(config, token);
    let (html_body, text_body) = verification_bodies(name, &link);

    let content = |data: String| {
        Content::builder()
            .data(data)
            .charset("UTF-8")
            .build()
            .map_err(|e| format!("Failed to build email content: {:?}", e))
    };

    let body = Body::builder()
        .html(content(html_body)?)
        .text(content(text_body)?)
        .build();
    let message = Message::builder()
        .subject(content(SUBJECT.to_string())?)
        .body(body)
        .build();

    ses_client
        .send_email()
        .from_email_address(&config.email_from)
        .destination(Destination::builder().to_addresses(to_email).build())
        .content(EmailContent::builder().simple(message).build())
        .send()
        .await
        .map_err(|e| format!("Failed to send email: {:?}", e))?;

    tracing::info!("Verification email sent to {}", to_email);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_link_uses_frontend_url() {
        let config = Config {
            frontend_url: "https://patajob.co.ke".to_string(),
            ..Config::local()
        };
        assert_eq!(
            verification_link(&config, "abc123"),
            "https://patajob.co.ke/verify-email/abc123"
        );
    }

    #[test]
    fn test_bodies_carry_link() {
        let (html, text) = verification_bodies("Njeri", "https://x.test/verify-email/t");
        assert!(html.contains(r#"href="https://x.test/verify-email/t""#));
        assert!(html.contains("Hi Njeri"));
        assert!(text.contains("https://x.test/verify-email/t"));
    }

    #[test]
    fn test_registrant_name_is_escaped_in_html() {
        let name = r#"<a href="https://evil.example/login">Reset password</a>"#;
        let (html, _) = verification_bodies(name, "https://x.test/verify-email/t");
        assert!(html.contains("Hi &lt;a href=&quot;https://evil.example/login&quot;&gt;Reset password&lt;/a&gt;,"));
        assert!(!html.contains("evil.example/login\""));
        assert!(!html.contains("<a href=\"https://evil"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("Tom & Jerry's <b>"), "Tom &amp; Jerry&#39;s &lt;b&gt;");
        assert_eq!(escape_html("Njeri"), "Njeri");
    }
}
