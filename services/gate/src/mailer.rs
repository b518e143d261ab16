//! Magic-link email delivery

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

pub const MAGIC_LINK_SUBJECT: &str = "Sign in to Resume Rewriter";

/// A single outgoing email
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl Email {
    /// Sign-in email carrying `link`
    pub fn magic_link(to: &str, link: &str) -> Self {
        let html = format!(
            r#"<p>Hello!</p>
<p>Click the button below to sign in to your Resume Rewriter account:</p>
<a href="{link}" style="display:inline-block;padding:10px 20px;background:#4f46e5;color:#fff;text-decoration:none;border-radius:4px;">Sign In</a>"#
        );

        Self {
            to: to.to_string(),
            subject: MAGIC_LINK_SUBJECT.to_string(),
            html,
        }
    }
}

/// Build the link the user clicks to finish signing in
pub fn magic_link_url(frontend_url: &str, token: &str) -> String {
    format!("{}/login?token={}", frontend_url.trim_end_matches('/'), token)
}

/// Outgoing mail collaborator
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<()>;
}

/// Mailer backed by the Resend HTTP API
pub struct ResendMailer {
    http: reqwest::Client,
    api_key: String,
    from: String,
}

impl ResendMailer {
    pub fn new(api_key: String, from: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("build http client")?;

        Ok(Self {
            http,
            api_key,
            from,
        })
    }
}

#[derive(Serialize)]
struct ResendPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: Email) -> Result<()> {
        let payload = ResendPayload {
            from: &self.from,
            to: [&email.to],
            subject: &email.subject,
            html: &email.html,
        };

        let response = self
            .http
            .post(RESEND_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("send email request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("mail API returned {status}: {body}");
        }

        info!("Sent \"{}\" email to {}", email.subject, email.to);
        Ok(())
    }
}

/// Development mailer that writes emails to the log instead of sending them
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<()> {
        info!(
            "Email to {} ({}) not sent in development:\n{}",
            email.to, email.subject, email.html
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_link_url() {
        assert_eq!(
            magic_link_url("http://localhost:3000/", "abc.def.ghi"),
            "http://localhost:3000/login?token=abc.def.ghi"
        );
    }

    #[test]
    fn test_magic_link_email() {
        let link = magic_link_url("https://rewrite.example.com", "tok");
        let email = Email::magic_link("alice@example.com", &link);

        assert_eq!(email.to, "alice@example.com");
        assert_eq!(email.subject, MAGIC_LINK_SUBJECT);
        assert!(email.html.contains(r#"href="https://rewrite.example.com/login?token=tok""#));
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_everything() {
        assert!(
            LogMailer
                .send(Email::magic_link("a@example.com", "http://x/login?token=t"))
                .await
                .is_ok()
        );
    }
}
