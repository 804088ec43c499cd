use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::config::MailConfig;

/// One transactional email.
#[derive(Debug, Clone, Serialize)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Outbound email delivery. Callers treat delivery as best-effort: the user
/// record is saved before `send` is attempted and a failure never rolls the
/// primary write back.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, mail: &Mail) -> anyhow::Result<()>;
}

/// Delivers mail by posting JSON to an HTTP relay.
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl HttpNotifier {
    pub fn new(endpoint: &str, api_key: &str, from: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        }
    }
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
    html: &'a str,
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, mail: &Mail) -> anyhow::Result<()> {
        let body = RelayMessage {
            from: &self.from,
            to: &mail.to,
            subject: &mail.subject,
            text: &mail.text,
            html: &mail.html,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("mail relay request")?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("mail relay returned {status}");
        }
        info!(to = %mail.to, subject = %mail.subject, "email sent");
        Ok(())
    }
}

/// No relay configured: log the message and report success.
pub struct DiscardNotifier;

#[async_trait]
impl Notifier for DiscardNotifier {
    async fn send(&self, mail: &Mail) -> anyhow::Result<()> {
        info!(to = %mail.to, subject = %mail.subject, "mail relay not configured, discarding email");
        Ok(())
    }
}

/// Pick the notifier implied by the config.
pub fn from_config(mail: &MailConfig) -> std::sync::Arc<dyn Notifier> {
    match &mail.endpoint {
        Some(endpoint) => std::sync::Arc::new(HttpNotifier::new(endpoint, &mail.api_key, &mail.from)),
        None => std::sync::Arc::new(DiscardNotifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn discard_notifier_always_succeeds() {
        let mail = Mail {
            to: "ann@x.com".into(),
            subject: "Email Verification".into(),
            text: "code".into(),
            html: "<p>code</p>".into(),
        };
        assert!(DiscardNotifier.send(&mail).await.is_ok());
    }

    #[tokio::test]
    async fn from_config_without_endpoint_discards() {
        let notifier = from_config(&MailConfig {
            endpoint: None,
            api_key: String::new(),
            from: "no-reply@keygate.local".into(),
        });
        let mail = Mail {
            to: "a@b.c".into(),
            subject: "s".into(),
            text: "t".into(),
            html: "h".into(),
        };
        assert!(notifier.send(&mail).await.is_ok());
    }
}
