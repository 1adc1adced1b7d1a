// src/notifications/transport.rs
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{DispatchError, RenderedEmail};
use crate::config::MailConfig;

/// Delivers one rendered e-mail to one address.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, to: &str, email: &RenderedEmail) -> Result<(), DispatchError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &MailConfig) -> anyhow::Result<Self> {
        let builder = if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
        };

        let mut builder = builder
            .port(config.smtp_port)
            .timeout(Some(config.timeout()));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = Mailbox::new(Some(config.from_name.clone()), config.from_email.parse()?);

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, to: &str, email: &RenderedEmail) -> Result<Message, DispatchError> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| DispatchError::InvalidAddress(format!("{}: {}", to, e)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone())
            .map_err(|e| DispatchError::Render(e.to_string()))
    }
}

#[async_trait]
impl EmailTransport for SmtpMailer {
    async fn send(&self, to: &str, email: &RenderedEmail) -> Result<(), DispatchError> {
        let message = self.build_message(to, email)?;
        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| DispatchError::Transport(e.to_string()))
    }
}

/// Used when mail is disabled: records what would have been sent.
pub struct LogOnlyTransport;

#[async_trait]
impl EmailTransport for LogOnlyTransport {
    async fn send(&self, to: &str, email: &RenderedEmail) -> Result<(), DispatchError> {
        log::info!("Mail disabled, not sending '{}' to {}", email.subject, to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail_config() -> MailConfig {
        MailConfig {
            enabled: true,
            smtp_host: "smtp.example.com".to_string(),
            ..MailConfig::default()
        }
    }

    #[test]
    fn test_builds_html_message() {
        let mailer = SmtpMailer::from_config(&mail_config()).unwrap();
        let email = RenderedEmail {
            subject: "Request Confirmation - REQ-20240309-ABCDEFGHJK | Eco Marketplace".to_string(),
            html: "<p>hello</p>".to_string(),
        };

        let message = mailer.build_message("buyer@example.com", &email).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: buyer@example.com"));
        assert!(raw.contains("Content-Type: text/html"));
        assert!(raw.contains("REQ-20240309-ABCDEFGHJK"));
    }

    #[test]
    fn test_bad_recipient_is_not_retryable() {
        let mailer = SmtpMailer::from_config(&mail_config()).unwrap();
        let email = RenderedEmail { subject: "s".into(), html: "h".into() };

        let err = mailer.build_message("not an address", &email).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidAddress(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_invalid_from_address_is_a_config_error() {
        let config = MailConfig { from_email: "nope".to_string(), ..mail_config() };
        assert!(SmtpMailer::from_config(&config).is_err());
    }
}
