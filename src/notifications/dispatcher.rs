// src/notifications/dispatcher.rs
//! Sends workflow e-mails off the request path. Failures end here: they are
//! retried, logged and counted, never returned to the caller.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::Instrument;

use super::transport::{EmailTransport, LogOnlyTransport, SmtpMailer};
use super::{render, DispatchError, NotificationEvent, RenderedEmail};
use crate::config::MailConfig;
use crate::models::RequestDetail;
use crate::monitoring::Metrics;

#[derive(Clone)]
pub struct NotificationDispatcher {
    transport: Arc<dyn EmailTransport>,
    admin_copy_to: Option<String>,
    max_attempts: u32,
    retry_backoff: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl NotificationDispatcher {
    pub fn new(transport: Arc<dyn EmailTransport>, config: &MailConfig) -> Self {
        Self {
            transport,
            admin_copy_to: config.admin_copy_to.clone(),
            max_attempts: config.max_attempts.max(1),
            retry_backoff: config.retry_backoff(),
            metrics: None,
        }
    }

    /// SMTP when mail is enabled, log-only otherwise.
    pub fn from_config(config: &MailConfig) -> anyhow::Result<Self> {
        let transport: Arc<dyn EmailTransport> = if config.enabled {
            Arc::new(SmtpMailer::from_config(config)?)
        } else {
            log::warn!("Mail delivery disabled; notifications will only be logged");
            Arc::new(LogOnlyTransport)
        };
        Ok(Self::new(transport, config))
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Buyer first, then the operations copy for new requests.
    pub fn recipients(&self, event: NotificationEvent, detail: &RequestDetail) -> Vec<String> {
        let mut recipients = Vec::with_capacity(2);
        if let Some(email) = &detail.request.buyer_email {
            recipients.push(email.clone());
        }
        if event == NotificationEvent::Created {
            if let Some(copy_to) = &self.admin_copy_to {
                if !recipients.contains(copy_to) {
                    recipients.push(copy_to.clone());
                }
            }
        }
        recipients
    }

    /// Spawns delivery and returns immediately.
    pub fn dispatch(&self, event: NotificationEvent, detail: RequestDetail) -> JoinHandle<()> {
        let dispatcher = self.clone();
        let span = tracing::info_span!(
            "notification",
            %event,
            request_code = %detail.request.request_code,
        );
        tokio::spawn(
            async move {
                dispatcher.deliver(event, &detail).await;
            }
            .instrument(span),
        )
    }

    /// Renders and sends to every recipient. Returns how many were delivered.
    pub async fn deliver(&self, event: NotificationEvent, detail: &RequestDetail) -> usize {
        let code = &detail.request.request_code;

        if detail.request.buyer_email.is_none() {
            log::info!("Request {} has no buyer email, skipping {} notification to buyer", code, event);
        }

        let recipients = self.recipients(event, detail);
        if recipients.is_empty() {
            return 0;
        }

        let email = match render(event, detail) {
            Ok(email) => email,
            Err(e) => {
                log::error!("{} notification for {} not sent: {}", event, code, e);
                self.count_failure();
                return 0;
            }
        };

        let mut delivered = 0;
        for to in &recipients {
            match self.send_with_retry(to, &email).await {
                Ok(()) => {
                    log::info!("{} notification for {} sent to {}", event, code, to);
                    if let Some(metrics) = &self.metrics {
                        metrics.increment_notifications_sent();
                    }
                    delivered += 1;
                }
                Err(e) => {
                    log::error!("{} notification for {} to {} failed: {}", event, code, to, e);
                    self.count_failure();
                }
            }
        }
        delivered
    }

    async fn send_with_retry(&self, to: &str, email: &RenderedEmail) -> Result<(), DispatchError> {
        let mut attempt = 1;
        loop {
            match self.transport.send(to, email).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    log::warn!(
                        "Email to {} failed (attempt {}/{}): {}",
                        to, attempt, self.max_attempts, e
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn count_failure(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.increment_notifications_failed();
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Captures every e-mail instead of sending it.
    #[derive(Default)]
    pub struct RecordingTransport {
        pub sent: Mutex<Vec<(String, RenderedEmail)>>,
    }

    impl RecordingTransport {
        pub fn sent(&self) -> Vec<(String, RenderedEmail)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmailTransport for RecordingTransport {
        async fn send(&self, to: &str, email: &RenderedEmail) -> Result<(), DispatchError> {
            self.sent.lock().unwrap().push((to.to_string(), email.clone()));
            Ok(())
        }
    }

    /// Fails the first `failures` sends with a transport error.
    pub struct FlakyTransport {
        pub failures: u32,
        pub attempts: AtomicU32,
    }

    impl FlakyTransport {
        pub fn failing(failures: u32) -> Self {
            Self { failures, attempts: AtomicU32::new(0) }
        }

        pub fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmailTransport for FlakyTransport {
        async fn send(&self, _to: &str, _email: &RenderedEmail) -> Result<(), DispatchError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                Err(DispatchError::Transport("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    pub fn fast_mail_config() -> MailConfig {
        MailConfig {
            retry_backoff_ms: 1,
            ..MailConfig::default()
        }
    }
}
