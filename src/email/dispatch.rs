//! Email dispatcher: one send attempt per call, mock result when the transport
//! is unconfigured or fails.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, Message, SmtpTransport, Transport};
use rand::Rng;
use rand::distributions::Alphanumeric;
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SmtpConfig;
use crate::error::EmailError;

/// A fully rendered email ready to send.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub name: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    /// Sequence stage or other tag, for logging.
    pub email_type: String,
}

/// Outcome of a dispatch. Same shape for real and mock sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub success: bool,
    pub provider: String,
    pub message_id: String,
    pub to: String,
    #[serde(rename = "type")]
    pub email_type: String,
    pub mock: bool,
}

/// Something that can deliver an email.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Transport name reported as `provider`.
    fn name(&self) -> &str;

    /// Send and return the transport's message id.
    async fn send(&self, email: &OutgoingEmail) -> Result<String, EmailError>;
}

/// SMTP transport via lettre.
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, EmailError> {
        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&config.host)
            .map_err(|e| EmailError::Transport {
                transport: "smtp".into(),
                reason: format!("SMTP relay error: {e}"),
            })?
            .port(config.port)
            .credentials(creds)
            .timeout(Some(config.timeout))
            .build();

        let from = config
            .from_address
            .parse::<Mailbox>()
            .map_err(|e| EmailError::InvalidAddress {
                address: config.from_address.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self { transport, from })
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<(Message, String), EmailError> {
        let address = email
            .to
            .parse::<Address>()
            .map_err(|e| EmailError::InvalidAddress {
                address: email.to.clone(),
                reason: e.to_string(),
            })?;
        let to = Mailbox::new(
            Some(email.name.clone()).filter(|n| !n.trim().is_empty()),
            address,
        );

        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain());
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .message_id(Some(message_id.clone()))
            .multipart(MultiPart::alternative_plain_html(
                email.text.clone(),
                email.html.clone(),
            ))
            .map_err(|e| EmailError::Build(e.to_string()))?;

        Ok((message, message_id))
    }
}

#[async_trait]
impl EmailTransport for SmtpMailer {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<String, EmailError> {
        let (message, message_id) = self.build_message(email)?;
        let transport = self.transport.clone();

        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| EmailError::Transport {
                transport: "smtp".into(),
                reason: format!("send task failed: {e}"),
            })?
            .map_err(|e| EmailError::Transport {
                transport: "smtp".into(),
                reason: format!("SMTP send failed: {e}"),
            })?;

        Ok(message_id)
    }
}

/// Upper bound on one send attempt, whatever the transport does.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Sends through the configured transport, substituting a mock result on
/// absence, failure or timeout. Never fails.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Option<Arc<dyn EmailTransport>>,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(transport: Option<Arc<dyn EmailTransport>>) -> Self {
        Self {
            transport,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Dispatcher with no transport: every send is mocked.
    pub fn mock_only() -> Self {
        Self::new(None)
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }

    pub async fn dispatch(&self, email: &OutgoingEmail) -> DispatchResult {
        let Some(transport) = &self.transport else {
            let result = mock_result(email);
            info!(
                to = %email.to,
                email_type = %email.email_type,
                message_id = %result.message_id,
                "Email transport not configured, mock send"
            );
            return result;
        };

        let outcome = tokio::time::timeout(self.send_timeout, transport.send(email))
            .await
            .unwrap_or_else(|_| {
                Err(EmailError::Transport {
                    transport: transport.name().to_string(),
                    reason: format!("no response within {:?}", self.send_timeout),
                })
            });

        match outcome {
            Ok(message_id) => {
                info!(
                    to = %email.to,
                    email_type = %email.email_type,
                    provider = transport.name(),
                    %message_id,
                    "Email sent"
                );
                DispatchResult {
                    success: true,
                    provider: transport.name().to_string(),
                    message_id,
                    to: email.to.clone(),
                    email_type: email.email_type.clone(),
                    mock: false,
                }
            }
            Err(e) => {
                warn!(
                    to = %email.to,
                    email_type = %email.email_type,
                    error = %e,
                    "Email send failed, returning mock result"
                );
                mock_result(email)
            }
        }
    }
}

fn mock_result(email: &OutgoingEmail) -> DispatchResult {
    DispatchResult {
        success: true,
        provider: "mock".to_string(),
        message_id: mock_message_id(),
        to: email.to.clone(),
        email_type: email.email_type.clone(),
        mock: true,
    }
}

/// `mock_<unix-millis>_<8 alphanumerics>`.
fn mock_message_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("mock_{}_{}", chrono::Utc::now().timestamp_millis(), suffix)
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingTransport;
    use super::*;

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            to: "ada@example.com".into(),
            name: "Ada".into(),
            subject: "Hi".into(),
            html: "<p>Hi</p>".into(),
            text: "Hi".into(),
            email_type: "welcome".into(),
        }
    }

    #[tokio::test]
    async fn unconfigured_is_mocked() {
        let result = Dispatcher::mock_only().dispatch(&email()).await;
        assert!(result.success);
        assert!(result.mock);
        assert_eq!(result.provider, "mock");
        assert_eq!(result.email_type, "welcome");

        let parts: Vec<&str> = result.message_id.splitn(3, '_').collect();
        assert_eq!(parts[0], "mock");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn transport_success_reports_provider() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = Dispatcher::new(Some(transport.clone()));
        let result = dispatcher.dispatch(&email()).await;

        assert!(!result.mock);
        assert_eq!(result.provider, "recording");
        assert_eq!(result.message_id, "rec-1");
        assert_eq!(transport.types(), vec!["welcome"]);
    }

    #[tokio::test]
    async fn transport_failure_is_mocked_after_one_attempt() {
        let transport = Arc::new(RecordingTransport::failing());
        let dispatcher = Dispatcher::new(Some(transport.clone()));
        let result = dispatcher.dispatch(&email()).await;

        assert!(result.success);
        assert!(result.mock);
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    /// Accepts the connection and never answers.
    struct SilentTransport;

    #[async_trait]
    impl EmailTransport for SilentTransport {
        fn name(&self) -> &str {
            "silent"
        }

        async fn send(&self, _email: &OutgoingEmail) -> Result<String, EmailError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_transport_is_mocked_after_timeout() {
        let dispatcher = Dispatcher::new(Some(Arc::new(SilentTransport)))
            .with_send_timeout(Duration::from_secs(5));
        let started = tokio::time::Instant::now();

        let result = dispatcher.dispatch(&email()).await;

        assert!(result.success);
        assert!(result.mock);
        assert_eq!(result.provider, "mock");
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(6));
    }

    #[test]
    fn smtp_message_is_multipart() {
        let config = SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            username: "user".into(),
            password: secrecy::SecretString::from("pw"),
            from_address: "Academy <hello@academy.example.com>".into(),
            timeout: crate::config::DEFAULT_SMTP_TIMEOUT,
        };
        let mailer = SmtpMailer::new(&config).unwrap();
        let (message, id) = mailer.build_message(&email()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(id.ends_with("@academy.example.com>"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("Subject: Hi"));
    }

    #[test]
    fn bad_recipient_is_rejected() {
        let config = SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            username: "user".into(),
            password: secrecy::SecretString::from("pw"),
            from_address: "hello@academy.example.com".into(),
            timeout: crate::config::DEFAULT_SMTP_TIMEOUT,
        };
        let mailer = SmtpMailer::new(&config).unwrap();
        let mut bad = email();
        bad.to = "not-an-address".into();
        assert!(matches!(
            mailer.build_message(&bad),
            Err(EmailError::InvalidAddress { .. })
        ));
    }
}
