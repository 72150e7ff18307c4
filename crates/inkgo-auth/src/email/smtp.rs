//! Outbound mail
//!
//! [`SmtpDirectory`] maps a sender's domain to its provider's SMTP endpoint;
//! [`MailTransport`] delivers one message. [`SmtpMailTransport`] is the real
//! transport (feature `smtp`); tests substitute a recording implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

/// Port that means implicit TLS
pub const IMPLICIT_TLS_PORT: u16 = 465;

/// SMTP server for a sender domain
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SmtpEndpoint {
    /// Host name
    pub host: String,
    /// Port; 465 selects implicit TLS
    pub port: u16,
}

impl SmtpEndpoint {
    /// Create an endpoint
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Whether the connection starts with TLS
    #[must_use]
    pub fn use_tls(&self) -> bool {
        self.port == IMPLICIT_TLS_PORT
    }
}

/// Sender domain → SMTP endpoint table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpDirectory {
    endpoints: HashMap<String, SmtpEndpoint>,
}

impl Default for SmtpDirectory {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SmtpDirectory {
    /// Table with no entries
    #[must_use]
    pub fn empty() -> Self {
        Self {
            endpoints: HashMap::new(),
        }
    }

    /// Common Chinese and international mailbox providers
    #[must_use]
    pub fn builtin() -> Self {
        let endpoints = [
            ("qq.com", "smtp.qq.com", 587),
            ("163.com", "smtp.163.com", 25),
            ("126.com", "smtp.126.com", 25),
            ("gmail.com", "smtp.gmail.com", 587),
            ("aliyun.com", "smtp.aliyun.com", 465),
            ("sina.com", "smtp.sina.com", 25),
        ]
        .into_iter()
        .map(|(domain, host, port)| (domain.to_string(), SmtpEndpoint::new(host, port)))
        .collect();
        Self { endpoints }
    }

    /// Add or replace entries
    #[must_use]
    pub fn with_overrides(mut self, overrides: HashMap<String, SmtpEndpoint>) -> Self {
        for (domain, endpoint) in overrides {
            self.endpoints.insert(domain.to_ascii_lowercase(), endpoint);
        }
        self
    }

    /// Add or replace one entry
    #[must_use]
    pub fn with_endpoint(mut self, domain: &str, endpoint: SmtpEndpoint) -> Self {
        self.endpoints.insert(domain.to_ascii_lowercase(), endpoint);
        self
    }

    /// Endpoint for `domain` (case-insensitive)
    pub fn lookup(&self, domain: &str) -> Option<&SmtpEndpoint> {
        self.endpoints.get(&domain.to_ascii_lowercase())
    }
}

/// Domain part of an address with exactly one `@` and non-empty halves
pub fn sender_domain(address: &str) -> Option<&str> {
    let (local, domain) = address.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(domain)
}

/// One message ready for delivery
#[derive(Debug, Clone)]
pub struct OutboundMail {
    /// SMTP host
    pub host: String,
    /// SMTP port
    pub port: u16,
    /// Implicit TLS
    pub use_tls: bool,
    /// Sender address, also the SMTP login
    pub from: String,
    /// SMTP authorization code for the sender
    pub auth_code: SecretString,
    /// Recipient
    pub to: String,
    /// Subject line
    pub subject: String,
    /// HTML body
    pub html_body: String,
}

/// Mail delivery errors
#[derive(Debug, Error)]
pub enum MailError {
    /// Sender or recipient address is not valid
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Message could not be assembled
    #[error("failed to build message: {0}")]
    Build(String),

    /// SMTP dialogue failed
    #[error("SMTP transport error: {0}")]
    Transport(String),
}

/// Delivers one message
#[async_trait]
pub trait MailTransport: Send + Sync + std::fmt::Debug {
    /// Send `mail`
    ///
    /// # Errors
    ///
    /// Any [`MailError`].
    async fn send(&self, mail: &OutboundMail) -> Result<(), MailError>;
}

#[cfg(feature = "smtp")]
pub use lettre_transport::SmtpMailTransport;

#[cfg(feature = "smtp")]
mod lettre_transport {
    use std::time::Duration;

    use async_trait::async_trait;
    use lettre::message::Mailbox;
    use lettre::message::header::ContentType;
    use lettre::transport::smtp::authentication::Credentials;
    use lettre::transport::smtp::client::{Tls, TlsParameters};
    use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
    use secrecy::ExposeSecret;
    use tracing::debug;

    use super::{MailError, MailTransport, OutboundMail};

    /// `lettre` SMTP transport
    ///
    /// A connection is opened per message since the SMTP login is the
    /// sender's own mailbox and differs between calls.
    #[derive(Debug, Clone)]
    pub struct SmtpMailTransport {
        timeout: Duration,
    }

    impl Default for SmtpMailTransport {
        fn default() -> Self {
            Self::new(Duration::from_secs(10))
        }
    }

    impl SmtpMailTransport {
        /// Transport with `timeout` for connect and each command
        #[must_use]
        pub fn new(timeout: Duration) -> Self {
            Self { timeout }
        }

        /// Transport using `email.smtp_timeout_secs`
        #[must_use]
        pub fn from_config(config: &crate::config::EmailConfig) -> Self {
            Self::new(config.smtp_timeout())
        }

        fn transport(
            &self,
            mail: &OutboundMail,
        ) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
            let creds = Credentials::new(
                mail.from.clone(),
                mail.auth_code.expose_secret().clone(),
            );

            let builder = if mail.use_tls {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&mail.host)
                    .map_err(|e| MailError::Transport(e.to_string()))?
            } else {
                let tls = TlsParameters::new(mail.host.clone())
                    .map_err(|e| MailError::Transport(e.to_string()))?;
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&mail.host)
                    .tls(Tls::Opportunistic(tls))
            };

            Ok(builder
                .port(mail.port)
                .credentials(creds)
                .timeout(Some(self.timeout))
                .build())
        }
    }

    #[async_trait]
    impl MailTransport for SmtpMailTransport {
        async fn send(&self, mail: &OutboundMail) -> Result<(), MailError> {
            let from: Mailbox = mail
                .from
                .parse()
                .map_err(|_| MailError::InvalidAddress(mail.from.clone()))?;
            let to: Mailbox = mail
                .to
                .parse()
                .map_err(|_| MailError::InvalidAddress(mail.to.clone()))?;

            let message = Message::builder()
                .from(from)
                .to(to)
                .subject(mail.subject.as_str())
                .header(ContentType::TEXT_HTML)
                .body(mail.html_body.clone())
                .map_err(|e| MailError::Build(e.to_string()))?;

            self.transport(mail)?
                .send(message)
                .await
                .map_err(|e| MailError::Transport(e.to_string()))?;

            debug!(host = %mail.host, port = mail.port, tls = mail.use_tls, "mail delivered");
            Ok(())
        }
    }
}
