//! Email verification for password reset
//!
//! ```text
//! send_code(from, to)   -> mail_<to>            = "123456"  (5 min)
//! verify_code(to, code) -> reset_token:<token>  = <to>      (15 min)
//! consume_reset_token   -> <to>, entry deleted
//! ```
//!
//! All state lives in the key-value store; when the store is disabled every
//! operation fails with [`AuthError::EmailFlowUnavailable`].

pub mod smtp;

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use secrecy::SecretString;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::config::EmailConfig;
use crate::error::{AuthError, Result};
use crate::store::{KeyValueStore, StoreError};
use smtp::{MailTransport, OutboundMail, SmtpDirectory, sender_domain};

/// Key prefix for verification codes
pub const CODE_KEY_PREFIX: &str = "mail_";
/// Key prefix for reset tokens
pub const RESET_TOKEN_KEY_PREFIX: &str = "reset_token:";
/// Prefix of every reset token value
pub const RESET_TOKEN_PREFIX: &str = "reset_";
/// Digits in a verification code
pub const CODE_LENGTH: usize = 6;

const RESET_TOKEN_BYTES: usize = 32;

/// Verification code → reset token flow
#[derive(Debug, Clone)]
pub struct EmailVerificationFlow {
    store: Arc<dyn KeyValueStore>,
    smtp: SmtpDirectory,
    transport: Arc<dyn MailTransport>,
    config: EmailConfig,
}

impl EmailVerificationFlow {
    /// Flow with the built-in SMTP table and default TTLs
    pub fn new(store: Arc<dyn KeyValueStore>, transport: Arc<dyn MailTransport>) -> Self {
        Self::from_config(store, transport, &EmailConfig::default())
    }

    /// Flow configured from the `[email]` section
    pub fn from_config(
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn MailTransport>,
        config: &EmailConfig,
    ) -> Self {
        Self {
            store,
            smtp: SmtpDirectory::builtin().with_overrides(config.smtp_overrides.clone()),
            transport,
            config: config.clone(),
        }
    }

    /// Replace the SMTP table
    #[must_use]
    pub fn with_smtp_directory(mut self, smtp: SmtpDirectory) -> Self {
        self.smtp = smtp;
        self
    }

    /// Whether the backing store is on
    pub fn is_available(&self) -> bool {
        self.store.is_enabled()
    }

    /// Store key for `email`'s code
    #[must_use]
    pub fn code_key(email: &str) -> String {
        format!("{CODE_KEY_PREFIX}{email}")
    }

    /// Store key for a reset token
    #[must_use]
    pub fn reset_token_key(token: &str) -> String {
        format!("{RESET_TOKEN_KEY_PREFIX}{token}")
    }

    /// Store a fresh code for `to` and mail it from `from`
    ///
    /// A delivery failure after the code was stored is logged and not
    /// returned; the code stays valid for its TTL.
    ///
    /// # Errors
    ///
    /// - [`AuthError::EmptyInput`] for an empty address
    /// - [`AuthError::UnsupportedEmailProvider`] if `from`'s domain has no SMTP entry
    /// - [`AuthError::EmailFlowUnavailable`] or [`AuthError::Store`] if the code
    ///   cannot be stored (no mail is sent)
    pub async fn send_code(&self, from: &str, to: &str, smtp_auth_code: &str) -> Result<()> {
        if from.is_empty() {
            return Err(AuthError::EmptyInput("from"));
        }
        if to.is_empty() {
            return Err(AuthError::EmptyInput("email"));
        }

        let domain = sender_domain(from).unwrap_or_default();
        let endpoint = self
            .smtp
            .lookup(domain)
            .ok_or_else(|| AuthError::UnsupportedEmailProvider(domain.to_string()))?;
        self.ensure_available()?;

        let code = generate_code();
        self.store
            .set(&Self::code_key(to), &code, self.config.code_ttl())
            .await
            .map_err(store_error)?;
        debug!(to, ttl_secs = self.config.code_ttl_secs, "verification code stored");

        let mail = OutboundMail {
            host: endpoint.host.clone(),
            port: endpoint.port,
            use_tls: endpoint.use_tls(),
            from: from.to_string(),
            auth_code: SecretString::new(smtp_auth_code.to_string()),
            to: to.to_string(),
            subject: self.config.subject.clone(),
            html_body: render_code_mail(&code, self.config.code_ttl()),
        };

        if let Err(e) = self.transport.send(&mail).await {
            warn!(
                error = %e,
                to,
                host = %endpoint.host,
                "verification mail not delivered; code remains valid"
            );
        }
        Ok(())
    }

    /// Check `code` for `email` and mint a reset token
    ///
    /// # Errors
    ///
    /// - [`AuthError::EmptyInput`] if either argument is empty
    /// - [`AuthError::CodeNotFound`] if no live code exists
    /// - [`AuthError::CodeMismatch`] if the code differs
    /// - [`AuthError::EmailFlowUnavailable`] / [`AuthError::Store`] on store failure
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<String> {
        if email.is_empty() {
            return Err(AuthError::EmptyInput("email"));
        }
        if code.is_empty() {
            return Err(AuthError::EmptyInput("code"));
        }
        self.ensure_available()?;

        let key = Self::code_key(email);
        let stored = self
            .store
            .get(&key)
            .await
            .map_err(store_error)?
            .ok_or(AuthError::CodeNotFound)?;

        if !bool::from(stored.as_bytes().ct_eq(code.as_bytes())) {
            debug!(email, "verification code mismatch");
            return Err(AuthError::CodeMismatch);
        }

        if self.config.consume_code_on_success {
            self.store.delete(&key).await.map_err(store_error)?;
        }

        let token = generate_reset_token();
        self.store
            .set(
                &Self::reset_token_key(&token),
                email,
                self.config.reset_token_ttl(),
            )
            .await
            .map_err(store_error)?;
        debug!(email, "reset token issued");
        Ok(token)
    }

    /// Email authorised by `token`
    ///
    /// # Errors
    ///
    /// [`AuthError::ResetTokenNotFound`] if absent or expired.
    pub async fn resolve_reset_token(&self, token: &str) -> Result<String> {
        if token.is_empty() {
            return Err(AuthError::EmptyInput("reset_token"));
        }
        self.ensure_available()?;

        self.store
            .get(&Self::reset_token_key(token))
            .await
            .map_err(store_error)?
            .ok_or(AuthError::ResetTokenNotFound)
    }

    /// Resolve `token` and delete it so it cannot be used again
    ///
    /// # Errors
    ///
    /// Same as [`EmailVerificationFlow::resolve_reset_token`].
    pub async fn consume_reset_token(&self, token: &str) -> Result<String> {
        let email = self.resolve_reset_token(token).await?;
        self.store
            .delete(&Self::reset_token_key(token))
            .await
            .map_err(store_error)?;
        debug!(email = %email, "reset token consumed");
        Ok(email)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.store.is_enabled() {
            Ok(())
        } else {
            Err(AuthError::EmailFlowUnavailable)
        }
    }
}

fn store_error(e: StoreError) -> AuthError {
    match e {
        StoreError::Disabled => AuthError::EmailFlowUnavailable,
        other => AuthError::Store(other),
    }
}

/// Six random digits, zero-padded
fn generate_code() -> String {
    let n: u32 = rand::rng().random_range(0..1_000_000);
    format!("{n:0width$}", width = CODE_LENGTH)
}

/// `reset_` followed by 32 random bytes in URL-safe base64
fn generate_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    format!("{RESET_TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes))
}

fn render_code_mail(code: &str, ttl: Duration) -> String {
    let minutes = (ttl.as_secs() / 60).max(1);
    format!(
        r#"<h2>您的验证码</h2>
<p>请使用以下验证码完成操作：</p>
<p style="font-size: 24px; color: blue;"><strong>{code}</strong></p>
<p>验证码将在 {minutes} 分钟后失效。</p>"#
    )
}
