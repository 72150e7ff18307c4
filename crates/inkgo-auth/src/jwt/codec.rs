//! HS256 token codec
//!
//! The codec holds only immutable configuration and a handle to the
//! revocation ledger, so one instance is shared across all requests.
//!
//! Time checks are done here rather than by `jsonwebtoken` so that the window
//! is exactly `nbf <= now < exp` with no leeway.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use super::{Claims, RevocationLedger, RevocationReadPolicy, Subject};
use crate::config::{JwtConfig, MAX_EXPIRE_SECS};
use crate::error::{AuthError, Result};
use crate::store::StoreError;

/// Default refresh window
pub const DEFAULT_REFRESH_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Issues and verifies bearer tokens
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl: Duration,
    refresh_window: Duration,
    read_policy: RevocationReadPolicy,
    ledger: Arc<RevocationLedger>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .field("refresh_window", &self.refresh_window)
            .field("read_policy", &self.read_policy)
            .field("ledger", &self.ledger)
            .finish()
    }
}

impl TokenCodec {
    /// Create a codec with the default refresh window and fail-open reads
    ///
    /// `ttl` is rounded up to whole seconds, with a minimum of one second.
    pub fn new(
        secret: &SecretString,
        issuer: impl Into<String>,
        ttl: Duration,
        ledger: Arc<RevocationLedger>,
    ) -> Self {
        let issuer = issuer.into();
        let ttl = whole_seconds(ttl);
        let bytes = secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss"]);

        Self {
            encoding_key: EncodingKey::from_secret(bytes),
            decoding_key: DecodingKey::from_secret(bytes),
            validation,
            issuer,
            ttl,
            refresh_window: DEFAULT_REFRESH_WINDOW,
            read_policy: RevocationReadPolicy::default(),
            ledger,
        }
    }

    /// Build from the `[jwt]` section
    ///
    /// # Errors
    ///
    /// [`AuthError::Config`] for an empty secret or issuer, or a zero TTL.
    pub fn from_config(config: &JwtConfig, ledger: Arc<RevocationLedger>) -> Result<Self> {
        if config.secret.expose_secret().is_empty() {
            return Err(AuthError::Config("jwt.secret must not be empty".into()));
        }
        if config.issuer.is_empty() {
            return Err(AuthError::Config("jwt.issuer must not be empty".into()));
        }
        if config.expire_secs == 0 || config.expire_secs > MAX_EXPIRE_SECS {
            return Err(AuthError::Config(format!(
                "jwt.expire_secs must be between 1 and {MAX_EXPIRE_SECS}"
            )));
        }

        Ok(Self::new(&config.secret, config.issuer.clone(), config.ttl(), ledger)
            .with_refresh_window(config.refresh_window())
            .with_read_policy(config.revocation_read_policy))
    }

    /// Override the refresh window
    #[must_use]
    pub fn with_refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = window;
        self
    }

    /// Override the revocation read policy
    #[must_use]
    pub fn with_read_policy(mut self, policy: RevocationReadPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    /// Token lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `subject`
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidSubject`] when the subject has no name.
    pub fn generate_token(&self, subject: &Subject) -> Result<String> {
        self.generate_at(subject, now_secs())
    }

    /// Verify `token` and return its subject
    ///
    /// Does not consult the revocation ledger; see [`TokenCodec::authenticate`].
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidOrExpiredToken`] on any verification failure.
    pub fn parse_token(&self, token: &str) -> Result<Subject> {
        self.claims_at(token, now_secs()).map(|claims| claims.subject())
    }

    /// Time left before `token` expires
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidOrExpiredToken`] on any verification failure.
    pub fn remaining_lifetime(&self, token: &str) -> Result<Duration> {
        let now = now_secs();
        let claims = self.claims_at(token, now)?;
        Ok(Duration::from_secs(claims.exp - now))
    }

    /// Swap a nearly-expired token for a fresh one
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidOrExpiredToken`] on verification failure
    /// - [`AuthError::RefreshNotNeeded`] while more than the refresh window remains
    pub fn refresh_token(&self, token: &str) -> Result<String> {
        self.refresh_at(token, now_secs())
    }

    /// Revoke `token` for the rest of its lifetime
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidOrExpiredToken`] if the token no longer verifies
    ///   (nothing is written)
    /// - [`AuthError::RevocationStoreUnavailable`] if the ledger write fails
    pub async fn revoke_token(&self, token: &str) -> Result<()> {
        let now = now_secs();
        let claims = self.claims_at(token, now)?;
        let remaining = Duration::from_secs(claims.exp - now);

        self.ledger.revoke(token, remaining).await.map_err(|e| {
            warn!(error = %e, user_id = claims.id, "failed to record token revocation");
            AuthError::RevocationStoreUnavailable(e.to_string())
        })?;

        debug!(
            user_id = claims.id,
            remaining_secs = remaining.as_secs(),
            "token revoked"
        );
        Ok(())
    }

    /// Whether `token` is in the revocation ledger
    ///
    /// # Errors
    ///
    /// Only under [`RevocationReadPolicy::FailClosed`], when the ledger cannot
    /// be read: [`AuthError::RevocationStoreUnavailable`].
    pub async fn is_token_revoked(&self, token: &str) -> Result<bool> {
        match self.ledger.is_revoked(token).await {
            Ok(revoked) => Ok(revoked),
            Err(e) => match self.read_policy {
                RevocationReadPolicy::FailOpen => {
                    if matches!(e, StoreError::Disabled) {
                        debug!("revocation ledger disabled, treating token as live");
                    } else {
                        warn!(error = %e, "revocation ledger unreadable, treating token as live");
                    }
                    Ok(false)
                }
                RevocationReadPolicy::FailClosed => {
                    warn!(error = %e, "revocation ledger unreadable, rejecting token");
                    Err(AuthError::RevocationStoreUnavailable(e.to_string()))
                }
            },
        }
    }

    /// Revocation check followed by verification
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidOrExpiredToken`] for revoked, expired or malformed
    /// tokens; [`AuthError::RevocationStoreUnavailable`] under fail-closed reads.
    pub async fn authenticate(&self, token: &str) -> Result<Subject> {
        if self.is_token_revoked(token).await? {
            debug!("rejected revoked token");
            return Err(AuthError::InvalidOrExpiredToken);
        }
        self.parse_token(token)
    }

    fn generate_at(&self, subject: &Subject, now: u64) -> Result<String> {
        if subject.name.trim().is_empty() {
            return Err(AuthError::InvalidSubject("subject name is empty".into()));
        }

        let exp = now
            .checked_add(self.ttl.as_secs())
            .ok_or_else(|| AuthError::Internal("token expiry overflows".into()))?;
        let claims = Claims {
            id: subject.id,
            name: subject.name.clone(),
            iss: self.issuer.clone(),
            iat: now,
            nbf: now,
            exp,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("token signing failed: {e}")))?;
        debug!(user_id = subject.id, exp = claims.exp, "token issued");
        Ok(token)
    }

    fn claims_at(&self, token: &str, now: u64) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!(error = %e, "token verification failed");
            AuthError::InvalidOrExpiredToken
        })?;

        let claims = data.claims;
        if !claims.is_valid_at(now) {
            debug!(
                nbf = claims.nbf,
                exp = claims.exp,
                now,
                "token outside its validity window"
            );
            return Err(AuthError::InvalidOrExpiredToken);
        }
        Ok(claims)
    }

    fn refresh_at(&self, token: &str, now: u64) -> Result<String> {
        let claims = self.claims_at(token, now)?;
        let remaining = claims.exp - now;
        if remaining > self.refresh_window.as_secs() {
            return Err(AuthError::RefreshNotNeeded);
        }
        self.generate_at(&claims.subject(), now)
    }
}

fn whole_seconds(ttl: Duration) -> Duration {
    let secs = ttl.as_secs().saturating_add(u64::from(ttl.subsec_nanos() > 0));
    Duration::from_secs(secs.max(1))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
