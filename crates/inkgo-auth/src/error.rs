//! Authentication Errors
//!
//! One error enum for the whole authentication core. Variants are grouped by
//! [`ErrorKind`] so the HTTP layer can pick a response class without matching
//! every variant. Token failures are deliberately collapsed into
//! [`AuthError::InvalidOrExpiredToken`]: callers never learn whether a token was
//! revoked, expired or malformed.

use thiserror::Error;

use crate::directory::DirectoryError;
use crate::store::StoreError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, AuthError>;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    // ═══════════════════════════════════════════════════════════
    // INPUT
    // ═══════════════════════════════════════════════════════════
    /// Subject has no usable identity (empty name)
    #[error("Invalid subject: {0}")]
    InvalidSubject(String),

    /// A required argument was empty
    #[error("Required input is empty: {0}")]
    EmptyInput(&'static str),

    /// No Authorization header was supplied
    #[error("Missing Authorization header")]
    MissingAuthorizationHeader,

    /// Authorization header is not `Bearer <token>`
    #[error("Authorization header is malformed")]
    MalformedAuthorizationHeader,

    // ═══════════════════════════════════════════════════════════
    // TOKEN
    // ═══════════════════════════════════════════════════════════
    /// Bad signature, malformed, expired, not yet valid or revoked
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,

    /// Token still has more than the refresh window left
    #[error("token is still valid, no need to refresh")]
    RefreshNotNeeded,

    // ═══════════════════════════════════════════════════════════
    // PROVIDER
    // ═══════════════════════════════════════════════════════════
    /// Provider name is not registered or has no configuration
    #[error("OAuth provider not found or not configured: {0}")]
    UnknownOrUnconfiguredProvider(String),

    /// Authorization code exchange failed
    #[error("{provider}: access token exchange failed: {reason}")]
    ProviderExchangeFailed {
        /// Provider name
        provider: String,
        /// Failure description (never contains client secrets)
        reason: String,
    },

    /// Profile fetch or decode failed
    #[error("{provider}: user info request failed: {reason}")]
    ProviderProfileFailed {
        /// Provider name
        provider: String,
        /// Failure description
        reason: String,
    },

    /// Profile call attempted without an access token
    #[error("Missing provider access token")]
    MissingAccessToken,

    /// QQ / WeChat token response carried no openid
    #[error("{provider}: token response did not include an openid")]
    MissingProviderOpenID {
        /// Provider name
        provider: String,
    },

    // ═══════════════════════════════════════════════════════════
    // STORE
    // ═══════════════════════════════════════════════════════════
    /// Revocation ledger could not be written (or read under fail-closed policy)
    #[error("Token revocation store unavailable: {0}")]
    RevocationStoreUnavailable(String),

    /// Email verification needs a key-value store and none is enabled
    #[error("Email verification is unavailable: key-value store is disabled")]
    EmailFlowUnavailable,

    /// Other key-value store failure
    #[error("Key-value store error: {0}")]
    Store(#[from] StoreError),

    // ═══════════════════════════════════════════════════════════
    // VERIFICATION
    // ═══════════════════════════════════════════════════════════
    /// Sender domain has no SMTP configuration
    #[error("Unsupported email provider: {0}")]
    UnsupportedEmailProvider(String),

    /// No live verification code for this email
    #[error("Verification code not found or expired")]
    CodeNotFound,

    /// Supplied code differs from the stored one
    #[error("Verification code does not match")]
    CodeMismatch,

    /// Reset token unknown or expired
    #[error("Reset token not found or expired")]
    ResetTokenNotFound,

    // ═══════════════════════════════════════════════════════════
    // ACCOUNT
    // ═══════════════════════════════════════════════════════════
    /// Identifier/password pair rejected
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Token subject or email has no matching user
    #[error("User not found")]
    UserNotFound,

    /// User exists but is frozen or deleted
    #[error("User is frozen or deleted")]
    UserInactive,

    /// User directory failure
    #[error("User directory error: {0}")]
    Directory(#[from] DirectoryError),

    // ═══════════════════════════════════════════════════════════
    // INTERNAL
    // ═══════════════════════════════════════════════════════════
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected internal failure (e.g. signing)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error taxonomy used to pick a response class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any I/O
    Input,
    /// Bearer token rejected
    Token,
    /// Third-party OAuth provider failure
    Provider,
    /// Key-value store disabled or unreachable
    StoreUnavailable,
    /// Email code / reset token failure the user can act on
    Verification,
    /// Credentials or account state
    Account,
    /// Server-side fault
    Internal,
}

impl AuthError {
    /// Taxonomy bucket for this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSubject(_)
            | Self::EmptyInput(_)
            | Self::MissingAuthorizationHeader
            | Self::MalformedAuthorizationHeader => ErrorKind::Input,
            Self::InvalidOrExpiredToken | Self::RefreshNotNeeded => ErrorKind::Token,
            Self::UnknownOrUnconfiguredProvider(_)
            | Self::ProviderExchangeFailed { .. }
            | Self::ProviderProfileFailed { .. }
            | Self::MissingAccessToken
            | Self::MissingProviderOpenID { .. } => ErrorKind::Provider,
            Self::RevocationStoreUnavailable(_) | Self::EmailFlowUnavailable | Self::Store(_) => {
                ErrorKind::StoreUnavailable
            }
            Self::UnsupportedEmailProvider(_)
            | Self::CodeNotFound
            | Self::CodeMismatch
            | Self::ResetTokenNotFound => ErrorKind::Verification,
            Self::InvalidCredentials | Self::UserNotFound | Self::UserInactive => {
                ErrorKind::Account
            }
            Self::Directory(_) | Self::Config(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller (rather than the server) is at fault
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Input | ErrorKind::Token | ErrorKind::Verification | ErrorKind::Account
        )
    }

    pub(crate) fn exchange(provider: &str, reason: impl Into<String>) -> Self {
        Self::ProviderExchangeFailed {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn profile(provider: &str, reason: impl Into<String>) -> Self {
        Self::ProviderProfileFailed {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing_openid(provider: &str) -> Self {
        Self::MissingProviderOpenID {
            provider: provider.to_string(),
        }
    }
}
