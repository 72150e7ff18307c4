//! Bearer token lifecycle
//!
//! - [`TokenCodec`] issues, parses, refreshes and revokes HS256 tokens
//! - [`RevocationLedger`] records revoked tokens in the key-value store until
//!   they would have expired anyway
//!
//! Every verification failure surfaces as
//! [`AuthError::InvalidOrExpiredToken`](crate::AuthError::InvalidOrExpiredToken).

mod codec;
mod revocation;

use serde::{Deserialize, Serialize};

pub use codec::TokenCodec;
pub use revocation::{REVOCATION_KEY_PREFIX, REVOKED_MARKER, RevocationLedger};

/// Identity embedded in a token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    /// User id
    pub id: u64,
    /// Display name
    pub name: String,
}

impl Subject {
    /// Create a subject
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Token payload
///
/// Times are Unix seconds with `iat <= nbf < exp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub id: u64,
    /// Display name
    pub name: String,
    /// Issuer
    pub iss: String,
    /// Issued at
    pub iat: u64,
    /// Not before
    pub nbf: u64,
    /// Expiry
    pub exp: u64,
}

impl Claims {
    /// Project back to the subject
    #[must_use]
    pub fn subject(&self) -> Subject {
        Subject::new(self.id, self.name.clone())
    }

    /// Whether `now` falls in `[nbf, exp)`
    #[must_use]
    pub fn is_valid_at(&self, now: u64) -> bool {
        self.nbf <= now && now < self.exp
    }
}

/// What [`TokenCodec::is_token_revoked`] answers when the ledger is unreadable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReadPolicy {
    /// Treat the token as not revoked and log a warning
    #[default]
    FailOpen,
    /// Report [`AuthError::RevocationStoreUnavailable`](crate::AuthError::RevocationStoreUnavailable)
    FailClosed,
}
