//! User directory seam
//!
//! Account storage belongs to the application; the authentication core only
//! needs the lookups and writes below.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::jwt::Subject;
use crate::oauth::NormalizedIdentity;

/// User directory errors
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Backend query failed
    #[error("directory backend error: {0}")]
    Backend(String),

    /// Write rejected (e.g. duplicate username or email)
    #[error("directory conflict: {0}")]
    Conflict(String),
}

/// Account state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// May sign in
    #[default]
    Active,
    /// Suspended by an administrator
    Frozen,
    /// Soft-deleted
    Deleted,
}

impl UserStatus {
    /// Whether the account may authenticate
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Account as seen by the authentication core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// User id
    pub id: u64,
    /// Name embedded in tokens
    pub display_name: String,
    /// Email address
    pub email: Option<String>,
    /// Account state
    pub status: UserStatus,
}

impl UserRecord {
    /// Token subject for this user
    #[must_use]
    pub fn subject(&self) -> Subject {
        Subject::new(self.id, self.display_name.clone())
    }
}

/// Account lookups and writes used by login, session checks and password reset
#[async_trait]
pub trait UserDirectory: Send + Sync + std::fmt::Debug {
    /// Look up by id
    async fn find_by_id(&self, id: u64) -> Result<Option<UserRecord>, DirectoryError>;

    /// Look up by email
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DirectoryError>;

    /// Look up by linked provider account
    async fn find_by_provider_identity(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<UserRecord>, DirectoryError>;

    /// Find the user linked to `identity`, creating and linking one if needed
    async fn upsert_oauth_user(
        &self,
        identity: &NormalizedIdentity,
    ) -> Result<UserRecord, DirectoryError>;

    /// Check an identifier (username, email or phone) and password
    ///
    /// `Ok(None)` means the pair was rejected.
    async fn verify_password(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<Option<UserRecord>, DirectoryError>;

    /// Replace the password of the account owning `email`
    async fn update_password_by_email(
        &self,
        email: &str,
        new_password: &str,
    ) -> Result<(), DirectoryError>;
}
