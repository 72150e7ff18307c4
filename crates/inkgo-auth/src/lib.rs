//! # inkgo-auth - Authentication Core
//!
//! Authentication for the inkgo blog backend: bearer tokens with revocation,
//! third-party login through GitHub, QQ and WeChat, and email-verified
//! password reset.
//!
//! ## Architecture
//!
//! - [`jwt`] - HS256 token codec and the revocation ledger
//! - [`oauth`] - `OAuthProvider` trait, the three providers, and the registry
//! - [`email`] - verification code → reset token flow and SMTP delivery
//! - [`store`] - expiring key-value store (memory, Redis)
//! - [`directory`] - `UserDirectory` trait implemented by the application
//! - [`service`] - `AuthService` façade used by request handlers
//! - [`config`] / [`logging`] - file + environment configuration, tracing setup
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use inkgo_auth::{MemoryStore, RevocationLedger, Subject, TokenCodec};
//! use secrecy::SecretString;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let ledger = Arc::new(RevocationLedger::new(Arc::new(MemoryStore::new())));
//! let codec = TokenCodec::new(
//!     &SecretString::new("change-me".to_string()),
//!     "inkgo",
//!     Duration::from_secs(3600),
//!     ledger,
//! );
//!
//! let token = codec.generate_token(&Subject::new(1, "alice"))?;
//! assert_eq!(codec.authenticate(&token).await?.name, "alice");
//!
//! codec.revoke_token(&token).await?;
//! assert!(codec.authenticate(&token).await.is_err());
//! # Ok::<(), inkgo_auth::AuthError>(())
//! # }).unwrap();
//! ```
//!
//! ## Feature Flags
//!
//! - `redis-store` (default) - `RedisStore`
//! - `smtp` (default) - `SmtpMailTransport` over `lettre`
//!
//! ## Key Layout
//!
//! | Key | Value | TTL |
//! |-----|-------|-----|
//! | `jwt:blacklist:<token>` | `blacklisted` | token's remaining lifetime |
//! | `mail_<email>` | 6-digit code | 5 minutes |
//! | `reset_token:<token>` | email | 15 minutes |

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod directory;
pub mod email;
pub mod error;
pub mod jwt;
pub mod logging;
pub mod oauth;
pub mod service;
pub mod store;

#[doc(inline)]
pub use config::{AuthConfig, ConfigError};

#[doc(inline)]
pub use error::{AuthError, ErrorKind, Result};

#[doc(inline)]
pub use jwt::{Claims, RevocationLedger, RevocationReadPolicy, Subject, TokenCodec};

#[doc(inline)]
pub use oauth::{NormalizedIdentity, OAuthProvider, ProviderRegistry, ProviderToken};

#[doc(inline)]
pub use email::EmailVerificationFlow;
#[doc(inline)]
pub use email::smtp::{MailTransport, OutboundMail, SmtpDirectory, SmtpEndpoint};
#[cfg(feature = "smtp")]
#[doc(inline)]
pub use email::smtp::SmtpMailTransport;

#[doc(inline)]
pub use store::{DisabledStore, KeyValueStore, MemoryStore, StoreError};
#[cfg(feature = "redis-store")]
#[doc(inline)]
pub use store::RedisStore;

#[doc(inline)]
pub use directory::{DirectoryError, UserDirectory, UserRecord, UserStatus};

#[doc(inline)]
pub use service::{AuthService, LoginOutcome, LoginRequest, bearer_token};
