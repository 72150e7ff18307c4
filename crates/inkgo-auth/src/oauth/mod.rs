//! Third-party OAuth2 login
//!
//! Each provider turns an authorization code into a [`ProviderToken`] and the
//! token into a [`NormalizedIdentity`]. Providers are looked up by name through
//! the [`ProviderRegistry`].
//!
//! | Provider | Token exchange | Identity key |
//! |----------|----------------|--------------|
//! | `github` | JSON POST | numeric user id |
//! | `qq` | form POST | `openid` from the token response |
//! | `wechat` | GET with query | `unionid`, else `openid` |

mod github;
pub(crate) mod http;
mod qq;
mod registry;
mod wechat;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use github::GitHubProvider;
pub use http::build_http_client;
pub use qq::QqProvider;
pub use registry::{ProviderFactory, ProviderRegistry, is_empty_auth_type};
pub use wechat::WeChatProvider;

/// GitHub provider name
pub const GITHUB: &str = "github";
/// QQ provider name
pub const QQ: &str = "qq";
/// WeChat provider name
pub const WECHAT: &str = "wechat";
/// Auth type sent by clients that do not use OAuth
pub const EMPTY_AUTH_TYPE: &str = "nil";

/// Result of an authorization code exchange
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderToken {
    /// Access token for profile calls
    pub access_token: String,
    /// Token type as reported (or implied) by the provider
    pub token_type: String,
    /// Refresh token, if issued
    pub refresh_token: Option<String>,
    /// Lifetime in seconds, if reported
    pub expires_in: Option<u64>,
    /// Granted scope
    pub scope: Option<String>,
    /// QQ / WeChat user id scoped to this app
    pub openid: Option<String>,
    /// WeChat id shared across an open-platform account
    pub union_id: Option<String>,
}

impl ProviderToken {
    /// Bearer token with only an access token set
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            ..Self::default()
        }
    }
}

/// Provider profile mapped onto local fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedIdentity {
    /// Provider name
    pub provider: String,
    /// Stable id within the provider
    pub union_id: String,
    /// Public profile page
    pub profile_url: Option<String>,
    /// Login or nickname
    pub username: String,
    /// Human-readable name
    pub display_name: Option<String>,
    /// Email, when the provider shares it
    pub email: Option<String>,
    /// Avatar image
    pub avatar_url: Option<String>,
}

/// OAuth2 login provider
#[async_trait]
pub trait OAuthProvider: Send + Sync + std::fmt::Debug {
    /// Registry name (`github`, `qq`, `wechat`)
    fn name(&self) -> &str;

    /// Exchange an authorization code for a token
    ///
    /// # Errors
    ///
    /// [`AuthError::ProviderExchangeFailed`](crate::AuthError::ProviderExchangeFailed)
    /// on transport, status or payload errors;
    /// [`AuthError::MissingProviderOpenID`](crate::AuthError::MissingProviderOpenID)
    /// when QQ or WeChat omit the openid.
    async fn get_access_token(&self, code: &str) -> Result<ProviderToken>;

    /// Fetch and normalize the user's profile
    ///
    /// # Errors
    ///
    /// [`AuthError::MissingAccessToken`](crate::AuthError::MissingAccessToken)
    /// for an empty token, otherwise
    /// [`AuthError::ProviderProfileFailed`](crate::AuthError::ProviderProfileFailed).
    async fn get_user_info(&self, token: &ProviderToken) -> Result<NormalizedIdentity>;
}

/// Treat empty strings from provider JSON as absent
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}
