//! QQ Connect login
//!
//! QQ returns the user's `openid` with the token rather than the profile, so
//! the profile call depends on it and QQ never shares an email address.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, warn};

use super::http::{Stage, read_json};
use super::{NormalizedIdentity, OAuthProvider, ProviderToken, QQ, non_empty};
use crate::config::OAuthProviderConfig;
use crate::error::{AuthError, Result};

/// Default token endpoint
pub const DEFAULT_TOKEN_URL: &str = "https://graph.qq.com/oauth2.0/token";
/// Default profile endpoint
pub const DEFAULT_USERINFO_URL: &str = "https://graph.qq.com/user/get_user_info";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    openid: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QqUser {
    #[serde(default)]
    ret: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    figureurl_qq_1: Option<String>,
    #[serde(default)]
    figureurl_qq_2: Option<String>,
}

/// QQ provider
#[derive(Debug, Clone)]
pub struct QqProvider {
    config: OAuthProviderConfig,
    http: Client,
}

impl QqProvider {
    /// Create from configuration and the shared client
    pub fn new(config: OAuthProviderConfig, http: Client) -> Self {
        Self { config, http }
    }

    fn token_url(&self) -> &str {
        self.config.token_url.as_deref().unwrap_or(DEFAULT_TOKEN_URL)
    }

    fn userinfo_url(&self) -> &str {
        self.config
            .userinfo_url
            .as_deref()
            .unwrap_or(DEFAULT_USERINFO_URL)
    }
}

/// QQ reports `expires_in` as either a number or a numeric string
fn parse_expires_in(value: Option<serde_json::Value>) -> Option<u64> {
    match value? {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl OAuthProvider for QqProvider {
    fn name(&self) -> &str {
        QQ
    }

    async fn get_access_token(&self, code: &str) -> Result<ProviderToken> {
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("fmt", "json"),
        ];

        let sent = self.http.post(self.token_url()).form(&form).send().await;
        let response: TokenResponse = read_json(QQ, Stage::Exchange, sent).await?;

        if let Some(error) = response.error.filter(|e| !e.is_null()) {
            let reason = match non_empty(response.error_description) {
                Some(description) => format!("{error}: {description}"),
                None => error.to_string(),
            };
            return Err(AuthError::exchange(QQ, reason));
        }

        let access_token = non_empty(response.access_token)
            .ok_or_else(|| AuthError::exchange(QQ, "empty access token"))?;

        let Some(openid) = non_empty(response.openid) else {
            warn!(provider = QQ, "token response carried no openid");
            return Err(AuthError::missing_openid(QQ));
        };

        debug!(provider = QQ, "authorization code exchanged");
        Ok(ProviderToken {
            access_token,
            token_type: "QQToken".to_string(),
            refresh_token: non_empty(response.refresh_token),
            expires_in: parse_expires_in(response.expires_in),
            scope: non_empty(response.scope),
            openid: Some(openid),
            union_id: None,
        })
    }

    async fn get_user_info(&self, token: &ProviderToken) -> Result<NormalizedIdentity> {
        if token.access_token.is_empty() {
            return Err(AuthError::MissingAccessToken);
        }
        let openid = token
            .openid
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::missing_openid(QQ))?;

        let sent = self
            .http
            .get(self.userinfo_url())
            .query(&[
                ("access_token", token.access_token.as_str()),
                ("oauth_consumer_key", self.config.client_id.as_str()),
                ("openid", openid),
            ])
            .send()
            .await;
        let user: QqUser = read_json(QQ, Stage::Profile, sent).await?;

        if user.ret != 0 {
            let msg = user.msg.unwrap_or_default();
            return Err(AuthError::profile(QQ, format!("ret={} {msg}", user.ret)));
        }

        let nickname = user.nickname.unwrap_or_default();
        debug!(provider = QQ, "profile fetched");
        Ok(NormalizedIdentity {
            provider: QQ.to_string(),
            union_id: openid.to_string(),
            profile_url: None,
            username: nickname.clone(),
            display_name: non_empty(Some(nickname)),
            email: None,
            avatar_url: non_empty(user.figureurl_qq_2).or_else(|| non_empty(user.figureurl_qq_1)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_expires_in() {
        assert_eq!(parse_expires_in(Some(serde_json::json!(7776000))), Some(7_776_000));
        assert_eq!(parse_expires_in(Some(serde_json::json!("7776000"))), Some(7_776_000));
        assert_eq!(parse_expires_in(Some(serde_json::json!(null))), None);
        assert_eq!(parse_expires_in(None), None);
    }

    #[tokio::test]
    async fn test_profile_requires_openid() {
        let provider = QqProvider::new(OAuthProviderConfig::new("app", "key"), Client::new());
        let err = provider
            .get_user_info(&ProviderToken::bearer("tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingProviderOpenID { .. }));
    }
}
