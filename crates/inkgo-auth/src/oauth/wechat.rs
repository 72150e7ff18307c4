//! WeChat open-platform website login
//!
//! WeChat reports failures in-band as `{"errcode": ..., "errmsg": ...}` with
//! status 200, so every response is checked for a non-zero `errcode`.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, warn};

use super::http::{Stage, read_json};
use super::{NormalizedIdentity, OAuthProvider, ProviderToken, WECHAT, non_empty};
use crate::config::OAuthProviderConfig;
use crate::error::{AuthError, Result};

/// Default token endpoint
pub const DEFAULT_TOKEN_URL: &str = "https://api.weixin.qq.com/sns/oauth2/access_token";
/// Default profile endpoint
pub const DEFAULT_USERINFO_URL: &str = "https://api.weixin.qq.com/sns/userinfo";
/// Default profile language
pub const DEFAULT_LOCALE: &str = "zh_CN";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    openid: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    unionid: Option<String>,
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WeChatUser {
    #[serde(default)]
    openid: Option<String>,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    headimgurl: Option<String>,
    #[serde(default)]
    unionid: Option<String>,
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: Option<String>,
}

/// WeChat provider
#[derive(Debug, Clone)]
pub struct WeChatProvider {
    config: OAuthProviderConfig,
    http: Client,
}

impl WeChatProvider {
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

    fn locale(&self) -> &str {
        self.config
            .locale
            .as_deref()
            .filter(|l| !l.is_empty())
            .unwrap_or(DEFAULT_LOCALE)
    }
}

fn errcode_reason(errcode: i64, errmsg: Option<String>) -> String {
    format!("errcode={errcode} {}", errmsg.unwrap_or_default())
        .trim_end()
        .to_string()
}

#[async_trait]
impl OAuthProvider for WeChatProvider {
    fn name(&self) -> &str {
        WECHAT
    }

    async fn get_access_token(&self, code: &str) -> Result<ProviderToken> {
        let sent = self
            .http
            .get(self.token_url())
            .query(&[
                ("appid", self.config.client_id.as_str()),
                ("secret", self.config.client_secret.expose_secret().as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await;
        let response: TokenResponse = read_json(WECHAT, Stage::Exchange, sent).await?;

        if response.errcode != 0 {
            return Err(AuthError::exchange(
                WECHAT,
                errcode_reason(response.errcode, response.errmsg),
            ));
        }

        let access_token = non_empty(response.access_token)
            .ok_or_else(|| AuthError::exchange(WECHAT, "empty access token"))?;

        let Some(openid) = non_empty(response.openid) else {
            warn!(provider = WECHAT, "token response carried no openid");
            return Err(AuthError::missing_openid(WECHAT));
        };

        debug!(provider = WECHAT, "authorization code exchanged");
        Ok(ProviderToken {
            access_token,
            token_type: "WechatToken".to_string(),
            refresh_token: non_empty(response.refresh_token),
            expires_in: response.expires_in,
            scope: non_empty(response.scope),
            openid: Some(openid),
            union_id: non_empty(response.unionid),
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
            .ok_or_else(|| AuthError::missing_openid(WECHAT))?;

        let sent = self
            .http
            .get(self.userinfo_url())
            .query(&[
                ("access_token", token.access_token.as_str()),
                ("openid", openid),
                ("lang", self.locale()),
            ])
            .send()
            .await;
        let user: WeChatUser = read_json(WECHAT, Stage::Profile, sent).await?;

        if user.errcode != 0 {
            return Err(AuthError::profile(
                WECHAT,
                errcode_reason(user.errcode, user.errmsg),
            ));
        }

        let union_id = non_empty(user.unionid)
            .or_else(|| token.union_id.clone())
            .or_else(|| non_empty(user.openid))
            .unwrap_or_else(|| openid.to_string());
        let nickname = user.nickname.unwrap_or_default();

        debug!(provider = WECHAT, "profile fetched");
        Ok(NormalizedIdentity {
            provider: WECHAT.to_string(),
            union_id,
            profile_url: None,
            username: nickname.clone(),
            display_name: non_empty(Some(nickname)),
            email: None,
            avatar_url: non_empty(user.headimgurl),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_defaults_to_zh_cn() {
        let provider = WeChatProvider::new(OAuthProviderConfig::new("app", "secret"), Client::new());
        assert_eq!(provider.locale(), "zh_CN");

        let mut config = OAuthProviderConfig::new("app", "secret");
        config.locale = Some("en".into());
        let provider = WeChatProvider::new(config, Client::new());
        assert_eq!(provider.locale(), "en");
    }

    #[test]
    fn test_errcode_reason() {
        assert_eq!(
            errcode_reason(40029, Some("invalid code".into())),
            "errcode=40029 invalid code"
        );
        assert_eq!(errcode_reason(40163, None), "errcode=40163");
    }
}
