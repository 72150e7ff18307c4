//! GitHub OAuth App login

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http::{Stage, read_json};
use super::{GITHUB, NormalizedIdentity, OAuthProvider, ProviderToken, non_empty};
use crate::config::OAuthProviderConfig;
use crate::error::{AuthError, Result};

/// Default token endpoint
pub const DEFAULT_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
/// Default profile endpoint
pub const DEFAULT_USERINFO_URL: &str = "https://api.github.com/user";

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

/// GitHub provider
#[derive(Debug, Clone)]
pub struct GitHubProvider {
    config: OAuthProviderConfig,
    http: Client,
}

impl GitHubProvider {
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

#[async_trait]
impl OAuthProvider for GitHubProvider {
    fn name(&self) -> &str {
        GITHUB
    }

    async fn get_access_token(&self, code: &str) -> Result<ProviderToken> {
        let body = TokenRequest {
            grant_type: "authorization_code",
            client_id: &self.config.client_id,
            client_secret: self.config.client_secret.expose_secret(),
            code,
            redirect_uri: &self.config.redirect_uri,
        };

        let sent = self
            .http
            .post(self.token_url())
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await;
        let response: TokenResponse = read_json(GITHUB, Stage::Exchange, sent).await?;

        if let Some(error) = non_empty(response.error) {
            let reason = match non_empty(response.error_description) {
                Some(description) => format!("{error}: {description}"),
                None => error,
            };
            return Err(AuthError::exchange(GITHUB, reason));
        }

        let access_token = non_empty(response.access_token)
            .ok_or_else(|| AuthError::exchange(GITHUB, "empty access token"))?;

        debug!(provider = GITHUB, "authorization code exchanged");
        Ok(ProviderToken {
            access_token,
            token_type: non_empty(response.token_type).unwrap_or_else(|| "Bearer".to_string()),
            scope: non_empty(response.scope),
            ..ProviderToken::default()
        })
    }

    async fn get_user_info(&self, token: &ProviderToken) -> Result<NormalizedIdentity> {
        if token.access_token.is_empty() {
            return Err(AuthError::MissingAccessToken);
        }

        let sent = self
            .http
            .get(self.userinfo_url())
            .bearer_auth(&token.access_token)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, "inkgo-auth")
            .send()
            .await;
        let user: GitHubUser = read_json(GITHUB, Stage::Profile, sent).await?;

        debug!(provider = GITHUB, user_id = user.id, "profile fetched");
        Ok(NormalizedIdentity {
            provider: GITHUB.to_string(),
            union_id: user.id.to_string(),
            profile_url: non_empty(user.html_url),
            username: user.login,
            display_name: non_empty(user.name),
            email: non_empty(user.email),
            avatar_url: non_empty(user.avatar_url),
        })
    }
}
