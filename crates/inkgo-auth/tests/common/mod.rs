//! Common test utilities for integration tests
//!
//! Mock provider endpoints, a recording mail transport and an in-memory
//! user directory shared by the login, token and email scenarios.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use inkgo_auth::config::{HttpClientConfig, OAuthProviderConfig};
use inkgo_auth::oauth::build_http_client;
use inkgo_auth::{
    DirectoryError, MailTransport, MemoryStore, NormalizedIdentity, OutboundMail,
    ProviderRegistry, RevocationLedger, TokenCodec, UserDirectory, UserRecord, UserStatus,
};
use inkgo_auth::email::smtp::MailError;
use secrecy::SecretString;
use serde_json::json;
use tokio::sync::RwLock;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const TEST_SECRET: &str = "integration-test-secret";
pub const TEST_ISSUER: &str = "inkgo";

/// Paths served by [`MockProviders`]
pub const GITHUB_TOKEN_PATH: &str = "/github/login/oauth/access_token";
pub const GITHUB_USER_PATH: &str = "/github/user";
pub const QQ_TOKEN_PATH: &str = "/qq/oauth2.0/token";
pub const QQ_USER_PATH: &str = "/qq/user/get_user_info";
pub const WECHAT_TOKEN_PATH: &str = "/wechat/sns/oauth2/access_token";
pub const WECHAT_USER_PATH: &str = "/wechat/sns/userinfo";

/// One mock server standing in for all three providers
pub struct MockProviders {
    pub server: MockServer,
}

impl MockProviders {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    pub fn github_config(&self) -> OAuthProviderConfig {
        OAuthProviderConfig::new("gh-client", "gh-secret")
            .with_token_url(self.url(GITHUB_TOKEN_PATH))
            .with_userinfo_url(self.url(GITHUB_USER_PATH))
            .with_redirect_uri("https://blog.example.com/oauth/github")
    }

    pub fn qq_config(&self) -> OAuthProviderConfig {
        OAuthProviderConfig::new("qq-app", "qq-key")
            .with_token_url(self.url(QQ_TOKEN_PATH))
            .with_userinfo_url(self.url(QQ_USER_PATH))
            .with_redirect_uri("https://blog.example.com/oauth/qq")
    }

    pub fn wechat_config(&self) -> OAuthProviderConfig {
        OAuthProviderConfig::new("wx-app", "wx-secret")
            .with_token_url(self.url(WECHAT_TOKEN_PATH))
            .with_userinfo_url(self.url(WECHAT_USER_PATH))
    }

    /// Registry with all three providers pointed at this server
    pub fn registry(&self) -> ProviderRegistry {
        let mut configs = HashMap::new();
        configs.insert("github".to_string(), self.github_config());
        configs.insert("qq".to_string(), self.qq_config());
        configs.insert("wechat".to_string(), self.wechat_config());
        ProviderRegistry::with_builtin_providers(configs, http_client())
    }

    pub async fn mock_github_token(&self, access_token: &str) {
        Mock::given(method("POST"))
            .and(path(GITHUB_TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access_token,
                "token_type": "bearer",
                "scope": "read:user,user:email",
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_github_user(&self, id: u64, login: &str) {
        Mock::given(method("GET"))
            .and(path(GITHUB_USER_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "login": login,
                "name": format!("{login} (GitHub)"),
                "html_url": format!("https://github.com/{login}"),
                "email": format!("{login}@users.noreply.github.com"),
                "avatar_url": format!("https://avatars.githubusercontent.com/u/{id}"),
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_qq_token(&self, access_token: &str, openid: Option<&str>) {
        let mut body = json!({
            "access_token": access_token,
            "expires_in": "7776000",
            "refresh_token": "qq-refresh",
        });
        if let Some(openid) = openid {
            body["openid"] = json!(openid);
        }
        Mock::given(method("POST"))
            .and(path(QQ_TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_qq_user(&self, nickname: &str) {
        Mock::given(method("GET"))
            .and(path(QQ_USER_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ret": 0,
                "msg": "",
                "nickname": nickname,
                "figureurl_qq_1": "https://qzapp.qlogo.cn/40",
                "figureurl_qq_2": "https://qzapp.qlogo.cn/100",
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_wechat_token(&self, access_token: &str, openid: &str, unionid: Option<&str>) {
        let mut body = json!({
            "access_token": access_token,
            "expires_in": 7200,
            "refresh_token": "wx-refresh",
            "openid": openid,
            "scope": "snsapi_login",
        });
        if let Some(unionid) = unionid {
            body["unionid"] = json!(unionid);
        }
        Mock::given(method("GET"))
            .and(path(WECHAT_TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_wechat_user(&self, openid: &str, nickname: &str, unionid: Option<&str>) {
        let mut body = json!({
            "openid": openid,
            "nickname": nickname,
            "headimgurl": "https://thirdwx.qlogo.cn/head/0",
        });
        if let Some(unionid) = unionid {
            body["unionid"] = json!(unionid);
        }
        Mock::given(method("GET"))
            .and(path(WECHAT_USER_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }
}

pub fn http_client() -> reqwest::Client {
    build_http_client(&HttpClientConfig::default()).expect("HTTP client")
}

/// Codec over a fresh in-memory store; the store is returned for inspection
pub fn codec_with_store(ttl: Duration) -> (TokenCodec, MemoryStore) {
    let store = MemoryStore::new();
    let ledger = Arc::new(RevocationLedger::new(Arc::new(store.clone())));
    let codec = TokenCodec::new(
        &SecretString::new(TEST_SECRET.to_string()),
        TEST_ISSUER,
        ttl,
        ledger,
    );
    (codec, store)
}

/// Mail transport that keeps every message instead of sending it
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: std::sync::Mutex<Vec<OutboundMail>>,
    fail: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose every send fails
    pub fn failing() -> Self {
        Self {
            sent: std::sync::Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, mail: &OutboundMail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(mail.clone());
        if self.fail {
            return Err(MailError::Transport("connection refused".into()));
        }
        Ok(())
    }
}

/// Extract the six-digit code from a rendered mail body
pub fn code_from_mail(mail: &OutboundMail) -> String {
    mail.html_body
        .as_bytes()
        .windows(6)
        .find(|w| w.iter().all(u8::is_ascii_digit))
        .map(|w| String::from_utf8_lossy(w).into_owned())
        .expect("mail body carries a code")
}

#[derive(Debug, Clone)]
struct StoredUser {
    record: UserRecord,
    username: String,
    password: String,
    links: Vec<(String, String)>,
}

/// In-memory [`UserDirectory`]
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: RwLock<Vec<StoredUser>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a password user and return its id
    pub async fn add_user(&self, username: &str, email: &str, password: &str) -> u64 {
        let mut users = self.users.write().await;
        let id = users.len() as u64 + 1;
        users.push(StoredUser {
            record: UserRecord {
                id,
                display_name: username.to_string(),
                email: Some(email.to_string()),
                status: UserStatus::Active,
            },
            username: username.to_string(),
            password: password.to_string(),
            links: Vec::new(),
        });
        id
    }

    pub async fn set_status(&self, id: u64, status: UserStatus) {
        let mut users = self.users.write().await;
        if let Some(user) = users.iter_mut().find(|u| u.record.id == id) {
            user.record.status = status;
        }
    }

    pub async fn password_of(&self, email: &str) -> Option<String> {
        let users = self.users.read().await;
        users
            .iter()
            .find(|u| u.record.email.as_deref() == Some(email))
            .map(|u| u.password.clone())
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn find_by_id(&self, id: u64) -> Result<Option<UserRecord>, DirectoryError> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.record.id == id).map(|u| u.record.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DirectoryError> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .find(|u| u.record.email.as_deref() == Some(email))
            .map(|u| u.record.clone()))
    }

    async fn find_by_provider_identity(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<UserRecord>, DirectoryError> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .find(|u| {
                u.links
                    .iter()
                    .any(|(p, id)| p == provider && id == provider_id)
            })
            .map(|u| u.record.clone()))
    }

    async fn upsert_oauth_user(
        &self,
        identity: &NormalizedIdentity,
    ) -> Result<UserRecord, DirectoryError> {
        if let Some(user) = self
            .find_by_provider_identity(&identity.provider, &identity.union_id)
            .await?
        {
            return Ok(user);
        }

        let mut users = self.users.write().await;
        let id = users.len() as u64 + 1;
        let record = UserRecord {
            id,
            display_name: identity
                .display_name
                .clone()
                .unwrap_or_else(|| identity.username.clone()),
            email: identity.email.clone(),
            status: UserStatus::Active,
        };
        users.push(StoredUser {
            record: record.clone(),
            username: identity.username.clone(),
            password: String::new(),
            links: vec![(identity.provider.clone(), identity.union_id.clone())],
        });
        Ok(record)
    }

    async fn verify_password(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<Option<UserRecord>, DirectoryError> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .find(|u| {
                (u.username == identifier || u.record.email.as_deref() == Some(identifier))
                    && !u.password.is_empty()
                    && u.password == password
            })
            .map(|u| u.record.clone()))
    }

    async fn update_password_by_email(
        &self,
        email: &str,
        new_password: &str,
    ) -> Result<(), DirectoryError> {
        let mut users = self.users.write().await;
        let user = users
            .iter_mut()
            .find(|u| u.record.email.as_deref() == Some(email))
            .ok_or_else(|| DirectoryError::Backend(format!("no user with email {email}")))?;
        user.password = new_password.to_string();
        Ok(())
    }
}
