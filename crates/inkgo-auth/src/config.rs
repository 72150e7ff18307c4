//! Configuration
//!
//! [`AuthConfig`] is read from TOML, YAML or JSON (picked by file extension)
//! and then overridden by `INKGO_`-prefixed environment variables, with `__`
//! separating nested keys:
//!
//! ```text
//! INKGO_JWT__SECRET=...            -> jwt.secret
//! INKGO_REDIS__ENABLE=false        -> redis.enable
//! INKGO_OAUTH__GITHUB__CLIENT_ID=  -> oauth.github.client_id
//! ```
//!
//! Secrets are held as [`SecretString`] and never serialized back out.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

use crate::email::smtp::SmtpEndpoint;
use crate::jwt::RevocationReadPolicy;
use crate::logging::LoggingConfig;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "INKGO";

/// Longest accepted `jwt.expire_secs` (366 days)
pub const MAX_EXPIRE_SECS: u64 = 366 * 24 * 60 * 60;

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// Semantically invalid value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer token settings
    pub jwt: JwtConfig,
    /// Key-value store connection
    pub redis: RedisConfig,
    /// OAuth providers keyed by name (`github`, `qq`, `wechat`)
    pub oauth: HashMap<String, OAuthProviderConfig>,
    /// Outbound HTTP client
    pub http: HttpClientConfig,
    /// Email verification
    pub email: EmailConfig,
    /// Logging
    pub logging: LoggingConfig,
}

/// `[jwt]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// HMAC-SHA256 signing secret
    #[serde(deserialize_with = "deserialize_secret")]
    pub secret: SecretString,
    /// `iss` claim written and required
    pub issuer: String,
    /// Token lifetime in seconds
    pub expire_secs: u64,
    /// Refresh is allowed once remaining validity drops to this many seconds
    pub refresh_window_secs: u64,
    /// Behaviour when the revocation ledger cannot be read
    pub revocation_read_policy: RevocationReadPolicy,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: SecretString::new(String::new()),
            issuer: "inkgo".to_string(),
            expire_secs: 24 * 60 * 60,
            refresh_window_secs: 5 * 60,
            revocation_read_policy: RevocationReadPolicy::default(),
        }
    }
}

impl JwtConfig {
    /// Token lifetime
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.expire_secs)
    }

    /// Refresh window
    #[must_use]
    pub fn refresh_window(&self) -> Duration {
        Duration::from_secs(self.refresh_window_secs)
    }
}

/// `[redis]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// When false, revocation and email verification are turned off
    pub enable: bool,
    /// Host name
    pub host: String,
    /// Port
    pub port: u16,
    /// Optional password
    #[serde(deserialize_with = "deserialize_optional_secret")]
    pub password: Option<SecretString>,
    /// Database index
    pub db: i64,
    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Per-command response timeout in seconds
    pub response_timeout_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enable: true,
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            db: 0,
            connect_timeout_secs: 5,
            response_timeout_secs: 2,
        }
    }
}

impl RedisConfig {
    /// Connect timeout
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Response timeout for each command
    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

/// Per-provider OAuth client registration
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthProviderConfig {
    /// Client id (`appid` for WeChat, app id for QQ)
    pub client_id: String,
    /// Client secret
    #[serde(deserialize_with = "deserialize_secret")]
    pub client_secret: SecretString,
    /// Redirect URI registered with the provider
    #[serde(default)]
    pub redirect_uri: String,
    /// Token endpoint override
    #[serde(default)]
    pub token_url: Option<String>,
    /// Profile endpoint override
    #[serde(default)]
    pub userinfo_url: Option<String>,
    /// Profile language (WeChat `lang`)
    #[serde(default)]
    pub locale: Option<String>,
}

impl OAuthProviderConfig {
    /// Minimal configuration with default endpoints
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
            redirect_uri: String::new(),
            token_url: None,
            userinfo_url: None,
            locale: None,
        }
    }

    /// Point the token exchange at `url`
    #[must_use]
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    /// Point the profile fetch at `url`
    #[must_use]
    pub fn with_userinfo_url(mut self, url: impl Into<String>) -> Self {
        self.userinfo_url = Some(url.into());
        self
    }

    /// Set the redirect URI
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }
}

/// `[http]` section for outbound provider calls
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// TCP + TLS connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            timeout_secs: 10,
        }
    }
}

/// `[email]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// Verification code lifetime in seconds
    pub code_ttl_secs: u64,
    /// Reset token lifetime in seconds
    pub reset_token_ttl_secs: u64,
    /// Delete the code once it has been verified
    pub consume_code_on_success: bool,
    /// Mail subject line
    pub subject: String,
    /// SMTP connect/send timeout in seconds
    pub smtp_timeout_secs: u64,
    /// Extra or replacement sender domains
    pub smtp_overrides: HashMap<String, SmtpEndpoint>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            code_ttl_secs: 5 * 60,
            reset_token_ttl_secs: 15 * 60,
            consume_code_on_success: false,
            subject: "找回密码 - 验证码".to_string(),
            smtp_timeout_secs: 10,
            smtp_overrides: HashMap::new(),
        }
    }
}

impl EmailConfig {
    /// Verification code lifetime
    #[must_use]
    pub fn code_ttl(&self) -> Duration {
        Duration::from_secs(self.code_ttl_secs)
    }

    /// Reset token lifetime
    #[must_use]
    pub fn reset_token_ttl(&self) -> Duration {
        Duration::from_secs(self.reset_token_ttl_secs)
    }

    /// SMTP timeout
    #[must_use]
    pub fn smtp_timeout(&self) -> Duration {
        Duration::from_secs(self.smtp_timeout_secs)
    }
}

impl AuthConfig {
    /// Load from a file with `INKGO_` environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, has an unknown extension,
    /// cannot be parsed, or fails [`AuthConfig::validate`].
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load from a file with a custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`AuthConfig::from_file`].
    pub fn from_file_with_prefix(
        path: impl AsRef<std::path::Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let source = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = source.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the components cannot run with
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.expose_secret().is_empty() {
            return Err(ConfigError::Invalid("jwt.secret must not be empty".into()));
        }
        if self.jwt.issuer.is_empty() {
            return Err(ConfigError::Invalid("jwt.issuer must not be empty".into()));
        }
        if self.jwt.expire_secs == 0 || self.jwt.expire_secs > MAX_EXPIRE_SECS {
            return Err(ConfigError::Invalid(format!(
                "jwt.expire_secs must be between 1 and {MAX_EXPIRE_SECS}"
            )));
        }
        if self.email.code_ttl_secs == 0 || self.email.reset_token_ttl_secs == 0 {
            return Err(ConfigError::Invalid("email TTLs must be positive".into()));
        }
        if self.redis.enable
            && (self.redis.connect_timeout_secs == 0 || self.redis.response_timeout_secs == 0)
        {
            return Err(ConfigError::Invalid("redis timeouts must be positive".into()));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid("http.timeout_secs must be positive".into()));
        }
        for (name, provider) in &self.oauth {
            if provider.client_id.is_empty() || provider.client_secret.expose_secret().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "oauth.{name}: client_id and client_secret are required"
                )));
            }
        }
        Ok(())
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(SecretString::new(s))
}

fn deserialize_optional_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    Ok(s.map(SecretString::new))
}
