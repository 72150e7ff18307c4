//! Provider registry
//!
//! Maps a provider name to a factory and a client registration. Providers are
//! cheap to build, so one is constructed per [`ProviderRegistry::resolve`] call
//! and the registry itself is never mutated while shared.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use tracing::debug;

use super::{
    EMPTY_AUTH_TYPE, GITHUB, GitHubProvider, OAuthProvider, QQ, QqProvider, WECHAT, WeChatProvider,
    build_http_client,
};
use crate::config::{AuthConfig, OAuthProviderConfig};
use crate::error::{AuthError, Result};

/// Builds a provider from its registration and the shared HTTP client
pub type ProviderFactory = fn(&OAuthProviderConfig, Client) -> Arc<dyn OAuthProvider>;

/// Name → provider lookup
#[derive(Clone)]
pub struct ProviderRegistry {
    configs: HashMap<String, OAuthProviderConfig>,
    factories: HashMap<String, ProviderFactory>,
    http: Client,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut factories: Vec<_> = self.factories.keys().collect();
        factories.sort();
        f.debug_struct("ProviderRegistry")
            .field("configured", &self.configured_providers())
            .field("factories", &factories)
            .finish()
    }
}

fn github(config: &OAuthProviderConfig, http: Client) -> Arc<dyn OAuthProvider> {
    Arc::new(GitHubProvider::new(config.clone(), http))
}

fn qq(config: &OAuthProviderConfig, http: Client) -> Arc<dyn OAuthProvider> {
    Arc::new(QqProvider::new(config.clone(), http))
}

fn wechat(config: &OAuthProviderConfig, http: Client) -> Arc<dyn OAuthProvider> {
    Arc::new(WeChatProvider::new(config.clone(), http))
}

impl ProviderRegistry {
    /// Empty registry over `configs`
    pub fn new(configs: HashMap<String, OAuthProviderConfig>, http: Client) -> Self {
        Self {
            configs,
            factories: HashMap::new(),
            http,
        }
    }

    /// Registry with the GitHub, QQ and WeChat factories installed
    pub fn with_builtin_providers(configs: HashMap<String, OAuthProviderConfig>, http: Client) -> Self {
        Self::new(configs, http)
            .register(GITHUB, github)
            .register(QQ, qq)
            .register(WECHAT, wechat)
    }

    /// Built-in registry using `[oauth]` and a client built from `[http]`
    ///
    /// # Errors
    ///
    /// [`AuthError::Config`] if the HTTP client cannot be built.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let http = build_http_client(&config.http)
            .map_err(|e| AuthError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_builtin_providers(config.oauth.clone(), http))
    }

    /// Add or replace a factory
    #[must_use]
    pub fn register(mut self, name: impl Into<String>, factory: ProviderFactory) -> Self {
        self.factories.insert(name.into(), factory);
        self
    }

    /// Build the provider registered as `name`
    ///
    /// # Errors
    ///
    /// [`AuthError::UnknownOrUnconfiguredProvider`] when either the factory or
    /// the configuration for `name` is missing.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn OAuthProvider>> {
        let (Some(factory), Some(config)) = (self.factories.get(name), self.configs.get(name))
        else {
            debug!(provider = name, "no factory or configuration for provider");
            return Err(AuthError::UnknownOrUnconfiguredProvider(name.to_string()));
        };
        Ok(factory(config, self.http.clone()))
    }

    /// Names that [`ProviderRegistry::resolve`] will accept, sorted
    pub fn configured_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .configs
            .keys()
            .filter(|name| self.factories.contains_key(*name))
            .cloned()
            .collect();
        names.sort();
        names
    }
}

/// Whether a client-supplied auth type means "no OAuth"
pub fn is_empty_auth_type(auth_type: &str) -> bool {
    auth_type.is_empty() || auth_type == EMPTY_AUTH_TYPE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::{NormalizedIdentity, ProviderToken};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct Static;

    #[async_trait]
    impl OAuthProvider for Static {
        fn name(&self) -> &str {
            "static"
        }

        async fn get_access_token(&self, code: &str) -> Result<ProviderToken> {
            Ok(ProviderToken::bearer(code))
        }

        async fn get_user_info(&self, token: &ProviderToken) -> Result<NormalizedIdentity> {
            Ok(NormalizedIdentity {
                provider: "static".into(),
                union_id: token.access_token.clone(),
                profile_url: None,
                username: "static".into(),
                display_name: None,
                email: None,
                avatar_url: None,
            })
        }
    }

    fn static_factory(_: &OAuthProviderConfig, _: Client) -> Arc<dyn OAuthProvider> {
        Arc::new(Static)
    }

    fn configs(names: &[&str]) -> HashMap<String, OAuthProviderConfig> {
        names
            .iter()
            .map(|n| (n.to_string(), OAuthProviderConfig::new("id", "secret")))
            .collect()
    }

    #[test]
    fn test_resolve_builtin() {
        let registry = ProviderRegistry::with_builtin_providers(
            configs(&["github", "qq", "wechat"]),
            Client::new(),
        );
        for name in ["github", "qq", "wechat"] {
            assert_eq!(registry.resolve(name).unwrap().name(), name);
        }
        assert_eq!(registry.configured_providers(), vec!["github", "qq", "wechat"]);
    }

    #[test]
    fn test_unconfigured_or_unknown() {
        let registry =
            ProviderRegistry::with_builtin_providers(configs(&["github", "google"]), Client::new());

        // factory but no config
        assert!(matches!(
            registry.resolve("qq"),
            Err(AuthError::UnknownOrUnconfiguredProvider(name)) if name == "qq"
        ));
        // config but no factory
        assert!(matches!(
            registry.resolve("google"),
            Err(AuthError::UnknownOrUnconfiguredProvider(_))
        ));
        assert!(registry.resolve("").is_err());
        assert_eq!(registry.configured_providers(), vec!["github"]);
    }

    #[tokio::test]
    async fn test_register_custom_factory() {
        let registry = ProviderRegistry::with_builtin_providers(configs(&["static"]), Client::new())
            .register("static", static_factory);

        let provider = registry.resolve("static").unwrap();
        let token = provider.get_access_token("abc").await.unwrap();
        let identity = provider.get_user_info(&token).await.unwrap();
        assert_eq!(identity.union_id, "abc");
    }

    #[test]
    fn test_from_config() {
        let mut config = AuthConfig::default();
        config.oauth = configs(&["wechat"]);
        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert_eq!(registry.configured_providers(), vec!["wechat"]);
        assert!(format!("{:?}", registry).contains("wechat"));
    }

    #[test]
    fn test_empty_auth_type() {
        assert!(is_empty_auth_type(""));
        assert!(is_empty_auth_type("nil"));
        assert!(!is_empty_auth_type("github"));
        assert!(!is_empty_auth_type("NIL"));
    }
}
