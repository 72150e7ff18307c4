//! Outbound HTTP for provider calls
//!
//! The shared client never follows redirects and has both a connect and an
//! overall timeout. Response handling is centralised here so every provider
//! reports failures the same way and never echoes request URLs (which carry
//! the client secret for WeChat).

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::HttpClientConfig;
use crate::error::{AuthError, Result};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Build the client shared by all providers
///
/// # Errors
///
/// Returns the `reqwest` builder error (TLS backend initialisation).
pub fn build_http_client(config: &HttpClientConfig) -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(USER_AGENT)
        .build()
}

/// Which leg of the login failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Exchange,
    Profile,
}

impl Stage {
    pub(crate) fn error(self, provider: &str, reason: impl Into<String>) -> AuthError {
        match self {
            Self::Exchange => AuthError::exchange(provider, reason),
            Self::Profile => AuthError::profile(provider, reason),
        }
    }
}

/// Check transport and status, then decode the JSON body
pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: &str,
    stage: Stage,
    sent: std::result::Result<Response, reqwest::Error>,
) -> Result<T> {
    let response = sent.map_err(|e| stage.error(provider, describe(e)))?;

    let status = response.status();
    if !status.is_success() {
        debug!(provider, ?stage, %status, "provider returned non-success status");
        return Err(stage.error(provider, status_reason(status)));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| stage.error(provider, format!("invalid response body: {}", describe(e))))
}

fn status_reason(status: StatusCode) -> String {
    format!("unexpected status {status}")
}

fn describe(e: reqwest::Error) -> String {
    let kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection failed"
    } else if e.is_decode() {
        "decode error"
    } else {
        "request failed"
    };
    format!("{kind}: {}", e.without_url())
}
