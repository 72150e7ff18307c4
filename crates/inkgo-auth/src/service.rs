//! Login and session façade
//!
//! [`AuthService`] wires the token codec, provider registry and email flow to
//! the application's [`UserDirectory`]. It is what request handlers call.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::directory::{UserDirectory, UserRecord};
use crate::email::EmailVerificationFlow;
use crate::error::{AuthError, Result};
use crate::jwt::TokenCodec;
use crate::oauth::{ProviderRegistry, is_empty_auth_type};

/// How the caller wants to sign in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginRequest {
    /// Username, email or phone plus password
    Password {
        /// Username, email or phone
        identifier: String,
        /// Plain-text password
        password: String,
    },
    /// Authorization code from a provider redirect
    OAuth {
        /// Provider name
        provider: String,
        /// Authorization code
        code: String,
    },
}

impl LoginRequest {
    /// Interpret a login form
    ///
    /// A non-empty `auth_type` other than `nil` with no identifier selects
    /// OAuth; an empty auth type with an identifier selects password login.
    ///
    /// # Errors
    ///
    /// [`AuthError::EmptyInput`] when the form fits neither shape or the
    /// selected shape is missing a field.
    pub fn from_form(
        auth_type: &str,
        auth_code: &str,
        identifier: &str,
        password: &str,
    ) -> Result<Self> {
        match (is_empty_auth_type(auth_type), identifier.is_empty()) {
            (false, true) => {
                if auth_code.is_empty() {
                    return Err(AuthError::EmptyInput("auth_code"));
                }
                Ok(Self::OAuth {
                    provider: auth_type.to_string(),
                    code: auth_code.to_string(),
                })
            }
            (true, false) => {
                if password.is_empty() {
                    return Err(AuthError::EmptyInput("password"));
                }
                Ok(Self::Password {
                    identifier: identifier.to_string(),
                    password: password.to_string(),
                })
            }
            _ => Err(AuthError::EmptyInput("credentials")),
        }
    }
}

/// Successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    /// Bearer token
    pub token: String,
    /// Signed-in user
    pub user: UserRecord,
}

/// Extract the token from an `Authorization: Bearer <token>` value
///
/// The scheme is matched case-insensitively and the value must consist of
/// exactly two whitespace-separated parts.
///
/// # Errors
///
/// [`AuthError::MissingAuthorizationHeader`] for an absent or blank header,
/// [`AuthError::MalformedAuthorizationHeader`] otherwise.
pub fn bearer_token(header: Option<&str>) -> Result<&str> {
    let header = header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(AuthError::MissingAuthorizationHeader)?;

    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        _ => Err(AuthError::MalformedAuthorizationHeader),
    }
}

/// Authentication entry points for request handlers
#[derive(Debug, Clone)]
pub struct AuthService {
    codec: Arc<TokenCodec>,
    providers: Arc<ProviderRegistry>,
    email: Arc<EmailVerificationFlow>,
    directory: Arc<dyn UserDirectory>,
}

impl AuthService {
    /// Assemble the service
    pub fn new(
        codec: Arc<TokenCodec>,
        providers: Arc<ProviderRegistry>,
        email: Arc<EmailVerificationFlow>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            codec,
            providers,
            email,
            directory,
        }
    }

    /// Token codec
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Provider registry
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Email verification flow
    pub fn email_flow(&self) -> &EmailVerificationFlow {
        &self.email
    }

    /// Sign in and issue a token
    ///
    /// OAuth logins create and link a local account on first use.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidCredentials`] for a rejected password
    /// - [`AuthError::UserInactive`] for frozen or deleted accounts
    /// - provider and directory errors as returned
    pub async fn login(&self, request: LoginRequest) -> Result<LoginOutcome> {
        let (user, method) = match request {
            LoginRequest::Password {
                identifier,
                password,
            } => {
                let user = self
                    .directory
                    .verify_password(&identifier, &password)
                    .await?
                    .ok_or_else(|| {
                        debug!("password login rejected");
                        AuthError::InvalidCredentials
                    })?;
                (user, "password".to_string())
            }
            LoginRequest::OAuth { provider, code } => {
                let oauth = self.providers.resolve(&provider)?;
                let token = oauth.get_access_token(&code).await?;
                let identity = oauth.get_user_info(&token).await?;
                let user = self.directory.upsert_oauth_user(&identity).await?;
                (user, provider)
            }
        };

        if !user.status.is_active() {
            warn!(user_id = user.id, status = ?user.status, "login refused for inactive user");
            return Err(AuthError::UserInactive);
        }

        let token = self.codec.generate_token(&user.subject())?;
        info!(user_id = user.id, method = %method, "user signed in");
        Ok(LoginOutcome { token, user })
    }

    /// Revoke `token`
    ///
    /// # Errors
    ///
    /// See [`TokenCodec::revoke_token`].
    pub async fn logout(&self, token: &str) -> Result<()> {
        self.codec.revoke_token(token).await?;
        info!("user signed out");
        Ok(())
    }

    /// Exchange a nearly-expired token
    ///
    /// # Errors
    ///
    /// See [`TokenCodec::refresh_token`].
    pub fn refresh(&self, token: &str) -> Result<String> {
        self.codec.refresh_token(token)
    }

    /// Resolve an `Authorization` header to an active user
    ///
    /// # Errors
    ///
    /// - header errors from [`bearer_token`]
    /// - [`AuthError::InvalidOrExpiredToken`] for revoked, expired or bad tokens
    /// - [`AuthError::UserNotFound`] / [`AuthError::UserInactive`]
    pub async fn authenticate_header(&self, header: Option<&str>) -> Result<UserRecord> {
        let token = bearer_token(header)?;
        let subject = self.codec.authenticate(token).await?;

        let user = self
            .directory
            .find_by_id(subject.id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !user.status.is_active() {
            debug!(user_id = user.id, status = ?user.status, "token belongs to inactive user");
            return Err(AuthError::UserInactive);
        }
        Ok(user)
    }

    /// Mail a reset code to a registered address
    ///
    /// # Errors
    ///
    /// [`AuthError::UserNotFound`] for unknown addresses, otherwise see
    /// [`EmailVerificationFlow::send_code`].
    pub async fn send_reset_code(&self, from: &str, smtp_auth_code: &str, email: &str) -> Result<()> {
        if email.is_empty() {
            return Err(AuthError::EmptyInput("email"));
        }
        if self.directory.find_by_email(email).await?.is_none() {
            return Err(AuthError::UserNotFound);
        }
        self.email.send_code(from, email, smtp_auth_code).await
    }

    /// Trade a mailed code for a reset token
    ///
    /// # Errors
    ///
    /// See [`EmailVerificationFlow::verify_code`].
    pub async fn verify_reset_code(&self, email: &str, code: &str) -> Result<String> {
        self.email.verify_code(email, code).await
    }

    /// Set a new password using a reset token; the token is spent
    ///
    /// # Errors
    ///
    /// [`AuthError::EmptyInput`] for an empty password,
    /// [`AuthError::ResetTokenNotFound`] for unknown or spent tokens.
    pub async fn reset_password(&self, reset_token: &str, new_password: &str) -> Result<()> {
        if new_password.is_empty() {
            return Err(AuthError::EmptyInput("password"));
        }
        let email = self.email.consume_reset_token(reset_token).await?;
        self.directory
            .update_password_by_email(&email, new_password)
            .await?;
        info!(email = %email, "password reset");
        Ok(())
    }
}
