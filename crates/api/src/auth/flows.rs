//! Login and token renewal flows
//!
//! Each flow runs its steps in order and stops at the first failure with a
//! flow-specific error. Handlers convert those errors into [`ApiError`]s.

use serde::Serialize;
use uuid::Uuid;

use super::{
    google::{GoogleIdTokenVerifier, IdentityError, VerifiedIdentity},
    jwt::{JwtError, JwtManager},
    password::{self, PasswordError},
};
use crate::{
    error::ApiError,
    store::{NewUser, StoreError, User, UserStore},
};

/// Characters of the provider subject appended to derived usernames
const SUBJECT_FRAGMENT_LEN: usize = 8;

// =============================================================================
// Federated login
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedLoginResponse {
    pub user: SessionUser,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum FederatedLoginError {
    #[error("identity token missing")]
    MissingAssertion,
    #[error("federated login is not configured")]
    NotConfigured,
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("user store failure: {0}")]
    Store(#[from] StoreError),
    #[error("user disappeared after a concurrent create")]
    UserVanished,
    #[error("token issuance failed: {0}")]
    Token(#[from] JwtError),
}

impl From<FederatedLoginError> for ApiError {
    fn from(err: FederatedLoginError) -> Self {
        match err {
            FederatedLoginError::MissingAssertion => ApiError::MissingInput("ID token requerido"),
            FederatedLoginError::NotConfigured => ApiError::Internal("Server misconfigured"),
            // The assertion itself checked out; the account just lacks a usable email.
            FederatedLoginError::Identity(IdentityError::EmailMissing) => {
                ApiError::BadRequest("Email no disponible de Google")
            }
            FederatedLoginError::Identity(_) => ApiError::Unauthorized("Google auth failed"),
            FederatedLoginError::Store(_)
            | FederatedLoginError::UserVanished
            | FederatedLoginError::Token(_) => ApiError::Internal("Error interno del servidor"),
        }
    }
}

/// Derive a username for a federated account.
///
/// The display name is lower-cased, whitespace runs become `_`, and a
/// fragment of the provider subject keeps it distinct; without a display
/// name the email local-part is used.
pub fn derive_username(identity: &VerifiedIdentity) -> String {
    let base = identity
        .display_name
        .as_deref()
        .map(|name| name.split_whitespace().collect::<Vec<_>>().join("_").to_lowercase())
        .filter(|name| !name.is_empty());

    match base {
        Some(base) => {
            let fragment: String = identity.subject.chars().take(SUBJECT_FRAGMENT_LEN).collect();
            format!("{base}_{fragment}")
        }
        None => identity
            .email
            .split('@')
            .next()
            .unwrap_or(identity.email.as_str())
            .to_string(),
    }
}

/// Find the local account for a verified identity, creating it on first login
async fn resolve_user(
    users: &dyn UserStore,
    identity: &VerifiedIdentity,
) -> Result<User, FederatedLoginError> {
    if let Some(user) = users.find_user_by_email(&identity.email).await? {
        tracing::info!(user_id = %user.id, "Found existing user for federated login");
        return Ok(user);
    }

    tracing::info!(email = %identity.email, "Creating user for federated login");
    let username = derive_username(identity);

    match create_federated_user(users, identity, username.clone()).await {
        Ok(user) => Ok(user),
        Err(StoreError::Duplicate) => {
            // Someone else created it first; use theirs.
            tracing::info!(email = %identity.email, "Concurrent user creation, re-fetching");
            if let Some(user) = users.find_user_by_email(&identity.email).await? {
                return Ok(user);
            }

            // The email is free, so the username was the clash.
            let subject: Vec<char> = identity.subject.chars().collect();
            let tail: String = subject[subject.len().saturating_sub(SUBJECT_FRAGMENT_LEN)..]
                .iter()
                .collect();
            let retry = format!("{username}_{tail}");
            tracing::info!(username = %retry, "Derived username taken, retrying");
            match create_federated_user(users, identity, retry).await {
                Ok(user) => Ok(user),
                Err(StoreError::Duplicate) => users
                    .find_user_by_email(&identity.email)
                    .await?
                    .ok_or(FederatedLoginError::UserVanished),
                Err(e) => Err(e.into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

async fn create_federated_user(
    users: &dyn UserStore,
    identity: &VerifiedIdentity,
    username: String,
) -> Result<User, StoreError> {
    users
        .create_user(NewUser {
            username,
            email: identity.email.clone(),
            password_hash: None,
            avatar_url: identity.avatar_url.clone(),
        })
        .await
}

/// Verify an identity assertion, resolve or create the user and issue a token pair
pub async fn federated_login(
    verifier: Option<&GoogleIdTokenVerifier>,
    users: &dyn UserStore,
    jwt: &JwtManager,
    id_token: Option<&str>,
) -> Result<FederatedLoginResponse, FederatedLoginError> {
    let id_token = id_token
        .filter(|t| !t.trim().is_empty())
        .ok_or(FederatedLoginError::MissingAssertion)?;

    let verifier = verifier.ok_or_else(|| {
        tracing::error!("GOOGLE_CLIENT_ID not configured; rejecting federated login");
        FederatedLoginError::NotConfigured
    })?;

    let identity = verifier.verify(id_token).await.map_err(|e| {
        tracing::warn!(reason = %e, "Identity assertion rejected");
        e
    })?;

    let user = resolve_user(users, &identity).await.map_err(|e| {
        tracing::error!(error = ?e, "Failed to resolve federated user");
        e
    })?;

    let tokens = jwt.generate_token_pair(user.id)?;

    Ok(FederatedLoginResponse {
        user: SessionUser {
            id: user.id,
            email: user.email,
            name: user.username,
            avatar_url: user.avatar_url,
        },
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_in: jwt.access_token_expiry_seconds(),
    })
}

// =============================================================================
// Password login
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordLoginResponse {
    pub message: &'static str,
    /// Access token
    pub token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("email or password missing")]
    MissingCredentials,
    #[error("no user with that email")]
    UserNotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("user store failure: {0}")]
    Store(#[from] StoreError),
    #[error("token issuance failed: {0}")]
    Token(#[from] JwtError),
    #[error("password check aborted")]
    Aborted,
}

impl From<LoginError> for ApiError {
    fn from(err: LoginError) -> Self {
        match err {
            LoginError::MissingCredentials => ApiError::MissingInput("Faltan datos"),
            // Same answer for both so the endpoint does not reveal which emails exist.
            LoginError::UserNotFound | LoginError::InvalidCredentials => {
                ApiError::Unauthorized("Credenciales inválidas")
            }
            LoginError::Store(_) | LoginError::Token(_) | LoginError::Aborted => {
                ApiError::Internal("Error en login")
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Authenticate with email and password and issue a token pair
pub async fn password_login(
    users: &dyn UserStore,
    jwt: &JwtManager,
    email: Option<&str>,
    password: Option<&str>,
) -> Result<PasswordLoginResponse, LoginError> {
    let (Some(email), Some(password)) = (non_empty(email), non_empty(password)) else {
        return Err(LoginError::MissingCredentials);
    };

    let user = users.find_user_by_email(email).await?;

    // Unknown and password-less accounts still pay for one Argon2 verification.
    let attempt = password.to_string();
    let stored_hash = user.as_ref().and_then(|u| u.password_hash.clone());
    let outcome = tokio::task::spawn_blocking(move || match stored_hash {
        Some(hash) => password::check_password(&attempt, Some(&hash)),
        None => {
            password::verify_against_dummy(&attempt);
            Err(PasswordError::NoStoredHash)
        }
    })
    .await
    .map_err(|e| {
        tracing::error!(error = ?e, "Password check task failed");
        LoginError::Aborted
    })?;

    let Some(user) = user else {
        tracing::info!("Password login for unknown email");
        return Err(LoginError::UserNotFound);
    };

    if let Err(e) = outcome {
        match e {
            PasswordError::NoStoredHash => {
                tracing::info!(user_id = %user.id, "Password login on federated-only account")
            }
            PasswordError::InvalidHash => {
                tracing::error!(user_id = %user.id, "Stored password hash is unreadable")
            }
            _ => tracing::info!(user_id = %user.id, "Password mismatch"),
        }
        return Err(LoginError::InvalidCredentials);
    }

    let tokens = jwt.generate_token_pair(user.id)?;
    tracing::info!(user_id = %user.id, "Password login succeeded");

    Ok(PasswordLoginResponse {
        message: "Login exitoso",
        token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_in: jwt.access_token_expiry_seconds(),
    })
}

// =============================================================================
// Refresh
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub expires_in: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("refresh token missing")]
    MissingToken,
    #[error("refresh token rejected: {0}")]
    InvalidRefreshToken(JwtError),
    #[error("user no longer exists")]
    UserNotFound,
    #[error("user store failure: {0}")]
    Store(#[from] StoreError),
    #[error("token issuance failed: {0}")]
    Token(JwtError),
}

impl From<RefreshError> for ApiError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::MissingToken => ApiError::MissingInput("Refresh token requerido"),
            RefreshError::InvalidRefreshToken(_) => {
                ApiError::Unauthorized("Token de refresh inválido")
            }
            RefreshError::UserNotFound => ApiError::Unauthorized("Usuario no encontrado"),
            RefreshError::Store(_) | RefreshError::Token(_) => {
                ApiError::Internal("Error interno del servidor")
            }
        }
    }
}

/// Exchange a refresh token for a new access token.
///
/// The refresh token itself is not rotated. Re-reading the user is what
/// stops deleted accounts from renewing.
pub async fn refresh_access_token(
    users: &dyn UserStore,
    jwt: &JwtManager,
    refresh_token: Option<&str>,
) -> Result<RefreshResponse, RefreshError> {
    let refresh_token = non_empty(refresh_token).ok_or(RefreshError::MissingToken)?;

    let claims = jwt.validate_refresh_token(refresh_token).map_err(|e| {
        tracing::warn!(reason = %e, "Refresh token rejected");
        RefreshError::InvalidRefreshToken(e)
    })?;

    let user = users
        .find_user_by_id(claims.sub)
        .await?
        .ok_or_else(|| {
            tracing::info!(user_id = %claims.sub, "Refresh for deleted user");
            RefreshError::UserNotFound
        })?;

    let access_token = jwt
        .generate_access_token(user.id)
        .map_err(RefreshError::Token)?;

    Ok(RefreshResponse {
        access_token,
        expires_in: jwt.access_token_expiry_seconds(),
    })
}
