//! Authentication middleware for Axum

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use super::jwt::JwtManager;

/// Authenticated caller, placed in request extensions by [`require_auth`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
}

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing authorization header")]
    TokenRequired,
    #[error("invalid or expired token")]
    TokenInvalid,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::TokenRequired => "Token requerido",
            AuthError::TokenInvalid => "Token inválido",
        };
        let status = StatusCode::UNAUTHORIZED;

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// Pull the bearer token out of the Authorization header.
///
/// `Ok(None)` means no header at all; a header in any other shape is an
/// invalid token. The scheme name is matched case-insensitively.
fn extract_bearer_token(request: &Request) -> Result<Option<&str>, AuthError> {
    let Some(value) = request.headers().get(AUTHORIZATION) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(|header| header.trim_start().split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty())
        .map(Some)
        .ok_or(AuthError::TokenInvalid)
}

fn authenticate(auth_state: &AuthState, request: &Request) -> Result<AuthUser, AuthError> {
    let token = extract_bearer_token(request)?.ok_or(AuthError::TokenRequired)?;

    let claims = auth_state
        .jwt_manager
        .validate_access_token(token)
        .map_err(|e| {
            // The reason is for operators only; callers just see TokenInvalid.
            tracing::warn!(reason = %e, "Access token rejected");
            AuthError::TokenInvalid
        })?;

    Ok(AuthUser {
        user_id: claims.sub,
    })
}

/// Middleware that requires a valid access token
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    match authenticate(&auth_state, &request) {
        Ok(auth_user) => {
            tracing::debug!(path = %path, user_id = %auth_user.user_id, "require_auth: authenticated");
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            tracing::info!(path = %path, error = ?err, "require_auth: rejected");
            err.into_response()
        }
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Only present when the route sits behind require_auth.
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .ok_or(AuthError::TokenRequired)
    }
}
