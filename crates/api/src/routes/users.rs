//! User registration

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::{
    auth::password,
    error::{ApiError, ApiResult},
    state::AppState,
    store::{NewUser, StoreError, UserProfile},
};

use super::extract::ApiJson;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// POST /users
pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> ApiResult<Json<UserProfile>> {
    let present = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    let (Some(username), Some(email), Some(plain)) = (
        present(req.username),
        present(req.email),
        req.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::MissingInput("Faltan datos"));
    };

    let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "Password hashing task failed");
            ApiError::Internal("Error creando usuario")
        })?
        .map_err(|e| {
            tracing::error!(error = %e, "Password hashing failed");
            ApiError::Internal("Error creando usuario")
        })?;

    let user = state
        .users
        .create_user(NewUser {
            username,
            email,
            password_hash: Some(password_hash),
            avatar_url: None,
        })
        .await
        .map_err(|e| match e {
            StoreError::Duplicate => ApiError::Conflict("El usuario ya existe"),
            other => ApiError::from(other),
        })?;

    tracing::info!(user_id = %user.id, "User registered");
    Ok(Json(UserProfile::from(user)))
}
