//! Session endpoints: federated login, password login, refresh, logout

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{
    auth::flows::{
        self, FederatedLoginResponse, PasswordLoginResponse, RefreshResponse,
    },
    error::ApiResult,
    state::AppState,
};

use super::extract::ApiJson;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoogleLoginRequest {
    pub id_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// POST /auth/google/mobile
pub async fn google_mobile_login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<GoogleLoginRequest>,
) -> ApiResult<Json<FederatedLoginResponse>> {
    tracing::info!(
        has_id_token = req.id_token.is_some(),
        "Federated login request received"
    );

    let response = flows::federated_login(
        state.google_verifier.as_ref(),
        state.users.as_ref(),
        &state.jwt_manager,
        req.id_token.as_deref(),
    )
    .await?;

    tracing::info!(user_id = %response.user.id, "Federated login succeeded");
    Ok(Json(response))
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let response = flows::refresh_access_token(
        state.users.as_ref(),
        &state.jwt_manager,
        req.refresh_token.as_deref(),
    )
    .await?;

    Ok(Json(response))
}

/// POST /auth/logout
///
/// Sessions live entirely in client-held tokens, so there is nothing to
/// invalidate here; the client discards its tokens.
pub async fn logout() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Logout exitoso",
    })
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<PasswordLoginResponse>> {
    let response = flows::password_login(
        state.users.as_ref(),
        &state.jwt_manager,
        req.email.as_deref(),
        req.password.as_deref(),
    )
    .await?;

    Ok(Json(response))
}
