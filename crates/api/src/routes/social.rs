//! Follow graph endpoints

use axum::{
    extract::{rejection::PathRejection, Path, State},
    Json,
};
use uuid::Uuid;

use super::auth::MessageResponse;
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
    store::StoreError,
};

/// POST /users/{user_id}/follow
pub async fn follow_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<MessageResponse>> {
    // No user can have an id that is not a UUID.
    let Path(user_id) = user_id.map_err(|e| {
        tracing::debug!(reason = %e.body_text(), "Unparsable user id in path");
        ApiError::NotFound("Usuario no encontrado")
    })?;

    if user_id == auth_user.user_id {
        return Err(ApiError::BadRequest("No puedes seguirte a ti mismo"));
    }

    state
        .follows
        .create_follow(auth_user.user_id, user_id)
        .await
        .map_err(|e| match e {
            StoreError::Duplicate => ApiError::Conflict("Ya sigues a este usuario"),
            StoreError::MissingReference => ApiError::NotFound("Usuario no encontrado"),
            other => ApiError::from(other),
        })?;

    tracing::info!(follower_id = %auth_user.user_id, following_id = %user_id, "Follow created");
    Ok(Json(MessageResponse {
        message: "Ahora estás siguiendo a este usuario",
    }))
}
