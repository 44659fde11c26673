//! Request extractors that answer in the `ApiError` shape

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// JSON request body that never rejects with axum's plain-text errors.
///
/// A missing body, a missing content type or a field of the wrong type all
/// yield `T::default()`. Request types keep every field optional, so the
/// flow's own field checks produce the 400 for them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned + Default + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(JsonRejection::BytesRejection(e)) => {
                tracing::warn!(reason = %e.body_text(), "Failed to read request body");
                Err(ApiError::BadRequest("Cuerpo de la petición inválido"))
            }
            Err(rejection) => {
                tracing::debug!(
                    status = %rejection.status(),
                    reason = %rejection.body_text(),
                    "Unusable JSON body, treating as empty"
                );
                Ok(Self(T::default()))
            }
        }
    }
}
