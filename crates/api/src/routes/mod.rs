//! HTTP routes

mod auth;
mod extract;
mod social;
mod users;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::{auth::require_auth, config::Config, state::AppState};

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    // Routes that need `Authorization: Bearer <access token>`
    let protected = Router::new()
        .route("/users/{user_id}/follow", post(social::follow_user))
        .route_layer(middleware::from_fn_with_state(
            state.auth_state(),
            require_auth,
        ));

    Router::new()
        .route("/", get(health))
        .route("/auth/google/mobile", post(auth::google_mobile_login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/login", post(auth::login))
        .route("/users", post(users::create_user))
        .merge(protected)
        .with_state(state)
}

async fn health() -> &'static str {
    "Servidor funcionando"
}

/// CORS policy: the configured allowlist, or any origin when none is set
pub fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let allow_origin = if origins.is_empty() {
        tracing::info!("CORS configured for any origin");
        AllowOrigin::from(Any)
    } else {
        tracing::info!(
            allowed_origins = ?origins,
            "CORS configured with {} allowed origins",
            origins.len()
        );
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
}
