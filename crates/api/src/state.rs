//! Application state

use std::sync::Arc;

use crate::{
    auth::{AuthState, GoogleIdTokenVerifier, JwtManager},
    config::Config,
    store::{FollowStore, UserStore},
};

/// Shared application state. Everything in it is read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub jwt_manager: JwtManager,
    /// None when GOOGLE_CLIENT_ID is not configured
    pub google_verifier: Option<GoogleIdTokenVerifier>,
    pub users: Arc<dyn UserStore>,
    pub follows: Arc<dyn FollowStore>,
}

impl AppState {
    pub fn new<S>(config: Config, store: S) -> Self
    where
        S: UserStore + FollowStore + 'static,
    {
        let jwt_manager = JwtManager::new(&config.jwt_secret, &config.jwt_refresh_secret);
        tracing::info!(
            access_ttl_secs = jwt_manager.access_token_expiry_seconds(),
            "Session token manager initialized"
        );

        let google_verifier = match &config.google_client_id {
            Some(client_id) => {
                tracing::info!("Google ID token verification enabled");
                Some(GoogleIdTokenVerifier::google(client_id.clone()))
            }
            None => {
                tracing::warn!(
                    "Google ID token verification not configured (missing GOOGLE_CLIENT_ID)"
                );
                None
            }
        };

        let store = Arc::new(store);

        Self {
            config,
            jwt_manager,
            google_verifier,
            users: store.clone(),
            follows: store,
        }
    }

    /// Replace the identity-token verifier
    pub fn with_google_verifier(mut self, verifier: GoogleIdTokenVerifier) -> Self {
        self.google_verifier = Some(verifier);
        self
    }

    /// Get auth state for middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
        }
    }
}
