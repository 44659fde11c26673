// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Tribu API Library
//!
//! Identity and session core for the Tribu community backend: accounts,
//! Google sign-in, password login, token refresh, and the follow graph.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod store;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
