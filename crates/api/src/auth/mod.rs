//! Authentication module for Tribu

#[cfg(test)]
mod edge_case_tests;
pub mod flows;
pub mod google;
pub mod jwt;
pub mod middleware;
pub mod password;

pub use flows::{
    federated_login, password_login, refresh_access_token, FederatedLoginError, LoginError,
    RefreshError,
};
pub use google::{
    GoogleIdTokenVerifier, IdentityError, JwksKeySource, SigningKeySource, VerifiedIdentity,
};
pub use jwt::{Claims, JwtError, JwtManager, TokenPair, TokenType};
pub use middleware::{require_auth, AuthError, AuthState, AuthUser};
pub use password::{check_password, hash_password, verify_password, PasswordError};
