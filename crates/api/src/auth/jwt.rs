//! Session token issuance and verification
//!
//! Access and refresh tokens are HS256 JWTs signed with independent
//! secrets, so holding one secret never allows forging the other kind.
//! Nothing is stored server-side; a token is valid until it expires.

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Canonical access token lifetime for every flow
pub const ACCESS_TOKEN_TTL_SECS: i64 = 3600;

/// Refresh token lifetime (7 days)
pub const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims embedded in every session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    pub token_type: TokenType,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum JwtError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is not of the expected type")]
    WrongTokenType,
    #[error("refusing to issue a token for an empty subject")]
    InvalidSubject,
    #[error("failed to sign token: {0}")]
    Encoding(String),
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => JwtError::InvalidSignature,
            ErrorKind::ExpiredSignature => JwtError::Expired,
            _ => JwtError::Malformed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signing material for one token kind
#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Issues and validates session tokens. Cheap to clone; holds no mutable state.
#[derive(Clone)]
pub struct JwtManager {
    access: KeyPair,
    refresh: KeyPair,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtManager {
    pub fn new(access_secret: &str, refresh_secret: &str) -> Self {
        Self {
            access: KeyPair::from_secret(access_secret),
            refresh: KeyPair::from_secret(refresh_secret),
            access_ttl: Duration::seconds(ACCESS_TOKEN_TTL_SECS),
            refresh_ttl: Duration::seconds(REFRESH_TOKEN_TTL_SECS),
        }
    }

    /// Access token lifetime, as reported to clients in `expiresIn`
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_ttl.whole_seconds()
    }

    pub fn generate_access_token(&self, user_id: Uuid) -> Result<String, JwtError> {
        self.issue(user_id, TokenType::Access, OffsetDateTime::now_utc())
    }

    pub fn generate_refresh_token(&self, user_id: Uuid) -> Result<String, JwtError> {
        self.issue(user_id, TokenType::Refresh, OffsetDateTime::now_utc())
    }

    pub fn generate_token_pair(&self, user_id: Uuid) -> Result<TokenPair, JwtError> {
        let now = OffsetDateTime::now_utc();
        Ok(TokenPair {
            access_token: self.issue(user_id, TokenType::Access, now)?,
            refresh_token: self.issue(user_id, TokenType::Refresh, now)?,
        })
    }

    pub fn validate_access_token(&self, token: &str) -> Result<Claims, JwtError> {
        self.validate(token, TokenType::Access)
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims, JwtError> {
        self.validate(token, TokenType::Refresh)
    }

    fn keys(&self, kind: TokenType) -> &KeyPair {
        match kind {
            TokenType::Access => &self.access,
            TokenType::Refresh => &self.refresh,
        }
    }

    pub(crate) fn issue(
        &self,
        user_id: Uuid,
        kind: TokenType,
        issued_at: OffsetDateTime,
    ) -> Result<String, JwtError> {
        if user_id.is_nil() {
            return Err(JwtError::InvalidSubject);
        }

        let ttl = match kind {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user_id,
            token_type: kind,
            iat: issued_at.unix_timestamp(),
            exp: (issued_at + ttl).unix_timestamp(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.keys(kind).encoding,
        )
        .map_err(|e| JwtError::Encoding(e.to_string()))
    }

    fn validate(&self, token: &str, expected: TokenType) -> Result<Claims, JwtError> {
        // Pin the algorithm; expiry is checked below without leeway.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.keys(expected).decoding, &validation)?;
        let claims = data.claims;

        if OffsetDateTime::now_utc().unix_timestamp() >= claims.exp {
            return Err(JwtError::Expired);
        }
        if claims.token_type != expected {
            return Err(JwtError::WrongTokenType);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCESS_SECRET: &str = "test-access-secret-at-least-32-chars!";
    const REFRESH_SECRET: &str = "test-refresh-secret-at-least-32-chars";

    fn manager() -> JwtManager {
        JwtManager::new(ACCESS_SECRET, REFRESH_SECRET)
    }

    #[test]
    fn test_access_token_round_trip() {
        let jwt = manager();
        let user_id = Uuid::new_v4();

        let token = jwt.generate_access_token(user_id).unwrap();
        let claims = jwt.validate_access_token(&token).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.exp - claims.iat, ACCESS_TOKEN_TTL_SECS);
    }

    #[test]
    fn test_refresh_token_round_trip() {
        let jwt = manager();
        let user_id = Uuid::new_v4();

        let token = jwt.generate_refresh_token(user_id).unwrap();
        let claims = jwt.validate_refresh_token(&token).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 3600);
    }

    #[test]
    fn test_kinds_are_not_interchangeable() {
        let jwt = manager();
        let pair = jwt.generate_token_pair(Uuid::new_v4()).unwrap();

        assert_eq!(
            jwt.validate_refresh_token(&pair.access_token).unwrap_err(),
            JwtError::InvalidSignature
        );
        assert_eq!(
            jwt.validate_access_token(&pair.refresh_token).unwrap_err(),
            JwtError::InvalidSignature
        );
    }

    #[test]
    fn test_foreign_secret_rejected() {
        let ours = manager();
        let theirs = JwtManager::new("another-access-secret", "another-refresh-secret");

        let token = theirs.generate_access_token(Uuid::new_v4()).unwrap();
        assert_eq!(
            ours.validate_access_token(&token).unwrap_err(),
            JwtError::InvalidSignature
        );
    }

    #[test]
    fn test_expired_token_rejected() {
        let jwt = manager();
        let issued_at = OffsetDateTime::now_utc() - Duration::hours(2);

        let token = jwt
            .issue(Uuid::new_v4(), TokenType::Access, issued_at)
            .unwrap();
        assert_eq!(
            jwt.validate_access_token(&token).unwrap_err(),
            JwtError::Expired
        );
    }

    #[test]
    fn test_token_expiring_now_is_expired() {
        let jwt = manager();
        let issued_at = OffsetDateTime::now_utc() - Duration::seconds(ACCESS_TOKEN_TTL_SECS);

        let token = jwt
            .issue(Uuid::new_v4(), TokenType::Access, issued_at)
            .unwrap();
        assert_eq!(
            jwt.validate_access_token(&token).unwrap_err(),
            JwtError::Expired
        );
    }

    #[test]
    fn test_wrong_token_type_with_shared_secret() {
        // Only reachable when both secrets are equal, which config forbids.
        let jwt = JwtManager::new(ACCESS_SECRET, ACCESS_SECRET);
        let token = jwt.generate_refresh_token(Uuid::new_v4()).unwrap();

        assert_eq!(
            jwt.validate_access_token(&token).unwrap_err(),
            JwtError::WrongTokenType
        );
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let jwt = manager();
        for token in ["", "completely-invalid", "not.a.valid.token", "a.b.c"] {
            assert_eq!(
                jwt.validate_access_token(token).unwrap_err(),
                JwtError::Malformed,
                "token {token:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_nil_subject_refused() {
        let jwt = manager();
        assert_eq!(
            jwt.generate_access_token(Uuid::nil()).unwrap_err(),
            JwtError::InvalidSubject
        );
    }

    #[test]
    fn test_expiry_seconds_reported() {
        assert_eq!(manager().access_token_expiry_seconds(), 3600);
    }
}
