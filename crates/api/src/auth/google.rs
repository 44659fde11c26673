//! Google ID token verification
//!
//! The verifier is built once at startup with the application's client id
//! and a signing-key source, then shared read-only by every request. Keys
//! are looked up by the token's `kid`; the algorithm always comes from the
//! key, never from the token header.

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// Google's published signing keys
pub const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Issuers Google uses for ID tokens
pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Clock skew tolerance for ID token expiry
const LEEWAY_SECS: u64 = 60;

const JWKS_CACHE_TTL: Duration = Duration::from_secs(600);
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum spacing between key set fetches triggered by unknown `kid`s
const JWKS_MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum JWKS response size (512 KB)
const MAX_JWKS_SIZE: usize = 512 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Header, signature, expiry or key lookup failed
    #[error("identity assertion is invalid: {0}")]
    AssertionInvalid(String),
    /// Issuer or audience does not match this application
    #[error("identity assertion is not trusted: {0}")]
    AssertionUntrusted(String),
    #[error("identity provider did not return a verified email")]
    EmailMissing,
}

/// Identity attributes extracted from a verified assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject: String,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// `email_verified` arrives as a bool or as the string "true"/"false"
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum BoolOrString {
    Bool(bool),
    String(String),
}

impl BoolOrString {
    fn is_true(&self) -> bool {
        match self {
            BoolOrString::Bool(b) => *b,
            BoolOrString::String(s) => s.eq_ignore_ascii_case("true"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleIdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<BoolOrString>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

/// Resolves the verification key for a token's `kid`
#[async_trait]
pub trait SigningKeySource: Send + Sync {
    async fn key_for(&self, kid: &str) -> Result<(DecodingKey, Algorithm), IdentityError>;
}

#[derive(Clone)]
pub struct GoogleIdTokenVerifier {
    client_id: String,
    keys: Arc<dyn SigningKeySource>,
}

impl GoogleIdTokenVerifier {
    pub fn new(client_id: impl Into<String>, keys: Arc<dyn SigningKeySource>) -> Self {
        Self {
            client_id: client_id.into(),
            keys,
        }
    }

    /// Verifier backed by Google's live JWKS endpoint
    pub fn google(client_id: impl Into<String>) -> Self {
        Self::new(client_id, Arc::new(JwksKeySource::new(GOOGLE_JWKS_URL)))
    }

    pub async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let header = decode_header(id_token)
            .map_err(|e| IdentityError::AssertionInvalid(format!("unreadable header: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| IdentityError::AssertionInvalid("missing kid in header".to_string()))?;

        let (key, algorithm) = self.keys.key_for(&kid).await?;

        let mut validation = Validation::new(algorithm);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_issuer(&GOOGLE_ISSUERS);
        validation.leeway = LEEWAY_SECS;

        let data = decode::<GoogleIdTokenClaims>(id_token, &key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidAudience | ErrorKind::InvalidIssuer => {
                    IdentityError::AssertionUntrusted(e.to_string())
                }
                _ => IdentityError::AssertionInvalid(e.to_string()),
            }
        })?;
        let claims = data.claims;

        let verified = claims.email_verified.as_ref().is_some_and(BoolOrString::is_true);
        let email = claims
            .email
            .filter(|e| !e.trim().is_empty() && verified)
            .ok_or(IdentityError::EmailMissing)?;

        Ok(VerifiedIdentity {
            subject: claims.sub,
            email,
            display_name: claims.name.filter(|n| !n.trim().is_empty()),
            avatar_url: claims.picture.filter(|p| !p.is_empty()),
        })
    }
}

/// JWKS document (RFC 7517)
#[derive(Debug, Clone, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: Option<String>,
    kty: String,
    alg: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

impl Jwk {
    fn decoding_key(&self) -> Result<(DecodingKey, Algorithm), IdentityError> {
        if self.kty != "RSA" {
            return Err(IdentityError::AssertionInvalid(format!(
                "unsupported key type {}",
                self.kty
            )));
        }
        let (Some(n), Some(e)) = (self.n.as_deref(), self.e.as_deref()) else {
            return Err(IdentityError::AssertionInvalid(
                "RSA key missing modulus or exponent".to_string(),
            ));
        };
        let key = DecodingKey::from_rsa_components(n, e)
            .map_err(|e| IdentityError::AssertionInvalid(format!("bad RSA key: {e}")))?;
        let alg = match self.alg.as_deref() {
            Some("RS384") => Algorithm::RS384,
            Some("RS512") => Algorithm::RS512,
            _ => Algorithm::RS256,
        };
        Ok((key, alg))
    }
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Fetches and caches a JWKS document over HTTPS.
///
/// The set is cached for ten minutes and refetched when a token names an
/// unknown `kid`, which is how provider key rotation shows up. Fetches run
/// one at a time and no more often than the refetch interval, so a stream
/// of made-up `kid`s cannot fan out into requests to the provider.
pub struct JwksKeySource {
    url: String,
    http_client: Client,
    cache: RwLock<Option<CachedKeys>>,
    /// Start of the last fetch attempt; held while fetching
    last_fetch: Mutex<Option<Instant>>,
    min_refetch_interval: Duration,
}

impl JwksKeySource {
    pub fn new(url: impl Into<String>) -> Self {
        let http_client = Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            url: url.into(),
            http_client,
            cache: RwLock::new(None),
            last_fetch: Mutex::new(None),
            min_refetch_interval: JWKS_MIN_REFETCH_INTERVAL,
        }
    }

    pub fn with_min_refetch_interval(mut self, interval: Duration) -> Self {
        self.min_refetch_interval = interval;
        self
    }

    /// Key for `kid` from an unexpired cached set
    async fn cached_key(&self, kid: &str) -> Option<Jwk> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < JWKS_CACHE_TTL)
            .and_then(|c| find_key(&c.keys, kid))
            .cloned()
    }

    async fn refresh(&self) -> Result<JwkSet, IdentityError> {
        let keys = self.fetch().await?;
        *self.cache.write().await = Some(CachedKeys {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });
        Ok(keys)
    }

    async fn fetch(&self) -> Result<JwkSet, IdentityError> {
        tracing::debug!(url = %self.url, "Fetching identity provider signing keys");

        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| IdentityError::AssertionInvalid(format!("key fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(IdentityError::AssertionInvalid(format!(
                "key fetch returned HTTP {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| IdentityError::AssertionInvalid(format!("key fetch failed: {e}")))?;
        if bytes.len() > MAX_JWKS_SIZE {
            return Err(IdentityError::AssertionInvalid(format!(
                "key set too large: {} bytes",
                bytes.len()
            )));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| IdentityError::AssertionInvalid(format!("unparsable key set: {e}")))
    }
}

fn find_key<'a>(set: &'a JwkSet, kid: &str) -> Option<&'a Jwk> {
    set.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
}

#[async_trait]
impl SigningKeySource for JwksKeySource {
    async fn key_for(&self, kid: &str) -> Result<(DecodingKey, Algorithm), IdentityError> {
        if let Some(jwk) = self.cached_key(kid).await {
            return jwk.decoding_key();
        }

        let mut last_fetch = self.last_fetch.lock().await;

        // Another caller may have fetched while we waited for the lock.
        if let Some(jwk) = self.cached_key(kid).await {
            return jwk.decoding_key();
        }

        if last_fetch.is_some_and(|at| at.elapsed() < self.min_refetch_interval) {
            tracing::debug!(kid = %kid, "Unknown signing key id, key set fetched recently");
            return Err(IdentityError::AssertionInvalid(format!(
                "no signing key for kid {kid}"
            )));
        }

        tracing::info!(kid = %kid, "Signing key id not cached, fetching key set");
        *last_fetch = Some(Instant::now());
        let set = self.refresh().await?;
        drop(last_fetch);

        find_key(&set, kid)
            .ok_or_else(|| IdentityError::AssertionInvalid(format!("no signing key for kid {kid}")))?
            .decoding_key()
    }
}

/// Fixed symmetric key source for tests
#[cfg(test)]
pub(crate) struct StaticKeySource {
    pub kid: String,
    pub secret: Vec<u8>,
}

#[cfg(test)]
#[async_trait]
impl SigningKeySource for StaticKeySource {
    async fn key_for(&self, kid: &str) -> Result<(DecodingKey, Algorithm), IdentityError> {
        if kid != self.kid {
            return Err(IdentityError::AssertionInvalid(format!(
                "no signing key for kid {kid}"
            )));
        }
        Ok((DecodingKey::from_secret(&self.secret), Algorithm::HS256))
    }
}
