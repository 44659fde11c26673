//! Persistence collaborator
//!
//! The auth core only needs find / create operations and a uniqueness
//! guarantee on email; everything else about storage lives behind these
//! traits.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{create_pool, PgStore};

use async_trait::async_trait;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint (email, username, follow pair) was violated
    #[error("record already exists")]
    Duplicate,
    /// A referenced row does not exist
    #[error("referenced record does not exist")]
    MissingReference,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Stored user account
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// `None` for accounts created through federated login
    pub password_hash: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Public projection of a user; never carries the password hash
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub avatar_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            avatar_url: user.avatar_url,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Insert a user. Fails with [`StoreError::Duplicate`] when the email or
    /// username is taken.
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError>;
}

#[async_trait]
pub trait FollowStore: Send + Sync {
    /// Record that `follower_id` follows `following_id`.
    ///
    /// Fails with [`StoreError::Duplicate`] if the edge exists and with
    /// [`StoreError::MissingReference`] if either user does not.
    async fn create_follow(&self, follower_id: Uuid, following_id: Uuid)
        -> Result<(), StoreError>;
}
