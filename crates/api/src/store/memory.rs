//! In-process store with the same uniqueness rules as the SQL schema.
//! Used by tests and local experiments.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{FollowStore, NewUser, StoreError, User, UserStore};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    follows: HashSet<(Uuid, Uuid)>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a user and every follow edge that touches it
    pub async fn delete_user(&self, id: Uuid) -> bool {
        let mut tables = self.tables.write().await;
        tables
            .follows
            .retain(|(follower, following)| *follower != id && *following != id);
        tables.users.remove(&id).is_some()
    }

    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }

    pub async fn is_following(&self, follower_id: Uuid, following_id: Uuid) -> bool {
        self.tables
            .read()
            .await
            .follows
            .contains(&(follower_id, following_id))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;

        let taken = tables
            .users
            .values()
            .any(|u| u.email == new_user.email || u.username == new_user.username);
        if taken {
            return Err(StoreError::Duplicate);
        }

        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            avatar_url: new_user.avatar_url,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.users.insert(user.id, user.clone());

        Ok(user)
    }
}

#[async_trait]
impl FollowStore for MemoryStore {
    async fn create_follow(
        &self,
        follower_id: Uuid,
        following_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        if !tables.users.contains_key(&follower_id) || !tables.users.contains_key(&following_id) {
            return Err(StoreError::MissingReference);
        }
        if !tables.follows.insert((follower_id, following_id)) {
            return Err(StoreError::Duplicate);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: None,
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn test_email_is_unique() {
        let store = MemoryStore::new();
        store
            .create_user(new_user("ana", "ana@example.com"))
            .await
            .unwrap();

        let result = store.create_user(new_user("ana2", "ana@example.com")).await;
        assert!(matches!(result, Err(StoreError::Duplicate)));
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_follow_rules() {
        let store = MemoryStore::new();
        let a = store.create_user(new_user("a", "a@example.com")).await.unwrap();
        let b = store.create_user(new_user("b", "b@example.com")).await.unwrap();

        store.create_follow(a.id, b.id).await.unwrap();
        assert!(store.is_following(a.id, b.id).await);
        assert!(matches!(
            store.create_follow(a.id, b.id).await,
            Err(StoreError::Duplicate)
        ));
        assert!(matches!(
            store.create_follow(a.id, Uuid::new_v4()).await,
            Err(StoreError::MissingReference)
        ));
    }

    #[tokio::test]
    async fn test_delete_user_drops_edges() {
        let store = MemoryStore::new();
        let a = store.create_user(new_user("a", "a@example.com")).await.unwrap();
        let b = store.create_user(new_user("b", "b@example.com")).await.unwrap();
        store.create_follow(a.id, b.id).await.unwrap();

        assert!(store.delete_user(b.id).await);
        assert!(!store.is_following(a.id, b.id).await);
        assert!(store.find_user_by_id(b.id).await.unwrap().is_none());
        assert!(!store.delete_user(b.id).await);
    }
}
