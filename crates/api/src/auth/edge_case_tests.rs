//! Edge Case Tests for the login and renewal flows
//!
//! Covers:
//! - Federated login idempotence and user provisioning
//! - Concurrent creation races on the same email
//! - Password login against federated-only accounts
//! - Refresh after account deletion

#[cfg(test)]
mod federated_tests {
    use super::super::flows::*;
    use super::super::google::{testing, IdentityError, VerifiedIdentity};
    use super::super::jwt::JwtManager;
    use crate::store::{MemoryStore, NewUser, StoreError, User, UserStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    fn jwt() -> JwtManager {
        JwtManager::new(
            "federated-access-secret-32-chars!!!",
            "federated-refresh-secret-32-chars!!",
        )
    }

    fn identity(name: Option<&str>, email: &str, subject: &str) -> VerifiedIdentity {
        VerifiedIdentity {
            subject: subject.to_string(),
            email: email.to_string(),
            display_name: name.map(str::to_string),
            avatar_url: None,
        }
    }

    #[test]
    fn test_username_from_display_name() {
        let id = identity(Some("Ana  María Pérez"), "ana@example.com", "1098765432101234");
        assert_eq!(derive_username(&id), "ana_maría_pérez_10987654");
    }

    #[test]
    fn test_username_falls_back_to_email_local_part() {
        let id = identity(None, "carlos.ruiz@example.com", "42");
        assert_eq!(derive_username(&id), "carlos.ruiz");

        let blank = identity(Some("   "), "carlos.ruiz@example.com", "42");
        assert_eq!(derive_username(&blank), "carlos.ruiz");
    }

    #[test]
    fn test_short_subject_is_used_whole() {
        let id = identity(Some("Bo"), "bo@example.com", "7");
        assert_eq!(derive_username(&id), "bo_7");
    }

    #[tokio::test]
    async fn test_first_login_creates_federated_user() {
        let store = MemoryStore::new();
        let jwt = jwt();
        let verifier = testing::verifier();
        let token = testing::sign(&testing::claims_for(
            "ana@example.com",
            Some("Ana Pérez"),
            "1098765432101234",
        ));

        let response = federated_login(Some(&verifier), &store, &jwt, Some(token.as_str()))
            .await
            .unwrap();

        assert_eq!(response.user.email, "ana@example.com");
        assert_eq!(response.user.name, "ana_pérez_10987654");
        assert_eq!(
            response.user.avatar_url.as_deref(),
            Some("https://lh3.googleusercontent.com/a/photo.jpg")
        );
        assert_eq!(response.expires_in, 3600);

        let stored = store
            .find_user_by_email("ana@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.password_hash.is_none(), "federated users have no password");

        let access = jwt.validate_access_token(&response.access_token).unwrap();
        let refresh = jwt.validate_refresh_token(&response.refresh_token).unwrap();
        assert_eq!(access.sub, response.user.id);
        assert_eq!(refresh.sub, response.user.id);
    }

    #[tokio::test]
    async fn test_federated_login_is_idempotent_per_email() {
        let store = MemoryStore::new();
        let jwt = jwt();
        let verifier = testing::verifier();
        let token = testing::sign(&testing::claims_for("ana@example.com", Some("Ana"), "111"));

        let first = federated_login(Some(&verifier), &store, &jwt, Some(token.as_str()))
            .await
            .unwrap();
        let second = federated_login(Some(&verifier), &store, &jwt, Some(token.as_str()))
            .await
            .unwrap();

        assert_eq!(first.user.id, second.user.id);
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_existing_password_account_is_reused() {
        let store = MemoryStore::new();
        let existing = store
            .create_user(NewUser {
                username: "ana".to_string(),
                email: "ana@example.com".to_string(),
                password_hash: Some("$argon2id$placeholder".to_string()),
                avatar_url: None,
            })
            .await
            .unwrap();

        let token = testing::sign(&testing::claims_for("ana@example.com", Some("Ana"), "111"));
        let response = federated_login(Some(&testing::verifier()), &store, &jwt(), Some(token.as_str()))
            .await
            .unwrap();

        assert_eq!(response.user.id, existing.id);
        assert_eq!(response.user.name, "ana");
    }

    #[tokio::test]
    async fn test_username_clash_gets_suffix() {
        let store = MemoryStore::new();
        store
            .create_user(NewUser {
                username: "carlos".to_string(),
                email: "carlos@other.org".to_string(),
                password_hash: None,
                avatar_url: None,
            })
            .await
            .unwrap();

        let token = testing::sign(&testing::claims_for("carlos@example.com", None, "1234567890"));
        let response = federated_login(Some(&testing::verifier()), &store, &jwt(), Some(token.as_str()))
            .await
            .unwrap();

        assert_eq!(response.user.name, "carlos_34567890");
        assert_eq!(store.user_count().await, 2);
    }

    #[tokio::test]
    async fn test_missing_id_token() {
        let store = MemoryStore::new();
        let verifier = testing::verifier();

        for token in [None, Some(""), Some("   ")] {
            let err = federated_login(Some(&verifier), &store, &jwt(), token)
                .await
                .unwrap_err();
            assert!(matches!(err, FederatedLoginError::MissingAssertion));
        }
    }

    #[tokio::test]
    async fn test_unconfigured_verifier() {
        let err = federated_login(None, &MemoryStore::new(), &jwt(), Some("x.y.z"))
            .await
            .unwrap_err();
        assert!(matches!(err, FederatedLoginError::NotConfigured));
    }

    #[tokio::test]
    async fn test_rejected_assertion_creates_nothing() {
        let store = MemoryStore::new();
        let mut claims = testing::claims_for("ana@example.com", None, "111");
        claims["aud"] = "another-app".into();

        let err = federated_login(
            Some(&testing::verifier()),
            &store,
            &jwt(),
            Some(testing::sign(&claims).as_str()),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            FederatedLoginError::Identity(IdentityError::AssertionUntrusted(_))
        ));
        assert_eq!(store.user_count().await, 0);
    }

    /// Store where another request wins the race to create the user
    struct RacingStore {
        inner: MemoryStore,
        raced: AtomicBool,
    }

    #[async_trait]
    impl UserStore for RacingStore {
        async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            self.inner.find_user_by_email(email).await
        }

        async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
            self.inner.find_user_by_id(id).await
        }

        async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                // The competing request inserts the same email first.
                self.inner
                    .create_user(NewUser {
                        username: format!("{}_other", new_user.username),
                        ..new_user.clone()
                    })
                    .await?;
            }
            self.inner.create_user(new_user).await
        }
    }

    #[tokio::test]
    async fn test_duplicate_on_create_refetches_winner() {
        let store = RacingStore {
            inner: MemoryStore::new(),
            raced: AtomicBool::new(false),
        };
        let token = testing::sign(&testing::claims_for("ana@example.com", Some("Ana"), "111"));

        let response = federated_login(Some(&testing::verifier()), &store, &jwt(), Some(token.as_str()))
            .await
            .unwrap();

        let winner = store
            .inner
            .find_user_by_email("ana@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.user.id, winner.id);
        assert_eq!(store.inner.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_logins_share_one_account() {
        let store = MemoryStore::new();
        let jwt = jwt();
        let verifier = testing::verifier();
        let token = testing::sign(&testing::claims_for("ana@example.com", Some("Ana"), "111"));

        let (a, b) = tokio::join!(
            federated_login(Some(&verifier), &store, &jwt, Some(token.as_str())),
            federated_login(Some(&verifier), &store, &jwt, Some(token.as_str())),
        );

        assert_eq!(a.unwrap().user.id, b.unwrap().user.id);
        assert_eq!(store.user_count().await, 1);
    }
}

#[cfg(test)]
mod password_login_tests {
    use super::super::flows::*;
    use super::super::jwt::JwtManager;
    use super::super::password::hash_password;
    use crate::error::ApiError;
    use crate::store::{MemoryStore, NewUser, UserStore};

    fn jwt() -> JwtManager {
        JwtManager::new("login-access-secret-32-chars!!!!!!", "login-refresh-secret-32-chars!!!!!")
    }

    async fn store_with(email: &str, password_hash: Option<String>) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create_user(NewUser {
                username: "ana".to_string(),
                email: email.to_string(),
                password_hash,
                avatar_url: None,
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_successful_login_issues_tokens() {
        let hash = hash_password("s3cret").unwrap();
        let store = store_with("a@b.com", Some(hash)).await;
        let jwt = jwt();

        let response = password_login(&store, &jwt, Some("a@b.com"), Some("s3cret"))
            .await
            .unwrap();

        let user = store.find_user_by_email("a@b.com").await.unwrap().unwrap();
        assert_eq!(jwt.validate_access_token(&response.token).unwrap().sub, user.id);
        assert_eq!(
            jwt.validate_refresh_token(&response.refresh_token).unwrap().sub,
            user.id
        );
        assert_eq!(response.expires_in, 3600);
    }

    #[tokio::test]
    async fn test_null_hash_is_invalid_credentials() {
        let store = store_with("a@b.com", None).await;

        let err = password_login(&store, &jwt(), Some("a@b.com"), Some("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoginError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_wrong_password_is_invalid_credentials() {
        let store = store_with("a@b.com", Some(hash_password("right").unwrap())).await;

        let err = password_login(&store, &jwt(), Some("a@b.com"), Some("wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoginError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_unknown_email_is_user_not_found() {
        let store = MemoryStore::new();

        let err = password_login(&store, &jwt(), Some("nobody@b.com"), Some("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoginError::UserNotFound));
    }

    #[tokio::test]
    async fn test_unknown_email_costs_a_verification() {
        let store = store_with("a@b.com", Some(hash_password("right").unwrap())).await;
        let jwt = jwt();

        // Warm the throwaway hash so neither timing includes its creation.
        let _ = password_login(&store, &jwt, Some("nobody@b.com"), Some("x")).await;

        let started = std::time::Instant::now();
        let _ = password_login(&store, &jwt, Some("a@b.com"), Some("wrong")).await;
        let wrong_password = started.elapsed();

        let started = std::time::Instant::now();
        let err = password_login(&store, &jwt, Some("nobody@b.com"), Some("x"))
            .await
            .unwrap_err();
        let unknown_email = started.elapsed();

        assert!(matches!(err, LoginError::UserNotFound));
        assert!(
            unknown_email * 4 >= wrong_password,
            "unknown email took {unknown_email:?}, wrong password {wrong_password:?}"
        );
    }

    #[tokio::test]
    async fn test_missing_fields() {
        let store = MemoryStore::new();
        let cases = [
            (None, Some("x")),
            (Some("a@b.com"), None),
            (Some(""), Some("x")),
            (Some("a@b.com"), Some("")),
        ];

        for (email, password) in cases {
            let err = password_login(&store, &jwt(), email, password)
                .await
                .unwrap_err();
            assert!(matches!(err, LoginError::MissingCredentials));
        }
    }

    #[test]
    fn test_not_found_and_bad_password_look_identical() {
        let a = ApiError::from(LoginError::UserNotFound);
        let b = ApiError::from(LoginError::InvalidCredentials);
        assert_eq!(a.status(), b.status());
        assert_eq!(a.message(), b.message());
    }
}

#[cfg(test)]
mod refresh_tests {
    use super::super::flows::*;
    use super::super::jwt::{JwtError, JwtManager, TokenType};
    use crate::store::{MemoryStore, NewUser, UserStore};
    use time::{Duration, OffsetDateTime};
    use uuid::Uuid;

    fn jwt() -> JwtManager {
        JwtManager::new("refresh-access-secret-32-chars!!!!", "refresh-refresh-secret-32-chars!!!")
    }

    async fn store_with_user() -> (MemoryStore, Uuid) {
        let store = MemoryStore::new();
        let user = store
            .create_user(NewUser {
                username: "u1".to_string(),
                email: "u1@example.com".to_string(),
                password_hash: None,
                avatar_url: None,
            })
            .await
            .unwrap();
        (store, user.id)
    }

    #[tokio::test]
    async fn test_refresh_returns_access_token_for_same_user() {
        let (store, user_id) = store_with_user().await;
        let jwt = jwt();
        let pair = jwt.generate_token_pair(user_id).unwrap();

        let response = refresh_access_token(&store, &jwt, Some(pair.refresh_token.as_str()))
            .await
            .unwrap();

        assert_eq!(response.expires_in, 3600);
        let claims = jwt.validate_access_token(&response.access_token).unwrap();
        assert_eq!(claims.sub, user_id);
    }

    #[tokio::test]
    async fn test_refresh_after_deletion_is_user_not_found() {
        let (store, user_id) = store_with_user().await;
        let jwt = jwt();
        let refresh_token = jwt.generate_refresh_token(user_id).unwrap();

        assert!(store.delete_user(user_id).await);

        let err = refresh_access_token(&store, &jwt, Some(refresh_token.as_str()))
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::UserNotFound));
    }

    #[tokio::test]
    async fn test_access_token_cannot_refresh() {
        let (store, user_id) = store_with_user().await;
        let jwt = jwt();
        let access_token = jwt.generate_access_token(user_id).unwrap();

        let err = refresh_access_token(&store, &jwt, Some(access_token.as_str()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RefreshError::InvalidRefreshToken(JwtError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_expired_refresh_token() {
        let (store, user_id) = store_with_user().await;
        let jwt = jwt();
        let issued_at = OffsetDateTime::now_utc() - Duration::days(8);
        let token = jwt.issue(user_id, TokenType::Refresh, issued_at).unwrap();

        let err = refresh_access_token(&store, &jwt, Some(token.as_str()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RefreshError::InvalidRefreshToken(JwtError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_missing_refresh_token() {
        let (store, _) = store_with_user().await;

        for token in [None, Some("")] {
            let err = refresh_access_token(&store, &jwt(), token).await.unwrap_err();
            assert!(matches!(err, RefreshError::MissingToken));
        }
    }
}
