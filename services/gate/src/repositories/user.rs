//! User repository for database operations

use async_trait::async_trait;
use common::{
    clock::Clock,
    error::{DatabaseError, DatabaseResult},
};
use sqlx::PgPool;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::models::User;

/// Persistence of user records
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Return the user with `email`, creating it on first sight
    async fn upsert_by_email(&self, email: &str) -> DatabaseResult<User>;

    /// Find a user by email
    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>>;

    /// All users, newest first
    async fn list(&self) -> DatabaseResult<Vec<User>>;
}

/// PostgreSQL user repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn upsert_by_email(&self, email: &str) -> DatabaseResult<User> {
        info!("Upserting user: {}", email);

        // The no-op update makes RETURNING yield the existing row on conflict
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email)
            VALUES ($1, $2)
            ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
            RETURNING id, email, is_pro, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, is_pro, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    async fn list(&self) -> DatabaseResult<Vec<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, is_pro, created_at
            FROM users
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }
}

/// In-process user store for local development and tests
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, User>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryUserStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Flip a user's Pro entitlement, creating the user if needed
    pub async fn set_pro(&self, email: &str, is_pro: bool) -> User {
        let mut users = self.users.write().await;
        let now = self.clock.now();
        let user = users.entry(email.to_string()).or_insert_with(|| User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            is_pro: false,
            created_at: now,
        });
        user.is_pro = is_pro;
        user.clone()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn upsert_by_email(&self, email: &str) -> DatabaseResult<User> {
        let mut users = self.users.write().await;
        let now = self.clock.now();
        let user = users.entry(email.to_string()).or_insert_with(|| User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            is_pro: false,
            created_at: now,
        });
        Ok(user.clone())
    }

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        Ok(self.users.read().await.get(email).cloned())
    }

    async fn list(&self) -> DatabaseResult<Vec<User>> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use common::clock::ManualClock;

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        let store = InMemoryUserStore::new(Arc::new(clock.clone()));

        let first = store.upsert_by_email("a@example.com").await.unwrap();
        clock.advance(Duration::hours(1));
        let second = store.upsert_by_email("a@example.com").await.unwrap();

        assert_eq!(first, second);
        assert!(!second.is_pro);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_keeps_pro_entitlement() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        let store = InMemoryUserStore::new(Arc::new(clock.clone()));

        store.set_pro("pro@example.com", true).await;
        let user = store.upsert_by_email("pro@example.com").await.unwrap();

        assert!(user.is_pro);
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        let store = InMemoryUserStore::new(Arc::new(clock.clone()));

        store.upsert_by_email("old@example.com").await.unwrap();
        clock.advance(Duration::minutes(1));
        store.upsert_by_email("new@example.com").await.unwrap();

        let emails: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.email)
            .collect();
        assert_eq!(emails, ["new@example.com", "old@example.com"]);
        assert_eq!(store.find_by_email("missing@example.com").await.unwrap(), None);
    }
}
