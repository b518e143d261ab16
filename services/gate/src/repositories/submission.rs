//! Submission ledger for quota accounting

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{ANONYMOUS_TEMPLATE_TAG, LedgerSubject, NewSubmission, Submission};

/// Append-only log of metered actions
#[async_trait]
pub trait SubmissionLedger: Send + Sync {
    /// Entries charged to `subject` created at or after `since`
    async fn count_since(&self, subject: &LedgerSubject, since: DateTime<Utc>)
    -> DatabaseResult<u64>;

    /// Append one entry
    async fn append(&self, entry: NewSubmission) -> DatabaseResult<Submission>;

    /// Most recent entries, newest first
    async fn recent(&self, limit: u32) -> DatabaseResult<Vec<Submission>>;
}

/// PostgreSQL submission repository
#[derive(Clone)]
pub struct SubmissionRepository {
    pool: PgPool,
}

impl SubmissionRepository {
    /// Create a new submission repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubmissionLedger for SubmissionRepository {
    async fn count_since(
        &self,
        subject: &LedgerSubject,
        since: DateTime<Utc>,
    ) -> DatabaseResult<u64> {
        let query = match subject {
            LedgerSubject::Identity(email) => sqlx::query_scalar::<sqlx::Postgres, i64>(
                r#"
                SELECT COUNT(*)
                FROM submissions
                WHERE email = $1 AND created_at >= $2
                "#,
            )
            .bind(email.as_str())
            .bind(since),
            LedgerSubject::Anonymous(addr) => sqlx::query_scalar::<sqlx::Postgres, i64>(
                r#"
                SELECT COUNT(*)
                FROM submissions
                WHERE email IS NULL AND template = $3 AND client_addr = $1 AND created_at >= $2
                "#,
            )
            .bind(addr.as_str())
            .bind(since)
            .bind(ANONYMOUS_TEMPLATE_TAG),
        };

        let count = query
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;
        Ok(count.max(0) as u64)
    }

    async fn append(&self, entry: NewSubmission) -> DatabaseResult<Submission> {
        sqlx::query_as::<_, Submission>(
            r#"
            INSERT INTO submissions (id, email, client_addr, template, input, output, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, email, client_addr, template, input, output, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.subject.email())
        .bind(entry.subject.client_addr())
        .bind(entry.subject.template_tag())
        .bind(&entry.input)
        .bind(&entry.output)
        .bind(entry.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    async fn recent(&self, limit: u32) -> DatabaseResult<Vec<Submission>> {
        sqlx::query_as::<_, Submission>(
            r#"
            SELECT id, email, client_addr, template, input, output, created_at
            FROM submissions
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }
}

/// In-process ledger for local development and tests
#[derive(Default)]
pub struct InMemoryLedger {
    entries: RwLock<Vec<Submission>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubmissionLedger for InMemoryLedger {
    async fn count_since(
        &self,
        subject: &LedgerSubject,
        since: DateTime<Utc>,
    ) -> DatabaseResult<u64> {
        let entries = self.entries.read().await;
        let count = entries
            .iter()
            .filter(|entry| entry.created_at >= since && entry.charged_to(subject))
            .count();
        Ok(count as u64)
    }

    async fn append(&self, entry: NewSubmission) -> DatabaseResult<Submission> {
        let submission = Submission {
            id: Uuid::new_v4(),
            email: entry.subject.email().map(str::to_string),
            client_addr: entry.subject.client_addr().map(str::to_string),
            template: entry.subject.template_tag().to_string(),
            input: entry.input,
            output: entry.output,
            created_at: entry.created_at,
        };
        self.entries.write().await.push(submission.clone());
        Ok(submission)
    }

    async fn recent(&self, limit: u32) -> DatabaseResult<Vec<Submission>> {
        let mut entries = self.entries.read().await.clone();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit as usize);
        Ok(entries)
    }
}
