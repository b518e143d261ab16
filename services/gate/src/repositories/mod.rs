//! Repositories for database operations
//!
//! The datastore is an external collaborator: the gate only talks to it
//! through [`UserStore`] and [`SubmissionLedger`].

pub mod submission;
pub mod user;

pub use submission::{InMemoryLedger, SubmissionLedger, SubmissionRepository};
pub use user::{InMemoryUserStore, UserRepository, UserStore};

use common::error::{DatabaseError, DatabaseResult};
use sqlx::PgPool;
use tracing::info;

/// Apply the schema migrations bundled with the service
pub async fn run_migrations(pool: &PgPool) -> DatabaseResult<()> {
    info!("Applying database migrations");

    sqlx::migrate!()
        .run(pool)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))
}
