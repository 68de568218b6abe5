//! PostgreSQL implementation of the Job Record Store.
//!
//! The `itinerary_jobs` table is written by the backend worker and only
//! read here. Live subscriptions ride on a `pg_notify` trigger: every row
//! write notifies the `wayfarer_job_changed` channel with the job id, and
//! [`store::PgJobStore`] fans the refetched snapshot out to subscribers.

use sqlx::postgres::PgPoolOptions;

pub mod models;
pub mod repository;
pub mod store;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending migrations from `migrations/`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
