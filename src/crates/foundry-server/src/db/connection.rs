//! Database connection management
//!
//! SQLite pool wrapper with health check and idempotent schema setup.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::sync::Arc;

/// Type alias for the database connection pool.
pub type DatabasePool = SqlitePool;

/// Database connection wrapper.
#[derive(Clone)]
pub struct DatabaseConnection {
    pool: Arc<DatabasePool>,
}

impl DatabaseConnection {
    /// Connect to a SQLite database (e.g. "sqlite:foundry.db" or
    /// "sqlite::memory:").
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        // A single connection keeps ":memory:" databases coherent and is
        // plenty for the checkpoint write pattern.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist.
    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        crate::db::schema::init_schema(&self.pool).await
    }

    /// Perform a health check by running a simple query.
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").fetch_one(self.pool.as_ref()).await?;
        Ok(())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_connection_and_schema() {
        let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        db.init_schema().await.unwrap();
        db.health_check().await.unwrap();
    }
}
