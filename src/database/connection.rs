use crate::config::DispatchConfig;
use crate::error::{DispatchError, DispatchResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

/// Shared PostgreSQL pool for the database-backed collaborators
#[derive(Debug, Clone)]
pub struct DatabaseConnection {
    pool: PgPool,
}

impl DatabaseConnection {
    pub async fn new(config: &DispatchConfig) -> DispatchResult<Self> {
        let database_url = config.database_url.as_deref().ok_or_else(|| {
            DispatchError::configuration("database_url", "no database URL configured")
        })?;

        // Every local worker may hold a connection while committing a chunk
        let pool = PgPoolOptions::new()
            .max_connections(u32::try_from(config.local_workers + 1).unwrap_or(u32::MAX))
            .connect(database_url)
            .await
            .map_err(|e| DispatchError::database("connect", e.to_string()))?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> DispatchResult<bool> {
        let row = sqlx::query("SELECT 1 as health")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DispatchError::database("health_check", e.to_string()))?;

        let health: i32 = row
            .try_get("health")
            .map_err(|e| DispatchError::database("health_check", e.to_string()))?;
        Ok(health == 1)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
