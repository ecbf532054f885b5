use crate::error::{DispatchError, DispatchResult};
use crate::validation::{validate_identifier, validate_table_name};
use crate::worker::BoundsProvider;
use async_trait::async_trait;
use sqlx::{PgPool, Row};

/// `SELECT MIN/MAX` over an integer key column
#[derive(Debug, Clone)]
pub struct PgBoundsProvider {
    pool: PgPool,
}

impl PgBoundsProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub(crate) fn bounds_query(table: &str, column: &str) -> DispatchResult<String> {
        validate_table_name(table)?;
        validate_identifier(column, "column")?;
        Ok(format!(
            "SELECT MIN({column})::BIGINT AS min_key, MAX({column})::BIGINT AS max_key FROM {table}"
        ))
    }
}

#[async_trait]
impl BoundsProvider for PgBoundsProvider {
    async fn min_max_key(&self, table: &str, column: &str) -> DispatchResult<Option<(i64, i64)>> {
        let query = Self::bounds_query(table, column)?;
        let row = sqlx::query(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DispatchError::database("min_max_key", e.to_string()))?;

        let min: Option<i64> = row.try_get("min_key")?;
        let max: Option<i64> = row.try_get("max_key")?;
        Ok(min.zip(max))
    }
}
