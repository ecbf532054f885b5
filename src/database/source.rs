use crate::error::{DispatchError, DispatchResult};
use crate::partition::PartitionKeyRange;
use crate::validation::{validate_identifier, validate_table_name};
use crate::worker::DataSource;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::PgPool;

/// Reads one key range of a table, ordered by key, with LIMIT/OFFSET paging
#[derive(Debug, Clone)]
pub struct PgRangeSource {
    pool: PgPool,
    exclusive_query: String,
    inclusive_query: String,
}

impl PgRangeSource {
    /// `columns` defaults to `*` when empty
    pub fn new(pool: PgPool, table: &str, key_column: &str, columns: &[&str]) -> DispatchResult<Self> {
        Ok(Self {
            pool,
            exclusive_query: Self::range_query(table, key_column, columns, false)?,
            inclusive_query: Self::range_query(table, key_column, columns, true)?,
        })
    }

    pub(crate) fn range_query(
        table: &str,
        key_column: &str,
        columns: &[&str],
        upper_inclusive: bool,
    ) -> DispatchResult<String> {
        validate_table_name(table)?;
        validate_identifier(key_column, "key_column")?;
        for column in columns {
            validate_identifier(column, "column")?;
        }

        let select = if columns.is_empty() {
            "*".to_string()
        } else {
            columns.join(", ")
        };
        let upper = if upper_inclusive { "<=" } else { "<" };

        Ok(format!(
            "SELECT {select} FROM {table} WHERE {key_column} >= $1 AND {key_column} {upper} $2 \
             ORDER BY {key_column} ASC LIMIT $3 OFFSET $4"
        ))
    }
}

#[async_trait]
impl DataSource for PgRangeSource {
    type Row = PgRow;

    async fn fetch_page(
        &self,
        range: &PartitionKeyRange,
        offset: u64,
        page_size: usize,
    ) -> DispatchResult<Vec<PgRow>> {
        let query = if range.is_upper_inclusive() {
            &self.inclusive_query
        } else {
            &self.exclusive_query
        };
        let limit = i64::try_from(page_size)
            .map_err(|_| DispatchError::invalid_argument("page size too large"))?;
        let offset = i64::try_from(offset)
            .map_err(|_| DispatchError::invalid_argument("offset too large"))?;

        sqlx::query(query)
            .bind(range.lower_bound())
            .bind(range.upper_bound())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DispatchError::database("fetch_page", e.to_string()))
    }
}
