use crate::error::{DispatchError, DispatchResult};
use crate::validation::{validate_identifier, validate_table_name};
use crate::worker::{Chunk, ChunkWriter, KeyedItem};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use tracing::debug;

/// Upserts each chunk as JSONB rows inside one transaction.
///
/// Re-committing a chunk overwrites the same rows, so redelivered requests are
/// harmless.
#[derive(Debug, Clone)]
pub struct PgChunkWriter {
    pool: PgPool,
    upsert: String,
}

impl PgChunkWriter {
    pub fn new(pool: PgPool, table: &str, key_column: &str, data_column: &str) -> DispatchResult<Self> {
        Ok(Self {
            pool,
            upsert: Self::upsert_statement(table, key_column, data_column)?,
        })
    }

    pub(crate) fn upsert_statement(
        table: &str,
        key_column: &str,
        data_column: &str,
    ) -> DispatchResult<String> {
        validate_table_name(table)?;
        validate_identifier(key_column, "key_column")?;
        validate_identifier(data_column, "data_column")?;

        Ok(format!(
            "INSERT INTO {table} ({key_column}, {data_column}) VALUES ($1, $2) \
             ON CONFLICT ({key_column}) DO UPDATE SET {data_column} = EXCLUDED.{data_column}"
        ))
    }
}

#[async_trait]
impl<T> ChunkWriter<T> for PgChunkWriter
where
    T: KeyedItem + Serialize + Send + Sync,
{
    async fn commit(&self, chunk: &Chunk<T>) -> DispatchResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DispatchError::writer(format!("begin: {e}")))?;

        for item in chunk.items() {
            let data = serde_json::to_value(item)?;
            sqlx::query(&self.upsert)
                .bind(item.key())
                .bind(data)
                .execute(&mut *tx)
                .await
                .map_err(|e| DispatchError::writer(format!("upsert key {}: {e}", item.key())))?;
        }

        // Dropping the transaction on an early return rolls it back
        tx.commit()
            .await
            .map_err(|e| DispatchError::writer(format!("commit: {e}")))?;

        debug!(
            partition = %chunk.source_range().label(),
            sequence = chunk.sequence(),
            items = chunk.len(),
            "Committed chunk"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_statement_shape() {
        let sql = PgChunkWriter::upsert_statement("customer_out", "id", "payload").unwrap();
        assert_eq!(
            sql,
            "INSERT INTO customer_out (id, payload) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET payload = EXCLUDED.payload"
        );
    }

    #[test]
    fn test_upsert_statement_validates_names() {
        assert!(PgChunkWriter::upsert_statement("out", "id", "data = 1 --").is_err());
    }
}
