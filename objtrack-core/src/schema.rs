//! Schema bootstrap for the object-key history table

use sqlx::PgPool;

use crate::config::TableName;
use crate::error::{IngestError, Result};

/// Create the history table if it does not exist yet.
///
/// No uniqueness constraint on `object_key`: repeated notifications for the
/// same object are expected and each one becomes its own row.
pub async fn ensure_schema(pool: &PgPool, table: &TableName) -> Result<()> {
    tracing::info!(table = %table, "ensuring object-key table");

    sqlx::query(&create_table_statement(table))
        .execute(pool)
        .await
        .map_err(|e| IngestError::schema(format!("create table {}: {}", table, e)))?;

    Ok(())
}

pub fn create_table_statement(table: &TableName) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id BIGSERIAL PRIMARY KEY,
            object_key TEXT NOT NULL,
            bucket_name TEXT,
            inserted_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        table
    )
}
