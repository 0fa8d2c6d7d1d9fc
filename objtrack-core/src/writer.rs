//! Persistence writer - one parameterized INSERT per object key.
//!
//! The statement text is built once from a validated table name; the key,
//! bucket and timestamp are always bound, never spliced into SQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::Postgres;
use tracing::debug;

use crate::config::TableName;
use crate::error::{classify, IngestError, Result, WriteCause};
use crate::event::ObjectRef;

/// Writes a single object reference through a leased connection.
///
/// Implementations do not retry; a failure is reported once and the
/// coordinator decides what to do with it.
#[async_trait]
pub trait KeyWriter<L>: Send + Sync
where
    L: Send,
{
    async fn write(&self, lease: &mut L, object: &ObjectRef) -> Result<()>;
}

/// Row shape written to the history table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectKeyEntry {
    pub object_key: String,
    pub bucket_name: String,
    pub inserted_at: DateTime<Utc>,
}

impl ObjectKeyEntry {
    pub fn now(object: &ObjectRef) -> Self {
        Self {
            object_key: object.key.clone(),
            bucket_name: object.bucket.clone(),
            inserted_at: Utc::now(),
        }
    }
}

/// PostgreSQL writer.
#[derive(Debug, Clone)]
pub struct PgKeyWriter {
    insert_sql: String,
}

impl PgKeyWriter {
    pub fn new(table: &TableName) -> Self {
        Self {
            insert_sql: insert_statement(table),
        }
    }

    pub fn statement(&self) -> &str {
        &self.insert_sql
    }
}

pub fn insert_statement(table: &TableName) -> String {
    format!(
        "INSERT INTO {} (object_key, bucket_name, inserted_at) VALUES ($1, $2, $3)",
        table
    )
}

#[async_trait]
impl KeyWriter<PoolConnection<Postgres>> for PgKeyWriter {
    async fn write(
        &self,
        lease: &mut PoolConnection<Postgres>,
        object: &ObjectRef,
    ) -> Result<()> {
        let entry = ObjectKeyEntry::now(object);

        let outcome = sqlx::query(&self.insert_sql)
            .bind(&entry.object_key)
            .bind(&entry.bucket_name)
            .bind(entry.inserted_at)
            .execute(&mut **lease)
            .await;

        match outcome {
            Ok(done) => {
                debug!(rows = done.rows_affected(), key = %entry.object_key, "insert committed");
                Ok(())
            }
            Err(err) => {
                if classify(&err) == WriteCause::Connectivity {
                    // Broken connection: close it instead of returning it to the pool
                    lease.close_on_drop();
                }
                Err(IngestError::from_write(err))
            }
        }
    }
}
