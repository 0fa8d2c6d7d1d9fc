//! objtrack-core: storage notification ingestion
//!
//! Decodes object-created notification batches and records each object key
//! into a PostgreSQL history table through a shared connection pool.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod pool;
pub mod schema;
pub mod writer;

pub use config::{PoolConfig, StoreTarget, TableName};
pub use coordinator::{
    BatchCoordinator, BatchReport, InvocationResult, RecordOutcome, RecordStatus, SUCCESS_STATUS,
};
pub use error::{IngestError, Result, WriteCause};
pub use event::{NotificationBatch, ObjectRef};
pub use pool::{ConnectionSource, StorePool};
pub use schema::ensure_schema;
pub use writer::{KeyWriter, ObjectKeyEntry, PgKeyWriter};

/// Coordinator over the production pool and writer.
pub type StoreCoordinator = BatchCoordinator<StorePool, PgKeyWriter>;

/// Wire the production coordinator from a loaded config.
pub fn store_coordinator(pool: StorePool, config: &PoolConfig) -> StoreCoordinator {
    BatchCoordinator::new(
        std::sync::Arc::new(pool),
        std::sync::Arc::new(PgKeyWriter::new(&config.table)),
    )
    .with_max_in_flight(config.max_in_flight)
}
