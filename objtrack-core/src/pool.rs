//! Connection pool management
//!
//! A lease is released by dropping it, so every exit path (success, store
//! error, panic, cancelled deadline) gives the connection back exactly once.
//! `StorePool` wraps sqlx `PgPool`, which is safe to share across
//! concurrent invocations.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres};
use std::str::FromStr;
use tracing::{debug, info};

use crate::config::{PoolConfig, StoreTarget};
use crate::error::{IngestError, Result};

/// Hands out one connection per request.
///
/// `acquire` waits up to the source's own timeout when all connections are
/// leased, then fails with [`IngestError::ConnectionUnavailable`].
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    type Lease: Send;

    async fn acquire(&self) -> Result<Self::Lease>;
}

/// Process-wide PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct StorePool {
    pool: PgPool,
}

impl StorePool {
    /// Create the pool once at process start.
    ///
    /// With `min_connections > 0` the pool connects eagerly and fails fast
    /// on a bad target; otherwise connections open on first use.
    pub async fn connect(config: &PoolConfig) -> Result<Self> {
        let options = connect_options(&config.target)?;
        let builder = pool_options(config);

        let pool = if config.min_connections > 0 {
            builder
                .connect_with(options)
                .await
                .map_err(IngestError::from_acquire)?
        } else {
            builder.connect_lazy_with(options)
        };

        info!(
            pool_size = config.pool_size,
            min_connections = config.min_connections,
            acquire_timeout_ms = config.acquire_timeout.as_millis() as u64,
            idle_timeout_ms = config.idle_timeout.map(|t| t.as_millis() as u64),
            "store pool initialized"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests, embedding in a larger service).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn inner(&self) -> &PgPool {
        &self.pool
    }

    /// Connections currently open, leased or idle.
    pub fn size(&self) -> u32 {
        self.pool.size()
    }

    pub fn idle(&self) -> usize {
        self.pool.num_idle()
    }

    /// Close every connection. Pending and later `acquire` calls fail.
    pub async fn close(&self) {
        debug!(open = self.pool.size(), "closing store pool");
        self.pool.close().await;
        info!("store pool closed");
    }
}

#[async_trait]
impl ConnectionSource for StorePool {
    type Lease = PoolConnection<Postgres>;

    async fn acquire(&self) -> Result<Self::Lease> {
        self.pool.acquire().await.map_err(IngestError::from_acquire)
    }
}

fn pool_options(config: &PoolConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.pool_size)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        // Ping idle connections before handing them out; dead ones are
        // replaced instead of surfacing as a write failure.
        .test_before_acquire(true)
}

fn connect_options(target: &StoreTarget) -> Result<PgConnectOptions> {
    match target {
        StoreTarget::Url(url) => PgConnectOptions::from_str(url)
            .map_err(|e| IngestError::config(format!("invalid database URL: {}", e))),
        StoreTarget::Parts {
            host,
            port,
            user,
            password,
            database,
        } => {
            let mut options = PgConnectOptions::new()
                .host(host)
                .port(*port)
                .username(user)
                .database(database)
                .application_name("objtrack");
            if let Some(password) = password {
                options = options.password(password);
            }
            Ok(options)
        }
    }
}
