//! Command implementations for the objtrack driver

pub mod invoke;
pub mod migrate;
pub mod replay;

pub use invoke::run_invoke;
pub use migrate::run_migrate;
pub use replay::run_replay;

use std::path::Path;

use anyhow::{Context, Result};
use objtrack_core::{PoolConfig, StorePool};
use tokio::io::{AsyncBufRead, AsyncReadExt, BufReader};

/// Load the process-wide store config once.
pub(crate) fn load_config() -> Result<PoolConfig> {
    dotenvy::dotenv().ok();
    PoolConfig::from_env().context("invalid store configuration")
}

pub(crate) async fn connect(config: &PoolConfig) -> Result<StorePool> {
    StorePool::connect(config)
        .await
        .context("failed to initialize store pool")
}

/// `-` reads stdin.
pub(crate) fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == "-"
}

pub(crate) async fn read_input(path: &Path) -> Result<String> {
    if is_stdin(path) {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("failed to read event from stdin")?;
        Ok(buf)
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read event file {}", path.display()))
    }
}

pub(crate) async fn open_lines(path: &Path) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if is_stdin(path) {
        Ok(Box::new(BufReader::new(tokio::io::stdin())))
    } else {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping intake");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, stopping intake");
        }
    }
}
