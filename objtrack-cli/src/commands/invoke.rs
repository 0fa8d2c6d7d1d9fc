//! Single invocation: one notification batch in, one result envelope out.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use objtrack_core::{ensure_schema, store_coordinator, NotificationBatch};
use tokio::time::Instant;

use super::{connect, load_config, read_input};

#[derive(Parser, Debug)]
pub struct InvokeArgs {
    /// Notification batch JSON file ("-" reads stdin)
    #[arg(long, value_name = "PATH", default_value = "-")]
    pub event: PathBuf,

    /// Wall-clock deadline for the whole invocation, in milliseconds
    #[arg(long, value_name = "MS", env = "OBJTRACK_DEADLINE_MS")]
    pub deadline_ms: Option<u64>,

    /// Create the history table first if it does not exist
    #[arg(long)]
    pub ensure_schema: bool,
}

pub async fn run_invoke(args: InvokeArgs) -> Result<()> {
    let started = Instant::now();
    let text = read_input(&args.event).await?;

    // A batch with no record list is the one outright failure; check it
    // before touching the store.
    let batch = NotificationBatch::from_json(&text).context("unusable notification batch")?;
    tracing::debug!(records = batch.len(), "decoded notification batch");

    let config = load_config()?;
    let pool = connect(&config).await?;

    if args.ensure_schema {
        ensure_schema(pool.inner(), &config.table)
            .await
            .context("failed to ensure schema")?;
    }

    let coordinator = store_coordinator(pool.clone(), &config);
    let result = match args.deadline_ms {
        Some(ms) => {
            coordinator
                .handle_until(&batch, started + Duration::from_millis(ms))
                .await
        }
        None => coordinator.handle(&batch).await,
    };

    println!("{}", serde_json::to_string(&result)?);

    pool.close().await;
    Ok(())
}
