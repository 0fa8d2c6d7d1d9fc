//! Create the object-key history table

use anyhow::{Context, Result};
use clap::Parser;
use objtrack_core::ensure_schema;

use super::{connect, load_config};

#[derive(Parser, Debug)]
pub struct MigrateArgs {}

pub async fn run_migrate(_args: MigrateArgs) -> Result<()> {
    let config = load_config()?;
    let pool = connect(&config).await?;

    let outcome = ensure_schema(pool.inner(), &config.table)
        .await
        .with_context(|| format!("failed to create table {}", config.table));
    pool.close().await;
    outcome?;

    println!("table {} ready", config.table);
    Ok(())
}
