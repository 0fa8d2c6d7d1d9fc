//! objtrack - storage notification ingestion driver
//!
//! Feeds object-created notification batches into objtrack-core:
//! - `invoke`: one batch (JSON file or stdin), one result envelope
//! - `replay`: NDJSON of batches, run as concurrent invocations over one pool
//! - `migrate`: create the object-key history table
//!
//! Store settings come from the environment (OBJTRACK_* or DATABASE_URL),
//! optionally via a `.env` file in the working directory.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod tracing_setup;

use tracing_setup::TracingConfig;

#[derive(Parser, Debug)]
#[command(
    name = "objtrack",
    author,
    version,
    about = "Record storage object-created notifications into a relational history table"
)]
struct Cli {
    /// Enable debug logging (unless RUST_LOG is set)
    #[arg(long, global = true)]
    debug: bool,

    /// Export traces over OTLP (requires the `telemetry` feature)
    #[arg(long, global = true)]
    otel: bool,

    /// `service.name` attached to exported spans
    #[arg(long, global = true, env = "OTEL_SERVICE_NAME", default_value = "objtrack")]
    service_name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Handle one notification batch and print the invocation result
    Invoke(commands::invoke::InvokeArgs),
    /// Handle an NDJSON stream of batches as concurrent invocations
    Replay(commands::replay::ReplayArgs),
    /// Create the object-key table if it does not exist
    Migrate(commands::migrate::MigrateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_setup::init(&TracingConfig {
        debug: cli.debug,
        otel: cli.otel,
        service_name: cli.service_name.clone(),
    })
    .ok();

    let outcome = match cli.command {
        Commands::Invoke(args) => commands::run_invoke(args).await,
        Commands::Replay(args) => commands::run_replay(args).await,
        Commands::Migrate(args) => commands::run_migrate(args).await,
    };

    tracing_setup::shutdown();
    outcome
}
