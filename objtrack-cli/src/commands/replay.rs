//! Replay NDJSON batches as concurrent invocations over one shared pool.
//!
//! Each line is an independent invocation. Up to `--parallel` run at once;
//! results are printed in input order. Ctrl+C stops reading new lines and
//! lets in-flight invocations finish.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::{FuturesOrdered, StreamExt};
use objtrack_core::{store_coordinator, InvocationResult, NotificationBatch};
use tokio::io::AsyncBufReadExt;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

use super::{connect, load_config, open_lines, shutdown_signal};

#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// NDJSON file, one notification batch per line ("-" reads stdin)
    #[arg(long, value_name = "PATH", default_value = "-")]
    pub input: PathBuf,

    /// Invocations allowed to run at the same time
    #[arg(long, default_value = "4", env = "OBJTRACK_REPLAY_PARALLEL")]
    pub parallel: usize,
}

pub async fn run_replay(args: ReplayArgs) -> Result<()> {
    let parallel = args.parallel.max(1);
    let config = load_config()?;
    let pool = connect(&config).await?;
    let coordinator = store_coordinator(pool.clone(), &config);

    let mut reader = open_lines(&args.input).await?.lines();
    let mut in_flight: FuturesOrdered<JoinHandle<InvocationResult>> = FuturesOrdered::new();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut line_no = 0usize;
    let mut invocations = 0usize;
    let mut completed = 0usize;
    let mut reading = true;
    let mut read_error = None;

    while reading || !in_flight.is_empty() {
        tokio::select! {
            biased;

            _ = &mut shutdown, if reading => {
                reading = false;
            }
            Some(done) = in_flight.next(), if !in_flight.is_empty() => {
                if emit(done) {
                    completed += 1;
                }
            }
            line = reader.next_line(), if reading && in_flight.len() < parallel => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        reading = false;
                        continue;
                    }
                    Err(err) => {
                        error!(line = line_no + 1, error = %err, "input read failed, draining in-flight invocations");
                        read_error = Some(err);
                        reading = false;
                        continue;
                    }
                };
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }
                match NotificationBatch::from_json(&line) {
                    Ok(batch) => {
                        let coordinator = coordinator.clone();
                        invocations += 1;
                        in_flight.push_back(tokio::spawn(async move {
                            coordinator.handle(&batch).await
                        }));
                    }
                    Err(err) => warn!(line = line_no, error = %err, "skipping unusable batch"),
                }
            }
            else => break,
        }
    }

    info!(invocations, completed, lines = line_no, "replay finished");
    pool.close().await;

    match read_error {
        Some(err) => Err(err).context("failed to read input line"),
        None => Ok(()),
    }
}

/// Print one finished invocation. A task that failed to join is logged and
/// skipped so the remaining invocations still drain before the pool closes.
fn emit(done: std::result::Result<InvocationResult, JoinError>) -> bool {
    let result = match done {
        Ok(result) => result,
        Err(err) => {
            error!(error = %err, "invocation task failed");
            return false;
        }
    };
    match serde_json::to_string(&result) {
        Ok(line) => {
            println!("{}", line);
            true
        }
        Err(err) => {
            error!(error = %err, "failed to encode invocation result");
            false
        }
    }
}
