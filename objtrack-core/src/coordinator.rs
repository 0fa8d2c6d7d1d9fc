//! Batch coordinator - drives one invocation from payload to result.
//!
//! Per record: extract → acquire → write → release → outcome. Each record
//! commits on its own; a failure is recorded and the next record proceeds.
//! The invocation result is always the success envelope, per-record detail
//! lives in the report and the logs.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{IngestError, Result, WriteCause};
use crate::event::{NotificationBatch, ObjectRef};
use crate::pool::ConnectionSource;
use crate::writer::KeyWriter;

/// Status code of an invocation that ran to completion.
pub const SUCCESS_STATUS: u16 = 200;
pub const SUCCESS_MESSAGE: &str = "Object keys processed";

/// Invocation response envelope: `{"statusCode": 200, "body": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub status_code: u16,
    /// JSON-encoded human-readable summary
    pub body: String,
}

/// Terminal state of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Written,
    Malformed,
    ConnectionUnavailable,
    WriteFailed(WriteCause),
    UnexpectedFault,
    DeadlineExceeded,
}

impl RecordStatus {
    fn from_error(err: &IngestError) -> Self {
        match err {
            IngestError::MalformedRecord { .. } => RecordStatus::Malformed,
            IngestError::ConnectionUnavailable { .. } => RecordStatus::ConnectionUnavailable,
            IngestError::WriteFailed { cause, .. } => RecordStatus::WriteFailed(*cause),
            _ => RecordStatus::UnexpectedFault,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub index: usize,
    /// Absent when the record was malformed
    pub key: Option<String>,
    pub status: RecordStatus,
    pub error: Option<IngestError>,
}

impl RecordOutcome {
    fn written(object: &ObjectRef) -> Self {
        Self {
            index: object.index,
            key: Some(object.key.clone()),
            status: RecordStatus::Written,
            error: None,
        }
    }

    fn failed(index: usize, key: Option<String>, err: IngestError) -> Self {
        Self {
            index,
            key,
            status: RecordStatus::from_error(&err),
            error: Some(err),
        }
    }

    fn deadline(index: usize, key: Option<String>) -> Self {
        Self {
            index,
            key,
            status: RecordStatus::DeadlineExceeded,
            error: None,
        }
    }
}

/// Everything that happened during one invocation, in input order.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub invocation_id: Uuid,
    pub outcomes: Vec<RecordOutcome>,
}

impl BatchReport {
    pub fn written(&self) -> usize {
        self.count(|s| s == RecordStatus::Written)
    }

    /// Malformed records, skipped before any connection was requested
    pub fn skipped(&self) -> usize {
        self.count(|s| s == RecordStatus::Malformed)
    }

    pub fn timed_out(&self) -> usize {
        self.count(|s| s == RecordStatus::DeadlineExceeded)
    }

    /// Connection, write and unexpected failures
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.written() - self.skipped() - self.timed_out()
    }

    fn count(&self, pred: impl Fn(RecordStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o.status)).count()
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{}: {} written, {} failed, {} skipped",
            SUCCESS_MESSAGE,
            self.written(),
            self.failed(),
            self.skipped()
        );
        if self.timed_out() > 0 {
            summary.push_str(&format!(", {} not completed before deadline", self.timed_out()));
        }
        summary
    }

    pub fn to_invocation_result(&self) -> InvocationResult {
        InvocationResult {
            status_code: SUCCESS_STATUS,
            body: Value::String(self.summary()).to_string(),
        }
    }
}

/// Drives one invocation at a time over a shared connection source.
///
/// Cheap to clone: concurrent invocations each take a clone and share the
/// pool, nothing else.
pub struct BatchCoordinator<S, W> {
    source: Arc<S>,
    writer: Arc<W>,
    max_in_flight: usize,
}

impl<S, W> Clone for BatchCoordinator<S, W> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            writer: Arc::clone(&self.writer),
            max_in_flight: self.max_in_flight,
        }
    }
}

impl<S, W> BatchCoordinator<S, W>
where
    S: ConnectionSource,
    W: KeyWriter<S::Lease>,
{
    pub fn new(source: Arc<S>, writer: Arc<W>) -> Self {
        Self {
            source,
            writer,
            max_in_flight: 1,
        }
    }

    /// Records in flight per invocation. 1 (the default) is strictly
    /// sequential: a record's lease is released before the next acquire.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Decode a raw payload and handle it.
    ///
    /// Errors only when the payload holds no record list at all.
    pub async fn handle_value(&self, payload: Value) -> Result<InvocationResult> {
        debug!(
            event = %serde_json::to_string_pretty(&payload).unwrap_or_default(),
            "received event"
        );
        let batch = NotificationBatch::from_value(payload).map_err(|err| {
            error!(error = %err, "unusable notification batch");
            err
        })?;
        Ok(self.handle(&batch).await)
    }

    pub async fn handle(&self, batch: &NotificationBatch) -> InvocationResult {
        self.process(batch, None).await.to_invocation_result()
    }

    /// Handle with a wall-clock deadline; see [`BatchCoordinator::process`].
    pub async fn handle_until(&self, batch: &NotificationBatch, deadline: Instant) -> InvocationResult {
        self.process(batch, Some(deadline)).await.to_invocation_result()
    }

    /// Attempt every record and report each outcome in input order.
    ///
    /// When `deadline` passes, the in-flight write is cancelled (its lease
    /// dropped) and records not yet started are reported as
    /// `DeadlineExceeded` without touching the pool.
    pub async fn process(&self, batch: &NotificationBatch, deadline: Option<Instant>) -> BatchReport {
        let invocation_id = Uuid::new_v4();
        let span = info_span!("invocation", %invocation_id, records = batch.len());

        async move {
            let outcomes: Vec<RecordOutcome> = stream::iter(batch.records().enumerate())
                .map(|(index, item)| self.process_record(index, item, deadline))
                .buffered(self.max_in_flight)
                .collect()
                .await;

            let report = BatchReport {
                invocation_id,
                outcomes,
            };
            info!(
                written = report.written(),
                failed = report.failed(),
                skipped = report.skipped(),
                timed_out = report.timed_out(),
                "batch processed"
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn process_record(
        &self,
        index: usize,
        item: Result<ObjectRef>,
        deadline: Option<Instant>,
    ) -> RecordOutcome {
        let object = match item {
            Ok(object) => object,
            Err(err) => {
                warn!(index, error = %err, "skipping malformed record");
                return RecordOutcome::failed(index, None, err);
            }
        };

        if deadline.is_some_and(|d| Instant::now() >= d) {
            warn!(index, key = %object.key, "deadline passed before record was attempted");
            return RecordOutcome::deadline(index, Some(object.key));
        }

        let attempt = AssertUnwindSafe(self.attempt(&object)).catch_unwind();
        let result = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, attempt).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(index, key = %object.key, "deadline expired during write");
                    return RecordOutcome::deadline(index, Some(object.key));
                }
            },
            None => attempt.await,
        };

        match result {
            Ok(Ok(())) => {
                info!(
                    bucket = %object.bucket,
                    key = %object.key,
                    event = ?object.event_name,
                    event_time = ?object.event_time,
                    "object key recorded"
                );
                RecordOutcome::written(&object)
            }
            Ok(Err(err)) => {
                error!(
                    bucket = %object.bucket,
                    key = %object.key,
                    event = ?object.event_name,
                    event_time = ?object.event_time,
                    error = %err,
                    "failed to record object key"
                );
                RecordOutcome::failed(index, Some(object.key), err)
            }
            Err(panic) => {
                let err = IngestError::unexpected(panic_message(panic.as_ref()));
                error!(bucket = %object.bucket, key = %object.key, error = %err, "writer panicked");
                RecordOutcome::failed(index, Some(object.key), err)
            }
        }
    }

    /// Acquire, write, release. The lease is dropped on every path out of
    /// here, including unwinding and cancellation.
    async fn attempt(&self, object: &ObjectRef) -> Result<()> {
        let mut lease = self.source.acquire().await?;
        let result = self.writer.write(&mut lease, object).await;
        drop(lease);
        result
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "writer panicked".to_string()
    }
}
