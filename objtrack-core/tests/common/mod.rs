//! In-memory pool and writer used by the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use objtrack_core::{ConnectionSource, IngestError, KeyWriter, ObjectRef, Result, WriteCause};
use serde_json::{json, Value};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded pool: `size` permits, `acquire` waits up to `timeout`.
pub struct MemoryPool {
    permits: Arc<Semaphore>,
    timeout: Duration,
    state: Arc<PoolState>,
}

#[derive(Default)]
pub struct PoolState {
    next_id: AtomicUsize,
    outstanding: Mutex<HashSet<usize>>,
    pub peak: AtomicUsize,
    pub issued: AtomicUsize,
    pub released: AtomicUsize,
    pub double_issued: AtomicUsize,
}

impl PoolState {
    pub fn outstanding(&self) -> usize {
        self.outstanding.lock().unwrap().len()
    }
}

pub struct MemoryLease {
    pub id: usize,
    _permit: OwnedSemaphorePermit,
    state: Arc<PoolState>,
}

impl Drop for MemoryLease {
    fn drop(&mut self) {
        self.state.outstanding.lock().unwrap().remove(&self.id);
        self.state.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl MemoryPool {
    pub fn new(size: usize, timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size)),
            timeout,
            state: Arc::new(PoolState::default()),
        }
    }

    pub fn state(&self) -> &PoolState {
        &self.state
    }
}

#[async_trait]
impl ConnectionSource for MemoryPool {
    type Lease = MemoryLease;

    async fn acquire(&self) -> Result<MemoryLease> {
        let permit = tokio::time::timeout(self.timeout, Arc::clone(&self.permits).acquire_owned())
            .await
            .map_err(|_| IngestError::connection_unavailable("timed out waiting for a pooled connection"))?
            .map_err(|_| IngestError::connection_unavailable("pool closed"))?;

        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut outstanding = self.state.outstanding.lock().unwrap();
            if !outstanding.insert(id) {
                self.state.double_issued.fetch_add(1, Ordering::SeqCst);
            }
            self.state.peak.fetch_max(outstanding.len(), Ordering::SeqCst);
        }
        self.state.issued.fetch_add(1, Ordering::SeqCst);

        Ok(MemoryLease {
            id,
            _permit: permit,
            state: Arc::clone(&self.state),
        })
    }
}

/// Records every attempted key; misbehaves on demand based on key prefix.
///
/// - `reject*`: constraint failure
/// - `drop*`: connectivity failure
/// - `panic*`: panics mid-write
/// - `slow*`: sleeps for 50ms before succeeding
#[derive(Default)]
pub struct RecordingWriter {
    pub attempts: Mutex<Vec<String>>,
    pub stored: Mutex<Vec<String>>,
}

impl RecordingWriter {
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn stored(&self) -> Vec<String> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl KeyWriter<MemoryLease> for RecordingWriter {
    async fn write(&self, _lease: &mut MemoryLease, object: &ObjectRef) -> Result<()> {
        self.attempts.lock().unwrap().push(object.key.clone());

        if object.key.starts_with("reject") {
            return Err(IngestError::write_failed(
                WriteCause::Constraint,
                "violates check constraint",
            ));
        }
        if object.key.starts_with("drop") {
            return Err(IngestError::write_failed(
                WriteCause::Connectivity,
                "connection reset by peer",
            ));
        }
        if object.key.starts_with("panic") {
            panic!("writer fault for {}", object.key);
        }
        if object.key.starts_with("slow") {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        self.stored.lock().unwrap().push(object.key.clone());
        Ok(())
    }
}

pub fn s3_record(bucket: &str, key: &str) -> Value {
    json!({
        "eventVersion": "2.1",
        "eventSource": "aws:s3",
        "eventName": "ObjectCreated:Put",
        "s3": {
            "bucket": { "name": bucket },
            "object": { "key": key }
        }
    })
}

pub fn payload(records: Vec<Value>) -> Value {
    json!({ "Records": records })
}
