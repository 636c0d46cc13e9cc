//! Job queue collaborator seam.
//!
//! The broker contract the ingress layer and workers agree on: enqueue one
//! orchestration job per Evidence with a wall-clock timeout and a result
//! TTL, fetch job status by id. The in-memory implementation provides
//! at-least-once, single-process dispatch for local runs and tests; a
//! production deployment puts a real broker behind the same trait.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use tracevault_core::error::{Result, TraceVaultError};

/// Lifecycle state of one queued job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Finished,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed | JobState::TimedOut)
    }
}

/// Handle returned to the enqueuer.
#[derive(Debug, Clone, Serialize)]
pub struct JobHandle {
    pub job_id: Uuid,
}

/// One dispatched orchestration job.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job_id: Uuid,
    pub evidence_id: Uuid,
    pub timeout: Duration,
}

/// Broker contract consumed by ingress (enqueue, fetch) and honoured by
/// workers (status updates).
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue one orchestration job for an Evidence.
    async fn enqueue(
        &self,
        evidence_id: Uuid,
        timeout: Duration,
        result_ttl: Duration,
    ) -> Result<JobHandle>;

    /// Fetch the current state of a job. `None` once the result TTL has
    /// expired or the id was never known.
    async fn fetch(&self, job_id: Uuid) -> Result<Option<JobState>>;
}

struct JobRecord {
    state: JobState,
    result_ttl: Duration,
    expires_at: Option<Instant>,
}

/// Shared receiver end of the in-memory queue; workers take jobs one at a
/// time through the mutex.
pub type SharedJobReceiver = std::sync::Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<QueuedJob>>>;

/// In-memory job queue over an unbounded channel plus a status map.
pub struct InMemoryJobQueue {
    sender: mpsc::UnboundedSender<QueuedJob>,
    records: Mutex<HashMap<Uuid, JobRecord>>,
}

impl InMemoryJobQueue {
    /// Create the queue and the receiver workers pull from.
    pub fn new() -> (std::sync::Arc<Self>, SharedJobReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = std::sync::Arc::new(Self {
            sender,
            records: Mutex::new(HashMap::new()),
        });
        (
            queue,
            std::sync::Arc::new(tokio::sync::Mutex::new(receiver)),
        )
    }

    /// Record a state change for a job. Terminal states start the result
    /// TTL clock.
    pub fn mark(&self, job_id: Uuid, state: JobState) {
        if let Ok(mut records) = self.records.lock() {
            if let Some(record) = records.get_mut(&job_id) {
                record.state = state;
                if state.is_terminal() {
                    record.expires_at = Some(Instant::now() + record.result_ttl);
                }
            }
        }
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(
        &self,
        evidence_id: Uuid,
        timeout: Duration,
        result_ttl: Duration,
    ) -> Result<JobHandle> {
        let job_id = Uuid::new_v4();

        {
            let mut records = self
                .records
                .lock()
                .map_err(|e| TraceVaultError::Queue(format!("Queue lock poisoned: {}", e)))?;
            records.insert(
                job_id,
                JobRecord {
                    state: JobState::Queued,
                    result_ttl,
                    expires_at: None,
                },
            );
        }

        self.sender
            .send(QueuedJob {
                job_id,
                evidence_id,
                timeout,
            })
            .map_err(|e| TraceVaultError::Queue(format!("Failed to dispatch job: {}", e)))?;

        Ok(JobHandle { job_id })
    }

    async fn fetch(&self, job_id: Uuid) -> Result<Option<JobState>> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| TraceVaultError::Queue(format!("Queue lock poisoned: {}", e)))?;

        if let Some(record) = records.get(&job_id) {
            if let Some(expires_at) = record.expires_at {
                if Instant::now() >= expires_at {
                    records.remove(&job_id);
                    return Ok(None);
                }
            }
            return Ok(Some(record.state));
        }
        Ok(None)
    }
}
