//! Worker loop and stalled-job watchdog.
//!
//! Each worker pulls one job at a time from the queue and drives the
//! orchestrator under the job's wall-clock timeout; parallelism across
//! Evidence items comes only from running several workers, which share no
//! state beyond the Evidence Store. A timed-out job leaves the Evidence at
//! whatever status was last committed — the watchdog later marks such
//! stalled rows FAILED after a grace period.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{error, info, warn};

use tracevault_core::types::AnalysisStatus;
use tracevault_storage::repository::EvidenceRepository;
use tracevault_storage::Database;

use crate::orchestrator::Orchestrator;
use crate::queue::{InMemoryJobQueue, JobState, SharedJobReceiver};

/// One pipeline worker. Strictly sequential: one job occupies the worker
/// for its full duration.
pub struct Worker {
    orchestrator: Arc<Orchestrator>,
    queue: Arc<InMemoryJobQueue>,
    jobs: SharedJobReceiver,
    shutdown: Arc<Notify>,
}

impl Worker {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        queue: Arc<InMemoryJobQueue>,
        jobs: SharedJobReceiver,
    ) -> Self {
        Self {
            orchestrator,
            queue,
            jobs,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle used to stop the loop after the in-flight job.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Pull and process jobs until the channel closes or shutdown is
    /// signalled.
    pub async fn run(&self) {
        loop {
            let job = {
                let mut receiver = self.jobs.lock().await;
                tokio::select! {
                    job = receiver.recv() => match job {
                        Some(job) => job,
                        None => return, // queue dropped
                    },
                    _ = self.shutdown.notified() => return,
                }
            };

            self.queue.mark(job.job_id, JobState::Running);
            info!(job_id = %job.job_id, evidence_id = %job.evidence_id, "Job started");

            match tokio::time::timeout(job.timeout, self.orchestrator.run(job.evidence_id)).await
            {
                Ok(Ok(AnalysisStatus::AnalysisComplete)) => {
                    self.queue.mark(job.job_id, JobState::Finished);
                    info!(job_id = %job.job_id, "Job finished");
                }
                Ok(Ok(terminal)) => {
                    self.queue.mark(job.job_id, JobState::Failed);
                    info!(job_id = %job.job_id, status = %terminal, "Job ended in failure status");
                }
                Ok(Err(e)) => {
                    self.queue.mark(job.job_id, JobState::Failed);
                    error!(job_id = %job.job_id, error = %e, "Job errored");
                }
                Err(_elapsed) => {
                    // The orchestration future was dropped mid-pipeline; the
                    // Evidence keeps its last committed status until the
                    // watchdog sweeps it.
                    self.queue.mark(job.job_id, JobState::TimedOut);
                    warn!(
                        job_id = %job.job_id,
                        evidence_id = %job.evidence_id,
                        timeout_secs = job.timeout.as_secs(),
                        "Job timed out"
                    );
                }
            }
        }
    }
}

/// Background task failing Evidence stuck in a non-terminal status.
pub struct Watchdog {
    db: Arc<Database>,
    grace: Duration,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl Watchdog {
    pub fn new(db: Arc<Database>, grace: Duration, interval: Duration) -> Self {
        Self {
            db,
            grace,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Periodic sweep loop. Returns on shutdown signal.
    pub async fn run(&self) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.sweep() {
                        error!(error = %e, "Watchdog sweep failed");
                    }
                }
                _ = self.shutdown.notified() => return,
            }
        }
    }

    /// Mark every Evidence stalled for longer than the grace period as
    /// FAILED. Returns how many were swept.
    pub fn sweep(&self) -> tracevault_core::error::Result<usize> {
        let repo = EvidenceRepository::new(Arc::clone(&self.db));
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(self.grace)
                .unwrap_or_else(|_| chrono::Duration::seconds(0));

        let stalled = repo.list_stalled(cutoff)?;
        let mut swept = 0;
        for evidence in stalled {
            warn!(
                evidence_id = %evidence.id,
                status = %evidence.status,
                "Marking stalled evidence FAILED"
            );
            repo.update_status(evidence.id, AnalysisStatus::Failed)?;
            swept += 1;
        }
        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracevault_core::error::TraceVaultError;
    use tracevault_core::types::{Evidence, MediaType};

    fn backdate(db: &Arc<Database>, evidence: &Evidence) {
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE evidence SET updated_at = 0 WHERE id = ?1",
                rusqlite::params![evidence.id.to_string()],
            )
            .map_err(|e| TraceVaultError::Storage(e.to_string()))?;
            Ok(())
        })
        .unwrap();
    }

    #[tokio::test]
    async fn test_watchdog_sweeps_stalled_evidence() {
        let db = Arc::new(Database::in_memory().unwrap());
        let repo = EvidenceRepository::new(Arc::clone(&db));

        let stalled = Evidence::new("a.jpg".into(), "/tmp/a.jpg".into(), MediaType::Image);
        repo.insert(&stalled).unwrap();
        backdate(&db, &stalled);

        let fresh = Evidence::new("b.jpg".into(), "/tmp/b.jpg".into(), MediaType::Image);
        repo.insert(&fresh).unwrap();

        let watchdog = Watchdog::new(
            Arc::clone(&db),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        let swept = watchdog.sweep().unwrap();
        assert_eq!(swept, 1);

        assert_eq!(
            repo.find_by_id(stalled.id).unwrap().unwrap().status,
            AnalysisStatus::Failed
        );
        assert_eq!(
            repo.find_by_id(fresh.id).unwrap().unwrap().status,
            AnalysisStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_watchdog_ignores_terminal_evidence() {
        let db = Arc::new(Database::in_memory().unwrap());
        let repo = EvidenceRepository::new(Arc::clone(&db));

        let done = Evidence::new("a.jpg".into(), "/tmp/a.jpg".into(), MediaType::Image);
        repo.insert(&done).unwrap();
        repo.update_status(done.id, AnalysisStatus::MetadataExtracted)
            .unwrap();
        repo.update_status(done.id, AnalysisStatus::AnalysisComplete)
            .unwrap();
        backdate(&db, &done);

        let watchdog = Watchdog::new(
            Arc::clone(&db),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        assert_eq!(watchdog.sweep().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_watchdog_shutdown() {
        let db = Arc::new(Database::in_memory().unwrap());
        let watchdog = Watchdog::new(db, Duration::from_secs(60), Duration::from_secs(60));
        let shutdown = watchdog.shutdown_handle();

        shutdown.notify_one();
        tokio::time::timeout(Duration::from_secs(2), watchdog.run())
            .await
            .expect("Watchdog should shut down within timeout");
    }
}
