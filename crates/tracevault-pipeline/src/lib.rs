//! TraceVault pipeline crate - orchestration core.
//!
//! Drives one Evidence through the ordered analysis stages (metadata
//! extraction, optional frame extraction, per-target fan-out, completion),
//! advancing the Evidence state machine with one committed transaction per
//! stage. Collaborator models and the job queue are injected handles;
//! parallelism across Evidence items comes only from running multiple
//! workers.

pub mod fanout;
pub mod orchestrator;
pub mod queue;
pub mod worker;

pub use fanout::FrameProcessor;
pub use orchestrator::Orchestrator;
pub use queue::{InMemoryJobQueue, JobHandle, JobQueue, JobState, QueuedJob, SharedJobReceiver};
pub use worker::{Watchdog, Worker};
