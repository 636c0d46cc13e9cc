//! TraceVault API crate - the ingress layer.
//!
//! Exposes the upload endpoint that creates Evidence rows and enqueues
//! orchestration jobs, plus the read-only status/report surface over the
//! Evidence Store. The pipeline itself never runs in a request handler;
//! workers pick jobs up from the queue.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
