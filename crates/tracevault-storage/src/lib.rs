//! TraceVault storage crate - the SQLite Evidence Store.
//!
//! Provides a WAL-mode SQLite database with migrations, one repository per
//! persisted entity, and the read-model queries used by the status API.
//! The Evidence Store is the single source of truth for pipeline state.

pub mod db;
pub mod migrations;
pub mod queries;
pub mod repository;

pub use db::Database;
pub use queries::{EvidenceReport, FrameReport, ReportQueries, StatusSummary};
pub use repository::{
    EvidenceRepository, FaceRepository, FrameRepository, MetadataRepository,
    OsintMatchRepository, SceneRepository,
};
