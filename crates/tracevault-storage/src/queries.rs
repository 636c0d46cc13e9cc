//! Read-model queries for the status-reporting layer.
//!
//! The ingress API never touches pipeline write paths; it reads the
//! Evidence Store through these aggregations: a light status summary while
//! a job is in flight, and the full nested report once a terminal status
//! has been committed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use tracevault_core::error::TraceVaultError;
use tracevault_core::types::{
    AnalysisStatus, FaceEmbedding, Frame, MediaType, MetadataReport, OsintMatch, SceneAnalysis,
};

use crate::db::Database;
use crate::repository::{
    EvidenceRepository, FaceRepository, FrameRepository, MetadataRepository, OsintMatchRepository,
    SceneRepository,
};

/// Current processing state of one Evidence, plus the committed findings
/// once the pipeline has reached a terminal status.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub evidence_id: Uuid,
    pub original_filename: String,
    pub media_type: MediaType,
    pub status: AnalysisStatus,
    pub uploaded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_report: Option<MetadataReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u64>,
}

/// One face with its recorded identity matches.
#[derive(Debug, Clone, Serialize)]
pub struct FaceReport {
    #[serde(flatten)]
    pub face: FaceEmbedding,
    pub osint_matches: Vec<OsintMatch>,
}

/// One frame with everything found in it.
#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    #[serde(flatten)]
    pub frame: Frame,
    pub faces: Vec<FaceReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_analysis: Option<SceneAnalysis>,
}

/// The full nested report for one Evidence.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceReport {
    pub evidence_id: Uuid,
    pub original_filename: String,
    pub media_type: MediaType,
    pub status: AnalysisStatus,
    pub uploaded_at: DateTime<Utc>,
    pub metadata_report: Option<MetadataReport>,
    pub frames: Vec<FrameReport>,
}

/// Aggregating read queries over the Evidence Store.
pub struct ReportQueries {
    evidence: EvidenceRepository,
    metadata: MetadataRepository,
    frames: FrameRepository,
    faces: FaceRepository,
    scenes: SceneRepository,
    matches: OsintMatchRepository,
}

impl ReportQueries {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            evidence: EvidenceRepository::new(Arc::clone(&db)),
            metadata: MetadataRepository::new(Arc::clone(&db)),
            frames: FrameRepository::new(Arc::clone(&db)),
            faces: FaceRepository::new(Arc::clone(&db)),
            scenes: SceneRepository::new(Arc::clone(&db)),
            matches: OsintMatchRepository::new(db),
        }
    }

    /// Status summary for one Evidence. Findings are attached only once the
    /// status is terminal; a FAILED evidence still surfaces whatever partial
    /// record was committed before the failure.
    pub fn status_summary(
        &self,
        evidence_id: Uuid,
    ) -> Result<Option<StatusSummary>, TraceVaultError> {
        let Some(evidence) = self.evidence.find_by_id(evidence_id)? else {
            return Ok(None);
        };

        let (metadata_report, frame_count) = if evidence.status.is_terminal() {
            (
                self.metadata.find_by_evidence(evidence_id)?,
                Some(self.frames.count_for_evidence(evidence_id)?),
            )
        } else {
            (None, None)
        };

        Ok(Some(StatusSummary {
            evidence_id: evidence.id,
            original_filename: evidence.original_filename,
            media_type: evidence.media_type,
            status: evidence.status,
            uploaded_at: evidence.uploaded_at,
            metadata_report,
            frame_count,
        }))
    }

    /// The full nested report: metadata plus every frame with its faces,
    /// their identity matches, and the scene analysis where present.
    pub fn full_report(
        &self,
        evidence_id: Uuid,
    ) -> Result<Option<EvidenceReport>, TraceVaultError> {
        let Some(evidence) = self.evidence.find_by_id(evidence_id)? else {
            return Ok(None);
        };

        let metadata_report = self.metadata.find_by_evidence(evidence_id)?;

        let mut frames = Vec::new();
        for frame in self.frames.list_for_evidence(evidence_id)? {
            let mut faces = Vec::new();
            for face in self.faces.list_for_frame(frame.id)? {
                let osint_matches = self.matches.list_for_face(face.id)?;
                faces.push(FaceReport {
                    face,
                    osint_matches,
                });
            }
            let scene_analysis = self.scenes.find_by_frame(frame.id)?;
            frames.push(FrameReport {
                frame,
                faces,
                scene_analysis,
            });
        }

        Ok(Some(EvidenceReport {
            evidence_id: evidence.id,
            original_filename: evidence.original_filename,
            media_type: evidence.media_type,
            status: evidence.status,
            uploaded_at: evidence.uploaded_at,
            metadata_report,
            frames,
        }))
    }
}
