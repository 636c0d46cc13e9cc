//! The pipeline orchestrator.
//!
//! Runs the ordered stages for one Evidence, committing at every stage
//! boundary so a crash or kill leaves the status consistent with the last
//! committed stage. Rows committed before a failure are deliberately kept:
//! a partial forensic record beats transactional all-or-nothing here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use tracevault_core::error::{Result, TraceVaultError};
use tracevault_core::types::{AnalysisStatus, Evidence, MediaType};
use tracevault_extract::{FrameExtractor, MetadataExtractor, ScratchDir};
use tracevault_storage::repository::{EvidenceRepository, FrameRepository, MetadataRepository};
use tracevault_storage::Database;

use crate::fanout::FrameProcessor;

/// Drives one Evidence through metadata extraction, optional frame
/// extraction, the per-target fan-out, and the terminal status commit.
pub struct Orchestrator {
    db: Arc<Database>,
    metadata_extractor: Arc<dyn MetadataExtractor>,
    frame_extractor: Arc<dyn FrameExtractor>,
    processor: FrameProcessor,
    frame_base_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(
        db: Arc<Database>,
        metadata_extractor: Arc<dyn MetadataExtractor>,
        frame_extractor: Arc<dyn FrameExtractor>,
        processor: FrameProcessor,
        frame_base_dir: PathBuf,
    ) -> Self {
        Self {
            db,
            metadata_extractor,
            frame_extractor,
            processor,
            frame_base_dir,
        }
    }

    /// Run the full pipeline for one Evidence and return the committed
    /// terminal status.
    ///
    /// An unknown evidence id is `NotFound` and performs no further action.
    /// Any error raised during the stages is logged with the evidence id
    /// and converted into a committed FAILED status; it is never silently
    /// swallowed and never retried here (the job queue is the sole retry
    /// authority). `Err` escapes only when even the FAILED commit is
    /// impossible, e.g. a duplicate job on an already-terminal Evidence.
    pub async fn run(&self, evidence_id: Uuid) -> Result<AnalysisStatus> {
        let evidence_repo = EvidenceRepository::new(Arc::clone(&self.db));
        let evidence = evidence_repo
            .find_by_id(evidence_id)?
            .ok_or_else(|| TraceVaultError::NotFound(format!("evidence {}", evidence_id)))?;

        info!(
            evidence_id = %evidence_id,
            media_type = %evidence.media_type,
            "Starting orchestration"
        );

        match self.run_stages(&evidence).await {
            Ok(()) => {
                evidence_repo.update_status(evidence_id, AnalysisStatus::AnalysisComplete)?;
                info!(evidence_id = %evidence_id, "Orchestration complete");
                Ok(AnalysisStatus::AnalysisComplete)
            }
            Err(e) => {
                error!(evidence_id = %evidence_id, error = %e, "Orchestration failed");
                match evidence_repo.update_status(evidence_id, AnalysisStatus::Failed) {
                    Ok(()) => Ok(AnalysisStatus::Failed),
                    Err(commit_err) => {
                        error!(
                            evidence_id = %evidence_id,
                            error = %commit_err,
                            "Could not commit FAILED status"
                        );
                        Err(e)
                    }
                }
            }
        }
    }

    /// The sequential stage logic. Each stage commits before the next
    /// begins; any error aborts the remainder.
    async fn run_stages(&self, evidence: &Evidence) -> Result<()> {
        let evidence_repo = EvidenceRepository::new(Arc::clone(&self.db));
        let metadata_repo = MetadataRepository::new(Arc::clone(&self.db));
        let frame_repo = FrameRepository::new(Arc::clone(&self.db));

        // Stage 1: metadata / OCR extraction.
        let output = self
            .metadata_extractor
            .extract(Path::new(&evidence.storage_path))
            .await?;
        metadata_repo.insert(
            evidence.id,
            output.metadata.as_ref(),
            output.ocr_text.as_deref(),
        )?;
        evidence_repo.update_status(evidence.id, AnalysisStatus::MetadataExtracted)?;
        info!(evidence_id = %evidence.id, "Metadata report committed");

        // Stage 2: frame extraction, video only. The scratch dir guard
        // lives until the end of the fan-out and is released on every exit
        // path, success or failure.
        let (targets, _scratch): (Vec<String>, Option<ScratchDir>) =
            if evidence.media_type == MediaType::Video {
                let scratch = ScratchDir::create(&self.frame_base_dir, evidence.id)?;
                let locations = self
                    .frame_extractor
                    .extract_frames(Path::new(&evidence.storage_path), scratch.path())
                    .await?;

                let batch: Vec<(String, Option<f64>)> = locations
                    .iter()
                    .map(|loc| (loc.path.clone(), loc.timestamp_sec))
                    .collect();
                frame_repo.insert_batch(evidence.id, &batch)?;
                evidence_repo.update_status(evidence.id, AnalysisStatus::FramesExtracted)?;
                info!(
                    evidence_id = %evidence.id,
                    frames = locations.len(),
                    "Frame rows committed"
                );

                let targets = locations.into_iter().map(|loc| loc.path).collect();
                (targets, Some(scratch))
            } else {
                (vec![evidence.storage_path.clone()], None)
            };

        // Stage 3: fan-out over targets in extraction order. Only the first
        // target of a non-video Evidence is primary; video targets already
        // have their Frame rows from stage 2.
        let is_video = evidence.media_type == MediaType::Video;
        for (index, target) in targets.iter().enumerate() {
            let is_primary = index == 0 && !is_video;
            self.processor
                .process_target(evidence.id, target, is_primary)
                .await?;
        }

        Ok(())
    }
}
