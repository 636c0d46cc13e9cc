//! Per-target fan-out processing.
//!
//! For one analysis target (the original image or one extracted video
//! frame): resolve the Frame row, detect faces, rank identity candidates
//! for each face, classify the scene, and commit everything for that
//! target as a single unit of work. Collaborator calls run before the
//! transaction opens, so a model failure leaves nothing half-written for
//! the target.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use tracevault_core::config::PipelineConfig;
use tracevault_core::error::{Result, TraceVaultError};
use tracevault_core::types::SceneScore;
use tracevault_match::{CandidateSource, MatchEngine, RankedMatch};
use tracevault_storage::repository::{
    FaceRepository, FrameRepository, OsintMatchRepository, SceneRepository,
};
use tracevault_storage::Database;
use tracevault_vision::{FaceDetector, SceneClassifier};

/// Processes one analysis target end to end.
///
/// Model services are long-lived handles injected at startup, not owned
/// here. There is no per-target error isolation: any collaborator error
/// propagates to the orchestrator and aborts the remaining pipeline for
/// the whole Evidence.
pub struct FrameProcessor {
    db: Arc<Database>,
    face_detector: Arc<dyn FaceDetector>,
    scene_classifier: Arc<dyn SceneClassifier>,
    candidate_source: Arc<dyn CandidateSource>,
    engine: MatchEngine,
    scene_top_k: usize,
}

impl FrameProcessor {
    pub fn new(
        db: Arc<Database>,
        face_detector: Arc<dyn FaceDetector>,
        scene_classifier: Arc<dyn SceneClassifier>,
        candidate_source: Arc<dyn CandidateSource>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            db,
            face_detector,
            scene_classifier,
            candidate_source,
            engine: MatchEngine::from_config(config),
            scene_top_k: config.scene_top_k,
        }
    }

    /// Process one target for the given Evidence.
    ///
    /// A primary target (the original file of a non-video Evidence) creates
    /// its own Frame row with timestamp 0. A non-primary target must find
    /// the Frame row created during frame extraction by storage location;
    /// its absence is a `FrameNotFound` contract violation.
    pub async fn process_target(
        &self,
        evidence_id: Uuid,
        target_location: &str,
        is_primary: bool,
    ) -> Result<()> {
        // Resolve before invoking any model, so a contract violation fails
        // fast instead of after seconds of inference.
        if !is_primary {
            let existing = self.db.with_conn(|conn| {
                FrameRepository::find_by_location_with(conn, evidence_id, target_location)
            })?;
            if existing.is_none() {
                return Err(TraceVaultError::FrameNotFound(target_location.to_string()));
            }
        }

        debug!(evidence_id = %evidence_id, target = %target_location, "Processing analysis target");

        let detections = self
            .face_detector
            .detect(Path::new(target_location))
            .await?;

        // Rank identity candidates per detection with a usable vector. An
        // empty vector skips matching; a malformed one is an error from the
        // engine and aborts the target.
        let mut match_sets: Vec<Vec<RankedMatch>> = Vec::with_capacity(detections.len());
        for detection in &detections {
            if detection.embedding.is_empty() {
                debug!(
                    evidence_id = %evidence_id,
                    "Detection has no embedding vector; skipping identity matching"
                );
                match_sets.push(Vec::new());
                continue;
            }
            let candidates = self
                .candidate_source
                .candidates_for(&detection.embedding)
                .await?;
            match_sets.push(self.engine.rank(&detection.embedding, &candidates)?);
        }

        let scene_scores = self
            .scene_classifier
            .classify(Path::new(target_location))
            .await?;

        // Single unit of work for everything this target produced.
        let (face_count, match_count) = self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| TraceVaultError::Storage(e.to_string()))?;

            let frame_id = if is_primary {
                FrameRepository::insert_with(&tx, evidence_id, target_location, Some(0.0))?
            } else {
                FrameRepository::find_by_location_with(&tx, evidence_id, target_location)?
                    .ok_or_else(|| {
                        TraceVaultError::FrameNotFound(target_location.to_string())
                    })?
                    .id
            };

            let mut match_count = 0usize;
            for (detection, ranked) in detections.iter().zip(&match_sets) {
                let face_id = FaceRepository::insert_with(
                    &tx,
                    frame_id,
                    &detection.embedding,
                    &detection.bounding_box,
                    detection.attributes.as_ref(),
                )?;
                for m in ranked {
                    let extended = serde_json::json!({
                        "registry_id": m.candidate_id,
                        "distance": m.distance,
                        "profile": m.extended,
                    });
                    OsintMatchRepository::insert_with(
                        &tx,
                        face_id,
                        &m.profile_name,
                        &m.source_url,
                        &m.platform,
                        m.similarity_score,
                        Some(&extended),
                    )?;
                    match_count += 1;
                }
            }

            if !scene_scores.is_empty() {
                let scores: Vec<SceneScore> = scene_scores
                    .iter()
                    .map(|(label, score)| SceneScore {
                        label: label.clone(),
                        score: *score,
                    })
                    .collect();
                SceneRepository::insert_with(&tx, frame_id, scores, self.scene_top_k)?;
            }

            tx.commit()
                .map_err(|e| TraceVaultError::Storage(e.to_string()))?;
            Ok((detections.len(), match_count))
        })?;

        info!(
            evidence_id = %evidence_id,
            target = %target_location,
            faces = face_count,
            matches = match_count,
            scene_scored = !scene_scores.is_empty(),
            "Analysis target committed"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracevault_core::types::{
        AnalysisStatus, BoundingBox, Embedding, Evidence, MediaType,
    };
    use tracevault_match::StaticCandidateSource;
    use tracevault_storage::repository::EvidenceRepository;
    use tracevault_vision::{Detection, MockFaceDetector, MockSceneClassifier};

    const DIM: usize = 8;

    fn config() -> PipelineConfig {
        PipelineConfig {
            embedding_dim: DIM,
            scene_top_k: 3,
            match_threshold: 0.45,
        }
    }

    fn seed_evidence(db: &Arc<Database>, media_type: MediaType) -> Evidence {
        let evidence = Evidence::new(
            "upload.jpg".to_string(),
            "/tmp/uploads/upload.jpg".to_string(),
            media_type,
        );
        EvidenceRepository::new(Arc::clone(db)).insert(&evidence).unwrap();
        evidence
    }

    fn processor(
        db: &Arc<Database>,
        detector: MockFaceDetector,
        classifier: MockSceneClassifier,
    ) -> FrameProcessor {
        FrameProcessor::new(
            Arc::clone(db),
            Arc::new(detector),
            Arc::new(classifier),
            Arc::new(StaticCandidateSource::demo_registry(DIM)),
            &config(),
        )
    }

    #[tokio::test]
    async fn test_primary_target_creates_frame() {
        let db = Arc::new(Database::in_memory().unwrap());
        let evidence = seed_evidence(&db, MediaType::Image);
        let p = processor(&db, MockFaceDetector::empty(), MockSceneClassifier::empty());

        p.process_target(evidence.id, &evidence.storage_path, true)
            .await
            .unwrap();

        let frame = FrameRepository::new(Arc::clone(&db))
            .find_by_location(evidence.id, &evidence.storage_path)
            .unwrap()
            .unwrap();
        assert_eq!(frame.timestamp_sec, Some(0.0));
    }

    #[tokio::test]
    async fn test_non_primary_missing_frame_is_contract_violation() {
        let db = Arc::new(Database::in_memory().unwrap());
        let evidence = seed_evidence(&db, MediaType::Video);
        let detector = MockFaceDetector::with_face_count(1, DIM);
        let p = processor(&db, detector, MockSceneClassifier::empty());

        let err = p
            .process_target(evidence.id, "/tmp/frames/missing.jpg", false)
            .await
            .unwrap_err();
        assert!(matches!(err, TraceVaultError::FrameNotFound(_)));

        // Fail-fast: the detector was never invoked.
        // (call_count lives on the mock we moved in; re-check via row counts.)
        assert_eq!(
            FrameRepository::new(Arc::clone(&db))
                .count_for_evidence(evidence.id)
                .unwrap(),
            0
        );
        assert_eq!(
            EvidenceRepository::new(db).find_by_id(evidence.id).unwrap().unwrap().status,
            AnalysisStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_faces_and_scene_committed_together() {
        let db = Arc::new(Database::in_memory().unwrap());
        let evidence = seed_evidence(&db, MediaType::Image);
        let p = processor(
            &db,
            MockFaceDetector::with_face_count(2, DIM),
            MockSceneClassifier::urban_default(),
        );

        p.process_target(evidence.id, &evidence.storage_path, true)
            .await
            .unwrap();

        let frame = FrameRepository::new(Arc::clone(&db))
            .find_by_location(evidence.id, &evidence.storage_path)
            .unwrap()
            .unwrap();
        let faces = tracevault_storage::repository::FaceRepository::new(Arc::clone(&db))
            .list_for_frame(frame.id)
            .unwrap();
        assert_eq!(faces.len(), 2);

        let scene = tracevault_storage::repository::SceneRepository::new(Arc::clone(&db))
            .find_by_frame(frame.id)
            .unwrap()
            .unwrap();
        assert_eq!(scene.classification_scores.len(), 3);
        assert_eq!(scene.classification_scores[0].label, "urban street");
    }

    #[tokio::test]
    async fn test_empty_scene_scores_write_no_row() {
        let db = Arc::new(Database::in_memory().unwrap());
        let evidence = seed_evidence(&db, MediaType::Image);
        let p = processor(&db, MockFaceDetector::empty(), MockSceneClassifier::empty());

        p.process_target(evidence.id, &evidence.storage_path, true)
            .await
            .unwrap();

        let frame = FrameRepository::new(Arc::clone(&db))
            .find_by_location(evidence.id, &evidence.storage_path)
            .unwrap()
            .unwrap();
        assert!(tracevault_storage::repository::SceneRepository::new(db)
            .find_by_frame(frame.id)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_empty_embedding_skips_matching() {
        let db = Arc::new(Database::in_memory().unwrap());
        let evidence = seed_evidence(&db, MediaType::Image);
        let detection = Detection {
            bounding_box: BoundingBox { x: 0.0, y: 0.0, w: 32.0, h: 32.0 },
            embedding: Embedding(Vec::new()),
            attributes: None,
        };
        let p = processor(
            &db,
            MockFaceDetector::with_detections(vec![detection]),
            MockSceneClassifier::empty(),
        );

        p.process_target(evidence.id, &evidence.storage_path, true)
            .await
            .unwrap();

        let frame = FrameRepository::new(Arc::clone(&db))
            .find_by_location(evidence.id, &evidence.storage_path)
            .unwrap()
            .unwrap();
        let faces = tracevault_storage::repository::FaceRepository::new(Arc::clone(&db))
            .list_for_frame(frame.id)
            .unwrap();
        assert_eq!(faces.len(), 1);
        assert!(
            tracevault_storage::repository::OsintMatchRepository::new(db)
                .list_for_face(faces[0].id)
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_zero_embedding_aborts_target_with_nothing_written() {
        let db = Arc::new(Database::in_memory().unwrap());
        let evidence = seed_evidence(&db, MediaType::Image);
        let detection = Detection {
            bounding_box: BoundingBox { x: 0.0, y: 0.0, w: 32.0, h: 32.0 },
            embedding: Embedding(vec![0.0; DIM]),
            attributes: None,
        };
        let p = processor(
            &db,
            MockFaceDetector::with_detections(vec![detection]),
            MockSceneClassifier::urban_default(),
        );

        let err = p
            .process_target(evidence.id, &evidence.storage_path, true)
            .await
            .unwrap_err();
        assert!(matches!(err, TraceVaultError::InvalidEmbedding(_)));

        // The unit of work never opened: no frame, no faces, no matches.
        assert_eq!(
            FrameRepository::new(db).count_for_evidence(evidence.id).unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_detector_failure_leaves_no_rows_for_target() {
        let db = Arc::new(Database::in_memory().unwrap());
        let evidence = seed_evidence(&db, MediaType::Image);
        let p = processor(
            &db,
            MockFaceDetector::empty().failing_on_call(1),
            MockSceneClassifier::urban_default(),
        );

        let err = p
            .process_target(evidence.id, &evidence.storage_path, true)
            .await
            .unwrap_err();
        assert!(matches!(err, TraceVaultError::Detection(_)));
        assert_eq!(
            FrameRepository::new(db).count_for_evidence(evidence.id).unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_matches_persisted_for_close_candidate() {
        let db = Arc::new(Database::in_memory().unwrap());
        let evidence = seed_evidence(&db, MediaType::Image);
        // Near-ones vector: the demo registry's "Sarah Researcher" entry is
        // a constant 0.9 vector, cosine distance ~0.
        let detection = Detection {
            bounding_box: BoundingBox { x: 5.0, y: 5.0, w: 40.0, h: 40.0 },
            embedding: Embedding(vec![0.95; DIM]),
            attributes: None,
        };
        let p = processor(
            &db,
            MockFaceDetector::with_detections(vec![detection]),
            MockSceneClassifier::empty(),
        );

        p.process_target(evidence.id, &evidence.storage_path, true)
            .await
            .unwrap();

        let frame = FrameRepository::new(Arc::clone(&db))
            .find_by_location(evidence.id, &evidence.storage_path)
            .unwrap()
            .unwrap();
        let faces = tracevault_storage::repository::FaceRepository::new(Arc::clone(&db))
            .list_for_frame(frame.id)
            .unwrap();
        let matches = tracevault_storage::repository::OsintMatchRepository::new(db)
            .list_for_face(faces[0].id)
            .unwrap();
        assert!(!matches.is_empty());
        assert_eq!(matches[0].profile_name, "Sarah Researcher");
        assert_eq!(
            matches[0].extended_data.as_ref().unwrap()["registry_id"],
            "twitter_2"
        );
    }
}
