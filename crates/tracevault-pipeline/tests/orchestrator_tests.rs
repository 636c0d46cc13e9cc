//! End-to-end orchestration tests against mock collaborators and an
//! in-memory Evidence Store.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use tracevault_core::config::PipelineConfig;
use tracevault_core::error::{Result, TraceVaultError};
use tracevault_core::types::{AnalysisStatus, Evidence, MediaType};
use tracevault_extract::{
    MetadataExtractor, MetadataOutput, MockFrameExtractor, MockMetadataExtractor,
};
use tracevault_match::StaticCandidateSource;
use tracevault_pipeline::{
    FrameProcessor, InMemoryJobQueue, JobQueue, JobState, Orchestrator, Worker,
};
use tracevault_storage::repository::{
    EvidenceRepository, FaceRepository, FrameRepository, MetadataRepository, SceneRepository,
};
use tracevault_storage::Database;
use tracevault_vision::{MockFaceDetector, MockSceneClassifier};

const DIM: usize = 8;

struct Harness {
    db: Arc<Database>,
    orchestrator: Orchestrator,
    // Keeps the scratch base directory alive for the test's duration.
    _frame_dir: tempfile::TempDir,
}

fn harness(
    metadata: MockMetadataExtractor,
    frames: MockFrameExtractor,
    detector: MockFaceDetector,
    classifier: MockSceneClassifier,
) -> Harness {
    let db = Arc::new(Database::in_memory().unwrap());
    let config = PipelineConfig {
        embedding_dim: DIM,
        scene_top_k: 3,
        match_threshold: 0.45,
    };
    let processor = FrameProcessor::new(
        Arc::clone(&db),
        Arc::new(detector),
        Arc::new(classifier),
        Arc::new(StaticCandidateSource::demo_registry(DIM)),
        &config,
    );
    let frame_dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(
        Arc::clone(&db),
        Arc::new(metadata),
        Arc::new(frames),
        processor,
        frame_dir.path().to_path_buf(),
    );
    Harness {
        db,
        orchestrator,
        _frame_dir: frame_dir,
    }
}

fn seed(db: &Arc<Database>, media_type: MediaType) -> Evidence {
    let filename = match media_type {
        MediaType::Video => "capture.mp4",
        MediaType::Document => "report.pdf",
        _ => "photo.jpg",
    };
    let evidence = Evidence::new(
        filename.to_string(),
        format!("/tmp/uploads/{}", filename),
        media_type,
    );
    EvidenceRepository::new(Arc::clone(db)).insert(&evidence).unwrap();
    evidence
}

fn status_of(db: &Arc<Database>, id: Uuid) -> AnalysisStatus {
    EvidenceRepository::new(Arc::clone(db))
        .find_by_id(id)
        .unwrap()
        .unwrap()
        .status
}

fn table_count(db: &Arc<Database>, table: &str) -> i64 {
    db.with_conn(|conn| {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })
        .map_err(|e| TraceVaultError::Storage(e.to_string()))
    })
    .unwrap()
}

// ===========================================================================
// Scenario A: image with 2 detections and 3 scene scores.
// ===========================================================================

#[tokio::test]
async fn test_image_full_pipeline() {
    let h = harness(
        MockMetadataExtractor::with_output(
            Some(serde_json::json!({"EXIF:Make": "Canon"})),
            Some("street sign".to_string()),
        ),
        MockFrameExtractor::with_count(0),
        MockFaceDetector::with_face_count(2, DIM),
        MockSceneClassifier::urban_default(),
    );
    let evidence = seed(&h.db, MediaType::Image);

    let terminal = h.orchestrator.run(evidence.id).await.unwrap();
    assert_eq!(terminal, AnalysisStatus::AnalysisComplete);
    assert_eq!(status_of(&h.db, evidence.id), AnalysisStatus::AnalysisComplete);

    // 1 metadata report.
    let report = MetadataRepository::new(Arc::clone(&h.db))
        .find_by_evidence(evidence.id)
        .unwrap()
        .unwrap();
    assert_eq!(report.ocr_text.as_deref(), Some("street sign"));

    // Exactly one Frame, the primary one, at timestamp 0.
    let frames = FrameRepository::new(Arc::clone(&h.db))
        .list_for_evidence(evidence.id)
        .unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].frame_storage_path, evidence.storage_path);
    assert_eq!(frames[0].timestamp_sec, Some(0.0));

    // 2 faces, 1 scene analysis with 3 entries.
    let faces = FaceRepository::new(Arc::clone(&h.db))
        .list_for_frame(frames[0].id)
        .unwrap();
    assert_eq!(faces.len(), 2);

    let scene = SceneRepository::new(Arc::clone(&h.db))
        .find_by_frame(frames[0].id)
        .unwrap()
        .unwrap();
    assert_eq!(scene.classification_scores.len(), 3);
}

// ===========================================================================
// Scenario B: video with 5 extracted frames.
// ===========================================================================

#[tokio::test]
async fn test_video_five_frames_complete() {
    let h = harness(
        MockMetadataExtractor::new(),
        MockFrameExtractor::with_count(5),
        MockFaceDetector::empty(),
        MockSceneClassifier::empty(),
    );
    let evidence = seed(&h.db, MediaType::Video);

    let terminal = h.orchestrator.run(evidence.id).await.unwrap();
    assert_eq!(terminal, AnalysisStatus::AnalysisComplete);

    let frames = FrameRepository::new(Arc::clone(&h.db))
        .list_for_evidence(evidence.id)
        .unwrap();
    assert_eq!(frames.len(), 5);
    for frame in &frames {
        assert_eq!(frame.evidence_id, evidence.id);
        assert!(frame.timestamp_sec.is_none());
    }
    // Frames are in extractor order.
    assert!(frames[0].frame_storage_path.ends_with("frame_0001.jpg"));
    assert!(frames[4].frame_storage_path.ends_with("frame_0005.jpg"));
}

#[tokio::test]
async fn test_video_frames_committed_before_fanout_begins() {
    // Detector fails on the very first fan-out target. All 5 Frame rows and
    // the FRAMES_EXTRACTED commit must already be in place.
    let h = harness(
        MockMetadataExtractor::new(),
        MockFrameExtractor::with_count(5),
        MockFaceDetector::empty().failing_on_call(1),
        MockSceneClassifier::empty(),
    );
    let evidence = seed(&h.db, MediaType::Video);

    let terminal = h.orchestrator.run(evidence.id).await.unwrap();
    assert_eq!(terminal, AnalysisStatus::Failed);

    assert_eq!(
        FrameRepository::new(Arc::clone(&h.db))
            .count_for_evidence(evidence.id)
            .unwrap(),
        5
    );
    assert!(MetadataRepository::new(Arc::clone(&h.db))
        .find_by_evidence(evidence.id)
        .unwrap()
        .is_some());
}

// ===========================================================================
// Scenario C: detector fails on the 3rd of 5 frames.
// ===========================================================================

#[tokio::test]
async fn test_failure_mid_fanout_preserves_partial_record() {
    let h = harness(
        MockMetadataExtractor::new(),
        MockFrameExtractor::with_count(5),
        MockFaceDetector::with_face_count(1, DIM).failing_on_call(3),
        MockSceneClassifier::urban_default(),
    );
    let evidence = seed(&h.db, MediaType::Video);

    let terminal = h.orchestrator.run(evidence.id).await.unwrap();
    assert_eq!(terminal, AnalysisStatus::Failed);
    assert_eq!(status_of(&h.db, evidence.id), AnalysisStatus::Failed);

    // Metadata report and all 5 Frame rows remain.
    assert!(MetadataRepository::new(Arc::clone(&h.db))
        .find_by_evidence(evidence.id)
        .unwrap()
        .is_some());
    let frames = FrameRepository::new(Arc::clone(&h.db))
        .list_for_evidence(evidence.id)
        .unwrap();
    assert_eq!(frames.len(), 5);

    // Frames 1-2 keep their committed findings; frames 3-5 have none.
    let face_repo = FaceRepository::new(Arc::clone(&h.db));
    let scene_repo = SceneRepository::new(Arc::clone(&h.db));
    for (index, frame) in frames.iter().enumerate() {
        let faces = face_repo.list_for_frame(frame.id).unwrap();
        let scene = scene_repo.find_by_frame(frame.id).unwrap();
        if index < 2 {
            assert_eq!(faces.len(), 1, "frame {} should keep its face", index + 1);
            assert!(scene.is_some(), "frame {} should keep its scene", index + 1);
        } else {
            assert!(faces.is_empty(), "frame {} should have no faces", index + 1);
            assert!(scene.is_none(), "frame {} should have no scene", index + 1);
        }
    }
}

// ===========================================================================
// Scenario D: zero-component target embedding.
// ===========================================================================

#[tokio::test]
async fn test_zero_embedding_fails_with_no_matches_written() {
    let detection = tracevault_vision::Detection {
        bounding_box: tracevault_core::types::BoundingBox {
            x: 0.0,
            y: 0.0,
            w: 32.0,
            h: 32.0,
        },
        embedding: tracevault_core::types::Embedding(vec![0.0; DIM]),
        attributes: None,
    };
    let h = harness(
        MockMetadataExtractor::new(),
        MockFrameExtractor::with_count(0),
        MockFaceDetector::with_detections(vec![detection]),
        MockSceneClassifier::empty(),
    );
    let evidence = seed(&h.db, MediaType::Image);

    let terminal = h.orchestrator.run(evidence.id).await.unwrap();
    assert_eq!(terminal, AnalysisStatus::Failed);
    assert_eq!(table_count(&h.db, "osint_matches"), 0);
}

// ===========================================================================
// Preconditions and edge cases
// ===========================================================================

#[tokio::test]
async fn test_unknown_evidence_is_not_found() {
    let h = harness(
        MockMetadataExtractor::new(),
        MockFrameExtractor::with_count(0),
        MockFaceDetector::empty(),
        MockSceneClassifier::empty(),
    );

    let err = h.orchestrator.run(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, TraceVaultError::NotFound(_)));
    assert_eq!(table_count(&h.db, "metadata_reports"), 0);
    assert_eq!(table_count(&h.db, "frames"), 0);
}

#[tokio::test]
async fn test_metadata_failure_fails_before_any_frame() {
    let h = harness(
        MockMetadataExtractor::failing(),
        MockFrameExtractor::with_count(5),
        MockFaceDetector::empty(),
        MockSceneClassifier::empty(),
    );
    let evidence = seed(&h.db, MediaType::Video);

    let terminal = h.orchestrator.run(evidence.id).await.unwrap();
    assert_eq!(terminal, AnalysisStatus::Failed);
    assert_eq!(table_count(&h.db, "metadata_reports"), 0);
    assert_eq!(table_count(&h.db, "frames"), 0);
}

#[tokio::test]
async fn test_non_video_never_invokes_frame_extractor() {
    // A failing frame extractor proves stage 2 is skipped entirely for
    // images and documents.
    for media_type in [MediaType::Image, MediaType::Document, MediaType::Other] {
        let h = harness(
            MockMetadataExtractor::new(),
            MockFrameExtractor::failing(),
            MockFaceDetector::empty(),
            MockSceneClassifier::empty(),
        );
        let evidence = seed(&h.db, media_type);

        let terminal = h.orchestrator.run(evidence.id).await.unwrap();
        assert_eq!(terminal, AnalysisStatus::AnalysisComplete);
        assert_eq!(
            FrameRepository::new(Arc::clone(&h.db))
                .count_for_evidence(evidence.id)
                .unwrap(),
            1
        );
    }
}

#[tokio::test]
async fn test_video_with_no_extractable_frames_completes() {
    let h = harness(
        MockMetadataExtractor::new(),
        MockFrameExtractor::with_count(0),
        MockFaceDetector::empty().failing_on_call(1),
        MockSceneClassifier::empty(),
    );
    let evidence = seed(&h.db, MediaType::Video);

    // Empty extraction is a valid success; with no targets the fan-out
    // never runs, so the failing detector is never reached.
    let terminal = h.orchestrator.run(evidence.id).await.unwrap();
    assert_eq!(terminal, AnalysisStatus::AnalysisComplete);
    assert_eq!(table_count(&h.db, "frames"), 0);
}

#[tokio::test]
async fn test_duplicate_job_on_terminal_evidence_errors_without_regressing() {
    let h = harness(
        MockMetadataExtractor::new(),
        MockFrameExtractor::with_count(0),
        MockFaceDetector::empty(),
        MockSceneClassifier::empty(),
    );
    let evidence = seed(&h.db, MediaType::Image);

    let first = h.orchestrator.run(evidence.id).await.unwrap();
    assert_eq!(first, AnalysisStatus::AnalysisComplete);

    // Re-delivery of the same job: the metadata report is unique per
    // evidence, so the stage errors, and a terminal status cannot move to
    // FAILED. The error surfaces; the committed record is untouched.
    let second = h.orchestrator.run(evidence.id).await;
    assert!(second.is_err());
    assert_eq!(status_of(&h.db, evidence.id), AnalysisStatus::AnalysisComplete);
    assert_eq!(table_count(&h.db, "metadata_reports"), 1);
    assert_eq!(table_count(&h.db, "frames"), 1);
}

// ===========================================================================
// Worker + queue integration
// ===========================================================================

#[tokio::test]
async fn test_worker_drives_job_from_queue_to_finished() {
    let h = harness(
        MockMetadataExtractor::new(),
        MockFrameExtractor::with_count(0),
        MockFaceDetector::with_face_count(1, DIM),
        MockSceneClassifier::urban_default(),
    );
    let evidence = seed(&h.db, MediaType::Image);

    let (queue, receiver) = InMemoryJobQueue::new();
    let orchestrator = Arc::new(h.orchestrator);
    let worker = Worker::new(Arc::clone(&orchestrator), Arc::clone(&queue), receiver);
    let shutdown = worker.shutdown_handle();
    let worker_task = tokio::spawn(async move { worker.run().await });

    let handle = queue
        .enqueue(
            evidence.id,
            Duration::from_secs(30),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();

    // Poll until the job reaches a terminal state.
    let mut state = None;
    for _ in 0..100 {
        state = queue.fetch(handle.job_id).await.unwrap();
        if state.map(|s| s.is_terminal()).unwrap_or(false) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state, Some(JobState::Finished));
    assert_eq!(status_of(&h.db, evidence.id), AnalysisStatus::AnalysisComplete);

    shutdown.notify_one();
    let _ = tokio::time::timeout(Duration::from_secs(2), worker_task).await;
}

/// Metadata extractor that hangs long enough to trip the job timeout.
struct SlowMetadataExtractor;

#[async_trait]
impl MetadataExtractor for SlowMetadataExtractor {
    async fn extract(&self, _path: &Path) -> Result<MetadataOutput> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(MetadataOutput::default())
    }
}

#[tokio::test]
async fn test_timed_out_job_leaves_last_committed_status() {
    let db = Arc::new(Database::in_memory().unwrap());
    let config = PipelineConfig {
        embedding_dim: DIM,
        scene_top_k: 3,
        match_threshold: 0.45,
    };
    let processor = FrameProcessor::new(
        Arc::clone(&db),
        Arc::new(MockFaceDetector::empty()),
        Arc::new(MockSceneClassifier::empty()),
        Arc::new(StaticCandidateSource::demo_registry(DIM)),
        &config,
    );
    let frame_dir = tempfile::tempdir().unwrap();
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&db),
        Arc::new(SlowMetadataExtractor),
        Arc::new(MockFrameExtractor::with_count(0)),
        processor,
        frame_dir.path().to_path_buf(),
    ));
    let evidence = seed(&db, MediaType::Image);

    let (queue, receiver) = InMemoryJobQueue::new();
    let worker = Worker::new(orchestrator, Arc::clone(&queue), receiver);
    let shutdown = worker.shutdown_handle();
    let worker_task = tokio::spawn(async move { worker.run().await });

    let handle = queue
        .enqueue(
            evidence.id,
            Duration::from_millis(50),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();

    let mut state = None;
    for _ in 0..100 {
        state = queue.fetch(handle.job_id).await.unwrap();
        if state.map(|s| s.is_terminal()).unwrap_or(false) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state, Some(JobState::TimedOut));

    // No automatic FAILED transition on timeout: the Evidence keeps its
    // last committed status until the watchdog sweeps it.
    assert_eq!(status_of(&db, evidence.id), AnalysisStatus::Pending);

    shutdown.notify_one();
    let _ = tokio::time::timeout(Duration::from_secs(2), worker_task).await;
}
