//! Face detection service trait and mock implementation.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use tracevault_core::error::{Result, TraceVaultError};
use tracevault_core::types::{BoundingBox, Embedding};

/// One detected face: bounding box, embedding vector, optional attribute
/// map (age, emotion, and whatever else the backend reports).
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub embedding: Embedding,
    pub attributes: Option<serde_json::Value>,
}

/// Service detecting faces and producing embeddings for an image on disk.
///
/// Zero detections is a valid success. Implementations wrap external model
/// services; failures surface as `Detection` errors.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, path: &Path) -> Result<Vec<Detection>>;
}

/// Mock face detector returning scripted detections.
///
/// `fail_on_call` makes the Nth invocation fail, which exercises
/// mid-fan-out abort behavior (a detector failing on frame 3 of 5).
#[derive(Debug, Default)]
pub struct MockFaceDetector {
    detections: Vec<Detection>,
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
}

impl MockFaceDetector {
    /// A detector that finds no faces anywhere.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A detector returning the given detections for every target.
    pub fn with_detections(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            calls: AtomicUsize::new(0),
            fail_on_call: None,
        }
    }

    /// A detector producing `count` synthetic faces of dimension `dim` for
    /// every target. Embeddings are deterministic unit-ish vectors so the
    /// matching engine sees well-formed input.
    pub fn with_face_count(count: usize, dim: usize) -> Self {
        let detections = (0..count)
            .map(|i| {
                let mut vector = vec![0.05f32; dim];
                if dim > 0 {
                    vector[i % dim] = 1.0;
                }
                Detection {
                    bounding_box: BoundingBox {
                        x: 10.0 * i as f64,
                        y: 10.0 * i as f64,
                        w: 64.0,
                        h: 64.0,
                    },
                    embedding: Embedding(vector),
                    attributes: Some(serde_json::json!({"age": 30 + i, "emotion": "neutral"})),
                }
            })
            .collect();
        Self {
            detections,
            calls: AtomicUsize::new(0),
            fail_on_call: None,
        }
    }

    /// Fail the Nth call (1-based) with a `Detection` error.
    pub fn failing_on_call(mut self, n: usize) -> Self {
        self.fail_on_call = Some(n);
        self
    }

    /// Number of times `detect` has been invoked.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FaceDetector for MockFaceDetector {
    async fn detect(&self, path: &Path) -> Result<Vec<Detection>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(TraceVaultError::Detection(format!(
                "mock detector failure on call {} ({})",
                call,
                path.display()
            )));
        }
        Ok(self.detections.clone())
    }
}
