use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TraceVaultError;

// =============================================================================
// Enums
// =============================================================================

/// Processing status of an Evidence item.
///
/// The string values are the persisted wire format other services depend on
/// and must not change. Decoding an unknown value fails loudly; see
/// [`AnalysisStatus::parse`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStatus {
    /// Uploaded, not yet picked up by a worker.
    Pending,
    /// Metadata/OCR extraction committed.
    MetadataExtracted,
    /// Video frame rows committed (video evidence only).
    FramesExtracted,
    /// All analysis targets processed. Terminal.
    AnalysisComplete,
    /// Pipeline aborted. Terminal.
    Failed,
}

impl AnalysisStatus {
    /// The persisted string value for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "PENDING",
            AnalysisStatus::MetadataExtracted => "METADATA_EXTRACTED",
            AnalysisStatus::FramesExtracted => "FRAMES_EXTRACTED",
            AnalysisStatus::AnalysisComplete => "ANALYSIS_COMPLETE",
            AnalysisStatus::Failed => "FAILED",
        }
    }

    /// Decode a persisted status value.
    ///
    /// An unrecognized value signals schema drift or corruption and is an
    /// error, never a silent default.
    pub fn parse(value: &str) -> Result<Self, TraceVaultError> {
        match value {
            "PENDING" => Ok(AnalysisStatus::Pending),
            "METADATA_EXTRACTED" => Ok(AnalysisStatus::MetadataExtracted),
            "FRAMES_EXTRACTED" => Ok(AnalysisStatus::FramesExtracted),
            "ANALYSIS_COMPLETE" => Ok(AnalysisStatus::AnalysisComplete),
            "FAILED" => Ok(AnalysisStatus::Failed),
            other => Err(TraceVaultError::Storage(format!(
                "Unrecognized analysis status in store: {:?}",
                other
            ))),
        }
    }

    /// Whether no further transition may occur from this status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnalysisStatus::AnalysisComplete | AnalysisStatus::Failed
        )
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media type of an uploaded Evidence item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    Image,
    Video,
    Document,
    Other,
}

impl MediaType {
    /// The persisted string value for this media type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "IMAGE",
            MediaType::Video => "VIDEO",
            MediaType::Document => "DOCUMENT",
            MediaType::Other => "OTHER",
        }
    }

    /// Decode a persisted media type value, failing on unknown input.
    pub fn parse(value: &str) -> Result<Self, TraceVaultError> {
        match value {
            "IMAGE" => Ok(MediaType::Image),
            "VIDEO" => Ok(MediaType::Video),
            "DOCUMENT" => Ok(MediaType::Document),
            "OTHER" => Ok(MediaType::Other),
            other => Err(TraceVaultError::Storage(format!(
                "Unrecognized media type in store: {:?}",
                other
            ))),
        }
    }

    /// Classify an uploaded filename by extension.
    pub fn from_filename(filename: &str) -> Self {
        let ext = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "bmp" => MediaType::Image,
            "mp4" | "mov" | "avi" | "wmv" => MediaType::Video,
            "pdf" | "doc" | "docx" => MediaType::Document,
            _ => MediaType::Other,
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Vector / geometry types
// =============================================================================

/// A face embedding vector.
///
/// Dimensionality is fixed per deployment (config `pipeline.embedding_dim`);
/// validation against the configured D happens at the matching seam, not at
/// construction, since detector output length is a collaborator contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Euclidean (L2) norm, computed in f64.
    pub fn l2_norm(&self) -> f64 {
        self.0
            .iter()
            .map(|x| (*x as f64).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Cosine distance `1 - (a.b)/(|a||b|)`.
    ///
    /// Returns `None` when either vector has zero norm, where the distance
    /// is undefined.
    pub fn cosine_distance(&self, other: &Embedding) -> Option<f64> {
        let dot: f64 = self
            .0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| (*a as f64) * (*b as f64))
            .sum();
        let norm_a = self.l2_norm();
        let norm_b = other.l2_norm();
        if norm_a == 0.0 || norm_b == 0.0 {
            return None;
        }
        Some(1.0 - dot / (norm_a * norm_b))
    }
}

/// Face bounding box in source-image pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// One scene category with its confidence score.
///
/// `classification_scores` columns store an ordered array of these, sorted
/// by descending score at write time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneScore {
    pub label: String,
    pub score: f64,
}

// =============================================================================
// Entities
// =============================================================================

/// One uploaded media item under analysis. Root of the entity tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub id: Uuid,
    pub original_filename: String,
    pub storage_path: String,
    pub media_type: MediaType,
    pub status: AnalysisStatus,
    pub uploaded_at: DateTime<Utc>,
    /// Touched on every status change; drives the stalled-job watchdog.
    pub updated_at: DateTime<Utc>,
}

impl Evidence {
    /// Build a fresh PENDING Evidence record for an upload.
    pub fn new(original_filename: String, storage_path: String, media_type: MediaType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            original_filename,
            storage_path,
            media_type,
            status: AnalysisStatus::Pending,
            uploaded_at: now,
            updated_at: now,
        }
    }
}

/// Extracted file metadata and optional OCR text. 1:1 with Evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataReport {
    pub id: i64,
    pub evidence_id: Uuid,
    pub extracted_metadata: Option<serde_json::Value>,
    pub ocr_text: Option<String>,
    pub processed_at: DateTime<Utc>,
}

/// One analysis target: the original image, or one extracted video frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub id: i64,
    pub evidence_id: Uuid,
    pub frame_storage_path: String,
    /// Seconds from the start of the source video; None when the extractor
    /// does not supply one, 0.0 for the primary frame of a still image.
    pub timestamp_sec: Option<f64>,
}

/// One detected face: embedding vector, bounding box, optional attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceEmbedding {
    pub id: i64,
    pub frame_id: i64,
    pub embedding_vector: Embedding,
    pub bounding_box: BoundingBox,
    pub attributes: Option<serde_json::Value>,
}

/// Scene classification result for a Frame. 1:1 with Frame; a frame with no
/// scores simply has no row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneAnalysis {
    pub id: i64,
    pub frame_id: i64,
    pub classification_scores: Vec<SceneScore>,
}

/// One identity-match result linking a detected face to an external profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsintMatch {
    pub id: i64,
    pub face_embedding_id: i64,
    pub profile_name: String,
    pub source_url: String,
    pub platform: String,
    /// In [0, 1], higher is better.
    pub similarity_score: f64,
    pub extended_data: Option<serde_json::Value>,
    pub matched_at: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================
