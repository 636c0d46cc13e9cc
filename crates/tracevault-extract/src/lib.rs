//! TraceVault extraction crate - metadata/OCR and video frame collaborators.
//!
//! Provides the MetadataExtractor and FrameExtractor traits consumed by the
//! pipeline orchestrator, mock implementations for testing, subprocess-backed
//! implementations (exiftool + tesseract, ffmpeg), and the job-scoped
//! ScratchDir guard for frame output directories.

pub mod exiftool;
pub mod ffmpeg;
pub mod scratch;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use tracevault_core::error::{Result, TraceVaultError};

pub use exiftool::ExifToolExtractor;
pub use ffmpeg::FfmpegFrameExtractor;
pub use scratch::ScratchDir;

/// Output of the metadata-extraction collaborator. Both halves are
/// independently optional: a file may yield metadata and no OCR text, OCR
/// text and no metadata, or neither.
#[derive(Debug, Clone, Default)]
pub struct MetadataOutput {
    pub metadata: Option<serde_json::Value>,
    pub ocr_text: Option<String>,
}

/// One extracted frame location, with a source timestamp when the
/// collaborator supplies one.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameLocation {
    pub path: String,
    pub timestamp_sec: Option<f64>,
}

/// Service extracting file metadata and OCR text from stored media.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Extract metadata (and OCR text for images) from the file at `path`.
    async fn extract(&self, path: &Path) -> Result<MetadataOutput>;
}

/// Service extracting still frames from a video file.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Extract frames from the video at `path` into `output_dir`, returning
    /// the ordered list of frame locations. An empty list is a valid
    /// success (e.g. a video shorter than one sample interval).
    async fn extract_frames(&self, path: &Path, output_dir: &Path) -> Result<Vec<FrameLocation>>;
}

// ---------------------------------------------------------------------------
// Mocks
// ---------------------------------------------------------------------------

/// Mock metadata extractor returning scripted output.
#[derive(Debug, Default)]
pub struct MockMetadataExtractor {
    output: MetadataOutput,
    fail: bool,
}

impl MockMetadataExtractor {
    pub fn new() -> Self {
        Self {
            output: MetadataOutput {
                metadata: Some(serde_json::json!({"File:MIMEType": "image/jpeg"})),
                ocr_text: None,
            },
            fail: false,
        }
    }

    pub fn with_output(metadata: Option<serde_json::Value>, ocr_text: Option<String>) -> Self {
        Self {
            output: MetadataOutput { metadata, ocr_text },
            fail: false,
        }
    }

    /// A mock that always fails with an extraction error.
    pub fn failing() -> Self {
        Self {
            output: MetadataOutput::default(),
            fail: true,
        }
    }
}

#[async_trait]
impl MetadataExtractor for MockMetadataExtractor {
    async fn extract(&self, path: &Path) -> Result<MetadataOutput> {
        if self.fail {
            return Err(TraceVaultError::Extraction(format!(
                "mock metadata failure for {}",
                path.display()
            )));
        }
        Ok(self.output.clone())
    }
}

/// Mock frame extractor returning scripted locations.
#[derive(Debug, Default)]
pub struct MockFrameExtractor {
    locations: Vec<FrameLocation>,
    fail: bool,
}

impl MockFrameExtractor {
    /// A mock that yields `count` frame paths under the output directory.
    pub fn with_count(count: usize) -> Self {
        Self {
            locations: (1..=count)
                .map(|i| FrameLocation {
                    path: format!("frame_{:04}.jpg", i),
                    timestamp_sec: None,
                })
                .collect(),
            fail: false,
        }
    }

    pub fn with_locations(locations: Vec<FrameLocation>) -> Self {
        Self {
            locations,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            locations: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl FrameExtractor for MockFrameExtractor {
    async fn extract_frames(&self, path: &Path, output_dir: &Path) -> Result<Vec<FrameLocation>> {
        if self.fail {
            return Err(TraceVaultError::Extraction(format!(
                "mock frame-extraction failure for {}",
                path.display()
            )));
        }
        // Relative scripted paths resolve under the job scratch dir, the
        // same place the real extractor writes.
        Ok(self
            .locations
            .iter()
            .map(|loc| FrameLocation {
                path: output_dir.join(&loc.path).to_string_lossy().to_string(),
                timestamp_sec: loc.timestamp_sec,
            })
            .collect())
    }
}

/// Metadata extractor that fails on the Nth call and succeeds otherwise.
/// Used to exercise mid-pipeline failure behavior.
#[derive(Debug)]
pub struct FlakyMetadataExtractor {
    calls: AtomicUsize,
    fail_on_call: usize,
}

impl FlakyMetadataExtractor {
    pub fn fail_on_call(n: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on_call: n,
        }
    }
}

#[async_trait]
impl MetadataExtractor for FlakyMetadataExtractor {
    async fn extract(&self, _path: &Path) -> Result<MetadataOutput> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on_call {
            return Err(TraceVaultError::Extraction(format!(
                "injected failure on call {}",
                call
            )));
        }
        Ok(MetadataOutput::default())
    }
}
