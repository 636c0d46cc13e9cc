//! exiftool + tesseract backed metadata extraction.
//!
//! exiftool handles metadata for every media type (images, video,
//! documents); OCR is attempted only for image extensions. A metadata
//! failure is an extraction error; an OCR failure degrades to a missing
//! `ocr_text`, since many images legitimately carry no readable text and
//! tesseract availability varies by host.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use tracevault_core::config::ExtractConfig;
use tracevault_core::error::{Result, TraceVaultError};

use crate::{MetadataExtractor, MetadataOutput};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tiff", "gif"];

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Metadata extractor shelling out to exiftool and tesseract.
pub struct ExifToolExtractor {
    exiftool_path: String,
    tesseract_path: String,
}

impl ExifToolExtractor {
    pub fn new(config: &ExtractConfig) -> Self {
        Self {
            exiftool_path: config.exiftool_path.clone(),
            tesseract_path: config.tesseract_path.clone(),
        }
    }

    /// Run `exiftool -json -G` and parse its single-element JSON array.
    async fn extract_metadata(&self, path: &Path) -> Result<serde_json::Value> {
        let output = Command::new(&self.exiftool_path)
            .arg("-json")
            .arg("-G")
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                TraceVaultError::Extraction(format!(
                    "Failed to spawn exiftool ({}): {}",
                    self.exiftool_path, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TraceVaultError::Extraction(format!(
                "exiftool failed for {}: {}",
                path.display(),
                stderr.trim()
            )));
        }

        let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).map_err(|e| {
            TraceVaultError::Extraction(format!("Failed to parse exiftool output: {}", e))
        })?;

        // exiftool returns a list containing one object per input file.
        match parsed.as_array().and_then(|a| a.first()) {
            Some(first) => Ok(first.clone()),
            None => {
                warn!(path = %path.display(), "exiftool returned no metadata");
                Ok(serde_json::json!({}))
            }
        }
    }

    /// Run tesseract with stdout output. Any failure is logged and treated
    /// as "no text found".
    async fn extract_ocr(&self, path: &Path) -> Option<String> {
        let output = Command::new(&self.tesseract_path)
            .arg(path)
            .arg("stdout")
            .arg("-l")
            .arg("eng")
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {
                let text = String::from_utf8_lossy(&out.stdout).trim().to_string();
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
            Ok(out) => {
                warn!(
                    path = %path.display(),
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    "tesseract failed; continuing without OCR text"
                );
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to spawn tesseract");
                None
            }
        }
    }
}

#[async_trait]
impl MetadataExtractor for ExifToolExtractor {
    async fn extract(&self, path: &Path) -> Result<MetadataOutput> {
        if !path.exists() {
            return Err(TraceVaultError::Extraction(format!(
                "File not found: {}",
                path.display()
            )));
        }

        let metadata = self.extract_metadata(path).await?;

        let ocr_text = if is_image_file(path) {
            self.extract_ocr(path).await
        } else {
            None
        };

        info!(
            path = %path.display(),
            has_ocr = ocr_text.is_some(),
            "Metadata extraction complete"
        );

        Ok(MetadataOutput {
            metadata: Some(metadata),
            ocr_text,
        })
    }
}
