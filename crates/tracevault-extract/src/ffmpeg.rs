//! ffmpeg-backed video frame extraction.
//!
//! Samples frames at a fixed output rate into the job scratch directory
//! using the `frame_%04d.jpg` pattern, then lists the written files in
//! name order. An empty result is a valid success (video shorter than one
//! sample interval).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use tracevault_core::config::ExtractConfig;
use tracevault_core::error::{Result, TraceVaultError};

use crate::{FrameExtractor, FrameLocation};

/// Frame extractor shelling out to ffmpeg.
pub struct FfmpegFrameExtractor {
    ffmpeg_path: String,
    frame_fps: f64,
    timeout: Duration,
}

impl FfmpegFrameExtractor {
    pub fn new(config: &ExtractConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            frame_fps: config.frame_fps,
            timeout: Duration::from_secs(config.ffmpeg_timeout_secs),
        }
    }

    /// List extracted jpg files in the output directory, sorted by name.
    /// The %04d pattern makes name order frame order.
    fn collect_frames(output_dir: &Path) -> Result<Vec<FrameLocation>> {
        let mut paths: Vec<String> = std::fs::read_dir(output_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("jpg"))
                    .unwrap_or(false)
            })
            .map(|p| p.to_string_lossy().to_string())
            .collect();
        paths.sort();

        Ok(paths
            .into_iter()
            .map(|path| FrameLocation {
                path,
                timestamp_sec: None,
            })
            .collect())
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract_frames(&self, path: &Path, output_dir: &Path) -> Result<Vec<FrameLocation>> {
        if !path.exists() {
            return Err(TraceVaultError::Extraction(format!(
                "Video file not found: {}",
                path.display()
            )));
        }

        let output_pattern = output_dir.join("frame_%04d.jpg");

        let run = Command::new(&self.ffmpeg_path)
            .arg("-i")
            .arg(path)
            .arg("-r")
            .arg(self.frame_fps.to_string())
            .arg("-q:v")
            .arg("2")
            .arg(&output_pattern)
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                TraceVaultError::Extraction(format!(
                    "ffmpeg timed out after {}s for {}",
                    self.timeout.as_secs(),
                    path.display()
                ))
            })?
            .map_err(|e| {
                TraceVaultError::Extraction(format!(
                    "Failed to spawn ffmpeg ({}): {}",
                    self.ffmpeg_path, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TraceVaultError::Extraction(format!(
                "ffmpeg failed for {}: {}",
                path.display(),
                stderr.trim()
            )));
        }

        let frames = Self::collect_frames(output_dir)?;
        if frames.is_empty() {
            warn!(
                path = %path.display(),
                "ffmpeg succeeded but produced no frames; video may be too short"
            );
        } else {
            info!(path = %path.display(), count = frames.len(), "Extracted video frames");
        }

        Ok(frames)
    }
}
