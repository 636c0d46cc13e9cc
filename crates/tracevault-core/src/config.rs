use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, TraceVaultError};

/// Top-level configuration for the TraceVault service.
///
/// Loaded from `~/.tracevault/config.toml` by default. Each section
/// corresponds to a bounded context or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceVaultConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

impl TraceVaultConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TraceVaultConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| TraceVaultError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite store and derived artifacts.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.tracevault/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Ingress API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API server port.
    pub port: u16,
    /// Directory uploaded files are saved to before analysis.
    pub upload_dir: String,
    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 3040,
            upload_dir: "~/.tracevault/uploads".to_string(),
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}

/// Analysis pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Fixed embedding dimensionality D for this deployment. Vectors of any
    /// other length are rejected before matching.
    pub embedding_dim: usize,
    /// Maximum scene categories persisted per frame (top-K).
    pub scene_top_k: usize,
    /// Cosine-distance threshold below which a candidate counts as a match.
    pub match_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 512,
            scene_top_k: 3,
            match_threshold: 0.45,
        }
    }
}

/// Metadata and frame extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Frames extracted per second of video.
    pub frame_fps: f64,
    /// Base directory for job-scoped frame scratch directories.
    pub frame_dir: String,
    /// exiftool binary; resolved via PATH when not absolute.
    pub exiftool_path: String,
    /// tesseract binary for OCR.
    pub tesseract_path: String,
    /// ffmpeg binary for frame extraction.
    pub ffmpeg_path: String,
    /// Wall-clock limit for one ffmpeg invocation.
    pub ffmpeg_timeout_secs: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            frame_fps: 1.0,
            frame_dir: "~/.tracevault/frames".to_string(),
            exiftool_path: "exiftool".to_string(),
            tesseract_path: "tesseract".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            ffmpeg_timeout_secs: 300,
        }
    }
}

/// Job queue and worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of worker tasks, each pulling one job at a time.
    pub workers: usize,
    /// Wall-clock timeout for one orchestration job.
    pub job_timeout_secs: u64,
    /// How long finished job results stay fetchable.
    pub result_ttl_secs: u64,
    /// Age after which a non-terminal Evidence is considered stalled and
    /// marked FAILED by the watchdog.
    pub watchdog_grace_secs: u64,
    /// Interval between watchdog scans.
    pub watchdog_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            job_timeout_secs: 7200,
            result_ttl_secs: 86400,
            watchdog_grace_secs: 10800,
            watchdog_interval_secs: 300,
        }
    }
}
