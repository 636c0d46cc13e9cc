//! Route handler functions for all API endpoints.
//!
//! Each handler extracts path/multipart input via axum extractors, reads or
//! writes through AppState, and returns JSON responses.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use tracevault_core::types::{Evidence, MediaType};
use tracevault_pipeline::JobState;
use tracevault_storage::queries::{EvidenceReport, ReportQueries, StatusSummary};
use tracevault_storage::repository::EvidenceRepository;

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub message: String,
    pub evidence_id: Uuid,
    pub job_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub state: JobState,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub status: &'static str,
    pub evidence_id: Uuid,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /api/upload
///
/// Accepts a multipart form with a single `file` field, stores the payload
/// under a UUID filename, creates the Evidence row in PENDING, and
/// dispatches one orchestration job. Returns 202 with both ids.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(|f| f.to_string())
            .filter(|f| !f.is_empty())
            .ok_or_else(|| ApiError::BadRequest("No file selected for uploading".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;
        file = Some((filename, bytes.to_vec()));
    }

    let (original_filename, bytes) = file
        .ok_or_else(|| ApiError::BadRequest("No file part in the request".to_string()))?;

    if bytes.len() > state.config.api.max_upload_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "{} bytes exceeds {} bytes",
            bytes.len(),
            state.config.api.max_upload_bytes
        )));
    }

    let media_type = MediaType::from_filename(&original_filename);

    // Store the payload under a fresh UUID, keeping the original extension.
    let extension = std::path::Path::new(&original_filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    let stored_name = format!("{}{}", Uuid::new_v4(), extension);
    let save_path = state.upload_dir.join(&stored_name);

    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to create upload dir: {}", e)))?;
    tokio::fs::write(&save_path, &bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to store upload: {}", e)))?;

    let evidence = Evidence::new(
        original_filename,
        save_path.to_string_lossy().to_string(),
        media_type,
    );
    let evidence_id = evidence.id;
    EvidenceRepository::new(Arc::clone(&state.database))
        .insert(&evidence)
        .map_err(ApiError::from)?;

    let handle = state
        .queue
        .enqueue(
            evidence_id,
            Duration::from_secs(state.config.queue.job_timeout_secs),
            Duration::from_secs(state.config.queue.result_ttl_secs),
        )
        .await
        .map_err(|e| {
            error!(evidence_id = %evidence_id, error = %e, "Failed to enqueue analysis job");
            ApiError::from(e)
        })?;

    info!(
        evidence_id = %evidence_id,
        job_id = %handle.job_id,
        media_type = %media_type,
        "Evidence uploaded and analysis job dispatched"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            status: "queued",
            message: "File uploaded and analysis job dispatched.".to_string(),
            evidence_id,
            job_id: handle.job_id,
        }),
    ))
}

/// GET /api/status/{evidence_id}
pub async fn evidence_status(
    State(state): State<AppState>,
    Path(evidence_id): Path<Uuid>,
) -> Result<Json<StatusSummary>, ApiError> {
    let summary = ReportQueries::new(Arc::clone(&state.database))
        .status_summary(evidence_id)
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("evidence {}", evidence_id)))?;
    Ok(Json(summary))
}

/// GET /api/report/{evidence_id}
pub async fn evidence_report(
    State(state): State<AppState>,
    Path(evidence_id): Path<Uuid>,
) -> Result<Json<EvidenceReport>, ApiError> {
    let report = ReportQueries::new(Arc::clone(&state.database))
        .full_report(evidence_id)
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("evidence {}", evidence_id)))?;
    Ok(Json(report))
}

/// GET /api/jobs/{job_id}
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job_state = state
        .queue
        .fetch(job_id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("job {}", job_id)))?;
    Ok(Json(JobStatusResponse {
        job_id,
        state: job_state,
    }))
}

/// DELETE /api/evidence/{evidence_id}
///
/// Administrative purge: removes the Evidence and every descendant row.
pub async fn delete_evidence(
    State(state): State<AppState>,
    Path(evidence_id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let deleted = EvidenceRepository::new(Arc::clone(&state.database))
        .delete(evidence_id)
        .map_err(ApiError::from)?;
    if !deleted {
        return Err(ApiError::NotFound(format!("evidence {}", evidence_id)));
    }
    info!(evidence_id = %evidence_id, "Evidence purged");
    Ok(Json(DeleteResponse {
        status: "deleted",
        evidence_id,
    }))
}
