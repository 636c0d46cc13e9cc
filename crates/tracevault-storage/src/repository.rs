//! Repository implementations for SQLite-backed persistence.
//!
//! One repository per persisted entity, all operating on the shared
//! Database wrapper with raw SQL. Write paths that belong to a larger unit
//! of work (the per-target fan-out commit, the frame batch insert) are
//! exposed as `*_with` associated functions taking a `&Connection`, so the
//! caller controls the transaction boundary.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use tracevault_core::error::TraceVaultError;
use tracevault_core::state::validate_transition;
use tracevault_core::types::{
    AnalysisStatus, BoundingBox, Embedding, Evidence, FaceEmbedding, Frame, MediaType,
    MetadataReport, OsintMatch, SceneAnalysis, SceneScore,
};

use crate::db::Database;

fn ts_to_datetime(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn storage_err<E: std::fmt::Display>(e: E) -> TraceVaultError {
    TraceVaultError::Storage(e.to_string())
}

fn row_to_evidence(row: &rusqlite::Row<'_>) -> Result<Evidence, TraceVaultError> {
    let id: String = row.get(0).map_err(storage_err)?;
    let original_filename: String = row.get(1).map_err(storage_err)?;
    let storage_path: String = row.get(2).map_err(storage_err)?;
    let media_type: String = row.get(3).map_err(storage_err)?;
    let status: String = row.get(4).map_err(storage_err)?;
    let uploaded_at: i64 = row.get(5).map_err(storage_err)?;
    let updated_at: i64 = row.get(6).map_err(storage_err)?;

    Ok(Evidence {
        id: Uuid::parse_str(&id)
            .map_err(|e| TraceVaultError::Storage(format!("Malformed evidence id {:?}: {}", id, e)))?,
        original_filename,
        storage_path,
        media_type: MediaType::parse(&media_type)?,
        status: AnalysisStatus::parse(&status)?,
        uploaded_at: ts_to_datetime(uploaded_at),
        updated_at: ts_to_datetime(updated_at),
    })
}

fn row_to_frame(row: &rusqlite::Row<'_>) -> Result<Frame, TraceVaultError> {
    let id: i64 = row.get(0).map_err(storage_err)?;
    let evidence_id: String = row.get(1).map_err(storage_err)?;
    let frame_storage_path: String = row.get(2).map_err(storage_err)?;
    let timestamp_sec: Option<f64> = row.get(3).map_err(storage_err)?;

    Ok(Frame {
        id,
        evidence_id: Uuid::parse_str(&evidence_id).map_err(storage_err)?,
        frame_storage_path,
        timestamp_sec,
    })
}

const EVIDENCE_COLUMNS: &str =
    "id, original_filename, storage_path, media_type, status, uploaded_at, updated_at";

/// Repository for Evidence root records.
pub struct EvidenceRepository {
    db: Arc<Database>,
}

impl EvidenceRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store a new Evidence record (ingress creates these in PENDING).
    pub fn insert(&self, evidence: &Evidence) -> Result<(), TraceVaultError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO evidence (id, original_filename, storage_path, media_type, status, uploaded_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    evidence.id.to_string(),
                    evidence.original_filename,
                    evidence.storage_path,
                    evidence.media_type.as_str(),
                    evidence.status.as_str(),
                    evidence.uploaded_at.timestamp(),
                    evidence.updated_at.timestamp(),
                ],
            )
            .map_err(|e| TraceVaultError::Storage(format!("Failed to insert evidence: {}", e)))?;
            Ok(())
        })
    }

    /// Find an Evidence record by id.
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Evidence>, TraceVaultError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    &format!("SELECT {} FROM evidence WHERE id = ?1", EVIDENCE_COLUMNS),
                    rusqlite::params![id.to_string()],
                    |row| Ok(row_to_evidence(row)),
                )
                .optional()
                .map_err(storage_err)?;

            match result {
                Some(evidence) => Ok(Some(evidence?)),
                None => Ok(None),
            }
        })
    }

    /// Advance the Evidence status, validating the transition against the
    /// state machine and touching `updated_at` in the same statement.
    ///
    /// The transition and its commit are one unit: a crash between stages
    /// leaves the status consistent with the last committed stage.
    pub fn update_status(
        &self,
        id: Uuid,
        to: AnalysisStatus,
    ) -> Result<(), TraceVaultError> {
        self.db.with_conn(|conn| {
            let current: Option<String> = conn
                .query_row(
                    "SELECT status FROM evidence WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage_err)?;

            let current = match current {
                Some(s) => AnalysisStatus::parse(&s)?,
                None => {
                    return Err(TraceVaultError::NotFound(format!("evidence {}", id)));
                }
            };

            validate_transition(current, to)?;

            conn.execute(
                "UPDATE evidence SET status = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![to.as_str(), Utc::now().timestamp(), id.to_string()],
            )
            .map_err(|e| TraceVaultError::Storage(format!("Failed to update status: {}", e)))?;
            Ok(())
        })
    }

    /// Delete an Evidence and, via cascade, all of its descendants.
    ///
    /// Returns false when no row with the given id existed.
    pub fn delete(&self, id: Uuid) -> Result<bool, TraceVaultError> {
        self.db.with_conn(|conn| {
            let affected = conn
                .execute(
                    "DELETE FROM evidence WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                )
                .map_err(|e| TraceVaultError::Storage(format!("Failed to delete evidence: {}", e)))?;
            Ok(affected > 0)
        })
    }

    /// Count all Evidence rows.
    pub fn count(&self) -> Result<u64, TraceVaultError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM evidence", [], |row| row.get(0))
                .map_err(storage_err)?;
            Ok(count as u64)
        })
    }

    /// Evidence stuck in a non-terminal status since before `cutoff`.
    /// Used by the watchdog to fail stalled jobs.
    pub fn list_stalled(&self, cutoff: DateTime<Utc>) -> Result<Vec<Evidence>, TraceVaultError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM evidence
                     WHERE status NOT IN ('ANALYSIS_COMPLETE', 'FAILED') AND updated_at < ?1
                     ORDER BY updated_at ASC",
                    EVIDENCE_COLUMNS
                ))
                .map_err(storage_err)?;

            let rows = stmt
                .query_map(rusqlite::params![cutoff.timestamp()], |row| {
                    Ok(row_to_evidence(row))
                })
                .map_err(storage_err)?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(storage_err)??);
            }
            Ok(out)
        })
    }
}

/// Repository for metadata/OCR extraction reports.
pub struct MetadataRepository {
    db: Arc<Database>,
}

impl MetadataRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Persist the metadata report for an Evidence. Both halves are
    /// independently nullable.
    pub fn insert(
        &self,
        evidence_id: Uuid,
        extracted_metadata: Option<&serde_json::Value>,
        ocr_text: Option<&str>,
    ) -> Result<i64, TraceVaultError> {
        let metadata_json = extracted_metadata
            .map(serde_json::to_string)
            .transpose()?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO metadata_reports (evidence_id, extracted_metadata, ocr_text, processed_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    evidence_id.to_string(),
                    metadata_json,
                    ocr_text,
                    Utc::now().timestamp(),
                ],
            )
            .map_err(|e| TraceVaultError::Storage(format!("Failed to insert metadata report: {}", e)))?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Find the metadata report for an Evidence, if one was committed.
    pub fn find_by_evidence(
        &self,
        evidence_id: Uuid,
    ) -> Result<Option<MetadataReport>, TraceVaultError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    "SELECT id, evidence_id, extracted_metadata, ocr_text, processed_at
                     FROM metadata_reports WHERE evidence_id = ?1",
                    rusqlite::params![evidence_id.to_string()],
                    |row| {
                        let id: i64 = row.get(0)?;
                        let evidence_id: String = row.get(1)?;
                        let metadata: Option<String> = row.get(2)?;
                        let ocr_text: Option<String> = row.get(3)?;
                        let processed_at: i64 = row.get(4)?;
                        Ok((id, evidence_id, metadata, ocr_text, processed_at))
                    },
                )
                .optional()
                .map_err(storage_err)?;

            match result {
                Some((id, evidence_id, metadata, ocr_text, processed_at)) => {
                    let extracted_metadata = metadata
                        .map(|m| serde_json::from_str(&m))
                        .transpose()
                        .map_err(storage_err)?;
                    Ok(Some(MetadataReport {
                        id,
                        evidence_id: Uuid::parse_str(&evidence_id).map_err(storage_err)?,
                        extracted_metadata,
                        ocr_text,
                        processed_at: ts_to_datetime(processed_at),
                    }))
                }
                None => Ok(None),
            }
        })
    }
}

/// Repository for Frame analysis targets.
pub struct FrameRepository {
    db: Arc<Database>,
}

impl FrameRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a Frame row on an existing connection, returning its
    /// generated id. Used inside the fan-out unit of work.
    pub fn insert_with(
        conn: &Connection,
        evidence_id: Uuid,
        frame_storage_path: &str,
        timestamp_sec: Option<f64>,
    ) -> Result<i64, TraceVaultError> {
        conn.execute(
            "INSERT INTO frames (evidence_id, frame_storage_path, timestamp_sec)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![evidence_id.to_string(), frame_storage_path, timestamp_sec],
        )
        .map_err(|e| TraceVaultError::Storage(format!("Failed to insert frame: {}", e)))?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert one Frame row per extracted location in input order, all in
    /// one transaction (the FRAMES_EXTRACTED stage commit).
    pub fn insert_batch(
        &self,
        evidence_id: Uuid,
        locations: &[(String, Option<f64>)],
    ) -> Result<Vec<i64>, TraceVaultError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(storage_err)?;
            let mut ids = Vec::with_capacity(locations.len());
            for (path, timestamp_sec) in locations {
                ids.push(Self::insert_with(&tx, evidence_id, path, *timestamp_sec)?);
            }
            tx.commit().map_err(storage_err)?;
            Ok(ids)
        })
    }

    /// Look up a Frame on an existing connection by its storage location.
    pub fn find_by_location_with(
        conn: &Connection,
        evidence_id: Uuid,
        frame_storage_path: &str,
    ) -> Result<Option<Frame>, TraceVaultError> {
        let result = conn
            .query_row(
                "SELECT id, evidence_id, frame_storage_path, timestamp_sec
                 FROM frames WHERE evidence_id = ?1 AND frame_storage_path = ?2",
                rusqlite::params![evidence_id.to_string(), frame_storage_path],
                |row| Ok(row_to_frame(row)),
            )
            .optional()
            .map_err(storage_err)?;

        match result {
            Some(frame) => Ok(Some(frame?)),
            None => Ok(None),
        }
    }

    /// Look up a Frame by its storage location.
    pub fn find_by_location(
        &self,
        evidence_id: Uuid,
        frame_storage_path: &str,
    ) -> Result<Option<Frame>, TraceVaultError> {
        self.db
            .with_conn(|conn| Self::find_by_location_with(conn, evidence_id, frame_storage_path))
    }

    /// All Frame rows for an Evidence, in insertion (target) order.
    pub fn list_for_evidence(&self, evidence_id: Uuid) -> Result<Vec<Frame>, TraceVaultError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, evidence_id, frame_storage_path, timestamp_sec
                     FROM frames WHERE evidence_id = ?1 ORDER BY id ASC",
                )
                .map_err(storage_err)?;

            let rows = stmt
                .query_map(rusqlite::params![evidence_id.to_string()], |row| {
                    Ok(row_to_frame(row))
                })
                .map_err(storage_err)?;

            let mut frames = Vec::new();
            for row in rows {
                frames.push(row.map_err(storage_err)??);
            }
            Ok(frames)
        })
    }

    /// Count Frame rows for an Evidence.
    pub fn count_for_evidence(&self, evidence_id: Uuid) -> Result<u64, TraceVaultError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM frames WHERE evidence_id = ?1",
                    rusqlite::params![evidence_id.to_string()],
                    |row| row.get(0),
                )
                .map_err(storage_err)?;
            Ok(count as u64)
        })
    }
}

/// Repository for detected face embeddings.
pub struct FaceRepository {
    db: Arc<Database>,
}

impl FaceRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a face row on an existing connection, returning its generated
    /// id (needed before identity matches can reference it).
    pub fn insert_with(
        conn: &Connection,
        frame_id: i64,
        embedding: &Embedding,
        bounding_box: &BoundingBox,
        attributes: Option<&serde_json::Value>,
    ) -> Result<i64, TraceVaultError> {
        let vector_json = serde_json::to_string(embedding).map_err(storage_err)?;
        let box_json = serde_json::to_string(bounding_box).map_err(storage_err)?;
        let attributes_json = attributes.map(serde_json::to_string).transpose().map_err(storage_err)?;

        conn.execute(
            "INSERT INTO face_embeddings (frame_id, embedding_vector, bounding_box, attributes)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![frame_id, vector_json, box_json, attributes_json],
        )
        .map_err(|e| TraceVaultError::Storage(format!("Failed to insert face embedding: {}", e)))?;
        Ok(conn.last_insert_rowid())
    }

    /// All faces detected in a frame.
    pub fn list_for_frame(&self, frame_id: i64) -> Result<Vec<FaceEmbedding>, TraceVaultError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, frame_id, embedding_vector, bounding_box, attributes
                     FROM face_embeddings WHERE frame_id = ?1 ORDER BY id ASC",
                )
                .map_err(storage_err)?;

            let rows = stmt
                .query_map(rusqlite::params![frame_id], |row| {
                    let id: i64 = row.get(0)?;
                    let frame_id: i64 = row.get(1)?;
                    let vector: String = row.get(2)?;
                    let bbox: String = row.get(3)?;
                    let attributes: Option<String> = row.get(4)?;
                    Ok((id, frame_id, vector, bbox, attributes))
                })
                .map_err(storage_err)?;

            let mut faces = Vec::new();
            for row in rows {
                let (id, frame_id, vector, bbox, attributes) = row.map_err(storage_err)?;
                faces.push(FaceEmbedding {
                    id,
                    frame_id,
                    embedding_vector: serde_json::from_str(&vector).map_err(storage_err)?,
                    bounding_box: serde_json::from_str(&bbox).map_err(storage_err)?,
                    attributes: attributes
                        .map(|a| serde_json::from_str(&a))
                        .transpose()
                        .map_err(storage_err)?,
                });
            }
            Ok(faces)
        })
    }
}

/// Repository for scene classification results.
pub struct SceneRepository {
    db: Arc<Database>,
}

impl SceneRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert the scene analysis for a frame on an existing connection.
    ///
    /// Scores are sorted by descending score and truncated to `top_k`
    /// at write time; the persisted array order is the invariant readers
    /// rely on.
    pub fn insert_with(
        conn: &Connection,
        frame_id: i64,
        mut scores: Vec<SceneScore>,
        top_k: usize,
    ) -> Result<i64, TraceVaultError> {
        scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scores.truncate(top_k);
        let scores_json = serde_json::to_string(&scores).map_err(storage_err)?;

        conn.execute(
            "INSERT INTO scene_analyses (frame_id, classification_scores) VALUES (?1, ?2)",
            rusqlite::params![frame_id, scores_json],
        )
        .map_err(|e| TraceVaultError::Storage(format!("Failed to insert scene analysis: {}", e)))?;
        Ok(conn.last_insert_rowid())
    }

    /// The scene analysis for a frame. Absence is a legitimate terminal
    /// state (the classifier returned no scores), not an error.
    pub fn find_by_frame(&self, frame_id: i64) -> Result<Option<SceneAnalysis>, TraceVaultError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    "SELECT id, frame_id, classification_scores
                     FROM scene_analyses WHERE frame_id = ?1",
                    rusqlite::params![frame_id],
                    |row| {
                        let id: i64 = row.get(0)?;
                        let frame_id: i64 = row.get(1)?;
                        let scores: String = row.get(2)?;
                        Ok((id, frame_id, scores))
                    },
                )
                .optional()
                .map_err(storage_err)?;

            match result {
                Some((id, frame_id, scores)) => Ok(Some(SceneAnalysis {
                    id,
                    frame_id,
                    classification_scores: serde_json::from_str(&scores).map_err(storage_err)?,
                })),
                None => Ok(None),
            }
        })
    }
}

/// Repository for identity-match results.
pub struct OsintMatchRepository {
    db: Arc<Database>,
}

impl OsintMatchRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert one match row on an existing connection.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_with(
        conn: &Connection,
        face_embedding_id: i64,
        profile_name: &str,
        source_url: &str,
        platform: &str,
        similarity_score: f64,
        extended_data: Option<&serde_json::Value>,
    ) -> Result<i64, TraceVaultError> {
        let extended_json = extended_data.map(serde_json::to_string).transpose().map_err(storage_err)?;

        conn.execute(
            "INSERT INTO osint_matches (face_embedding_id, profile_name, source_url, platform, similarity_score, extended_data, matched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                face_embedding_id,
                profile_name,
                source_url,
                platform,
                similarity_score,
                extended_json,
                Utc::now().timestamp(),
            ],
        )
        .map_err(|e| TraceVaultError::Storage(format!("Failed to insert osint match: {}", e)))?;
        Ok(conn.last_insert_rowid())
    }

    /// All matches recorded for a face, best first.
    pub fn list_for_face(&self, face_embedding_id: i64) -> Result<Vec<OsintMatch>, TraceVaultError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, face_embedding_id, profile_name, source_url, platform, similarity_score, extended_data, matched_at
                     FROM osint_matches WHERE face_embedding_id = ?1
                     ORDER BY similarity_score DESC, id ASC",
                )
                .map_err(storage_err)?;

            let rows = stmt
                .query_map(rusqlite::params![face_embedding_id], |row| {
                    let id: i64 = row.get(0)?;
                    let face_embedding_id: i64 = row.get(1)?;
                    let profile_name: String = row.get(2)?;
                    let source_url: String = row.get(3)?;
                    let platform: String = row.get(4)?;
                    let similarity_score: f64 = row.get(5)?;
                    let extended_data: Option<String> = row.get(6)?;
                    let matched_at: i64 = row.get(7)?;
                    Ok((
                        id,
                        face_embedding_id,
                        profile_name,
                        source_url,
                        platform,
                        similarity_score,
                        extended_data,
                        matched_at,
                    ))
                })
                .map_err(storage_err)?;

            let mut matches = Vec::new();
            for row in rows {
                let (id, face_embedding_id, profile_name, source_url, platform, similarity_score, extended_data, matched_at) =
                    row.map_err(storage_err)?;
                matches.push(OsintMatch {
                    id,
                    face_embedding_id,
                    profile_name,
                    source_url,
                    platform,
                    similarity_score,
                    extended_data: extended_data
                        .map(|d| serde_json::from_str(&d))
                        .transpose()
                        .map_err(storage_err)?,
                    matched_at: ts_to_datetime(matched_at),
                });
            }
            Ok(matches)
        })
    }
}
