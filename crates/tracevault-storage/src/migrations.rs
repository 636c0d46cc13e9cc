//! Database schema migrations.
//!
//! Applies the initial schema: evidence, metadata_reports, frames,
//! face_embeddings, scene_analyses, osint_matches, and the
//! schema_migrations tracking table. All child tables cascade on delete so
//! that removing an Evidence removes its entire entity tree.

use rusqlite::Connection;
use tracing::info;

use tracevault_core::error::TraceVaultError;

/// Run all pending database migrations.
///
/// Currently implements the initial schema (version 1). Future migrations
/// can be added by checking the current version and applying incremental changes.
pub fn run_migrations(conn: &Connection) -> Result<(), TraceVaultError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| TraceVaultError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| TraceVaultError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
///
/// Status and media type columns carry CHECK constraints on the exact wire
/// strings; these values are a durable contract with other services.
fn apply_v1(conn: &Connection) -> Result<(), TraceVaultError> {
    conn.execute_batch(
        "
        -- Root table: one row per uploaded item.
        CREATE TABLE IF NOT EXISTS evidence (
            id                  TEXT PRIMARY KEY NOT NULL,
            original_filename   TEXT NOT NULL,
            storage_path        TEXT NOT NULL,
            media_type          TEXT NOT NULL DEFAULT 'OTHER'
                                CHECK (media_type IN ('IMAGE', 'VIDEO', 'DOCUMENT', 'OTHER')),
            status              TEXT NOT NULL DEFAULT 'PENDING'
                                CHECK (status IN ('PENDING', 'METADATA_EXTRACTED',
                                                  'FRAMES_EXTRACTED', 'ANALYSIS_COMPLETE',
                                                  'FAILED')),
            uploaded_at         INTEGER NOT NULL,
            updated_at          INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_evidence_status
            ON evidence (status, updated_at ASC);

        -- Metadata/OCR extraction results. One report per evidence.
        CREATE TABLE IF NOT EXISTS metadata_reports (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            evidence_id         TEXT NOT NULL UNIQUE,
            extracted_metadata  TEXT,
            ocr_text            TEXT,
            processed_at        INTEGER NOT NULL,
            FOREIGN KEY (evidence_id) REFERENCES evidence(id) ON DELETE CASCADE
        );

        -- Analysis targets: the original image, or extracted video frames.
        CREATE TABLE IF NOT EXISTS frames (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            evidence_id         TEXT NOT NULL,
            frame_storage_path  TEXT NOT NULL,
            timestamp_sec       REAL,
            FOREIGN KEY (evidence_id) REFERENCES evidence(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_frames_evidence
            ON frames (evidence_id, id ASC);

        CREATE INDEX IF NOT EXISTS idx_frames_location
            ON frames (evidence_id, frame_storage_path);

        -- Detected faces with embedding vectors.
        CREATE TABLE IF NOT EXISTS face_embeddings (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            frame_id            INTEGER NOT NULL,
            embedding_vector    TEXT NOT NULL,
            bounding_box        TEXT NOT NULL,
            attributes          TEXT,
            FOREIGN KEY (frame_id) REFERENCES frames(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_face_embeddings_frame
            ON face_embeddings (frame_id);

        -- Scene classification. At most one row per frame.
        CREATE TABLE IF NOT EXISTS scene_analyses (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            frame_id                INTEGER NOT NULL UNIQUE,
            classification_scores   TEXT NOT NULL,
            FOREIGN KEY (frame_id) REFERENCES frames(id) ON DELETE CASCADE
        );

        -- Identity matches linking faces to external profiles.
        CREATE TABLE IF NOT EXISTS osint_matches (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            face_embedding_id   INTEGER NOT NULL,
            profile_name        TEXT NOT NULL,
            source_url          TEXT NOT NULL,
            platform            TEXT NOT NULL,
            similarity_score    REAL NOT NULL,
            extended_data       TEXT,
            matched_at          INTEGER NOT NULL,
            FOREIGN KEY (face_embedding_id) REFERENCES face_embeddings(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_osint_matches_face
            ON osint_matches (face_embedding_id, similarity_score DESC);

        -- Record migration.
        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| TraceVaultError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    #[test]
    fn test_migrations_run_once() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        // Running again should be idempotent.
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_evidence_table_exists() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO evidence (id, original_filename, storage_path, media_type, status, uploaded_at, updated_at)
             VALUES ('ev-1', 'photo.jpg', '/tmp/uploads/photo.jpg', 'IMAGE', 'PENDING', 1700000000, 1700000000)",
            [],
        )
        .unwrap();

        let status: String = conn
            .query_row("SELECT status FROM evidence WHERE id = 'ev-1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(status, "PENDING");
    }

    #[test]
    fn test_status_check_constraint() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO evidence (id, original_filename, storage_path, media_type, status, uploaded_at, updated_at)
             VALUES ('bad', 'x', '/x', 'IMAGE', 'DONE', 0, 0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_media_type_check_constraint() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO evidence (id, original_filename, storage_path, media_type, status, uploaded_at, updated_at)
             VALUES ('bad', 'x', '/x', 'AUDIO', 'PENDING', 0, 0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_frame_requires_live_evidence() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO frames (evidence_id, frame_storage_path) VALUES ('ghost', '/tmp/f.jpg')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_cascade_delete_full_tree() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO evidence (id, original_filename, storage_path, media_type, status, uploaded_at, updated_at)
             VALUES ('ev-1', 'clip.mp4', '/tmp/clip.mp4', 'VIDEO', 'ANALYSIS_COMPLETE', 0, 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO metadata_reports (evidence_id, extracted_metadata, ocr_text, processed_at)
             VALUES ('ev-1', '{}', NULL, 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO frames (id, evidence_id, frame_storage_path) VALUES (1, 'ev-1', '/tmp/f1.jpg')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO face_embeddings (id, frame_id, embedding_vector, bounding_box)
             VALUES (1, 1, '[0.1]', '{\"x\":0,\"y\":0,\"w\":1,\"h\":1}')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO scene_analyses (frame_id, classification_scores) VALUES (1, '[]')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO osint_matches (face_embedding_id, profile_name, source_url, platform, similarity_score, matched_at)
             VALUES (1, 'John Doe', 'https://example.com/jdoe', 'Twitter', 0.91, 0)",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM evidence WHERE id = 'ev-1'", [])
            .unwrap();

        for table in [
            "metadata_reports",
            "frames",
            "face_embeddings",
            "scene_analyses",
            "osint_matches",
        ] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })
                .unwrap();
            assert_eq!(count, 0, "{} should be empty after cascade", table);
        }
    }
}
