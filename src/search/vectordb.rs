//! Persistent projection index using SQLite
//!
//! Stores each post's embedding as a BLOB next to its 2D projection, keyed
//! on a corpus fingerprint so a later process can skip retraining when the
//! keyword corpus has not changed.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use super::engine::EmbeddingSpace;
use crate::core::model::PostId;

/// On-disk cache of computed embedding spaces
pub struct IndexStore {
    conn: Connection,
}

impl IndexStore {
    /// Open or create database at path
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS projections (
                post_id INTEGER PRIMARY KEY,
                position INTEGER NOT NULL,
                title TEXT NOT NULL,
                x REAL NOT NULL,
                y REAL NOT NULL,
                vector BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_projections_position ON projections(position);
            "#,
        )?;

        Ok(())
    }

    /// Replace the stored space. `titles` runs parallel to `space.ids`.
    pub fn save_space(
        &mut self,
        space: &EmbeddingSpace,
        titles: &[&str],
        fingerprint: &str,
        params: &str,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM projections", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO projections (post_id, position, title, x, y, vector)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (position, id) in space.ids.iter().enumerate() {
                let [x, y] = space.points[position];
                stmt.execute(params![
                    id.0 as i64,
                    position as i64,
                    titles.get(position).copied().unwrap_or_default(),
                    x,
                    y,
                    embedding_to_blob(&space.vectors[position]),
                ])?;
            }
        }

        let built_at = chrono::Utc::now().timestamp().to_string();
        for (key, value) in [
            ("fingerprint", fingerprint.to_string()),
            ("params", params.to_string()),
            ("seed", space.seed.to_string()),
            ("built_at", built_at),
            ("post_count", space.ids.len().to_string()),
        ] {
            tx.execute(
                "INSERT INTO index_meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
        }
        tx.commit()?;

        Ok(())
    }

    /// Stored space, if it was built from this fingerprint with these params.
    pub fn load_space(&self, fingerprint: &str, params: &str) -> Result<Option<EmbeddingSpace>> {
        if self.get_meta("fingerprint")?.as_deref() != Some(fingerprint)
            || self.get_meta("params")?.as_deref() != Some(params)
        {
            return Ok(None);
        }
        let Some(seed) = self.get_meta("seed")?.and_then(|s| s.parse().ok()) else {
            return Ok(None);
        };

        let mut stmt = self
            .conn
            .prepare("SELECT post_id, x, y, vector FROM projections ORDER BY position")?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let x: f64 = row.get(1)?;
            let y: f64 = row.get(2)?;
            let blob: Vec<u8> = row.get(3)?;
            Ok((PostId(id as u64), [x, y], blob_to_embedding(&blob)))
        })?;

        let mut space = EmbeddingSpace {
            seed,
            ..EmbeddingSpace::default()
        };
        for row in rows {
            let (id, point, vector) = row?;
            space.ids.push(id);
            space.points.push(point);
            space.vectors.push(vector);
        }

        Ok(Some(space))
    }

    pub fn get_stats(&self) -> Result<IndexStats> {
        let post_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM projections", [], |row| row.get(0))?;

        Ok(IndexStats {
            post_count: post_count as usize,
            fingerprint: self.get_meta("fingerprint")?,
            seed: self.get_meta("seed")?.and_then(|s| s.parse().ok()),
            built_at: self.get_meta("built_at")?.and_then(|s| s.parse().ok()),
        })
    }

    /// Get index metadata
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| e.into())
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexStats {
    pub post_count: usize,
    pub fingerprint: Option<String>,
    pub seed: Option<u64>,
    pub built_at: Option<i64>,
}

/// Convert f32 embedding to BLOB
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        blob.extend_from_slice(&val.to_le_bytes());
    }
    blob
}

/// Convert BLOB to f32 embedding
fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
