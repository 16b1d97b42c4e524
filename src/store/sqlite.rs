// SPDX-License-Identifier: MIT

//! SQLite-backed episodic store.
//!
//! Checkpoints are stored as JSON snapshots keyed by (run_id, step);
//! embeddings are little-endian f32 blobs scanned in Rust for the
//! nearest-neighbor query. Fine at the scale of one workflow per deployment.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    cosine_similarity, Checkpoint, CheckpointLog, EpisodicRecord, SimilarityIndex, StoreError,
};
use crate::engine::node::NodeName;
use crate::engine::state::{RunId, RunState};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS checkpoints (
    run_id     TEXT NOT NULL,
    step       INTEGER NOT NULL,
    node       TEXT NOT NULL,
    state      TEXT NOT NULL,
    error      TEXT,
    created_at TEXT NOT NULL,
    PRIMARY KEY (run_id, step)
);

CREATE TABLE IF NOT EXISTS episodic_records (
    run_id       TEXT PRIMARY KEY,
    article      TEXT NOT NULL,
    embedding    BLOB NOT NULL,
    published_at TEXT NOT NULL
);";

const INSERT_CHECKPOINT: &str = "INSERT INTO checkpoints \
    (run_id, step, node, state, error, created_at) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

/// Episodic store over a single SQLite database file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    /// Fresh store in memory. Used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Other("store mutex poisoned".to_string()))
    }
}

type RawCheckpoint = (i64, String, String, Option<String>, String);

fn decode_checkpoint(run_id: RunId, raw: RawCheckpoint) -> Result<Checkpoint, StoreError> {
    let (step, node, state, error, created_at) = raw;
    let node: NodeName = node.parse().map_err(StoreError::Other)?;
    let state: RunState = serde_json::from_str(&state)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| StoreError::Other(format!("bad checkpoint timestamp: {}", e)))?
        .with_timezone(&Utc);

    Ok(Checkpoint {
        run_id,
        step: step as u64,
        node,
        state,
        error,
        created_at,
    })
}

fn encode_embedding(values: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 4);
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[async_trait]
impl CheckpointLog for SqliteStore {
    async fn append(&self, checkpoint: Checkpoint) -> Result<(), StoreError> {
        let state = serde_json::to_string(&checkpoint.state)?;
        let conn = self.lock()?;
        conn.execute(
            INSERT_CHECKPOINT,
            params![
                checkpoint.run_id.to_string(),
                checkpoint.step as i64,
                checkpoint.node.as_str(),
                state,
                checkpoint.error,
                checkpoint.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn latest(&self, run_id: RunId) -> Result<Option<Checkpoint>, StoreError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT step, node, state, error, created_at FROM checkpoints \
                 WHERE run_id = ?1 ORDER BY step DESC LIMIT 1",
                params![run_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(Some(decode_checkpoint(run_id, raw)?)),
            None => Ok(None),
        }
    }

    async fn history(&self, run_id: RunId) -> Result<Vec<Checkpoint>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT step, node, state, error, created_at FROM checkpoints \
             WHERE run_id = ?1 ORDER BY step ASC",
        )?;
        let rows = stmt.query_map(params![run_id.to_string()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut checkpoints = Vec::new();
        for raw in rows {
            checkpoints.push(decode_checkpoint(run_id, raw?)?);
        }
        Ok(checkpoints)
    }

    async fn commit_published(
        &self,
        checkpoint: Checkpoint,
        record: EpisodicRecord,
    ) -> Result<(), StoreError> {
        let state = serde_json::to_string(&checkpoint.state)?;
        let embedding = encode_embedding(&record.embedding);

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            INSERT_CHECKPOINT,
            params![
                checkpoint.run_id.to_string(),
                checkpoint.step as i64,
                checkpoint.node.as_str(),
                state,
                checkpoint.error,
                checkpoint.created_at.to_rfc3339(),
            ],
        )?;
        tx.execute(
            "INSERT INTO episodic_records (run_id, article, embedding, published_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.run_id.to_string(),
                record.article,
                embedding,
                record.published_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }
}

#[async_trait]
impl SimilarityIndex for SqliteStore {
    async fn nearest(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<(EpisodicRecord, f32)>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT run_id, article, embedding, published_at FROM episodic_records")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut scored = Vec::new();
        for raw in rows {
            let (run_id, article, blob, published_at) = raw?;
            let record = EpisodicRecord {
                run_id: run_id
                    .parse()
                    .map_err(|e: uuid::Error| StoreError::Other(e.to_string()))?,
                article,
                embedding: decode_embedding(&blob),
                published_at: DateTime::parse_from_rfc3339(&published_at)
                    .map_err(|e| StoreError::Other(format!("bad record timestamp: {}", e)))?
                    .with_timezone(&Utc),
            };
            let score = cosine_similarity(embedding, &record.embedding);
            scored.push((record, score));
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}
