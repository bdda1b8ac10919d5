//! Durable store adapter and the background persistence task.
//!
//! DESIGN
//! ======
//! The replicated document is persisted as an opaque snapshot keyed by
//! project id through the narrow [`DocumentStore`] interface. A
//! background task flushes dirty rooms on a fixed interval, then sleeps
//! until the next cycle.
//!
//! ERROR HANDLING
//! ==============
//! Dirty flags are cleared only after a successful write, and only if the
//! document did not advance while the flush was in flight. Repeated
//! flush attempts are acceptable; silent data loss is not.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::state::AppState;

const DEFAULT_DOC_FLUSH_INTERVAL_MS: u64 = 500;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored snapshot is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Opaque write/read persistence for document snapshots.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(&self, project_id: Uuid) -> Result<Option<Vec<u8>>, StoreError>;
    async fn save(&self, project_id: Uuid, snapshot: &[u8]) -> Result<(), StoreError>;
}

// =============================================================================
// POSTGRES STORE
// =============================================================================

/// Snapshot persistence in a `documents` table, one JSONB row per project.
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn load(&self, project_id: Uuid) -> Result<Option<Vec<u8>>, StoreError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT snapshot FROM documents WHERE project_id = $1")
                .bind(project_id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((snapshot,)) => Ok(Some(serde_json::to_vec(&snapshot)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, project_id: Uuid, snapshot: &[u8]) -> Result<(), StoreError> {
        let value: serde_json::Value = serde_json::from_slice(snapshot)?;
        sqlx::query(
            "INSERT INTO documents (project_id, snapshot, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (project_id) DO UPDATE SET snapshot = EXCLUDED.snapshot, updated_at = now()",
        )
        .bind(project_id)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// Map-backed store for tests and single-process development runs.
pub struct MemoryDocumentStore {
    inner: Mutex<HashMap<Uuid, Vec<u8>>>,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Mutex::new(HashMap::new()) }
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn load(&self, project_id: Uuid) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.lock().expect("store mutex poisoned").get(&project_id).cloned())
    }

    async fn save(&self, project_id: Uuid, snapshot: &[u8]) -> Result<(), StoreError> {
        self.inner.lock().expect("store mutex poisoned").insert(project_id, snapshot.to_vec());
        Ok(())
    }
}

// =============================================================================
// BACKGROUND FLUSH
// =============================================================================

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Spawn the background persistence task. Returns a handle for shutdown.
pub fn spawn_flush_task(state: AppState) -> JoinHandle<()> {
    let flush_interval_ms = env_parse("DOC_FLUSH_INTERVAL_MS", DEFAULT_DOC_FLUSH_INTERVAL_MS);
    info!(flush_interval_ms, "document persistence flush configured");
    tokio::spawn(async move {
        loop {
            flush_dirty_rooms(&state).await;
            tokio::time::sleep(Duration::from_millis(flush_interval_ms)).await;
        }
    })
}

/// Snapshot every dirty room under the lock, write lock-free, then clear
/// the dirty flag only if the document did not advance in the meantime.
pub(crate) async fn flush_dirty_rooms(state: &AppState) {
    let batches = {
        let rooms = state.rooms.read().await;
        rooms
            .iter()
            .filter(|(_, room)| room.dirty)
            .map(|(project_id, room)| {
                (*project_id, replica::update::encode_snapshot(&room.doc.snapshot()), room.doc.current_clock())
            })
            .collect::<Vec<_>>()
    };

    for (project_id, snapshot, flushed_clock) in batches {
        match state.store.save(project_id, &snapshot).await {
            Ok(()) => {
                let mut rooms = state.rooms.write().await;
                if let Some(room) = rooms.get_mut(&project_id) {
                    // Keep the flag if writes landed mid-flush.
                    if room.doc.current_clock() == flushed_clock {
                        room.dirty = false;
                    }
                }
            }
            Err(e) => {
                error!(error = %e, %project_id, "document flush failed; room retained as dirty");
            }
        }
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
