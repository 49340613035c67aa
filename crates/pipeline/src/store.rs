use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::snapshot::TickerSnapshot;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("insert failed: {0}")]
    InsertFailed(String),
    #[error("pool error: {0}")]
    Pool(String),
    #[error("migration failed: {0}")]
    Migration(String),
}

/// Persistence writer for ticker snapshots.
///
/// One call, one INSERT. There is no natural-key constraint and no merge:
/// two calls always produce two rows, even for the same logical update.
#[async_trait]
pub trait TickerStore: Send + Sync {
    async fn insert(&self, snapshot: &TickerSnapshot) -> Result<(), StoreError>;
}

/// In-memory store for tests, with an injectable failure switch so the
/// withhold-ack path can be exercised.
pub struct MemoryTickerStore {
    rows: RwLock<Vec<TickerSnapshot>>,
    next_id: AtomicI64,
    fail_inserts: AtomicBool,
}

impl MemoryTickerStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
            fail_inserts: AtomicBool::new(false),
        }
    }

    /// Make subsequent inserts fail (true) or succeed (false).
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub async fn rows(&self) -> Vec<TickerSnapshot> {
        self.rows.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

impl Default for MemoryTickerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TickerStore for MemoryTickerStore {
    async fn insert(&self, snapshot: &TickerSnapshot) -> Result<(), StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::InsertFailed("injected failure".to_string()));
        }
        let mut row = snapshot.clone();
        row.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst));
        if row.created_at.is_none() {
            row.created_at = Some(chrono::Utc::now());
        }
        self.rows.write().await.push(row);
        Ok(())
    }
}
