use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::models::batch::{BatchKey, BatchProgress};
use crate::services::coordinator_service::ProgressSink;

/// Batch keys kept when no capacity is configured.
pub const DEFAULT_PROGRESS_CAPACITY: usize = 1_000;

struct Entry {
    seq: u64,
    progress: BatchProgress,
}

#[derive(Default)]
struct Board {
    entries: HashMap<BatchKey, Entry>,
    next_seq: u64,
}

/// Latest progress per batch key, for polling clients. Only the `capacity`
/// most recently updated keys are kept.
#[derive(Clone)]
pub struct ProgressBoard {
    board: Arc<RwLock<Board>>,
    capacity: usize,
}

impl Default for ProgressBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_PROGRESS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            board: Arc::new(RwLock::new(Board::default())),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, key: &BatchKey, progress: BatchProgress) {
        let mut board = self.board.write().expect("progress board lock poisoned");
        let seq = board.next_seq;
        board.next_seq += 1;
        board.entries.insert(key.clone(), Entry { seq, progress });
        while board.entries.len() > self.capacity {
            let Some(stale) = board
                .entries
                .iter()
                .min_by_key(|(_, e)| e.seq)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            board.entries.remove(&stale);
        }
    }

    pub fn get(&self, key: &BatchKey) -> Option<BatchProgress> {
        self.board
            .read()
            .expect("progress board lock poisoned")
            .entries
            .get(key)
            .map(|e| e.progress.clone())
    }

    pub fn len(&self) -> usize {
        self.board.read().expect("progress board lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sink that records to this board and logs each step.
    pub fn sink(&self, key: BatchKey) -> ProgressSink {
        let board = self.clone();
        Arc::new(move |progress: BatchProgress| {
            tracing::info!(
                key = %key,
                current = progress.current,
                total = progress.total,
                errors = progress.errors.len(),
                "batch progress"
            );
            board.record(&key, progress);
        })
    }
}
