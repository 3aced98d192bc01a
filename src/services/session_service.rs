use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use uuid::Uuid;

/// Length of the polarity cycle.
pub const POLARITY_CYCLE: u64 = 5;

/// Required polarity for a zero-based absolute unit index. Positions 1, 3
/// and 5 of each cycle ask for a false statement, positions 2 and 4 for a
/// true one.
pub fn polarity_for_index(index: u64) -> bool {
    matches!(index % POLARITY_CYCLE, 1 | 3)
}

/// Holds the polarity position counter. Reusing a session keeps the cycle
/// running across batches; a fresh session starts it over.
#[derive(Debug)]
pub struct GenerationSession {
    id: Uuid,
    position: AtomicU64,
}

impl Default for GenerationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            position: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Claims the next unit position and returns the polarity it requires.
    pub fn next_polarity(&self) -> bool {
        polarity_for_index(self.position.fetch_add(1, Ordering::SeqCst))
    }

    /// Number of units claimed so far.
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.position.store(0, Ordering::SeqCst);
    }
}

/// Named sessions kept when no capacity is configured.
pub const DEFAULT_SESSION_CAPACITY: usize = 10_000;

struct TrackedSession {
    session: Arc<GenerationSession>,
    last_used: AtomicU64,
}

/// Named sessions for callers that want isolation, plus a shared default.
///
/// At most `capacity` named sessions are kept; creating one more evicts the
/// least recently used.
#[derive(Clone)]
pub struct SessionRegistry {
    default_session: Arc<GenerationSession>,
    sessions: Arc<RwLock<HashMap<Uuid, TrackedSession>>>,
    clock: Arc<AtomicU64>,
    capacity: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SESSION_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            default_session: Arc::new(GenerationSession::new()),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            clock: Arc::new(AtomicU64::new(0)),
            capacity: capacity.max(1),
        }
    }

    pub fn default_session(&self) -> Arc<GenerationSession> {
        self.default_session.clone()
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }

    pub fn create(&self) -> Arc<GenerationSession> {
        let session = Arc::new(GenerationSession::new());
        let mut sessions = self.sessions.write().expect("session registry lock poisoned");
        while sessions.len() >= self.capacity {
            let Some(idle) = sessions
                .iter()
                .min_by_key(|(_, t)| t.last_used.load(Ordering::SeqCst))
                .map(|(id, _)| *id)
            else {
                break;
            };
            sessions.remove(&idle);
            tracing::info!(session_id = %idle, "evicted least recently used session");
        }
        sessions.insert(
            session.id(),
            TrackedSession {
                session: session.clone(),
                last_used: AtomicU64::new(self.tick()),
            },
        );
        session
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<GenerationSession>> {
        if id == self.default_session.id() {
            return Some(self.default_session.clone());
        }
        let sessions = self.sessions.read().expect("session registry lock poisoned");
        let tracked = sessions.get(&id)?;
        tracked.last_used.store(self.tick(), Ordering::SeqCst);
        Some(tracked.session.clone())
    }

    /// Drops a named session. The default session cannot be removed.
    pub fn remove(&self, id: Uuid) -> bool {
        self.sessions
            .write()
            .expect("session registry lock poisoned")
            .remove(&id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().expect("session registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The named session, or the default one when no id is given.
    pub fn resolve(&self, id: Option<Uuid>) -> Option<Arc<GenerationSession>> {
        match id {
            Some(id) => self.get(id),
            None => Some(self.default_session()),
        }
    }
}
