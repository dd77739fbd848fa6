use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use super::ChatSession;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

struct Slot {
    session: Arc<Mutex<ChatSession>>,
    last_used: Instant,
}

/// Live conversations of the HTTP server, each behind its own lock.
///
/// Sessions idle for longer than `idle_timeout` are evicted when new ones are
/// created, and the store never holds more than `max_sessions`. A session
/// whose handle is still held by a request is never evicted.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Slot>>>,
    max_turns: Option<usize>,
    idle_timeout: Duration,
    max_sessions: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SessionStore {
    pub fn new(max_turns: Option<usize>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_turns,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }

    pub fn with_limits(mut self, idle_timeout: Duration, max_sessions: usize) -> Self {
        self.idle_timeout = idle_timeout;
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// Returns the session for `id`, creating it when unknown or absent.
    pub async fn get_or_create(&self, id: Option<&str>) -> Arc<Mutex<ChatSession>> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();

        if let Some(slot) = id.and_then(|id| sessions.get_mut(id)) {
            slot.last_used = now;
            return slot.session.clone();
        }

        self.evict(&mut sessions, now);

        let mut session = match id {
            Some(id) => ChatSession::with_id(id, self.max_turns),
            None => ChatSession::new(self.max_turns),
        };
        session.start();
        let key = session.id.clone();
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(
            key,
            Slot {
                session: handle.clone(),
                last_used: now,
            },
        );
        handle
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Mutex<ChatSession>>> {
        let mut sessions = self.sessions.write().await;
        let slot = sessions.get_mut(id)?;
        slot.last_used = Instant::now();
        Some(slot.session.clone())
    }

    /// Closes and forgets the session; returns whether it existed.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(slot) => {
                let mut session = slot.session.lock().await;
                session.clear();
                session.close();
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drops idle sessions, then the least recently used ones until a new
    /// session fits under `max_sessions`.
    fn evict(&self, sessions: &mut HashMap<String, Slot>, now: Instant) {
        let before = sessions.len();
        sessions.retain(|_, slot| {
            in_use(slot) || now.duration_since(slot.last_used) < self.idle_timeout
        });

        while sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .filter(|(_, slot)| !in_use(slot))
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                }
                None => break,
            }
        }

        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = sessions.len(), "evicted chat sessions");
        }
    }
}

fn in_use(slot: &Slot) -> bool {
    Arc::strong_count(&slot.session) > 1
}
