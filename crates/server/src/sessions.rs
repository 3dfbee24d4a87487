//! Chat sessions held in process memory.
//!
//! Each session sits behind its own lock, so two turns on one id run one after the other and
//! both land in the same history. Sessions idle for longer than the configured window are
//! dropped on the next checkout; clients may also end a session explicitly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use maitre_agent::SessionContext;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;
use uuid::Uuid;

struct SessionSlot {
    context: Arc<Mutex<SessionContext>>,
    last_seen: Instant,
}

pub struct SessionStore {
    idle: Duration,
    slots: Mutex<HashMap<Uuid, SessionSlot>>,
}

impl SessionStore {
    pub fn new(idle: Duration) -> Self {
        Self { idle, slots: Mutex::new(HashMap::new()) }
    }

    /// Locks the session for one turn, creating it when `id` is absent or unknown.
    pub async fn checkout(&self, id: Option<Uuid>) -> OwnedMutexGuard<SessionContext> {
        let now = Instant::now();
        let context = {
            let mut slots = self.slots.lock().await;
            self.evict_idle(&mut slots, now);

            let id = id.unwrap_or_else(Uuid::new_v4);
            let slot = slots.entry(id).or_insert_with(|| SessionSlot {
                context: Arc::new(Mutex::new(SessionContext::with_id(id))),
                last_seen: now,
            });
            slot.last_seen = now;
            Arc::clone(&slot.context)
        };
        context.lock_owned().await
    }

    /// Restarts the idle clock once a turn is done.
    pub async fn touch(&self, id: Uuid) {
        if let Some(slot) = self.slots.lock().await.get_mut(&id) {
            slot.last_seen = Instant::now();
        }
    }

    pub async fn end(&self, id: Uuid) -> bool {
        self.slots.lock().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    // A slot whose lock is held or awaited has outstanding clones and is never evicted.
    fn evict_idle(&self, slots: &mut HashMap<Uuid, SessionSlot>, now: Instant) {
        let before = slots.len();
        slots.retain(|_, slot| {
            Arc::strong_count(&slot.context) > 1
                || now.saturating_duration_since(slot.last_seen) < self.idle
        });
        let evicted = before - slots.len();
        if evicted > 0 {
            info!(
                event_name = "server.session.evicted",
                evicted,
                remaining = slots.len(),
                "idle chat sessions dropped"
            );
        }
    }
}
