// ── Live entity store ──
//
// Thread-safe, lock-free storage for the current value of every entity.
// Mutated only by the backend snapshot and push events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::collection::Collection;
use crate::model::{Entity, EntityId};

/// Current value of every entity known to the session.
pub struct EntityStore {
    pub(crate) entities: Collection<EntityId, Entity>,
    pub(crate) last_snapshot: watch::Sender<Option<DateTime<Utc>>>,
    pub(crate) last_push: watch::Sender<Option<DateTime<Utc>>>,
}

impl EntityStore {
    pub fn new() -> Self {
        let (last_snapshot, _) = watch::channel(None);
        let (last_push, _) = watch::channel(None);
        Self {
            entities: Collection::new(),
            last_snapshot,
            last_push,
        }
    }

    pub fn get(&self, id: &EntityId) -> Option<Arc<Entity>> {
        self.entities.get(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.len() == 0
    }

    // ── Metadata ─────────────────────────────────────────────────────

    pub fn last_snapshot(&self) -> Option<DateTime<Utc>> {
        *self.last_snapshot.borrow()
    }

    pub fn last_push(&self) -> Option<DateTime<Utc>> {
        *self.last_push.borrow()
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}
