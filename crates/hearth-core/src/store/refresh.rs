// ── Snapshot application logic ──
//
// Seeds the entity store from the backend's synchronous snapshot when a
// connection is attached, and applies individual push events afterwards.

use std::collections::HashSet;

use chrono::Utc;

use super::EntityStore;
use crate::backend::PushEvent;
use crate::model::{Entity, EntityId};

impl EntityStore {
    /// Replace the store contents with a full snapshot.
    ///
    /// Upserts every incoming entity, then prunes ids absent from the
    /// snapshot. This avoids the brief empty state a clear-then-insert
    /// would expose to subscribers.
    pub(crate) fn apply_snapshot(&self, entities: Vec<Entity>) {
        let incoming: HashSet<EntityId> = entities.iter().map(|e| e.entity_id.clone()).collect();
        for entity in entities {
            self.entities.upsert(entity.entity_id.clone(), entity);
        }
        for existing in self.entities.keys() {
            if !incoming.contains(&existing) {
                self.entities.remove(&existing);
            }
        }
        self.last_snapshot.send_replace(Some(Utc::now()));
    }

    /// Apply one push event (last write wins). Returns the entity's new
    /// value, or `None` when the event removed it.
    pub(crate) fn apply_push(&self, event: PushEvent) -> Option<std::sync::Arc<Entity>> {
        self.last_push.send_replace(Some(Utc::now()));
        match event.new_state {
            Some(entity) => Some(self.entities.upsert(event.entity_id, entity)),
            None => {
                self.entities.remove(&event.entity_id);
                None
            }
        }
    }
}
