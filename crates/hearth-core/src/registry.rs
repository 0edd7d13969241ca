// ── Subscription registry ──
//
// Routes entity-change notifications to the listeners interested in that
// entity id only. The registry owns no entity data, just routing.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{trace, warn};

use crate::model::{Entity, EntityId};

/// Callback invoked with an entity's new value (`None` on removal).
pub type Listener = Arc<dyn Fn(Option<&Arc<Entity>>) + Send + Sync>;

type ListenerSet = BTreeMap<u64, Listener>;

struct RegistryInner {
    listeners: DashMap<EntityId, ListenerSet>,
    next_listener: AtomicU64,
}

/// Entity id → set of listeners.
///
/// Cheaply cloneable; clones share the same routing table.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                listeners: DashMap::new(),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    /// Register `listener` for changes of `entity_id`.
    ///
    /// The listener stays registered until the returned guard is dropped
    /// or [`Subscription::unsubscribe`] is called.
    pub fn subscribe(
        &self,
        entity_id: impl Into<EntityId>,
        listener: impl Fn(Option<&Arc<Entity>>) + Send + Sync + 'static,
    ) -> Subscription {
        let entity_id = entity_id.into();
        let listener_id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .entry(entity_id.clone())
            .or_default()
            .insert(listener_id, Arc::new(listener));
        trace!(entity = %entity_id, listener_id, "listener subscribed");

        Subscription {
            registry: Arc::downgrade(&self.inner),
            entity_id,
            listener_id,
            active: true,
        }
    }

    /// Deliver a change to every current listener of `entity_id`.
    ///
    /// A panicking listener is logged and skipped; its siblings still
    /// receive the event. Returns how many listeners completed normally.
    pub fn notify(&self, entity_id: &EntityId, entity: Option<&Arc<Entity>>) -> usize {
        // Copy the listeners out so no shard lock is held while they run;
        // a listener may itself subscribe or unsubscribe.
        let targets: Vec<(u64, Listener)> = match self.inner.listeners.get(entity_id) {
            Some(set) => set.iter().map(|(id, l)| (*id, Arc::clone(l))).collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for (listener_id, listener) in targets {
            match catch_unwind(AssertUnwindSafe(|| listener(entity))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    warn!(entity = %entity_id, listener_id, "entity listener panicked");
                }
            }
        }
        delivered
    }

    pub fn listener_count(&self, entity_id: &EntityId) -> usize {
        self.inner
            .listeners
            .get(entity_id)
            .map_or(0, |set| set.len())
    }

    /// Ids with at least one listener.
    pub fn watched_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .inner
            .listeners
            .iter()
            .map(|r| r.key().clone())
            .collect();
        ids.sort();
        ids
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn remove_listener(inner: &RegistryInner, entity_id: &EntityId, listener_id: u64) {
    if let Entry::Occupied(mut set) = inner.listeners.entry(entity_id.clone()) {
        set.get_mut().remove(&listener_id);
        if set.get().is_empty() {
            set.remove();
        }
    }
}

/// Guard for one registered listener.
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    registry: Weak<RegistryInner>,
    entity_id: EntityId,
    listener_id: u64,
    active: bool,
}

impl Subscription {
    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// Remove exactly this listener. Idempotent.
    pub fn unsubscribe(&mut self) {
        if !std::mem::take(&mut self.active) {
            return;
        }
        if let Some(inner) = self.registry.upgrade() {
            remove_listener(&inner, &self.entity_id, self.listener_id);
            trace!(entity = %self.entity_id, listener_id = self.listener_id, "listener removed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(Option<&Arc<Entity>>) + Send + Sync + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        (hits, move |_: Option<&Arc<Entity>>| {
            h.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn entity(id: &str) -> Arc<Entity> {
        Arc::new(Entity::new(id, "on"))
    }

    #[test]
    fn delivers_only_to_listeners_of_that_id() {
        let registry = SubscriptionRegistry::new();
        let (a_hits, a) = counter();
        let (b_hits, b) = counter();
        let _sa = registry.subscribe("calendar.a", a);
        let _sb = registry.subscribe("calendar.b", b);

        let id = EntityId::from("calendar.a");
        assert_eq!(registry.notify(&id, Some(&entity("calendar.a"))), 1);
        assert_eq!(a_hits.load(Ordering::SeqCst), 1);
        assert_eq!(b_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn multiple_listeners_share_an_id() {
        let registry = SubscriptionRegistry::new();
        let (first, l1) = counter();
        let (second, l2) = counter();
        let _s1 = registry.subscribe("weather.home", l1);
        let _s2 = registry.subscribe("weather.home", l2);

        registry.notify(&EntityId::from("weather.home"), None);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_id_is_a_noop() {
        let registry = SubscriptionRegistry::new();
        assert_eq!(registry.notify(&EntityId::from("nobody.home"), None), 0);
    }

    #[test]
    fn unsubscribe_removes_exactly_one_listener_and_empty_sets() {
        let registry = SubscriptionRegistry::new();
        let (kept_hits, kept) = counter();
        let (_, dropped) = counter();
        let keep = registry.subscribe("weather.home", kept);
        let mut gone = registry.subscribe("weather.home", dropped);

        gone.unsubscribe();
        gone.unsubscribe();
        let id = EntityId::from("weather.home");
        assert_eq!(registry.listener_count(&id), 1);
        registry.notify(&id, None);
        assert_eq!(kept_hits.load(Ordering::SeqCst), 1);

        drop(keep);
        assert_eq!(registry.listener_count(&id), 0);
        assert!(registry.watched_ids().is_empty());
    }

    #[test]
    fn panicking_listener_does_not_block_siblings() {
        let registry = SubscriptionRegistry::new();
        let (hits, ok) = counter();
        let _bad = registry.subscribe("weather.home", |_: Option<&Arc<Entity>>| {
            panic!("listener bug");
        });
        let _good = registry.subscribe("weather.home", ok);

        let delivered = registry.notify(&EntityId::from("weather.home"), None);
        assert_eq!(delivered, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_may_unsubscribe_itself_during_delivery() {
        let registry = SubscriptionRegistry::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let inner_slot = Arc::clone(&slot);
        let sub = registry.subscribe("sensor.x", move |_: Option<&Arc<Entity>>| {
            inner_slot.lock().unwrap().take();
        });
        *slot.lock().unwrap() = Some(sub);

        registry.notify(&EntityId::from("sensor.x"), None);
        assert_eq!(registry.listener_count(&EntityId::from("sensor.x")), 0);
    }

    #[test]
    fn guard_outliving_registry_is_harmless() {
        let registry = SubscriptionRegistry::new();
        let (_, l) = counter();
        let sub = registry.subscribe("sensor.x", l);
        drop(registry);
        drop(sub);
    }
}
