// ── Reactive entity store ──
//
// Lock-free entity storage fed by backend snapshots and push events.

mod collection;
mod entity_store;
mod refresh;

pub use entity_store::EntityStore;
