// ── Persistent cache ──
//
// TTL-bounded records over pluggable durable storage.

mod storage;
mod store;

pub use storage::{CacheStorage, FileStorage, MemoryStorage};
pub use store::{CacheEntryInfo, CacheRecord, CacheStore};
