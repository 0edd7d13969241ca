// ── TTL cache over durable storage ──
//
// Records are `{data, timestamp}` JSON documents under a fixed key prefix.
// Expiry is checked lazily on read; nothing sweeps in the background.
// Every failure is absorbed here: callers see an absent value, never an
// error, and must not depend on a save having persisted.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::storage::CacheStorage;
use crate::clock::SharedClock;

/// On-disk shape of one cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub data: Value,
    /// Milliseconds since the Unix epoch at which the record was stored.
    pub timestamp: i64,
}

impl CacheRecord {
    pub fn stored_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// Listing row for one stored record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntryInfo {
    /// Key without the namespace prefix.
    pub key: String,
    pub stored_at: Option<DateTime<Utc>>,
    pub age: Duration,
    pub expired: bool,
    pub size_bytes: usize,
}

/// Key/value cache with per-entry timestamps and a fixed TTL.
pub struct CacheStore {
    storage: Arc<dyn CacheStorage>,
    prefix: String,
    ttl: Duration,
    clock: SharedClock,
}

impl CacheStore {
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        prefix: impl Into<String>,
        ttl: Duration,
        clock: SharedClock,
    ) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    fn ttl_millis(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }

    fn is_expired(&self, record: &CacheRecord, now_ms: i64) -> bool {
        now_ms.saturating_sub(record.timestamp) > self.ttl_millis()
    }

    /// Read the record for `key`, or `None` if it is missing, unreadable,
    /// or older than the TTL. Expired and unreadable records are removed.
    pub fn load(&self, key: &str) -> Option<Value> {
        self.load_record(key).map(|r| r.data)
    }

    /// [`load`](Self::load) followed by typed decoding; a decoding failure
    /// is treated as a miss.
    pub fn load_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.load(key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                debug!(key, error = %e, "cached value has unexpected shape");
                None
            }
        }
    }

    pub fn load_record(&self, key: &str) -> Option<CacheRecord> {
        let storage_key = self.storage_key(key);
        let raw = match self.storage.get(&storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "cache read failed");
                return None;
            }
        };

        let record: CacheRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(key, error = %e, "discarding unreadable cache record");
                self.discard(&storage_key);
                return None;
            }
        };

        if self.is_expired(&record, self.clock.now_millis()) {
            debug!(key, "cache record expired");
            self.discard(&storage_key);
            return None;
        }

        Some(record)
    }

    /// Persist `value` under `key`, stamped with the current time.
    pub fn save(&self, key: &str, value: &Value) {
        let record = CacheRecord {
            data: value.clone(),
            timestamp: self.clock.now_millis(),
        };
        let serialized = match serde_json::to_string(&record) {
            Ok(s) => s,
            Err(e) => {
                warn!(key, error = %e, "cache record not serializable");
                return;
            }
        };
        if let Err(e) = self.storage.set(&self.storage_key(key), &serialized) {
            warn!(key, error = %e, "cache write failed");
        }
    }

    pub fn save_as<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(v) => self.save(key, &v),
            Err(e) => warn!(key, error = %e, "cache value not serializable"),
        }
    }

    /// Drop the record for `key` so later reads miss even before expiry.
    pub fn invalidate(&self, key: &str) {
        self.discard(&self.storage_key(key));
    }

    /// Describe every record under the namespace, without removing any.
    pub fn entries(&self) -> Vec<CacheEntryInfo> {
        let now_ms = self.clock.now_millis();
        let mut entries: Vec<CacheEntryInfo> = self
            .namespaced_keys()
            .into_iter()
            .filter_map(|storage_key| {
                let raw = self.storage.get(&storage_key).ok().flatten()?;
                let key = storage_key.strip_prefix(&self.prefix)?.to_owned();
                let record: Option<CacheRecord> = serde_json::from_str(&raw).ok();
                let (stored_at, age_ms, expired) = match &record {
                    Some(r) => (
                        r.stored_at(),
                        now_ms.saturating_sub(r.timestamp),
                        self.is_expired(r, now_ms),
                    ),
                    None => (None, 0, true),
                };
                Some(CacheEntryInfo {
                    key,
                    stored_at,
                    age: Duration::from_millis(u64::try_from(age_ms).unwrap_or(0)),
                    expired,
                    size_bytes: raw.len(),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// Remove expired or unreadable records. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let doomed: Vec<String> = self
            .entries()
            .into_iter()
            .filter(|e| e.expired)
            .map(|e| e.key)
            .collect();
        for key in &doomed {
            self.invalidate(key);
        }
        doomed.len()
    }

    /// Remove every record under the namespace. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let keys = self.namespaced_keys();
        for key in &keys {
            self.discard(key);
        }
        keys.len()
    }

    fn namespaced_keys(&self) -> Vec<String> {
        match self.storage.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter(|k| k.starts_with(&self.prefix))
                .collect(),
            Err(e) => {
                warn!(error = %e, "cache key listing failed");
                Vec::new()
            }
        }
    }

    fn discard(&self, storage_key: &str) {
        if let Err(e) = self.storage.remove(storage_key) {
            warn!(key = storage_key, error = %e, "cache removal failed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::storage::MemoryStorage;
    use crate::clock::Clock;
    use crate::error::StorageError;
    use chrono::{FixedOffset, TimeZone};
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, Ordering};

    const HOUR_MS: i64 = 60 * 60 * 1000;

    /// Clock that only moves when told to.
    struct ManualClock(AtomicI64);

    impl ManualClock {
        fn advance_hours(&self, hours: i64) {
            self.0.fetch_add(hours * HOUR_MS, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<FixedOffset> {
            let utc = Utc
                .timestamp_millis_opt(self.0.load(Ordering::SeqCst))
                .unwrap();
            utc.fixed_offset()
        }
    }

    struct FailingStorage;

    impl CacheStorage for FailingStorage {
        fn get(&self, _: &str) -> Result<Option<String>, StorageError> {
            Err(std::io::Error::other("disk on fire").into())
        }
        fn set(&self, _: &str, _: &str) -> Result<(), StorageError> {
            Err(StorageError::QuotaExceeded { needed: 1, limit: 0 })
        }
        fn remove(&self, _: &str) -> Result<(), StorageError> {
            Err(std::io::Error::other("disk on fire").into())
        }
        fn keys(&self) -> Result<Vec<String>, StorageError> {
            Err(std::io::Error::other("disk on fire").into())
        }
    }

    fn setup() -> (Arc<MemoryStorage>, Arc<ManualClock>, CacheStore) {
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(ManualClock(AtomicI64::new(1_760_000_000_000)));
        let cache = CacheStore::new(
            storage.clone(),
            "hearth-cache:",
            Duration::from_secs(24 * 60 * 60),
            clock.clone(),
        );
        (storage, clock, cache)
    }

    #[test]
    fn forecast_scenario_survives_23h_and_expires_at_25h() {
        let (storage, clock, cache) = setup();
        let key = "forecast:weather.home:daily";
        cache.save(key, &json!([{ "temp": 70 }]));

        clock.advance_hours(23);
        assert_eq!(cache.load(key), Some(json!([{ "temp": 70 }])));

        clock.advance_hours(2);
        assert_eq!(cache.load(key), None);
        // The expired read removed the record.
        assert!(storage.get("hearth-cache:forecast:weather.home:daily").unwrap().is_none());
    }

    #[test]
    fn keys_are_namespaced_with_record_shape() {
        let (storage, _, cache) = setup();
        cache.save("k", &json!({ "a": 1 }));

        let raw = storage.get("hearth-cache:k").unwrap().unwrap();
        let record: CacheRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.data, json!({ "a": 1 }));
        assert_eq!(record.timestamp, 1_760_000_000_000);
    }

    #[test]
    fn unreadable_record_is_absent_and_removed() {
        let (storage, _, cache) = setup();
        storage.set("hearth-cache:bad", "not json").unwrap();
        assert_eq!(cache.load("bad"), None);
        assert!(storage.get("hearth-cache:bad").unwrap().is_none());
    }

    #[test]
    fn storage_failures_are_absorbed() {
        let clock = Arc::new(ManualClock(AtomicI64::new(0)));
        let cache = CacheStore::new(
            Arc::new(FailingStorage),
            "p:",
            Duration::from_secs(60),
            clock,
        );
        cache.save("k", &json!(1));
        assert_eq!(cache.load("k"), None);
        assert!(cache.entries().is_empty());
        cache.invalidate("k");
    }

    #[test]
    fn quota_exceeded_save_leaves_previous_value_readable() {
        let storage = Arc::new(MemoryStorage::with_limit(64));
        let clock = Arc::new(ManualClock(AtomicI64::new(0)));
        let cache = CacheStore::new(storage, "p:", Duration::from_secs(60), clock);

        cache.save("k", &json!(1));
        cache.save("k", &json!("x".repeat(200)));
        assert_eq!(cache.load("k"), Some(json!(1)));
    }

    #[test]
    fn invalidate_forces_a_miss_before_expiry() {
        let (_, _, cache) = setup();
        cache.save("k", &json!(true));
        cache.invalidate("k");
        assert_eq!(cache.load("k"), None);
    }

    #[test]
    fn typed_helpers_round_trip_and_mismatch_is_a_miss() {
        let (_, _, cache) = setup();
        cache.save_as("nums", &vec![1, 2, 3]);
        assert_eq!(cache.load_as::<Vec<u32>>("nums"), Some(vec![1, 2, 3]));
        assert_eq!(cache.load_as::<String>("nums"), None);
    }

    #[test]
    fn entries_and_purge_expired() {
        let (storage, clock, cache) = setup();
        storage.set("someone-else:k", "{}").unwrap();
        cache.save("old", &json!(1));
        clock.advance_hours(25);
        cache.save("new", &json!(2));

        let entries = cache.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "new");
        assert!(!entries[0].expired);
        assert_eq!(entries[1].key, "old");
        assert!(entries[1].expired);

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.entries().len(), 1);

        assert_eq!(cache.clear(), 1);
        assert!(storage.get("someone-else:k").unwrap().is_some());
    }
}
