//! ResultCache - pinned records and the auto-poll preference.
//!
//! Records are stored as JSON under a namespaced key. No expiry, no
//! eviction: a record lives until overwritten or until the backend drops it.
//! A stored value that no longer decodes reads as `NotFound`, never as a
//! crash.

pub mod store;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use store::{FileStore, KeyValueStore, MemoryStore};

use crate::error::{PortalError, Result};

const NAMESPACE: &str = "efti-portal";

#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache").finish_non_exhaustive()
    }
}

impl ResultCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    fn record_key(key: &str) -> String {
        format!("{NAMESPACE}:record:{key}")
    }

    fn flag_key(name: &str) -> String {
        format!("{NAMESPACE}:flag:{name}")
    }

    /// Store `record` under `key`, replacing any previous value.
    pub fn put<T: Serialize>(&self, key: &str, record: &T) -> Result<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| PortalError::Storage(format!("serializing {key}: {e}")))?;
        self.store.set(&Self::record_key(key), &json)?;
        tracing::debug!(key, bytes = json.len(), "Record cached");
        Ok(())
    }

    /// Read the record under `key`. Absent or undecodable values are
    /// `NotFound`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let Some(json) = self.store.get(&Self::record_key(key))? else {
            return Err(PortalError::not_found(key));
        };
        serde_json::from_str(&json).map_err(|e| {
            tracing::warn!(key, error = %e, "Cached record is not decodable, treating as absent");
            PortalError::not_found(key)
        })
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.store.remove(&Self::record_key(key))
    }

    pub fn set_flag(&self, name: &str, value: bool) -> Result<()> {
        let json = if value { "true" } else { "false" };
        self.store.set(&Self::flag_key(name), json)
    }

    /// Accessor for one flag, for handing to a scheduler as its enable check.
    pub fn flag_reader(&self, name: &str, default: bool) -> impl Fn() -> bool + Send + Sync + 'static {
        let cache = self.clone();
        let name = name.to_string();
        move || cache.get_flag(&name, default)
    }

    /// The stored flag, or `default` when unset, unreadable or not a bool.
    pub fn get_flag(&self, name: &str, default: bool) -> bool {
        match self.store.get(&Self::flag_key(name)) {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!(flag = name, error = %e, "Stored flag is not a bool, using default");
                default
            }),
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(flag = name, error = %e, "Flag read failed, using default");
                default
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_types::{Consignment, UsedTransportEquipment};

    fn record(dataset_id: &str) -> Consignment {
        let mut c = Consignment::new(dataset_id, "FR", "ttf");
        c.used_transport_equipment.push(UsedTransportEquipment {
            sequence_number: Some(1),
            category_code: Some("AE".into()),
            ..Default::default()
        });
        c.extra.insert("customField".into(), serde_json::json!({"kept": true}));
        c
    }

    #[test]
    fn put_then_get_returns_identical_record() {
        let cache = ResultCache::in_memory();
        let original = record("D1");
        cache.put("D1", &original).unwrap();

        let loaded: Consignment = cache.get("D1").unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn put_overwrites() {
        let cache = ResultCache::in_memory();
        cache.put("D1", &record("first")).unwrap();
        cache.put("D1", &record("second")).unwrap();
        let loaded: Consignment = cache.get("D1").unwrap();
        assert_eq!(loaded.dataset_id, "second");
    }

    #[test]
    fn unknown_key_is_not_found() {
        let cache = ResultCache::in_memory();
        let err = cache.get::<Consignment>("nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn undecodable_value_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        store.set("efti-portal:record:D1", "{not json").unwrap();
        let cache = ResultCache::new(store);
        assert!(cache.get::<Consignment>("D1").unwrap_err().is_not_found());
    }

    #[test]
    fn flag_defaults_until_set() {
        let cache = ResultCache::in_memory();
        assert!(!cache.get_flag("AUTO-POLLING", false));
        assert!(cache.get_flag("AUTO-POLLING", true));

        cache.set_flag("AUTO-POLLING", true).unwrap();
        assert!(cache.get_flag("AUTO-POLLING", false));
        cache.set_flag("AUTO-POLLING", false).unwrap();
        assert!(!cache.get_flag("AUTO-POLLING", true));
    }

    #[test]
    fn flag_reader_sees_later_writes() {
        let cache = ResultCache::in_memory();
        let enabled = cache.flag_reader("AUTO-POLLING", false);
        assert!(!enabled());
        cache.set_flag("AUTO-POLLING", true).unwrap();
        assert!(enabled());
    }

    #[test]
    fn garbage_flag_uses_default() {
        let store = Arc::new(MemoryStore::new());
        store.set("efti-portal:flag:AUTO-POLLING", "null").unwrap();
        let cache = ResultCache::new(store);
        assert!(cache.get_flag("AUTO-POLLING", true));
    }

    #[test]
    fn records_and_flags_do_not_collide() {
        let cache = ResultCache::in_memory();
        cache.set_flag("D1", true).unwrap();
        assert!(cache.get::<Consignment>("D1").is_err());
    }

    #[test]
    fn file_backed_cache_persists_records() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(Arc::new(FileStore::open(dir.path()).unwrap()));
        cache.put("D1", &record("D1")).unwrap();

        let reopened = ResultCache::new(Arc::new(FileStore::open(dir.path()).unwrap()));
        let loaded: Consignment = reopened.get("D1").unwrap();
        assert_eq!(loaded, record("D1"));
    }

    #[test]
    fn corrupt_file_entry_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(Arc::new(FileStore::open(dir.path()).unwrap()));
        cache.put("D1", &record("D1")).unwrap();
        cache.set_flag("AUTO-POLLING", true).unwrap();

        for key in ["efti-portal:record:D1", "efti-portal:flag:AUTO-POLLING"] {
            let file = dir.path().join(format!("{}.json", hex::encode(key)));
            std::fs::write(file, [0xff, 0xfe, 0x00]).unwrap();
        }

        assert!(cache.get::<Consignment>("D1").unwrap_err().is_not_found());
        assert!(!cache.get_flag("AUTO-POLLING", false));

        cache.put("D1", &record("D1")).unwrap();
        assert_eq!(cache.get::<Consignment>("D1").unwrap(), record("D1"));
    }
}
