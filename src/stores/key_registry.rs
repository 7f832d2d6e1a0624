use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::error::{KeyError, StoreError};
use crate::models::id::{IdGenerator, RecordId};
use crate::models::key::{KeyRecord, KeyStats, Possession, StatusFilter};
use crate::stores::kv::{load_record, save_record, KeyValueStore, KEYS_RECORD};
use crate::utils::barcode::generate_key_barcode;
use crate::utils::time::{current_timestamp_millis, today};
use crate::validation::fields::require_non_blank;

/// Office keys and their issue/return lifecycle
///
/// ```text
/// available --issue--> issued --return--> available
/// available|issued --mark_lost--> lost --recover--> available
/// ```
///
/// Every mutation is written through to the `keys_data` record.
pub struct KeyRegistry {
    keys: DashMap<RecordId, Arc<KeyRecord>>,
    store: Arc<dyn KeyValueStore>,
    ids: IdGenerator,
    barcode_prefix: String,
}

impl KeyRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>, barcode_prefix: impl Into<String>) -> Self {
        Self {
            keys: DashMap::new(),
            store,
            ids: IdGenerator::new(),
            barcode_prefix: barcode_prefix.into(),
        }
    }

    /// Replace the in-memory keys with the stored list
    ///
    /// Returns `false` when the record has never been written. Entries
    /// that violate the key invariants are skipped with a warning.
    pub fn load(&self) -> Result<bool, StoreError> {
        let Some(raw) = load_record::<Vec<serde_json::Value>>(self.store.as_ref(), KEYS_RECORD)?
        else {
            return Ok(false);
        };

        self.keys.clear();
        for (position, value) in raw.into_iter().enumerate() {
            match serde_json::from_value::<KeyRecord>(value) {
                Ok(record) => {
                    self.ids.observe(record.id);
                    self.keys.insert(record.id, Arc::new(record));
                }
                Err(e) => {
                    warn!(position, error = %e, "Skipping invalid stored key");
                }
            }
        }
        Ok(true)
    }

    /// Register a new available key with a generated barcode
    pub fn add(&self, office: &str, department: &str) -> Result<Arc<KeyRecord>, KeyError> {
        let office = require_non_blank("office", office)?;
        let department = require_non_blank("department", department)?;

        let id = self.ids.next_id()?;
        let barcode = generate_key_barcode(&self.barcode_prefix, current_timestamp_millis());
        let record = Arc::new(KeyRecord::new(
            id,
            office.to_string(),
            department.to_string(),
            Some(barcode),
        ));

        self.keys.insert(id, Arc::clone(&record));
        self.write_through();

        info!(key_id = %id, office, department, "Key added");
        Ok(record)
    }

    /// Insert a fully formed record, replacing any key with the same id
    pub fn insert(&self, record: KeyRecord) -> Arc<KeyRecord> {
        self.ids.observe(record.id);
        let record = Arc::new(record);
        self.keys.insert(record.id, Arc::clone(&record));
        self.write_through();
        record
    }

    pub fn issue(&self, id: RecordId, recipient: &str) -> Result<Arc<KeyRecord>, KeyError> {
        let recipient = require_non_blank("recipient", recipient)?;

        let record = self.transition(id, "issue", |possession| match possession {
            Possession::Available => Some(Possession::Issued {
                to: recipient.to_string(),
                at: today(),
            }),
            Possession::Issued { .. } | Possession::Lost => None,
        })?;

        info!(key_id = %id, office = %record.office, issued_to = recipient, "Key issued");
        Ok(record)
    }

    pub fn return_key(&self, id: RecordId) -> Result<Arc<KeyRecord>, KeyError> {
        let record = self.transition(id, "return", |possession| match possession {
            Possession::Issued { .. } => Some(Possession::Available),
            Possession::Available | Possession::Lost => None,
        })?;

        info!(key_id = %id, office = %record.office, "Key returned");
        Ok(record)
    }

    /// Report a key as lost; a holder, if any, is dropped
    pub fn mark_lost(&self, id: RecordId) -> Result<Arc<KeyRecord>, KeyError> {
        let record = self.transition(id, "mark lost", |possession| match possession {
            Possession::Available | Possession::Issued { .. } => Some(Possession::Lost),
            Possession::Lost => None,
        })?;

        warn!(key_id = %id, office = %record.office, "Key marked lost");
        Ok(record)
    }

    /// Bring a lost key back into circulation
    pub fn recover(&self, id: RecordId) -> Result<Arc<KeyRecord>, KeyError> {
        let record = self.transition(id, "recover", |possession| match possession {
            Possession::Lost => Some(Possession::Available),
            Possession::Available | Possession::Issued { .. } => None,
        })?;

        info!(key_id = %id, office = %record.office, "Key recovered");
        Ok(record)
    }

    /// Remove a key; returns the removed record if it existed
    pub fn delete(&self, id: RecordId) -> Option<Arc<KeyRecord>> {
        let removed = self.keys.remove(&id).map(|(_, record)| record);
        if let Some(record) = &removed {
            self.write_through();
            info!(key_id = %id, office = %record.office, "Key deleted");
        }
        removed
    }

    pub fn get(&self, id: RecordId) -> Option<Arc<KeyRecord>> {
        self.keys.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// All keys in creation order
    pub fn list(&self) -> Vec<Arc<KeyRecord>> {
        let mut keys: Vec<Arc<KeyRecord>> =
            self.keys.iter().map(|entry| Arc::clone(entry.value())).collect();
        keys.sort_by_key(|record| record.id);
        keys
    }

    pub fn filter(&self, search: &str, status: StatusFilter) -> Vec<Arc<KeyRecord>> {
        let needle = search.trim().to_lowercase();
        self.list()
            .into_iter()
            .filter(|record| status.accepts(record.status()) && record.matches_search(&needle))
            .collect()
    }

    /// Keys currently issued to the named holder
    pub fn held_by(&self, holder: &str) -> Vec<Arc<KeyRecord>> {
        let holder = holder.trim().to_lowercase();
        if holder.is_empty() {
            return Vec::new();
        }
        self.list()
            .into_iter()
            .filter(|record| {
                record
                    .issued_to()
                    .is_some_and(|to| to.trim().to_lowercase() == holder)
            })
            .collect()
    }

    pub fn stats(&self) -> KeyStats {
        let mut stats = KeyStats::default();
        for entry in self.keys.iter() {
            stats.record(entry.value().status());
        }
        stats
    }

    /// Write the full key list to the store
    pub fn persist(&self) -> Result<(), StoreError> {
        let keys: Vec<KeyRecord> = self.list().iter().map(|record| (**record).clone()).collect();
        save_record(self.store.as_ref(), KEYS_RECORD, &keys)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Apply a possession change; `next` returns `None` for illegal moves
    fn transition<F>(
        &self,
        id: RecordId,
        action: &'static str,
        next: F,
    ) -> Result<Arc<KeyRecord>, KeyError>
    where
        F: FnOnce(&Possession) -> Option<Possession>,
    {
        let updated = {
            let mut entry = self.keys.get_mut(&id).ok_or(KeyError::NotFound(id))?;
            let possession = next(&entry.possession).ok_or(KeyError::InvalidTransition {
                id,
                status: entry.status(),
                action,
            })?;

            let mut record = KeyRecord::clone(entry.value());
            record.possession = possession;
            let record = Arc::new(record);
            *entry.value_mut() = Arc::clone(&record);
            record
        };

        self.write_through();
        Ok(updated)
    }

    fn write_through(&self) {
        if let Err(e) = self.persist() {
            warn!(error = %e, "Failed to write keys to store");
            // Continue anyway - memory is updated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::key::KeyStatus;
    use crate::stores::kv::MemoryStore;

    fn registry() -> (Arc<MemoryStore>, KeyRegistry) {
        let store = Arc::new(MemoryStore::new());
        let registry = KeyRegistry::new(store.clone(), "KEY");
        (store, registry)
    }

    #[test]
    fn test_add_creates_available_key_with_barcode() {
        let (_, keys) = registry();
        let key = keys.add("  301 ", "IT").unwrap();

        assert_eq!(key.office, "301");
        assert_eq!(key.status(), KeyStatus::Available);
        assert_eq!(key.issued_to(), None);
        let barcode = key.barcode.as_deref().unwrap();
        assert!(barcode.starts_with("KEY"));
        assert_eq!(barcode.len(), 14);
    }

    #[test]
    fn test_add_rejects_blank_fields() {
        let (_, keys) = registry();
        assert!(matches!(keys.add("  ", "IT"), Err(KeyError::Validation(_))));
        assert!(matches!(keys.add("301", ""), Err(KeyError::Validation(_))));
        assert!(keys.is_empty());
    }

    #[test]
    fn test_add_after_highest_possible_id_fails() {
        let (_, keys) = registry();
        keys.insert(KeyRecord::new(
            RecordId(u64::MAX),
            "999".to_string(),
            "IT".to_string(),
            None,
        ));

        assert!(matches!(keys.add("301", "IT"), Err(KeyError::IdsExhausted(_))));
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn test_issue_then_return_round_trip() {
        let (_, keys) = registry();
        let key = keys.add("301", "IT").unwrap();

        let issued = keys.issue(key.id, "Petrov").unwrap();
        assert_eq!(issued.status(), KeyStatus::Issued);
        assert_eq!(issued.issued_to(), Some("Petrov"));
        assert_eq!(issued.issued_at(), Some(today().as_str()));

        let returned = keys.return_key(key.id).unwrap();
        assert_eq!(returned.status(), KeyStatus::Available);
        assert_eq!(returned.issued_to(), None);
        assert_eq!(returned.issued_at(), None);
        assert_eq!(*returned, *key);
    }

    #[test]
    fn test_issue_rejected_unless_available() {
        let (_, keys) = registry();
        let key = keys.add("301", "IT").unwrap();
        keys.issue(key.id, "Petrov").unwrap();

        let err = keys.issue(key.id, "Sidorov").unwrap_err();
        assert_eq!(
            err,
            KeyError::InvalidTransition {
                id: key.id,
                status: KeyStatus::Issued,
                action: "issue",
            }
        );
        assert_eq!(keys.get(key.id).unwrap().issued_to(), Some("Petrov"));

        keys.mark_lost(key.id).unwrap();
        assert!(matches!(
            keys.issue(key.id, "Sidorov"),
            Err(KeyError::InvalidTransition { status: KeyStatus::Lost, .. })
        ));
        assert_eq!(keys.get(key.id).unwrap().status(), KeyStatus::Lost);
    }

    #[test]
    fn test_issue_blank_recipient_changes_nothing() {
        let (_, keys) = registry();
        let key = keys.add("301", "IT").unwrap();

        assert!(matches!(keys.issue(key.id, "   "), Err(KeyError::Validation(_))));
        assert_eq!(keys.get(key.id).unwrap().status(), KeyStatus::Available);
    }

    #[test]
    fn test_return_requires_issued() {
        let (_, keys) = registry();
        let key = keys.add("302", "IT").unwrap();

        assert!(matches!(
            keys.return_key(key.id),
            Err(KeyError::InvalidTransition { status: KeyStatus::Available, .. })
        ));
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let (_, keys) = registry();
        let missing = RecordId(99);
        assert_eq!(keys.issue(missing, "Petrov").unwrap_err(), KeyError::NotFound(missing));
        assert_eq!(keys.return_key(missing).unwrap_err(), KeyError::NotFound(missing));
        assert_eq!(keys.recover(missing).unwrap_err(), KeyError::NotFound(missing));
    }

    #[test]
    fn test_lost_key_can_be_recovered() {
        let (_, keys) = registry();
        let key = keys.add("101", "Security").unwrap();
        keys.issue(key.id, "Guard").unwrap();

        let lost = keys.mark_lost(key.id).unwrap();
        assert_eq!(lost.status(), KeyStatus::Lost);
        assert_eq!(lost.issued_to(), None);
        assert!(keys.mark_lost(key.id).is_err());
        assert!(keys.return_key(key.id).is_err());

        let recovered = keys.recover(key.id).unwrap();
        assert_eq!(recovered.status(), KeyStatus::Available);
        assert!(keys.recover(key.id).is_err());
    }

    #[test]
    fn test_delete_removes_exactly_one() {
        let (_, keys) = registry();
        let a = keys.add("301", "IT").unwrap();
        let b = keys.add("302", "IT").unwrap();
        keys.add("410", "HR").unwrap();

        assert_eq!(keys.delete(b.id).unwrap().id, b.id);
        assert_eq!(keys.len(), 2);
        assert!(keys.delete(b.id).is_none());
        assert_eq!(keys.len(), 2);

        let remaining = keys.filter("", StatusFilter::All);
        assert!(remaining.iter().all(|k| k.id != b.id));
        assert!(remaining.iter().any(|k| k.id == a.id));
    }

    #[test]
    fn test_filter_by_search_and_status() {
        let (_, keys) = registry();
        let it = keys.add("301", "IT").unwrap();
        keys.add("205", "Accounting").unwrap();
        keys.add("410", "HR").unwrap();
        keys.issue(it.id, "Ivanov I.I.").unwrap();

        assert_eq!(keys.filter("", StatusFilter::All).len(), 3);
        assert_eq!(keys.filter("IVANOV", StatusFilter::All).len(), 1);
        assert_eq!(keys.filter("account", StatusFilter::All).len(), 1);
        assert_eq!(keys.filter("", StatusFilter::Only(KeyStatus::Issued)).len(), 1);
        assert_eq!(keys.filter("hr", StatusFilter::Only(KeyStatus::Issued)).len(), 0);

        let offices: Vec<String> = keys
            .filter("", StatusFilter::Only(KeyStatus::Available))
            .iter()
            .map(|k| k.office.clone())
            .collect();
        assert_eq!(offices, vec!["205", "410"]);
    }

    #[test]
    fn test_held_by_and_stats() {
        let (_, keys) = registry();
        let a = keys.add("301", "IT").unwrap();
        let b = keys.add("401", "IT").unwrap();
        let c = keys.add("101", "Security").unwrap();
        keys.issue(a.id, "Ivanov").unwrap();
        keys.issue(b.id, "ivanov ").unwrap();
        keys.mark_lost(c.id).unwrap();

        assert_eq!(keys.held_by("Ivanov").len(), 2);
        assert!(keys.held_by("").is_empty());
        assert_eq!(
            keys.stats(),
            KeyStats {
                total: 3,
                available: 0,
                issued: 2,
                lost: 1
            }
        );
    }

    #[test]
    fn test_mutations_are_written_through() {
        let (store, keys) = registry();
        let key = keys.add("301", "IT").unwrap();
        keys.issue(key.id, "Petrov").unwrap();

        let reloaded = KeyRegistry::new(store, "KEY");
        assert!(reloaded.load().unwrap());
        let stored = reloaded.get(key.id).unwrap();
        assert_eq!(stored.issued_to(), Some("Petrov"));

        // New ids keep sorting after loaded ones
        let newer = reloaded.add("302", "IT").unwrap();
        assert!(newer.id > key.id);
    }

    #[test]
    fn test_load_skips_invalid_entries() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                KEYS_RECORD,
                br#"[{"id":"1","office":"301","status":"issued","department":"IT"},
                    {"id":"2","office":"302","status":"available","department":"IT"}]"#,
            )
            .unwrap();

        let keys = KeyRegistry::new(store, "KEY");
        assert!(keys.load().unwrap());
        assert_eq!(keys.len(), 1);
        assert!(keys.get(RecordId(2)).is_some());
    }

    #[test]
    fn test_load_reports_missing_record() {
        let (_, keys) = registry();
        assert!(!keys.load().unwrap());
    }
}
