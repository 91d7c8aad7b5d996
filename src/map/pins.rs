//! Pin store: the active user's map markers, synchronized to storage.
//!
//! All users' pins share one flat JSON array under `communicare_pins`. The
//! store keeps only the active user's partition in memory and, after every
//! mutation, rewrites the array as (other users' entries) + (this user's pins).
//! Entries it cannot parse are skipped on load and carried through rewrites
//! untouched, whoever owns them.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::StorageError;
use crate::storage::{keys, KeyValueStore};
use crate::types::{NewPin, Pin, PinFilters, PinPatch};

use super::filter::filter_pins;

struct PinState {
    user_id: String,
    pins: Vec<Pin>,
    selected: Option<Pin>,
}

pub struct PinStore {
    storage: Arc<dyn KeyValueStore>,
    state: Mutex<PinState>,
}

impl PinStore {
    /// Open the store for `user_id`, loading that user's pins.
    ///
    /// Empty or absent storage yields an empty store.
    pub fn open(
        storage: Arc<dyn KeyValueStore>,
        user_id: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let user_id = user_id.into();
        let pins = load_partition(storage.as_ref(), &user_id)?;
        log::debug!("Loaded {} pins for user {}", pins.len(), user_id);
        Ok(Self {
            storage,
            state: Mutex::new(PinState {
                user_id,
                pins,
                selected: None,
            }),
        })
    }

    /// Re-partition for another user. Selection does not carry over.
    /// Switching to the current user is a no-op.
    pub fn switch_user(&self, user_id: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if state.user_id == user_id {
            return Ok(());
        }
        let pins = load_partition(self.storage.as_ref(), user_id)?;
        log::info!(
            "Pin store switched from {} to {} ({} pins)",
            state.user_id,
            user_id,
            pins.len()
        );
        state.user_id = user_id.to_string();
        state.pins = pins;
        state.selected = None;
        Ok(())
    }

    pub fn user_id(&self) -> String {
        self.state.lock().user_id.clone()
    }

    pub fn pins(&self) -> Vec<Pin> {
        self.state.lock().pins.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().pins.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Pin> {
        self.state.lock().pins.iter().find(|p| p.id == id).cloned()
    }

    pub fn selected(&self) -> Option<Pin> {
        self.state.lock().selected.clone()
    }

    /// Create a pin with a fresh id and creation time, then persist.
    pub fn add(&self, new_pin: NewPin) -> Result<Pin, StorageError> {
        let pin = Pin {
            id: uuid::Uuid::new_v4().to_string(),
            name: new_pin.name,
            description: new_pin.description,
            pin_type: new_pin.pin_type,
            coordinates: new_pin.coordinates,
            created_at: Utc::now(),
            scheduled_for: new_pin.scheduled_for,
            user_id: new_pin.user_id,
        };

        let mut state = self.state.lock();
        state.pins.push(pin.clone());
        self.persist(&state)?;
        Ok(pin)
    }

    /// Merge `patch` into the pin with `id`.
    ///
    /// Returns the updated pin, or `None` (without touching storage) when no
    /// pin has that id. An empty patch returns the pin and writes nothing.
    pub fn update(&self, id: &str, patch: &PinPatch) -> Result<Option<Pin>, StorageError> {
        let mut state = self.state.lock();
        let Some(pin) = state.pins.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        if patch.is_empty() {
            return Ok(Some(pin.clone()));
        }
        patch.apply(pin);
        let updated = pin.clone();

        if state.selected.as_ref().is_some_and(|s| s.id == id) {
            state.selected = Some(updated.clone());
        }

        self.persist(&state)?;
        Ok(Some(updated))
    }

    /// Remove the pin with `id`, clearing the selection if it pointed at it.
    ///
    /// Returns whether a pin was removed; unknown ids leave storage untouched.
    pub fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let mut state = self.state.lock();
        let before = state.pins.len();
        state.pins.retain(|p| p.id != id);
        if state.pins.len() == before {
            return Ok(false);
        }

        if state.selected.as_ref().is_some_and(|s| s.id == id) {
            state.selected = None;
        }

        self.persist(&state)?;
        Ok(true)
    }

    /// Select the pin with `id`; `None` or an unknown id clears the selection.
    pub fn select(&self, id: Option<&str>) -> Option<Pin> {
        let mut state = self.state.lock();
        let selected = id.and_then(|id| state.pins.iter().find(|p| p.id == id).cloned());
        state.selected = selected.clone();
        selected
    }

    pub fn filter(&self, filters: &PinFilters) -> Vec<Pin> {
        filter_pins(&self.state.lock().pins, filters)
    }

    /// Full read-modify-write of the shared collection.
    ///
    /// Runs under the state lock, so writers within this process are serialized.
    /// Other processes writing the same storage still race (last writer wins).
    fn persist(&self, state: &PinState) -> Result<(), StorageError> {
        let own_ids: HashSet<&str> = state.pins.iter().map(|p| p.id.as_str()).collect();

        let mut all: Vec<Value> = read_collection(self.storage.as_ref())?
            .into_iter()
            .filter(|entry| {
                entry_user_id(entry) != Some(state.user_id.as_str()) || !is_readable_pin(entry)
            })
            .filter(|entry| !entry_id(entry).is_some_and(|id| own_ids.contains(id)))
            .collect();

        for pin in &state.pins {
            let value = serde_json::to_value(pin).map_err(|e| StorageError::Serialize {
                key: keys::PINS.to_string(),
                message: e.to_string(),
            })?;
            all.push(value);
        }

        crate::storage::set_json(self.storage.as_ref(), keys::PINS, &all)
    }
}

/// Read the active user's pins, skipping entries that do not parse.
fn load_partition(storage: &dyn KeyValueStore, user_id: &str) -> Result<Vec<Pin>, StorageError> {
    let mut pins = Vec::new();
    for entry in read_collection(storage)? {
        if entry_user_id(&entry) != Some(user_id) {
            continue;
        }
        match serde_json::from_value::<Pin>(entry) {
            Ok(pin) => pins.push(pin),
            Err(e) => log::warn!("Skipping malformed pin for user {}: {}", user_id, e),
        }
    }
    Ok(pins)
}

/// The raw persisted array. Anything other than a JSON array reads as empty.
fn read_collection(storage: &dyn KeyValueStore) -> Result<Vec<Value>, StorageError> {
    let Some(raw) = storage.get(keys::PINS)? else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Array(entries)) => Ok(entries),
        Ok(_) => {
            log::warn!("Pin collection is not an array; treating as empty");
            Ok(Vec::new())
        }
        Err(e) => {
            log::warn!("Pin collection is not valid JSON ({}); treating as empty", e);
            Ok(Vec::new())
        }
    }
}

/// Whether `entry` loads as a pin. Unreadable entries are never in memory,
/// so a rewrite must carry them over or they would be lost.
fn is_readable_pin(entry: &Value) -> bool {
    Pin::deserialize(entry).is_ok()
}

fn entry_user_id(entry: &Value) -> Option<&str> {
    entry.get("userId").and_then(Value::as_str)
}

fn entry_id(entry: &Value) -> Option<&str> {
    entry.get("id").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::types::{Coordinates, PinType};

    fn storage() -> Arc<dyn KeyValueStore> {
        Arc::new(MemoryStorage::new())
    }

    fn clinic(user_id: &str) -> NewPin {
        NewPin::new("Clinic", PinType::Custom, Coordinates::new(10.0, 10.0), user_id)
    }

    fn raw_collection(storage: &Arc<dyn KeyValueStore>) -> Vec<Value> {
        read_collection(storage.as_ref()).unwrap()
    }

    #[test]
    fn test_open_on_empty_storage() {
        let store = PinStore::open(storage(), "u1").unwrap();
        assert!(store.is_empty());
        assert!(store.selected().is_none());
        assert_eq!(store.user_id(), "u1");
    }

    #[test]
    fn test_add_assigns_id_and_created_at() {
        let store = PinStore::open(storage(), "u1").unwrap();
        let before = Utc::now();
        let pin = store.add(clinic("u1")).unwrap();
        assert!(!pin.id.is_empty());
        assert!(pin.created_at >= before);
        assert_eq!(store.pins(), vec![pin.clone()]);

        let found = store.filter(&PinFilters::search("clin"));
        assert_eq!(found, vec![pin]);
    }

    #[test]
    fn test_add_allows_duplicate_names() {
        let store = PinStore::open(storage(), "u1").unwrap();
        let a = store.add(clinic("u1")).unwrap();
        let b = store.add(clinic("u1")).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_update_merges_and_keeps_identity() {
        let store = PinStore::open(storage(), "u1").unwrap();
        let pin = store.add(clinic("u1").with_description("old")).unwrap();

        let patch = PinPatch {
            name: Some("Renamed".to_string()),
            coordinates: Some(Coordinates::new(11.0, 12.0)),
            ..PinPatch::default()
        };
        let updated = store.update(&pin.id, &patch).unwrap().unwrap();

        assert_eq!(updated.id, pin.id);
        assert_eq!(updated.created_at, pin.created_at);
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.description.as_deref(), Some("old"));
        assert_eq!(updated.coordinates, Coordinates::new(11.0, 12.0));
        assert_eq!(store.get(&pin.id), Some(updated));
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let storage = storage();
        let store = PinStore::open(storage.clone(), "u1").unwrap();
        store.add(clinic("u1")).unwrap();
        let snapshot = storage.get(keys::PINS).unwrap();

        let result = store
            .update("missing", &PinPatch::coordinates(Coordinates::new(0.0, 0.0)))
            .unwrap();
        assert!(result.is_none());
        assert_eq!(storage.get(keys::PINS).unwrap(), snapshot);
    }

    #[test]
    fn test_empty_patch_returns_pin_without_writing() {
        let storage = storage();
        let store = PinStore::open(storage.clone(), "u1").unwrap();
        let pin = store.add(clinic("u1")).unwrap();
        storage.remove(keys::PINS).unwrap();

        let result = store.update(&pin.id, &PinPatch::default()).unwrap();
        assert_eq!(result, Some(pin));
        assert!(storage.get(keys::PINS).unwrap().is_none());
    }

    #[test]
    fn test_update_refreshes_selection() {
        let store = PinStore::open(storage(), "u1").unwrap();
        let pin = store.add(clinic("u1")).unwrap();
        store.select(Some(&pin.id));

        store
            .update(&pin.id, &PinPatch::coordinates(Coordinates::new(1.0, 2.0)))
            .unwrap();
        assert_eq!(
            store.selected().map(|p| p.coordinates),
            Some(Coordinates::new(1.0, 2.0))
        );
    }

    #[test]
    fn test_delete_selected_clears_selection() {
        let store = PinStore::open(storage(), "u1").unwrap();
        let a = store.add(clinic("u1")).unwrap();
        store.select(Some(&a.id));

        assert!(store.delete(&a.id).unwrap());
        assert!(store.selected().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_other_pin_keeps_selection() {
        let store = PinStore::open(storage(), "u1").unwrap();
        let a = store.add(clinic("u1")).unwrap();
        let b = store.add(clinic("u1")).unwrap();
        store.select(Some(&a.id));

        assert!(store.delete(&b.id).unwrap());
        assert_eq!(store.selected().map(|p| p.id), Some(a.id));
        assert!(!store.delete("missing").unwrap());
    }

    #[test]
    fn test_select_none_and_unknown() {
        let store = PinStore::open(storage(), "u1").unwrap();
        let a = store.add(clinic("u1")).unwrap();
        assert_eq!(store.select(Some(&a.id)).map(|p| p.id), Some(a.id.clone()));
        assert!(store.select(None).is_none());
        assert!(store.selected().is_none());

        store.select(Some(&a.id));
        assert!(store.select(Some("missing")).is_none());
        assert!(store.selected().is_none());
    }

    #[test]
    fn test_add_update_delete_sequence() {
        let store = PinStore::open(storage(), "u1").unwrap();
        let mut expected = Vec::new();
        for i in 0..6 {
            let pin = store
                .add(NewPin::new(
                    format!("Pin {i}"),
                    PinType::ALL[i % 4],
                    Coordinates::new(i as f64, 0.0),
                    "u1",
                ))
                .unwrap();
            expected.push(pin);
        }
        store.delete(&expected[1].id).unwrap();
        store.delete(&expected[4].id).unwrap();
        let patch = PinPatch {
            name: Some("Edited".to_string()),
            ..PinPatch::default()
        };
        store.update(&expected[2].id, &patch).unwrap();

        expected.remove(4);
        expected.remove(1);
        expected[1].name = "Edited".to_string();
        assert_eq!(store.pins(), expected);
    }

    #[test]
    fn test_round_trip_per_user() {
        let storage = storage();
        let pin = {
            let store = PinStore::open(storage.clone(), "A").unwrap();
            store.add(clinic("A")).unwrap()
        };

        let reloaded = PinStore::open(storage.clone(), "A").unwrap();
        assert_eq!(reloaded.pins(), vec![pin]);

        let other = PinStore::open(storage, "B").unwrap();
        assert!(other.is_empty());
    }

    #[test]
    fn test_pins_scoped_to_user() {
        let storage = storage();
        let u1 = PinStore::open(storage.clone(), "u1").unwrap();
        u1.add(clinic("u1")).unwrap();

        let u2 = PinStore::open(storage, "u2").unwrap();
        assert!(u2.filter(&PinFilters::search("clin")).is_empty());
        assert_eq!(u1.filter(&PinFilters::search("clin")).len(), 1);
    }

    #[test]
    fn test_writes_preserve_other_users() {
        let storage = storage();
        let a = PinStore::open(storage.clone(), "A").unwrap();
        let b = PinStore::open(storage.clone(), "B").unwrap();
        a.add(clinic("A")).unwrap();
        b.add(clinic("B")).unwrap();
        a.add(clinic("A")).unwrap();

        let all = raw_collection(&storage);
        assert_eq!(all.len(), 3);
        assert_eq!(PinStore::open(storage.clone(), "A").unwrap().len(), 2);
        assert_eq!(PinStore::open(storage, "B").unwrap().len(), 1);
    }

    #[test]
    fn test_foreign_owned_pin_is_not_duplicated() {
        // A pin added with another owner's id is written once, not once per save
        let storage = storage();
        let store = PinStore::open(storage.clone(), "u1").unwrap();
        store.add(clinic("mobile-clinic")).unwrap();
        store.add(clinic("u1")).unwrap();
        store.add(clinic("u1")).unwrap();

        assert_eq!(raw_collection(&storage).len(), 3);
    }

    #[test]
    fn test_malformed_entries_skipped_and_preserved() {
        let storage = storage();
        storage
            .set(
                keys::PINS,
                r#"[
                    {"id": "x", "userId": "B", "name": 42},
                    {"id": "y", "userId": "A", "type": "spaceship"},
                    "garbage",
                    {"id": "ok", "name": "Pantry", "type": "custom",
                     "coordinates": {"latitude": 1.0, "longitude": 2.0},
                     "createdAt": "2025-01-01T00:00:00Z", "userId": "A"}
                ]"#,
            )
            .unwrap();

        let store = PinStore::open(storage.clone(), "A").unwrap();
        assert_eq!(store.pins().len(), 1);
        assert_eq!(store.pins()[0].id, "ok");

        store.add(clinic("A")).unwrap();
        let all = raw_collection(&storage);
        // Unreadable records survive whoever owns them
        assert!(all.iter().any(|e| entry_id(e) == Some("x")));
        assert!(all.iter().any(|e| e.as_str() == Some("garbage")));
        assert!(all.iter().any(|e| entry_id(e) == Some("y")));
        assert_eq!(all.len(), 5);

        // Reloading still skips them and keeps the readable pins
        let reopened = PinStore::open(storage, "A").unwrap();
        assert_eq!(reopened.len(), 2);
    }

    #[test]
    fn test_minute_precision_schedule_loads_and_survives_writes() {
        let storage = storage();
        storage
            .set(
                keys::PINS,
                r#"[
                    {"id": "f1", "name": "Dentist", "type": "future",
                     "coordinates": {"latitude": 1.0, "longitude": 2.0},
                     "createdAt": "2025-01-01T00:00:00.000Z",
                     "scheduledFor": "2025-03-01T12:00", "userId": "1"}
                ]"#,
            )
            .unwrap();

        let store = PinStore::open(storage.clone(), "1").unwrap();
        assert_eq!(store.len(), 1);
        let pin = store.get("f1").unwrap();
        assert_eq!(
            pin.scheduled_for,
            Some("2025-03-01T12:00:00Z".parse().unwrap())
        );

        store.add(clinic("1")).unwrap();
        let all = raw_collection(&storage);
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|e| entry_id(e) == Some("f1")));
        assert_eq!(PinStore::open(storage, "1").unwrap().len(), 2);
    }

    #[test]
    fn test_deleting_readable_pin_does_not_resurrect_it() {
        let storage = storage();
        let store = PinStore::open(storage.clone(), "A").unwrap();
        let pin = store.add(clinic("A")).unwrap();
        store.delete(&pin.id).unwrap();
        assert!(raw_collection(&storage).is_empty());
    }

    #[test]
    fn test_non_array_collection_reads_empty() {
        let storage = storage();
        storage.set(keys::PINS, r#"{"not": "an array"}"#).unwrap();
        let store = PinStore::open(storage.clone(), "A").unwrap();
        assert!(store.is_empty());

        store.add(clinic("A")).unwrap();
        assert_eq!(raw_collection(&storage).len(), 1);
    }

    #[test]
    fn test_switch_user_reloads_and_clears_selection() {
        let storage = storage();
        let store = PinStore::open(storage.clone(), "A").unwrap();
        let a = store.add(clinic("A")).unwrap();
        store.select(Some(&a.id));

        PinStore::open(storage, "B").unwrap().add(clinic("B")).unwrap();

        store.switch_user("B").unwrap();
        assert_eq!(store.user_id(), "B");
        assert_eq!(store.len(), 1);
        assert!(store.selected().is_none());

        store.switch_user("A").unwrap();
        assert_eq!(store.pins(), vec![a]);
    }
}
