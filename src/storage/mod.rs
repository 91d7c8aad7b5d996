//! Key-value persistence for the app's local records.
//!
//! Every concern (pins, session, settings, messaging) lives under its own key
//! as a whole JSON blob. Reads return the last full write or nothing; writes
//! replace the blob wholesale.

mod file;
mod memory;

pub use file::{write_atomic, FileStorage};
pub use memory::MemoryStorage;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;

/// Storage keys, one record per concern
pub mod keys {
    pub const PINS: &str = "communicare_pins";
    pub const USER: &str = "communicare_user";
    pub const CONTACTS: &str = "communicare_contacts";
    pub const CONVERSATIONS: &str = "communicare_conversations";
    pub const MESSAGES: &str = "communicare_messages";
    pub const DARK_MODE: &str = "communicare_dark_mode";
    pub const LANGUAGE: &str = "communicare_language";
    pub const HIGH_CONTRAST: &str = "communicare_high_contrast";
    pub const LARGE_TEXT: &str = "communicare_large_text";
    pub const NOTIFICATIONS: &str = "communicare_notifications";
    pub const LOCATION_SHARING: &str = "communicare_location_sharing";
}

/// Minimal local-storage contract.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Read and parse a JSON record.
///
/// A record that does not parse as `T` is logged and treated as absent, so
/// hand-edited storage degrades to defaults instead of failing the caller.
pub fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            log::warn!("Ignoring malformed record '{}': {}", key, e);
            Ok(None)
        }
    }
}

pub fn set_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let payload = serde_json::to_string(value).map_err(|e| StorageError::Serialize {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    store.set(key, &payload)
}
