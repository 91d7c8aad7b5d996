//! Display and privacy preferences, one storage key per flag.
//!
//! A missing or unreadable key yields the default. Each setter writes only
//! its own key, so concurrent writers to different flags never clobber each
//! other.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{SettingsError, StorageError};
use crate::storage::{get_json, keys, set_json, KeyValueStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Spanish,
    French,
    Chinese,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::English,
        Language::Spanish,
        Language::French,
        Language::Chinese,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "english",
            Language::Spanish => "spanish",
            Language::French => "french",
            Language::Chinese => "chinese",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| SettingsError::UnknownLanguage(s.to_string()))
    }
}

/// Snapshot of every preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub dark_mode: bool,
    pub notifications: bool,
    pub share_location: bool,
    pub language: Language,
    pub high_contrast: bool,
    pub large_text: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dark_mode: false,
            notifications: true,
            share_location: true,
            language: Language::English,
            high_contrast: false,
            large_text: false,
        }
    }
}

pub struct SettingsStore {
    storage: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    pub fn snapshot(&self) -> Result<Settings, StorageError> {
        Ok(Settings {
            dark_mode: self.dark_mode()?,
            notifications: self.notifications()?,
            share_location: self.share_location()?,
            language: self.language()?,
            high_contrast: self.high_contrast()?,
            large_text: self.large_text()?,
        })
    }

    pub fn dark_mode(&self) -> Result<bool, StorageError> {
        self.flag(keys::DARK_MODE, false)
    }

    pub fn set_dark_mode(&self, enabled: bool) -> Result<(), StorageError> {
        self.set_flag(keys::DARK_MODE, enabled)
    }

    pub fn notifications(&self) -> Result<bool, StorageError> {
        self.flag(keys::NOTIFICATIONS, true)
    }

    pub fn set_notifications(&self, enabled: bool) -> Result<(), StorageError> {
        self.set_flag(keys::NOTIFICATIONS, enabled)
    }

    pub fn share_location(&self) -> Result<bool, StorageError> {
        self.flag(keys::LOCATION_SHARING, true)
    }

    pub fn set_share_location(&self, enabled: bool) -> Result<(), StorageError> {
        self.set_flag(keys::LOCATION_SHARING, enabled)
    }

    pub fn high_contrast(&self) -> Result<bool, StorageError> {
        self.flag(keys::HIGH_CONTRAST, false)
    }

    pub fn set_high_contrast(&self, enabled: bool) -> Result<(), StorageError> {
        self.set_flag(keys::HIGH_CONTRAST, enabled)
    }

    pub fn large_text(&self) -> Result<bool, StorageError> {
        self.flag(keys::LARGE_TEXT, false)
    }

    pub fn set_large_text(&self, enabled: bool) -> Result<(), StorageError> {
        self.set_flag(keys::LARGE_TEXT, enabled)
    }

    /// Accepts a JSON string or, for records written by older clients, the
    /// bare language id. Anything unrecognised reads as English.
    pub fn language(&self) -> Result<Language, StorageError> {
        let Some(raw) = self.storage.get(keys::LANGUAGE)? else {
            return Ok(Language::default());
        };
        let id = serde_json::from_str::<String>(&raw).unwrap_or(raw);
        match id.parse() {
            Ok(language) => Ok(language),
            Err(_) => {
                log::warn!("Ignoring unknown stored language '{}'", id);
                Ok(Language::default())
            }
        }
    }

    pub fn set_language(&self, id: &str) -> Result<Language, SettingsError> {
        let language: Language = id.parse()?;
        set_json(self.storage.as_ref(), keys::LANGUAGE, &language)?;
        log::info!("Language set to {}", language);
        Ok(language)
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, StorageError> {
        Ok(get_json(self.storage.as_ref(), key)?.unwrap_or(default))
    }

    fn set_flag(&self, key: &str, value: bool) -> Result<(), StorageError> {
        set_json(self.storage.as_ref(), key, &value)
    }
}
