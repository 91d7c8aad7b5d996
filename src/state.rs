use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, AuthError, StorageError};
use crate::map::{ClinicTracker, LocationProvider, PinStore, TrackerHandle, TrackerOptions};
use crate::messaging::MessagingStore;
use crate::session::SessionStore;
use crate::settings::SettingsStore;
use crate::storage::{write_atomic, FileStorage, KeyValueStore};
use crate::types::{Config, User, UserRole};

/// Application state: every store, wired to one storage backend.
pub struct AppState {
    pub config: Config,
    pub storage: Arc<dyn KeyValueStore>,
    pub session: SessionStore,
    pub settings: SettingsStore,
    pub messaging: MessagingStore,
    pub pins: Arc<PinStore>,
}

impl AppState {
    /// Open file-backed storage under the configured data directory.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let dir = data_dir(&config).map_err(AppError::Configuration)?;
        let storage = FileStorage::open(&dir)?;
        log::info!("Using data directory {}", dir.display());
        Ok(Self::with_storage(config, Arc::new(storage))?)
    }

    pub fn with_storage(
        config: Config,
        storage: Arc<dyn KeyValueStore>,
    ) -> Result<Self, StorageError> {
        let session = SessionStore::restore(
            storage.clone(),
            Duration::from_millis(config.sign_in_delay_ms),
        )?;
        let pins = Arc::new(PinStore::open(storage.clone(), session.active_user_id())?);
        let messaging = MessagingStore::open(storage.clone())?;
        let settings = SettingsStore::new(storage.clone());

        Ok(Self {
            config,
            storage,
            session,
            settings,
            messaging,
            pins,
        })
    }

    /// Sign in and move the pin store to the user's partition.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let user = self.session.sign_in(email, password).await?;
        self.pins.switch_user(&user.id)?;
        Ok(user)
    }

    /// Reuse a restored session for `email`, otherwise sign in.
    pub async fn resume_or_sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        if self.session.is_signed_in() {
            if let Some(user) = self
                .session
                .current_user()
                .filter(|u| u.email.eq_ignore_ascii_case(email))
            {
                log::info!("Resuming session for {}", user.email);
                return Ok(user);
            }
        }
        self.sign_in(email, password).await
    }

    pub fn sign_out(&self) -> Result<(), StorageError> {
        self.session.sign_out()?;
        self.pins.switch_user(&self.session.active_user_id())
    }

    /// Tracker options for the current session. Case managers get the staff
    /// wording even without `staffView` in the config.
    pub fn tracker_options(&self) -> TrackerOptions {
        let mut options = TrackerOptions::from(&self.config);
        let is_staff = self
            .session
            .current_user()
            .is_some_and(|u| u.role == UserRole::CaseManager);
        options.staff_view |= is_staff;
        options
    }

    /// Resolve the observer's location and start the clinic tracker loop.
    pub async fn start_tracker(
        &self,
        provider: &dyn LocationProvider,
    ) -> Result<TrackerHandle, StorageError> {
        let tracker = ClinicTracker::start(self.pins.clone(), provider, &self.tracker_options()).await?;
        Ok(tracker.spawn())
    }
}

/// Get the canonical config file path (~/.communicare/config.json)
pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".communicare").join("config.json"))
}

/// Load configuration from ~/.communicare/config.json.
/// A missing file yields the defaults.
pub fn load_config() -> Result<Config, String> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        log::info!("No config at {}; using defaults", path.display());
        return Ok(Config::default());
    }

    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;

    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Write config atomically, creating the parent directory when needed.
pub fn save_config(path: &Path, config: &Config) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config dir: {}", e))?;
        }
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    write_atomic(path, &content)
}

/// Storage directory: `dataDir` from the config, else ~/.communicare/data
pub fn data_dir(config: &Config) -> Result<PathBuf, String> {
    if let Some(ref dir) = config.data_dir {
        return Ok(expand_home(dir));
    }
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".communicare").join("data"))
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
