//! Mock authentication.
//!
//! Sign-in looks the e-mail up in a fixed two-user directory; the password is
//! not checked. The signed-in user is persisted under `communicare_user` and
//! restored on the next start.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{AuthError, StorageError};
use crate::storage::{get_json, keys, set_json, KeyValueStore};
use crate::types::{User, UserRole};

/// Pin partition used while nobody is signed in.
pub const ANONYMOUS_USER_ID: &str = "anonymous";

/// The fixed user directory.
pub fn mock_users() -> Vec<User> {
    vec![
        User {
            id: "1".to_string(),
            name: "John Doe".to_string(),
            email: "john@example.com".to_string(),
            role: UserRole::Client,
            avatar: None,
        },
        User {
            id: "2".to_string(),
            name: "Jane Smith".to_string(),
            email: "jane@example.com".to_string(),
            role: UserRole::CaseManager,
            avatar: None,
        },
    ]
}

pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
    sign_in_delay: Duration,
    user: Mutex<Option<User>>,
}

impl SessionStore {
    /// Restore the persisted user, if any.
    pub fn restore(
        storage: Arc<dyn KeyValueStore>,
        sign_in_delay: Duration,
    ) -> Result<Self, StorageError> {
        let user: Option<User> = get_json(storage.as_ref(), keys::USER)?;
        if let Some(ref u) = user {
            log::info!("Restored session for {}", u.email);
        }
        Ok(Self {
            storage,
            sign_in_delay,
            user: Mutex::new(user),
        })
    }

    pub fn current_user(&self) -> Option<User> {
        self.user.lock().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.user.lock().is_some()
    }

    pub fn active_user_id(&self) -> String {
        self.user
            .lock()
            .as_ref()
            .map(|u| u.id.clone())
            .unwrap_or_else(|| ANONYMOUS_USER_ID.to_string())
    }

    /// Simulated sign-in: waits the configured delay, then matches the e-mail
    /// case-insensitively against the directory.
    pub async fn sign_in(&self, email: &str, _password: &str) -> Result<User, AuthError> {
        tokio::time::sleep(self.sign_in_delay).await;

        let wanted = email.to_lowercase();
        let Some(user) = mock_users()
            .into_iter()
            .find(|u| u.email.to_lowercase() == wanted)
        else {
            log::info!("Sign-in rejected for {}", email);
            return Err(AuthError::InvalidCredentials);
        };

        set_json(self.storage.as_ref(), keys::USER, &user)?;
        *self.user.lock() = Some(user.clone());
        log::info!("Signed in as {} ({})", user.name, user.id);
        Ok(user)
    }

    pub fn sign_out(&self) -> Result<(), StorageError> {
        self.storage.remove(keys::USER)?;
        if let Some(user) = self.user.lock().take() {
            log::info!("Signed out {}", user.email);
        }
        Ok(())
    }
}
