//! Error types for the CommuniCare core
//!
//! Errors are classified by recoverability:
//! - Retryable: storage I/O hiccups, location timeouts
//! - NonRetryable: bad input, corrupt data that cannot be serialized
//! - RequiresUserAction: wrong credentials, location permission denied

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the key-value storage layer
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Failed to serialize '{key}': {message}")]
    Serialize { key: String, message: String },

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Data directory not found: {0}")]
    DataDirNotFound(PathBuf),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Unknown language: {0}")]
    UnknownLanguage(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Message text is empty")]
    EmptyMessage,

    #[error("Contact name and email are required")]
    MissingContactFields,

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Unknown location filter: {0}")]
    UnknownLocation(String),
}

/// Device location failures. Never fatal: callers fall back to a fixed coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("User denied the request for geolocation.")]
    PermissionDenied,

    #[error("Location information is unavailable.")]
    PositionUnavailable,

    #[error("The request to get user location timed out.")]
    Timeout,

    #[error("Geolocation is not supported on this device.")]
    Unsupported,
}

/// Umbrella error for anything surfaced to a UI boundary
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AppError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Storage(StorageError::Io(_))
                | AppError::Auth(AuthError::Storage(StorageError::Io(_)))
                | AppError::Settings(SettingsError::Storage(StorageError::Io(_)))
                | AppError::Messaging(MessagingError::Storage(StorageError::Io(_)))
                | AppError::Location(LocationError::Timeout)
                | AppError::Location(LocationError::PositionUnavailable)
        )
    }

    /// Returns true if this error requires user action to resolve
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            AppError::Auth(AuthError::InvalidCredentials)
                | AppError::Location(LocationError::PermissionDenied)
        )
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            AppError::Storage(e)
            | AppError::Auth(AuthError::Storage(e))
            | AppError::Settings(SettingsError::Storage(e))
            | AppError::Messaging(MessagingError::Storage(e)) => match e {
                StorageError::Io(_) => "Check file permissions and disk space, then try again.",
                StorageError::Serialize { .. } => "The record could not be saved. Try again.",
                StorageError::InvalidKey(_) => "Storage keys may only contain letters, digits, '_' and '-'.",
                StorageError::DataDirNotFound(_) => {
                    "Check the dataDir setting in ~/.communicare/config.json"
                }
            },
            AppError::Auth(AuthError::InvalidCredentials) => {
                "Check your email address and try again."
            }
            AppError::Settings(SettingsError::UnknownLanguage(_)) => {
                "Choose English, Spanish, French or Chinese."
            }
            AppError::Messaging(MessagingError::EmptyMessage) => "Type a message before sending.",
            AppError::Messaging(MessagingError::MissingContactFields) => {
                "Enter both a name and an email for the contact."
            }
            AppError::Messaging(MessagingError::ConversationNotFound(_)) => {
                "The conversation was removed. Pick another one."
            }
            AppError::Location(LocationError::PermissionDenied) => {
                "Allow location access in your device settings."
            }
            AppError::Location(LocationError::PositionUnavailable)
            | AppError::Location(LocationError::Timeout) => "Move to an open area and try again.",
            AppError::Location(LocationError::Unsupported) => {
                "This device cannot report its location; a default location is used."
            }
            AppError::Resource(ResourceError::UnknownTopic(_)) => {
                "Pick a topic from the resource filter list."
            }
            AppError::Resource(ResourceError::UnknownLocation(_)) => {
                "Pick a location from the resource filter list."
            }
            AppError::Configuration(_) => "Check your configuration in ~/.communicare/config.json",
        }
    }
}

/// Serializable error representation for a UI boundary
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
    pub error_type: ErrorType,
    pub can_retry: bool,
    pub recovery_suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorType {
    Retryable,
    NonRetryable,
    RequiresUserAction,
}

impl From<&AppError> for ErrorPayload {
    fn from(err: &AppError) -> Self {
        let error_type = if err.requires_user_action() {
            ErrorType::RequiresUserAction
        } else if err.is_retryable() {
            ErrorType::Retryable
        } else {
            ErrorType::NonRetryable
        };

        ErrorPayload {
            message: err.to_string(),
            error_type,
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}
