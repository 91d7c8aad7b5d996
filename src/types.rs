use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Configuration stored in ~/.communicare/config.json
///
/// Every field has a default, so a missing or partial file still yields a
/// usable configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory holding one JSON file per storage key.
    /// Defaults to ~/.communicare/data when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub geolocation: GeolocationConfig,
    /// Used whenever the device location is denied or unavailable (San Diego).
    #[serde(default = "default_fallback_location")]
    pub fallback_location: Coordinates,
    /// Simulated round-trip of the mock sign-in.
    #[serde(default = "default_sign_in_delay_ms")]
    pub sign_in_delay_ms: u64,
    /// Staff (case manager) wording for the observer pin.
    #[serde(default)]
    pub staff_view: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            tracker: TrackerConfig::default(),
            geolocation: GeolocationConfig::default(),
            fallback_location: default_fallback_location(),
            sign_in_delay_ms: default_sign_in_delay_ms(),
            staff_view: false,
        }
    }
}

fn default_fallback_location() -> Coordinates {
    Coordinates::new(32.7157, -117.1611)
}

fn default_sign_in_delay_ms() -> u64 {
    1000
}

/// Mobile clinic simulation constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    #[serde(default = "default_initial_distance")]
    pub initial_distance_miles: f64,
    #[serde(default = "default_step")]
    pub step_miles: f64,
    #[serde(default = "default_minutes_per_mile")]
    pub minutes_per_mile: f64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            initial_distance_miles: default_initial_distance(),
            step_miles: default_step(),
            minutes_per_mile: default_minutes_per_mile(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

fn default_initial_distance() -> f64 {
    3.2
}

fn default_step() -> f64 {
    0.1
}

fn default_minutes_per_mile() -> f64 {
    4.0
}

fn default_tick_interval_ms() -> u64 {
    3000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeolocationConfig {
    #[serde(default = "default_true")]
    pub enable_high_accuracy: bool,
    #[serde(default = "default_location_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_maximum_age_ms")]
    pub maximum_age_ms: u64,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout_ms: default_location_timeout_ms(),
            maximum_age_ms: default_maximum_age_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_location_timeout_ms() -> u64 {
    15_000
}

fn default_maximum_age_ms() -> u64 {
    10_000
}

// =============================================================================
// Map
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinType {
    Current,
    Custom,
    Future,
    MobileClinic,
}

impl PinType {
    pub const ALL: [PinType; 4] = [
        PinType::Current,
        PinType::Custom,
        PinType::Future,
        PinType::MobileClinic,
    ];
}

/// A named, typed geographic marker owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pin {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub pin_type: PinType,
    pub coordinates: Coordinates,
    pub created_at: DateTime<Utc>,
    /// Only meaningful for `PinType::Future`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_schedule"
    )]
    pub scheduled_for: Option<DateTime<Utc>>,
    pub user_id: String,
}

impl Pin {
    /// The timestamp date-range filters compare against.
    pub fn reference_date(&self) -> DateTime<Utc> {
        match (self.pin_type, self.scheduled_for) {
            (PinType::Future, Some(scheduled)) => scheduled,
            _ => self.created_at,
        }
    }
}

/// Parse a timestamp as RFC 3339, or as a zone-less local date-time
/// (`YYYY-MM-DDTHH:MM[:SS[.fff]]`, what a date-time picker produces) read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// `null`, `""` and absent all mean unscheduled.
fn deserialize_schedule<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_timestamp(value).map(Some).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid scheduledFor timestamp '{}'", value))
        }),
    }
}

/// Everything a caller supplies to create a pin.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPin {
    pub name: String,
    pub description: Option<String>,
    pub pin_type: PinType,
    pub coordinates: Coordinates,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub user_id: String,
}

impl NewPin {
    pub fn new(
        name: impl Into<String>,
        pin_type: PinType,
        coordinates: Coordinates,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            pin_type,
            coordinates,
            scheduled_for: None,
            user_id: user_id.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }
}

/// Partial update. `id`, `createdAt` and `userId` are deliberately absent.
///
/// For the optional fields, `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PinPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub pin_type: Option<PinType>,
    pub coordinates: Option<Coordinates>,
    pub scheduled_for: Option<Option<DateTime<Utc>>>,
}

impl PinPatch {
    pub fn coordinates(coordinates: Coordinates) -> Self {
        Self {
            coordinates: Some(coordinates),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub(crate) fn apply(&self, pin: &mut Pin) {
        if let Some(name) = &self.name {
            pin.name = name.clone();
        }
        if let Some(description) = &self.description {
            pin.description = description.clone();
        }
        if let Some(pin_type) = self.pin_type {
            pin.pin_type = pin_type;
        }
        if let Some(coordinates) = self.coordinates {
            pin.coordinates = coordinates;
        }
        if let Some(scheduled_for) = self.scheduled_for {
            pin.scheduled_for = scheduled_for;
        }
    }
}

/// Inclusive bounds; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Filter criteria, combined by logical AND. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PinFilters {
    pub pin_type: Option<PinType>,
    pub search: Option<String>,
    pub date_range: Option<DateRange>,
}

impl PinFilters {
    pub fn by_type(pin_type: PinType) -> Self {
        Self {
            pin_type: Some(pin_type),
            ..Self::default()
        }
    }

    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: Some(term.into()),
            ..Self::default()
        }
    }

    pub fn between(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self {
            date_range: Some(DateRange { from, to }),
            ..Self::default()
        }
    }
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Client,
    CaseManager,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

// =============================================================================
// Messaging
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub role: UserRole,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    /// User ids
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender_id: String,
    pub sender_name: String,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_deleted: bool,
}
