//! Map features: the pin store, pin filtering, great-circle helpers, device
//! location and the mobile clinic tracker.

pub mod filter;
pub mod geo;
pub mod geolocation;
pub mod pins;
pub mod tracker;

pub use filter::filter_pins;
pub use geolocation::{
    resolve_or_fallback, watch_position, CachedLocation, FixedLocation, GeolocationState,
    LocationProvider, NoLocation, PositionOptions, PositionWatch,
};
pub use pins::PinStore;
pub use tracker::{ClinicTracker, TrackerHandle, TrackerOptions, TrackerStatus};
