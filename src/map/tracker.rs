//! Mobile clinic tracker: a simulated vehicle converging on the observer.
//!
//! Follows the same loop shape as the other background pollers: a fixed
//! interval tick, a wake/stop signal raced against it with `select!`, and a
//! status snapshot published for whoever is watching. There is no real
//! telemetry; only convergence is meaningful, since the starting bearing is
//! random.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::error::StorageError;
use crate::types::{Config, Coordinates, NewPin, PinPatch, PinType, TrackerConfig};

use super::geo;
use super::geolocation::{resolve_or_fallback, GeolocationState, LocationProvider, PositionOptions};
use super::pins::PinStore;

/// Remaining distances below this count as arrived (absorbs float drift).
const ARRIVAL_EPSILON_MILES: f64 = 1e-9;

/// Smallest step a tick may take. Zero, negative or NaN steps are raised to it.
const MIN_STEP_MILES: f64 = 0.01;

/// Everything needed to start a tracker, usually derived from `Config`.
#[derive(Debug, Clone)]
pub struct TrackerOptions {
    pub tracker: TrackerConfig,
    pub position: PositionOptions,
    pub fallback: Coordinates,
    pub staff_view: bool,
}

impl From<&Config> for TrackerOptions {
    fn from(config: &Config) -> Self {
        Self {
            tracker: config.tracker.clone(),
            position: PositionOptions::from(&config.geolocation),
            fallback: config.fallback_location,
            staff_view: config.staff_view,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerStatus {
    pub distance_remaining: f64,
    pub eta_minutes: u32,
    pub clinic_position: Coordinates,
    pub observer: Coordinates,
    pub running: bool,
}

pub struct ClinicTracker {
    store: Arc<PinStore>,
    config: TrackerConfig,
    observer: Coordinates,
    clinic_pin_id: String,
    clinic_position: Coordinates,
    distance_remaining: f64,
    eta_minutes: u32,
    running: bool,
}

impl ClinicTracker {
    /// Resolve the observer (falling back when location fails), then place
    /// the clinic at a random bearing.
    ///
    /// Location resolution always completes before the tracker exists, so a
    /// returned tracker is already running.
    pub async fn start(
        store: Arc<PinStore>,
        provider: &dyn LocationProvider,
        options: &TrackerOptions,
    ) -> Result<Self, StorageError> {
        let observer = resolve_or_fallback(provider, &options.position, options.fallback).await;
        let bearing = rand::rng().random_range(0.0..360.0);
        Self::place(store, observer, options, bearing)
    }

    /// Start from a view's location state. Returns `None` while the position
    /// is still unknown.
    pub fn start_from_state(
        store: Arc<PinStore>,
        location: &GeolocationState,
        options: &TrackerOptions,
        rng: &mut impl Rng,
    ) -> Result<Option<Self>, StorageError> {
        let Some(observer) = location.coordinates else {
            log::debug!("Clinic tracker not started: observer position unknown");
            return Ok(None);
        };
        let bearing = rng.random_range(0.0..360.0);
        Self::place(store, observer, options, bearing).map(Some)
    }

    /// Add the observer pin (if the user has none) and the clinic pin
    /// `initial_distance_miles` away along `bearing_deg`.
    pub fn place(
        store: Arc<PinStore>,
        observer: Coordinates,
        options: &TrackerOptions,
        bearing_deg: f64,
    ) -> Result<Self, StorageError> {
        let mut config = options.tracker.clone();
        if config.step_miles.is_nan() || config.step_miles < MIN_STEP_MILES {
            log::warn!(
                "Tracker step {} mi is too small; using {} mi",
                config.step_miles,
                MIN_STEP_MILES
            );
            config.step_miles = MIN_STEP_MILES;
        }
        let user_id = store.user_id();

        let has_observer_pin = store.pins().iter().any(|p| p.pin_type == PinType::Current);
        if !has_observer_pin {
            let name = if options.staff_view {
                "Client Location"
            } else {
                "My Location"
            };
            store.add(NewPin::new(name, PinType::Current, observer, user_id.clone()))?;
        }

        let clinic_position = geo::destination(observer, config.initial_distance_miles, bearing_deg);
        let clinic = store.add(
            NewPin::new("Mobile Clinic", PinType::MobileClinic, clinic_position, user_id)
                .with_description("CommuniCare Mobile Health Services"),
        )?;

        log::info!(
            "Clinic tracker started: {:.1} mi out at bearing {:.0}",
            config.initial_distance_miles,
            bearing_deg
        );

        let distance_remaining = config.initial_distance_miles.max(0.0);
        Ok(Self {
            eta_minutes: eta_for(distance_remaining, config.minutes_per_mile),
            store,
            config,
            observer,
            clinic_pin_id: clinic.id,
            clinic_position,
            distance_remaining,
            running: true,
        })
    }

    pub fn clinic_pin_id(&self) -> &str {
        &self.clinic_pin_id
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn status(&self) -> TrackerStatus {
        TrackerStatus {
            distance_remaining: self.distance_remaining,
            eta_minutes: self.eta_minutes,
            clinic_position: self.clinic_position,
            observer: self.observer,
            running: self.running,
        }
    }

    /// Advance one step toward the observer and persist the new clinic position.
    ///
    /// Once arrived (or stopped) further ticks change nothing.
    pub fn tick(&mut self) -> Result<TrackerStatus, StorageError> {
        if !self.running {
            return Ok(self.status());
        }

        let step = self.config.step_miles;
        self.distance_remaining = (self.distance_remaining - step).max(0.0);
        if self.distance_remaining < ARRIVAL_EPSILON_MILES {
            self.distance_remaining = 0.0;
        }
        self.eta_minutes = eta_for(self.distance_remaining, self.config.minutes_per_mile);

        let arrived = self.distance_remaining == 0.0;
        let next = if arrived || geo::distance_miles(self.clinic_position, self.observer) <= step {
            self.observer
        } else {
            let bearing = geo::initial_bearing(self.clinic_position, self.observer);
            geo::destination(self.clinic_position, step, bearing)
        };
        self.clinic_position = next;

        let updated = self
            .store
            .update(&self.clinic_pin_id, &PinPatch::coordinates(next))?;
        if updated.is_none() {
            log::info!("Clinic pin {} was removed; tracker stopping", self.clinic_pin_id);
            self.running = false;
        }

        if arrived {
            log::info!("Mobile clinic arrived");
            self.running = false;
        } else {
            log::debug!(
                "Clinic tracker: {:.1} mi, ETA {} min",
                self.distance_remaining,
                self.eta_minutes
            );
        }

        Ok(self.status())
    }

    /// Run the tick loop on the tokio runtime.
    pub fn spawn(mut self) -> TrackerHandle {
        let (tx, rx) = watch::channel(self.status());
        let stop = Arc::new(Notify::new());
        let stop_signal = stop.clone();
        let period = Duration::from_millis(self.config.tick_interval_ms.max(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            while self.running {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop_signal.notified() => {
                        log::info!("Clinic tracker stopped");
                        self.running = false;
                        break;
                    }
                }
                match self.tick() {
                    Ok(status) => {
                        tx.send_replace(status);
                    }
                    Err(e) => log::warn!("Clinic tracker: failed to persist position: {}", e),
                }
            }
            tx.send_replace(self.status());
        });

        TrackerHandle { rx, stop, task }
    }
}

fn eta_for(distance_miles: f64, minutes_per_mile: f64) -> u32 {
    let minutes = (distance_miles * minutes_per_mile).floor();
    if minutes.is_finite() && minutes > 0.0 {
        minutes as u32
    } else {
        0
    }
}

/// Owner of a running tracker. Dropping it aborts the loop so no timer keeps
/// mutating the store after its owner is gone.
pub struct TrackerHandle {
    rx: watch::Receiver<TrackerStatus>,
    stop: Arc<Notify>,
    task: JoinHandle<()>,
}

impl TrackerHandle {
    pub fn status(&self) -> TrackerStatus {
        *self.rx.borrow()
    }

    /// Wait for the next published status. `None` once the loop has ended.
    pub async fn changed(&mut self) -> Option<TrackerStatus> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    pub fn stop(&self) {
        self.stop.notify_one();
    }

    /// Wait for the loop to finish (arrival or `stop`).
    pub async fn wait(&mut self) {
        if let Err(e) = (&mut self.task).await {
            if !e.is_cancelled() {
                log::warn!("Clinic tracker task failed: {}", e);
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TrackerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LocationError;
    use crate::map::geolocation::{FixedLocation, NoLocation};
    use crate::storage::{KeyValueStore, MemoryStorage};
    use crate::types::PinFilters;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const OBSERVER: Coordinates = Coordinates::new(32.7157, -117.1611);

    fn store() -> Arc<PinStore> {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStorage::new());
        Arc::new(PinStore::open(storage, "1").unwrap())
    }

    fn options() -> TrackerOptions {
        TrackerOptions::from(&Config::default())
    }

    fn clinic_coordinates(store: &PinStore, tracker_pin: &str) -> Coordinates {
        store.get(tracker_pin).unwrap().coordinates
    }

    #[test]
    fn test_place_adds_observer_and_clinic_pins() {
        let store = store();
        let tracker = ClinicTracker::place(store.clone(), OBSERVER, &options(), 90.0).unwrap();

        let current = store.filter(&PinFilters::by_type(PinType::Current));
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].name, "My Location");
        assert_eq!(current[0].coordinates, OBSERVER);

        let clinic = store.get(tracker.clinic_pin_id()).unwrap();
        assert_eq!(clinic.pin_type, PinType::MobileClinic);
        assert_eq!(clinic.user_id, "1");
        let d = geo::distance_miles(OBSERVER, clinic.coordinates);
        assert!((d - 3.2).abs() < 1e-6, "got {}", d);

        let status = tracker.status();
        assert!(status.running);
        assert_eq!(status.eta_minutes, 12);
    }

    #[test]
    fn test_place_reuses_existing_observer_pin_and_staff_name() {
        let store = store();
        let mut opts = options();
        opts.staff_view = true;
        ClinicTracker::place(store.clone(), OBSERVER, &opts, 10.0).unwrap();
        ClinicTracker::place(store.clone(), OBSERVER, &opts, 20.0).unwrap();

        let current = store.filter(&PinFilters::by_type(PinType::Current));
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].name, "Client Location");
        assert_eq!(store.filter(&PinFilters::by_type(PinType::MobileClinic)).len(), 2);
    }

    #[test]
    fn test_ticks_converge_to_zero() {
        let store = store();
        let mut tracker = ClinicTracker::place(store.clone(), OBSERVER, &options(), 45.0).unwrap();

        let mut previous = tracker.status().distance_remaining;
        for i in 1..=31 {
            let status = tracker.tick().unwrap();
            assert!(status.running, "stopped early at tick {}", i);
            assert!((previous - status.distance_remaining - 0.1).abs() < 1e-9);
            let geometric = geo::distance_miles(status.clinic_position, OBSERVER);
            assert!(
                (geometric - status.distance_remaining).abs() < 1e-6,
                "tick {}: geometric {} vs remaining {}",
                i,
                geometric,
                status.distance_remaining
            );
            previous = status.distance_remaining;
        }

        let last = tracker.tick().unwrap();
        assert_eq!(last.distance_remaining, 0.0);
        assert_eq!(last.eta_minutes, 0);
        assert!(!last.running);
        assert_eq!(last.clinic_position, OBSERVER);
        assert_eq!(clinic_coordinates(&store, tracker.clinic_pin_id()), OBSERVER);

        // Further ticks never go negative
        for _ in 0..3 {
            let status = tracker.tick().unwrap();
            assert_eq!(status.distance_remaining, 0.0);
            assert_eq!(status.eta_minutes, 0);
        }
    }

    #[test]
    fn test_non_positive_step_still_arrives() {
        for step in [0.0, -0.5, f64::NAN] {
            let store = store();
            let mut opts = options();
            opts.tracker.initial_distance_miles = 0.05;
            opts.tracker.step_miles = step;
            let mut tracker = ClinicTracker::place(store.clone(), OBSERVER, &opts, 0.0).unwrap();

            let mut previous = tracker.status().distance_remaining;
            let mut ticks = 0;
            while tracker.is_running() {
                let status = tracker.tick().unwrap();
                assert!(status.distance_remaining < previous, "step {} did not shrink", step);
                previous = status.distance_remaining;
                ticks += 1;
                assert!(ticks <= 5, "step {} never arrived", step);
            }
            assert_eq!(ticks, 5);
            assert_eq!(clinic_coordinates(&store, tracker.clinic_pin_id()), OBSERVER);
        }
    }

    #[test]
    fn test_eta_tracks_distance() {
        let store = store();
        let mut tracker = ClinicTracker::place(store, OBSERVER, &options(), 200.0).unwrap();
        for _ in 0..7 {
            tracker.tick().unwrap();
        }
        // 2.5 mi * 4 min/mi
        let status = tracker.status();
        assert!((status.distance_remaining - 2.5).abs() < 1e-9);
        assert_eq!(status.eta_minutes, 10);
    }

    #[test]
    fn test_tick_persists_position() {
        let store = store();
        let mut tracker = ClinicTracker::place(store.clone(), OBSERVER, &options(), 300.0).unwrap();
        let before = clinic_coordinates(&store, tracker.clinic_pin_id());
        let status = tracker.tick().unwrap();
        let after = clinic_coordinates(&store, tracker.clinic_pin_id());
        assert_ne!(before, after);
        assert_eq!(after, status.clinic_position);
    }

    #[test]
    fn test_deleted_clinic_pin_stops_tracker() {
        let store = store();
        let mut tracker = ClinicTracker::place(store.clone(), OBSERVER, &options(), 0.0).unwrap();
        store.delete(tracker.clinic_pin_id()).unwrap();
        let status = tracker.tick().unwrap();
        assert!(!status.running);
        assert!(store.get(tracker.clinic_pin_id()).is_none());
    }

    #[test]
    fn test_unknown_observer_does_not_start() {
        let store = store();
        let mut rng = StdRng::seed_from_u64(7);
        let state = GeolocationState::default();
        let tracker =
            ClinicTracker::start_from_state(store.clone(), &state, &options(), &mut rng).unwrap();
        assert!(tracker.is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_known_observer_starts_from_state() {
        let store = store();
        let mut rng = StdRng::seed_from_u64(7);
        let state = GeolocationState {
            coordinates: Some(OBSERVER),
            error: None,
            loading: false,
        };
        let tracker = ClinicTracker::start_from_state(store, &state, &options(), &mut rng)
            .unwrap()
            .unwrap();
        assert!(tracker.is_running());
        assert_eq!(tracker.status().observer, OBSERVER);
    }

    #[tokio::test]
    async fn test_start_uses_fallback_when_denied() {
        let store = store();
        let provider = NoLocation(LocationError::PermissionDenied);
        let tracker = ClinicTracker::start(store.clone(), &provider, &options()).await.unwrap();
        assert!(tracker.is_running());
        assert_eq!(tracker.status().observer, OBSERVER);
        let d = geo::distance_miles(OBSERVER, tracker.status().clinic_position);
        assert!((d - 3.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_start_uses_device_location() {
        let store = store();
        let home = Coordinates::new(47.6062, -122.3321);
        let tracker = ClinicTracker::start(store, &FixedLocation(home), &options()).await.unwrap();
        assert_eq!(tracker.status().observer, home);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_runs_to_arrival() {
        let store = store();
        let tracker = ClinicTracker::place(store.clone(), OBSERVER, &options(), 135.0).unwrap();
        let pin_id = tracker.clinic_pin_id().to_string();

        let mut handle = tracker.spawn();
        handle.wait().await;

        let status = handle.status();
        assert!(!status.running);
        assert_eq!(status.distance_remaining, 0.0);
        assert_eq!(status.eta_minutes, 0);
        assert_eq!(clinic_coordinates(&store, &pin_id), OBSERVER);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_waits_one_interval() {
        let store = store();
        let tracker = ClinicTracker::place(store, OBSERVER, &options(), 135.0).unwrap();
        let mut handle = tracker.spawn();

        let start = tokio::time::Instant::now();
        let status = handle.changed().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert!((status.distance_remaining - 3.1).abs() < 1e-9);
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_updates() {
        let store = store();
        let tracker = ClinicTracker::place(store.clone(), OBSERVER, &options(), 10.0).unwrap();
        let pin_id = tracker.clinic_pin_id().to_string();
        let mut handle = tracker.spawn();

        for _ in 0..3 {
            handle.changed().await.unwrap();
        }
        handle.stop();
        handle.wait().await;

        let status = handle.status();
        assert!(!status.running);
        assert!((status.distance_remaining - 2.9).abs() < 1e-9);

        let frozen = clinic_coordinates(&store, &pin_id);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(clinic_coordinates(&store, &pin_id), frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_loop() {
        let store = store();
        let tracker = ClinicTracker::place(store.clone(), OBSERVER, &options(), 10.0).unwrap();
        let pin_id = tracker.clinic_pin_id().to_string();
        let mut handle = tracker.spawn();
        handle.changed().await.unwrap();
        drop(handle);

        let frozen = clinic_coordinates(&store, &pin_id);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(clinic_coordinates(&store, &pin_id), frozen);
    }
}
