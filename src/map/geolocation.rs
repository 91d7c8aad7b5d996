//! Device location as a capability.
//!
//! Callers ask a `LocationProvider` for the current position with browser-like
//! options (accuracy, timeout, maximum cached age). Failures never propagate
//! past this module's helpers: `resolve_or_fallback` substitutes a fixed
//! coordinate so map features keep working without a fix.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::LocationError;
use crate::types::{Coordinates, GeolocationConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub timeout: Duration,
    /// A cached fix no older than this may be returned instead of a new query.
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self::from(&GeolocationConfig::default())
    }
}

impl From<&GeolocationConfig> for PositionOptions {
    fn from(config: &GeolocationConfig) -> Self {
        Self {
            enable_high_accuracy: config.enable_high_accuracy,
            timeout: Duration::from_millis(config.timeout_ms),
            maximum_age: Duration::from_millis(config.maximum_age_ms),
        }
    }
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(
        &self,
        options: &PositionOptions,
    ) -> Result<Coordinates, LocationError>;
}

/// Always reports the same coordinate.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub Coordinates);

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_position(
        &self,
        _options: &PositionOptions,
    ) -> Result<Coordinates, LocationError> {
        Ok(self.0)
    }
}

/// Always fails, e.g. a device without location support or a denied permission.
#[derive(Debug, Clone)]
pub struct NoLocation(pub LocationError);

#[async_trait]
impl LocationProvider for NoLocation {
    async fn current_position(
        &self,
        _options: &PositionOptions,
    ) -> Result<Coordinates, LocationError> {
        Err(self.0.clone())
    }
}

/// Wraps a provider and answers from the last fix while it is younger than
/// `maximum_age`.
pub struct CachedLocation<P> {
    inner: P,
    last_fix: Mutex<Option<(Instant, Coordinates)>>,
}

impl<P: LocationProvider> CachedLocation<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            last_fix: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<P: LocationProvider> LocationProvider for CachedLocation<P> {
    async fn current_position(
        &self,
        options: &PositionOptions,
    ) -> Result<Coordinates, LocationError> {
        let cached = *self.last_fix.lock();
        if let Some((at, coordinates)) = cached {
            if at.elapsed() <= options.maximum_age {
                return Ok(coordinates);
            }
        }
        let coordinates = self.inner.current_position(options).await?;
        *self.last_fix.lock() = Some((Instant::now(), coordinates));
        Ok(coordinates)
    }
}

/// Query with the options' timeout applied.
pub async fn query_position(
    provider: &dyn LocationProvider,
    options: &PositionOptions,
) -> Result<Coordinates, LocationError> {
    match tokio::time::timeout(options.timeout, provider.current_position(options)).await {
        Ok(result) => result,
        Err(_) => Err(LocationError::Timeout),
    }
}

/// Resolve the device position, substituting `fallback` on any failure.
pub async fn resolve_or_fallback(
    provider: &dyn LocationProvider,
    options: &PositionOptions,
    fallback: Coordinates,
) -> Coordinates {
    match query_position(provider, options).await {
        Ok(coordinates) => coordinates,
        Err(e) => {
            log::warn!(
                "Location unavailable ({}); using fallback {:.4},{:.4}",
                e,
                fallback.latitude,
                fallback.longitude
            );
            fallback
        }
    }
}

/// What a location-aware view shows: the last fix, the last error, and
/// whether a query is in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct GeolocationState {
    pub coordinates: Option<Coordinates>,
    pub error: Option<String>,
    pub loading: bool,
}

impl Default for GeolocationState {
    fn default() -> Self {
        Self {
            coordinates: None,
            error: None,
            loading: true,
        }
    }
}

impl GeolocationState {
    /// Re-query the position. A failure keeps the previous fix and records the error.
    pub async fn refresh(&mut self, provider: &dyn LocationProvider, options: &PositionOptions) {
        self.loading = true;
        match query_position(provider, options).await {
            Ok(coordinates) => {
                self.coordinates = Some(coordinates);
                self.error = None;
            }
            Err(e) => {
                self.error = Some(e.to_string());
            }
        }
        self.loading = false;
    }
}

/// A running position watch. Dropping it (or calling `clear`) stops the
/// background queries.
pub struct PositionWatch {
    rx: watch::Receiver<Option<Coordinates>>,
    task: JoinHandle<()>,
}

impl PositionWatch {
    /// Most recent successful fix, if any.
    pub fn latest(&self) -> Option<Coordinates> {
        *self.rx.borrow()
    }

    /// Wait for the next fix. Returns `None` once the watch has stopped.
    pub async fn changed(&mut self) -> Option<Coordinates> {
        self.rx.changed().await.ok()?;
        *self.rx.borrow_and_update()
    }

    pub fn clear(self) {
        // Drop aborts the task
    }
}

impl Drop for PositionWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Query now and then every `interval`, publishing each successful fix.
/// Failed queries are logged and skipped.
pub fn watch_position(
    provider: Arc<dyn LocationProvider>,
    options: PositionOptions,
    interval: Duration,
) -> PositionWatch {
    let (tx, rx) = watch::channel(None);
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match query_position(provider.as_ref(), &options).await {
                Ok(coordinates) => {
                    if tx.send(Some(coordinates)).is_err() {
                        break;
                    }
                }
                Err(e) => log::debug!("Position watch: {}", e),
            }
        }
    });
    PositionWatch { rx, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HOME: Coordinates = Coordinates::new(40.0, -75.0);
    const FALLBACK: Coordinates = Coordinates::new(32.7157, -117.1611);

    /// Never answers.
    struct Hanging;

    #[async_trait]
    impl LocationProvider for Hanging {
        async fn current_position(
            &self,
            _options: &PositionOptions,
        ) -> Result<Coordinates, LocationError> {
            std::future::pending().await
        }
    }

    /// Counts queries and walks north by 1 degree each time.
    struct Walking(AtomicUsize);

    #[async_trait]
    impl LocationProvider for Walking {
        async fn current_position(
            &self,
            _options: &PositionOptions,
        ) -> Result<Coordinates, LocationError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Coordinates::new(n as f64, 0.0))
        }
    }

    #[test]
    fn test_default_options() {
        let options = PositionOptions::default();
        assert!(options.enable_high_accuracy);
        assert_eq!(options.timeout, Duration::from_secs(15));
        assert_eq!(options.maximum_age, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_fallback_on_denied() {
        let provider = NoLocation(LocationError::PermissionDenied);
        let at = resolve_or_fallback(&provider, &PositionOptions::default(), FALLBACK).await;
        assert_eq!(at, FALLBACK);
    }

    #[tokio::test]
    async fn test_fallback_on_unsupported() {
        let provider = NoLocation(LocationError::Unsupported);
        let at = resolve_or_fallback(&provider, &PositionOptions::default(), FALLBACK).await;
        assert_eq!(at, FALLBACK);
    }

    #[tokio::test]
    async fn test_resolves_real_fix() {
        let at =
            resolve_or_fallback(&FixedLocation(HOME), &PositionOptions::default(), FALLBACK).await;
        assert_eq!(at, HOME);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_error() {
        let result = query_position(&Hanging, &PositionOptions::default()).await;
        assert_eq!(result, Err(LocationError::Timeout));
    }

    #[tokio::test]
    async fn test_state_keeps_previous_fix_on_error() {
        let options = PositionOptions::default();
        let mut state = GeolocationState::default();
        assert!(state.loading);

        state.refresh(&FixedLocation(HOME), &options).await;
        assert_eq!(state.coordinates, Some(HOME));
        assert!(state.error.is_none());
        assert!(!state.loading);

        state
            .refresh(&NoLocation(LocationError::PositionUnavailable), &options)
            .await;
        assert_eq!(state.coordinates, Some(HOME));
        assert_eq!(
            state.error.as_deref(),
            Some("Location information is unavailable.")
        );
        assert!(!state.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_honours_maximum_age() {
        let provider = CachedLocation::new(Walking(AtomicUsize::new(0)));
        let options = PositionOptions::default();

        let first = provider.current_position(&options).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        let cached = provider.current_position(&options).await.unwrap();
        assert_eq!(first, cached);

        tokio::time::advance(Duration::from_secs(6)).await;
        let fresh = provider.current_position(&options).await.unwrap();
        assert_ne!(first, fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_publishes_and_stops() {
        let provider: Arc<dyn LocationProvider> = Arc::new(Walking(AtomicUsize::new(0)));
        let mut watch = watch_position(provider, PositionOptions::default(), Duration::from_secs(1));

        assert_eq!(watch.changed().await, Some(Coordinates::new(0.0, 0.0)));
        assert_eq!(watch.changed().await, Some(Coordinates::new(1.0, 0.0)));
        assert_eq!(watch.latest(), Some(Coordinates::new(1.0, 0.0)));
        watch.clear();
    }
}
