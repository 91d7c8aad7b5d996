//! Great-circle math on a spherical Earth (pure math, no state).

use crate::types::Coordinates;

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const KM_PER_MILE: f64 = 1.60934;

/// Forward bearing from `from` toward `to`, in degrees clockwise from north, in [0, 360).
///
/// `θ = atan2(sin Δλ · cos φ2, cos φ1 · sin φ2 − sin φ1 · cos φ2 · cos Δλ)`
pub fn initial_bearing(from: Coordinates, to: Coordinates) -> f64 {
    let phi1 = from.latitude.to_radians();
    let phi2 = to.latitude.to_radians();
    let delta_lambda = (to.longitude - from.longitude).to_radians();

    let y = delta_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Point reached by travelling `distance_miles` from `start` along `bearing_deg`.
///
/// Latitude via the spherical law of cosines, longitude via the `atan2` form,
/// normalized into [-180, 180) so crossing the antimeridian wraps.
pub fn destination(start: Coordinates, distance_miles: f64, bearing_deg: f64) -> Coordinates {
    let angular = distance_miles * KM_PER_MILE / EARTH_RADIUS_KM;
    let theta = bearing_deg.to_radians();
    let phi1 = start.latitude.to_radians();
    let lambda1 = start.longitude.to_radians();

    let phi2 = (phi1.sin() * angular.cos() + phi1.cos() * angular.sin() * theta.cos()).asin();
    let lambda2 = lambda1
        + (theta.sin() * angular.sin() * phi1.cos()).atan2(angular.cos() - phi1.sin() * phi2.sin());

    Coordinates::new(phi2.to_degrees(), normalize_longitude(lambda2.to_degrees()))
}

/// Haversine great-circle distance in miles.
pub fn distance_miles(a: Coordinates, b: Coordinates) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = phi2 - phi1;
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c / KM_PER_MILE
}

fn normalize_longitude(longitude: f64) -> f64 {
    (longitude + 180.0).rem_euclid(360.0) - 180.0
}
