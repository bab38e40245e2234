use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Mean earth radius used for the great-circle distance calculation, matching the upstream
/// geocode library this was ported from rather than WGS84's semi-major axis.
const EARTH_RADIUS_KM: f64 = 6_372.795;

/// A geographic fix, with accuracy and derived speed/heading.
///
/// Treated as immutable once published: a new fix replaces the old one wholesale rather than
/// mutating it in place. `speed`/`heading` are the only fields ever set after construction, and
/// only by [`Location::set_speed_from_prev`]/[`Location::set_heading_from_prev`] before the fix is
/// handed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    latitude: f64,
    longitude: f64,
    /// Metres, or `None` for the *UNKNOWN* sentinel.
    accuracy: Option<f64>,
    /// Metres, or `None` for the *UNKNOWN* sentinel.
    altitude: Option<f64>,
    timestamp: DateTime<Utc>,
    description: Option<String>,
    /// Metres per second, or `None` for the *UNKNOWN* sentinel.
    speed: Option<f64>,
    /// Degrees from true north, or `None` for the *UNKNOWN* sentinel.
    heading: Option<f64>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, accuracy: Option<f64>) -> Result<Self> {
        Self::with_description(latitude, longitude, accuracy, None)
    }

    pub fn with_description(
        latitude: f64,
        longitude: f64,
        accuracy: Option<f64>,
        description: Option<String>,
    ) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidLatitude(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidLongitude(longitude));
        }
        if let Some(acc) = accuracy {
            if acc < 0.0 {
                return Err(Error::InvalidAccuracy(acc));
            }
        }

        Ok(Self {
            latitude,
            longitude,
            accuracy,
            altitude: None,
            timestamp: Utc::now(),
            description,
            speed: None,
            heading: None,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn accuracy(&self) -> Option<f64> {
        self.accuracy
    }

    pub fn altitude(&self) -> Option<f64> {
        self.altitude
    }

    pub fn with_altitude(mut self, altitude: Option<f64>) -> Self {
        self.altitude = altitude;
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn speed(&self) -> Option<f64> {
        self.speed
    }

    pub fn heading(&self) -> Option<f64> {
        self.heading
    }

    pub fn with_speed(mut self, speed: Option<f64>) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_heading(mut self, heading: Option<f64>) -> Self {
        self.heading = heading;
        self
    }

    /// Great-circle distance to `other`, in kilometres, via the spherical law of cosines.
    /// Altitude is ignored.
    pub fn distance_to(&self, other: &Location) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        // Clamp against float noise: for A == B this can drift fractionally above 1.0, and
        // acos of anything outside [-1, 1] is NaN.
        let central_angle =
            (lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * dlon.cos()).clamp(-1.0, 1.0);

        EARTH_RADIUS_KM * central_angle.acos()
    }

    /// Computes and stores `speed` (m/s) from `prev`, the source's previously published fix.
    /// `None` if there is no previous fix or the timestamps coincide.
    pub fn set_speed_from_prev(&mut self, prev: Option<&Location>) {
        self.speed = prev.and_then(|prev| {
            let seconds = (self.timestamp - prev.timestamp).num_milliseconds() as f64 / 1000.0;
            if seconds <= 0.0 {
                return None;
            }
            let distance_m = self.distance_to(prev) * 1000.0;
            Some(distance_m / seconds)
        });
    }

    /// Computes and stores `heading` (degrees from true north) from `prev` via the standard
    /// initial-bearing (forward azimuth) formula. `None` if there is no previous fix or the two
    /// fixes are coincident.
    pub fn set_heading_from_prev(&mut self, prev: Option<&Location>) {
        self.heading = prev.and_then(|prev| {
            if prev.latitude == self.latitude && prev.longitude == self.longitude {
                return None;
            }

            let lat1 = prev.latitude.to_radians();
            let lat2 = self.latitude.to_radians();
            let dlon = (self.longitude - prev.longitude).to_radians();

            let y = dlon.sin() * lat2.cos();
            let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
            let bearing = y.atan2(x).to_degrees();

            Some((bearing + 360.0) % 360.0)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn loc(lat: f64, lon: f64, accuracy: f64) -> Location {
        Location::new(lat, lon, Some(accuracy)).unwrap()
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(matches!(
            Location::new(91.0, 0.0, None),
            Err(Error::InvalidLatitude(_))
        ));
        assert!(matches!(
            Location::new(0.0, 181.0, None),
            Err(Error::InvalidLongitude(_))
        ));
    }

    #[test]
    fn rejects_negative_accuracy() {
        assert!(matches!(
            Location::new(0.0, 0.0, Some(-1.0)),
            Err(Error::InvalidAccuracy(_))
        ));
    }

    #[test]
    fn distance_is_symmetric_and_zero_for_identical_points() {
        let a = loc(48.8566, 2.3522, 10.0);
        let b = loc(51.5074, -0.1278, 10.0);

        assert!((a.distance_to(&b) - b.distance_to(&a)).abs() < 1e-9);
        assert!(a.distance_to(&a) < 1e-9);
    }

    #[test]
    fn merge_rejection_example_distance_matches_spec() {
        // Locator current (0, 0, 100); child publishes (0, 0.0005, 200): distance ~= 55.6 m.
        let current = loc(0.0, 0.0, 100.0);
        let candidate = loc(0.0, 0.0005, 200.0);
        let distance_m = current.distance_to(&candidate) * 1000.0;
        assert!((distance_m - 55.6).abs() < 1.0);
    }

    #[test]
    fn threshold_filter_example_distances_match_spec() {
        let f0 = loc(10.0, 10.0, 50.0);
        let f1 = loc(10.001, 10.001, 50.0);
        let f2 = loc(10.01, 10.0, 50.0);

        let d01 = f0.distance_to(&f1) * 1000.0;
        assert!((d01 - 157.0).abs() < 5.0);

        let d02 = f0.distance_to(&f2);
        assert!((d02 - 1.11).abs() < 0.05);
    }

    #[test]
    fn speed_is_unknown_without_previous_fix() {
        let mut fix = loc(0.0, 0.0, 10.0);
        fix.set_speed_from_prev(None);
        assert_eq!(fix.speed(), None);
    }

    #[test]
    fn speed_is_unknown_when_timestamps_coincide() {
        let prev = loc(0.0, 0.0, 10.0);
        let mut fix = loc(0.0, 1.0, 10.0).with_timestamp(prev.timestamp());
        fix.set_speed_from_prev(Some(&prev));
        assert_eq!(fix.speed(), None);
    }

    #[test]
    fn speed_derivation_matches_distance_over_time() {
        let prev = loc(0.0, 0.0, 10.0);
        let mut fix = loc(0.0, 1.0, 10.0).with_timestamp(prev.timestamp() + Duration::seconds(100));
        fix.set_speed_from_prev(Some(&prev));

        let expected = prev.distance_to(&fix) * 1000.0 / 100.0;
        assert!((fix.speed().unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn heading_due_east_is_ninety_degrees() {
        let prev = loc(0.0, 0.0, 10.0);
        let mut fix = loc(0.0, 1.0, 10.0).with_timestamp(prev.timestamp() + Duration::seconds(1));
        fix.set_heading_from_prev(Some(&prev));
        assert!((fix.heading().unwrap() - 90.0).abs() < 0.5);
    }

    #[test]
    fn heading_is_unknown_for_coincident_fixes() {
        let prev = loc(0.0, 0.0, 10.0);
        let mut fix = loc(0.0, 0.0, 10.0);
        fix.set_heading_from_prev(Some(&prev));
        assert_eq!(fix.heading(), None);
    }
}
