//! [`LocationObject`]: the `org.freedesktop.GeoClue2.Location` interface, one object per
//! published fix (§6). Ordinarily a snapshot — a new fix is a new object — except for the §9
//! in-place refinement case, where [`LocationObject::set_location`] updates this object instead of
//! a new one being minted.

use geoclued_core::Location;
use zbus::interface;

/// Sentinel the real GeoClue2 API returns for a speed/heading/altitude the source didn't report.
const UNKNOWN_F64: f64 = -1.0;

pub struct LocationObject {
    location: Location,
}

impl LocationObject {
    pub fn new(location: Location) -> Self {
        Self { location }
    }

    /// Refines an already-published object in place (§9: a fix inside the client's distance
    /// threshold updates the existing object rather than minting a new one).
    pub fn set_location(&mut self, location: Location) {
        self.location = location;
    }
}

#[interface(name = "org.freedesktop.GeoClue2.Location")]
impl LocationObject {
    #[zbus(property)]
    fn latitude(&self) -> f64 {
        self.location.latitude()
    }

    #[zbus(property)]
    fn longitude(&self) -> f64 {
        self.location.longitude()
    }

    #[zbus(property)]
    fn accuracy(&self) -> f64 {
        self.location.accuracy().unwrap_or(UNKNOWN_F64)
    }

    #[zbus(property)]
    fn altitude(&self) -> f64 {
        self.location.altitude().unwrap_or(UNKNOWN_F64)
    }

    #[zbus(property)]
    fn speed(&self) -> f64 {
        self.location.speed().unwrap_or(UNKNOWN_F64)
    }

    #[zbus(property)]
    fn heading(&self) -> f64 {
        self.location.heading().unwrap_or(UNKNOWN_F64)
    }

    #[zbus(property)]
    fn description(&self) -> String {
        self.location.description().unwrap_or_default().to_string()
    }

    #[zbus(property)]
    fn timestamp(&self) -> (u64, u64) {
        let ts = self.location.timestamp();
        let secs = ts.timestamp().max(0) as u64;
        let micros = u64::from(ts.timestamp_subsec_micros());
        (secs, micros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreported_fields_use_the_unknown_sentinel() {
        let fix = Location::new(48.8566, 2.3522, None).unwrap();
        let object = LocationObject::new(fix);
        assert_eq!(object.accuracy(), UNKNOWN_F64);
        assert_eq!(object.altitude(), UNKNOWN_F64);
        assert_eq!(object.speed(), UNKNOWN_F64);
        assert_eq!(object.heading(), UNKNOWN_F64);
    }

    #[test]
    fn reported_fields_pass_through() {
        let fix = Location::new(48.8566, 2.3522, Some(15000.0))
            .unwrap()
            .with_altitude(Some(35.0))
            .with_speed(Some(1.4))
            .with_heading(Some(90.0));
        let object = LocationObject::new(fix);
        assert_eq!(object.latitude(), 48.8566);
        assert_eq!(object.longitude(), 2.3522);
        assert_eq!(object.accuracy(), 15000.0);
        assert_eq!(object.altitude(), 35.0);
        assert_eq!(object.speed(), 1.4);
        assert_eq!(object.heading(), 90.0);
    }
}
