use crate::location::Location;

/// The Locator's merge rule (§4.8): decide whether a freshly published `candidate` should replace
/// `current`.
///
/// Rejects `candidate` iff it falls inside `current`'s confidence circle *and* is less accurate
/// than `current` - in that case it contributes no information. Everything else is accepted,
/// including the case where there is no `current` yet.
pub fn accepts(current: Option<&Location>, candidate: &Location) -> bool {
    let Some(current) = current else {
        return true;
    };

    let (Some(current_accuracy), Some(candidate_accuracy)) =
        (current.accuracy(), candidate.accuracy())
    else {
        // Unknown accuracy can't be compared; treat as always informative.
        return true;
    };

    let distance_m = current.distance_to(candidate) * 1000.0;
    let is_inside_confidence_circle = distance_m < candidate_accuracy;
    let is_less_accurate = candidate_accuracy > current_accuracy;

    !(is_inside_confidence_circle && is_less_accurate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(lat: f64, lon: f64, accuracy: f64) -> Location {
        Location::new(lat, lon, Some(accuracy)).unwrap()
    }

    #[test]
    fn rejects_less_accurate_fix_inside_confidence_circle() {
        let current = loc(0.0, 0.0, 100.0);
        let candidate = loc(0.0, 0.0005, 200.0);
        assert!(!accepts(Some(&current), &candidate));
    }

    #[test]
    fn accepts_fix_that_is_not_less_accurate() {
        let current = loc(0.0, 0.0, 100.0);
        let candidate = loc(0.0, 0.0005, 50.0);
        assert!(accepts(Some(&current), &candidate));
    }

    #[test]
    fn accepts_fix_outside_confidence_circle() {
        let current = loc(0.0, 0.0, 100.0);
        let far_away = loc(1.0, 1.0, 200.0);
        assert!(accepts(Some(&current), &far_away));
    }

    #[test]
    fn accepts_when_no_current_fix_exists() {
        let candidate = loc(0.0, 0.0, 10.0);
        assert!(accepts(None, &candidate));
    }
}
