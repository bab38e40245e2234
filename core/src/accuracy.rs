/// Total order of how precisely a source can locate the device.
///
/// Numeric gaps mirror the upstream taxonomy this was ported from; preserve the ordering when
/// adding variants, not the literal discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum AccuracyLevel {
    None = 0,
    Country = 1,
    City = 4,
    Neighborhood = 5,
    Street = 6,
    Exact = 8,
}

impl AccuracyLevel {
    /// `COUNTRY` is coerced to `CITY` at Locator-construction time because no source in this
    /// workspace offers country-only accuracy.
    pub fn coerce_requested(self) -> Self {
        if self == AccuracyLevel::Country {
            AccuracyLevel::City
        } else {
            self
        }
    }
}

/// Metre radii used to turn a provider's string accuracy tag into a numeric value.
pub mod bucket {
    pub const STREET: f64 = 1_000.0;
    pub const CITY: f64 = 15_000.0;
    pub const REGION: f64 = 50_000.0;
    pub const COUNTRY: f64 = 300_000.0;
    pub const CONTINENT: f64 = 3_000_000.0;
}

/// Maps an IP-geolocation provider's locality tag to a metre radius. Unrecognised tags fall back
/// to the widest (`CONTINENT`) bucket, the conservative choice when the provider's vocabulary
/// doesn't match any known tag.
pub fn accuracy_tag_to_metres(tag: &str) -> f64 {
    match tag {
        "street" => bucket::STREET,
        "city" => bucket::CITY,
        "region" => bucket::REGION,
        "country" => bucket::COUNTRY,
        "continent" => bucket::CONTINENT,
        _ => bucket::CONTINENT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_rank() {
        assert!(AccuracyLevel::None < AccuracyLevel::Country);
        assert!(AccuracyLevel::Country < AccuracyLevel::City);
        assert!(AccuracyLevel::City < AccuracyLevel::Neighborhood);
        assert!(AccuracyLevel::Neighborhood < AccuracyLevel::Street);
        assert!(AccuracyLevel::Street < AccuracyLevel::Exact);
    }

    #[test]
    fn country_is_coerced_to_city() {
        assert_eq!(AccuracyLevel::Country.coerce_requested(), AccuracyLevel::City);
        assert_eq!(AccuracyLevel::Street.coerce_requested(), AccuracyLevel::Street);
    }

    #[test]
    fn tag_mapping_is_total_and_monotone_with_buckets() {
        assert_eq!(accuracy_tag_to_metres("street"), bucket::STREET);
        assert_eq!(accuracy_tag_to_metres("city"), bucket::CITY);
        assert_eq!(accuracy_tag_to_metres("region"), bucket::REGION);
        assert_eq!(accuracy_tag_to_metres("country"), bucket::COUNTRY);
        assert_eq!(accuracy_tag_to_metres("continent"), bucket::CONTINENT);
        assert_eq!(accuracy_tag_to_metres("anything-else"), bucket::CONTINENT);
        assert!(bucket::STREET < bucket::CITY);
        assert!(bucket::CITY < bucket::REGION);
        assert!(bucket::REGION < bucket::COUNTRY);
        assert!(bucket::COUNTRY < bucket::CONTINENT);
    }
}
