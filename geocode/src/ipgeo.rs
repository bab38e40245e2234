//! IP-geolocation response codec (§6 "IP geolocation response JSON").

use geoclued_core::accuracy::accuracy_tag_to_metres;
use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidIpAddress,
    InvalidEntry,
    Database,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawErrorCode {
    InvalidIpAddress,
    InvalidEntry,
    Database,
}

impl From<RawErrorCode> for ErrorCode {
    fn from(raw: RawErrorCode) -> Self {
        match raw {
            RawErrorCode::InvalidIpAddress => ErrorCode::InvalidIpAddress,
            RawErrorCode::InvalidEntry => ErrorCode::InvalidEntry,
            RawErrorCode::Database => ErrorCode::Database,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    latitude: Option<f64>,
    longitude: Option<f64>,
    accuracy: Option<String>,
    street: Option<String>,
    city: Option<String>,
    region_name: Option<String>,
    country_name: Option<String>,
    continent: Option<String>,
    error_code: Option<RawErrorCode>,
    error_message: Option<String>,
}

pub struct IpFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
}

/// Radius is taken from the `accuracy` string bucket if present, else the finest-grained locality
/// hint available (street > city > region > country > continent), else the continent default.
pub fn parse_response(body: &str) -> Result<IpFix> {
    let raw: RawResponse = serde_json::from_str(body)?;

    if let Some(code) = raw.error_code {
        let code: ErrorCode = code.into();
        let message = raw.error_message.unwrap_or_default();
        return Err(Error::Provider(format!("{code:?}: {message}")));
    }

    let latitude = raw
        .latitude
        .ok_or_else(|| Error::Provider("IP geolocation response missing latitude".into()))?;
    let longitude = raw
        .longitude
        .ok_or_else(|| Error::Provider("IP geolocation response missing longitude".into()))?;

    let accuracy_m = if let Some(tag) = raw.accuracy.as_deref() {
        accuracy_tag_to_metres(tag)
    } else if raw.street.is_some() {
        accuracy_tag_to_metres("street")
    } else if raw.city.is_some() {
        accuracy_tag_to_metres("city")
    } else if raw.region_name.is_some() {
        accuracy_tag_to_metres("region")
    } else if raw.country_name.is_some() {
        accuracy_tag_to_metres("country")
    } else if raw.continent.is_some() {
        accuracy_tag_to_metres("continent")
    } else {
        accuracy_tag_to_metres("continent")
    };

    Ok(IpFix {
        latitude,
        longitude,
        accuracy_m,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_accuracy_bucket() {
        let fix = parse_response(r#"{"latitude":1.0,"longitude":2.0,"accuracy":"city"}"#).unwrap();
        assert_eq!(fix.accuracy_m, accuracy_tag_to_metres("city"));
    }

    #[test]
    fn falls_back_to_finest_locality_hint() {
        let fix = parse_response(
            r#"{"latitude":1.0,"longitude":2.0,"city":"Paris","country_name":"France"}"#,
        )
        .unwrap();
        assert_eq!(fix.accuracy_m, accuracy_tag_to_metres("city"));
    }

    #[test]
    fn error_code_is_surfaced() {
        let err = parse_response(r#"{"error_code":"invalid_ip_address","error_message":"nope"}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }
}
