use serde::{Deserialize, Serialize};

/// A single observed cell tower, as sent in a Mozilla-compatible geolocate request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellTower {
    pub cell_id: u32,
    pub mobile_country_code: u32,
    pub mobile_network_code: u32,
    pub location_area_code: u32,
}

/// A single tracked BSS, as sent in a Mozilla-compatible geolocate request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WifiAccessPoint {
    pub mac_address: String,
    pub signal_strength: i32,
}

/// The WiFi/cell geolocate query body (§6). Either array may be omitted when empty; an entirely
/// empty body (`{}`) means "pure geoip".
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeolocateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radio_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_towers: Option<Vec<CellTower>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wifi_access_points: Option<Vec<WifiAccessPoint>>,
}

impl GeolocateRequest {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_wifi(mut self, aps: Vec<WifiAccessPoint>) -> Self {
        self.radio_type = Some("gsm");
        if !aps.is_empty() {
            self.wifi_access_points = Some(aps);
        }
        self
    }

    pub fn with_cell(mut self, tower: CellTower) -> Self {
        self.radio_type = Some("gsm");
        self.cell_towers = Some(vec![tower]);
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeolocateCoordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeolocateSuccess {
    pub location: GeolocateCoordinates,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeolocateErrorBody {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeolocateErrorResponse {
    pub error: GeolocateErrorBody,
}

/// Response is either a fix or a provider-reported error; `serde(untagged)` tries each variant in
/// order, the same way a Google Geolocation API response type would.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GeolocateResponse {
    Success(GeolocateSuccess),
    Error(GeolocateErrorResponse),
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionWifi {
    pub key: String,
    pub signal: i32,
    pub frequency: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionCell {
    pub radio: &'static str,
    pub cid: u32,
    pub mcc: u32,
    pub mnc: u32,
    pub lac: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionItem {
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    pub time: String,
    pub radio_type: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub wifi: Vec<SubmissionWifi>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cell: Vec<SubmissionCell>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionRequest {
    pub items: Vec<SubmissionItem>,
}
