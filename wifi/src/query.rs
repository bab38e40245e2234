//! [`geoclued_geocode::QueryBuilder`] implementation for the WiFi source: shapes the tracked BSS
//! set into a Mozilla-compatible geolocate request and, optionally, a crowdsource submission.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use geoclued_core::Location;
use geoclued_geocode::builder::{GeolocateRequestBuilder, WifiInfoProvider};
use geoclued_geocode::{
    GeolocateResponse, QueryBuilder, SubmissionItem, SubmissionRequest, SubmissionWifi,
    WifiAccessPoint,
};
use tokio::sync::Mutex;

use crate::admission::Admission;
use crate::error::{Error, Result};

pub struct WifiQueryBuilder {
    geolocate_url: String,
    submit_url: Option<String>,
    admission: Arc<Mutex<Admission>>,
}

impl WifiQueryBuilder {
    pub fn new(
        geolocate_url: String,
        submit_url: Option<String>,
        admission: Arc<Mutex<Admission>>,
    ) -> Self {
        Self {
            geolocate_url,
            submit_url,
            admission,
        }
    }

    async fn snapshot(&self) -> Vec<WifiAccessPoint> {
        self.admission
            .lock()
            .await
            .tracked()
            .map(|bss| WifiAccessPoint {
                mac_address: bss.bssid.clone(),
                signal_strength: bss.signal_dbm,
            })
            .collect()
    }
}

/// Adapts a plain `Vec<WifiAccessPoint>` snapshot to the request builder's provider trait.
struct TrackedWifi(Vec<WifiAccessPoint>);

impl WifiInfoProvider for TrackedWifi {
    fn access_points(&self) -> Vec<WifiAccessPoint> {
        self.0.clone()
    }
}

#[async_trait]
impl QueryBuilder for WifiQueryBuilder {
    async fn create_query(&self, client: &reqwest::Client) -> Result<reqwest::Request> {
        let aps = self.snapshot().await;
        let request = if aps.is_empty() {
            // No access point known yet: fall back to a pure-geoip body (§6 scenario 1), not a
            // "gsm" radio type with an empty array.
            GeolocateRequestBuilder::new().geoip_only().finish()
        } else {
            GeolocateRequestBuilder::new()
                .wifi(&TrackedWifi(aps))
                .no_cell()
                .finish()
        };

        client
            .post(&self.geolocate_url)
            .json(&request)
            .build()
            .map_err(Error::from)
    }

    async fn parse_response(&self, response: reqwest::Response) -> Result<Location> {
        let body: GeolocateResponse = response.json().await.map_err(Error::from)?;
        match body {
            GeolocateResponse::Success(success) => Location::new(
                success.location.lat,
                success.location.lng,
                Some(success.accuracy),
            )
            .map_err(Error::from),
            GeolocateResponse::Error(err) => Err(Error::Provider(format!(
                "{}: {}",
                err.error.code, err.error.message
            ))),
        }
    }

    async fn create_submit_query(
        &self,
        client: &reqwest::Client,
        location: &Location,
    ) -> Option<reqwest::Request> {
        let submit_url = self.submit_url.as_ref()?;
        let admission = self.admission.lock().await;
        let wifi: Vec<SubmissionWifi> = admission
            .tracked()
            .map(|bss| SubmissionWifi {
                key: bss.bssid.clone(),
                signal: bss.signal_dbm,
                frequency: bss.frequency_mhz * 1000,
            })
            .collect();
        drop(admission);
        if wifi.is_empty() {
            return None;
        }

        let request = SubmissionRequest {
            items: vec![SubmissionItem {
                lat: location.latitude(),
                lon: location.longitude(),
                accuracy: location.accuracy(),
                altitude: location.altitude(),
                time: Utc::now().to_rfc3339(),
                radio_type: "gsm",
                wifi,
                cell: Vec::new(),
            }],
        };

        client.post(submit_url).json(&request).build().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::Admission;

    fn empty_builder() -> WifiQueryBuilder {
        WifiQueryBuilder::new(
            "https://example.invalid/geolocate".into(),
            None,
            Arc::new(Mutex::new(Admission::new())),
        )
    }

    #[tokio::test]
    async fn create_query_posts_to_the_configured_url() {
        let builder = empty_builder();
        let client = reqwest::Client::new();
        let request = builder.create_query(&client).await.unwrap();
        assert_eq!(request.url().as_str(), "https://example.invalid/geolocate");
        assert_eq!(request.method(), reqwest::Method::POST);
    }

    #[tokio::test]
    async fn submit_query_is_none_without_a_submit_url() {
        let builder = empty_builder();
        let client = reqwest::Client::new();
        let location = Location::new(1.0, 2.0, Some(10.0)).unwrap();
        assert!(builder.create_submit_query(&client, &location).await.is_none());
    }
}
