//! [`geoclued_geocode::QueryBuilder`] implementation for the cell source, talking to OpenCellID
//! rather than the Mozilla-compatible endpoint the WiFi source uses (§4.6, §6).

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use geoclued_core::Location;
use geoclued_geocode::opencellid::{self, CellFixRequest, COVERAGE_RADIUS_M};
use geoclued_geocode::{Error as GeocodeError, QueryBuilder};

use crate::modem::CellFix;

pub struct CellQueryBuilder {
    base_url: String,
    api_key: String,
    latest: StdMutex<Option<CellFix>>,
}

impl CellQueryBuilder {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            latest: StdMutex::new(None),
        }
    }

    pub fn set_latest(&self, fix: CellFix) {
        *self.latest.lock().unwrap() = Some(fix);
    }
}

#[async_trait]
impl QueryBuilder for CellQueryBuilder {
    async fn create_query(
        &self,
        client: &reqwest::Client,
    ) -> geoclued_geocode::Result<reqwest::Request> {
        let fix = self
            .latest
            .lock()
            .unwrap()
            .ok_or(GeocodeError::NotInitialised)?;

        let url = opencellid::request_url(
            &self.base_url,
            &self.api_key,
            CellFixRequest {
                mobile_country_code: fix.mobile_country_code,
                mobile_network_code: fix.mobile_network_code,
                location_area_code: fix.location_area_code,
                cell_id: fix.cell_id,
            },
        );

        client.get(&url).build().map_err(GeocodeError::from)
    }

    async fn parse_response(
        &self,
        response: reqwest::Response,
    ) -> geoclued_geocode::Result<Location> {
        let body = response.text().await.map_err(GeocodeError::from)?;
        let (lat, lon) = opencellid::parse_response(&body)?;
        Location::new(lat, lon, Some(COVERAGE_RADIUS_M)).map_err(GeocodeError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_query_fails_before_any_fix_is_known() {
        let builder = CellQueryBuilder::new("https://opencellid.org/cell/get".into(), "KEY".into());
        let client = reqwest::Client::new();
        assert!(builder.create_query(&client).await.is_err());
    }

    #[tokio::test]
    async fn create_query_succeeds_once_a_fix_is_set() {
        let builder = CellQueryBuilder::new("https://opencellid.org/cell/get".into(), "KEY".into());
        builder.set_latest(CellFix {
            mobile_country_code: 234,
            mobile_network_code: 15,
            location_area_code: 0x1a2b,
            cell_id: 0x0ffff,
        });
        let client = reqwest::Client::new();
        let request = builder.create_query(&client).await.unwrap();
        assert_eq!(request.method(), reqwest::Method::GET);
        assert!(request.url().query().unwrap().contains("mcc=234"));
    }
}
