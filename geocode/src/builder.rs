//! Type-state builder for [`GeolocateRequest`]: `WantsWifi -> WantsCell -> Done`, so that
//! forgetting to attach an information source is a compile error rather than a silently empty
//! query.

use std::marker::PhantomData;

use crate::model::{CellTower, GeolocateRequest, WifiAccessPoint};

/// Implemented by anything that can populate the WiFi portion of a [`GeolocateRequest`] - the
/// tracked-BSS set owned by `geoclued-wifi`'s `WifiSource`.
pub trait WifiInfoProvider {
    fn access_points(&self) -> Vec<WifiAccessPoint>;
}

/// Implemented by anything that can populate the cell portion of a [`GeolocateRequest`] - the
/// latest tower owned by `geoclued-cellular`'s `CellSource`.
pub trait CellInfoProvider {
    fn cell_tower(&self) -> Option<CellTower>;
}

pub struct WantsWifi;
pub struct WantsCell;
pub struct Done;

pub struct GeolocateRequestBuilder<S = WantsWifi> {
    request: GeolocateRequest,
    _state: PhantomData<S>,
}

impl GeolocateRequestBuilder<WantsWifi> {
    pub fn new() -> Self {
        Self {
            request: GeolocateRequest::empty(),
            _state: PhantomData,
        }
    }

    pub fn wifi<W: WifiInfoProvider>(mut self, wifi: &W) -> GeolocateRequestBuilder<WantsCell> {
        self.request = self.request.with_wifi(wifi.access_points());
        GeolocateRequestBuilder {
            request: self.request,
            _state: PhantomData,
        }
    }

    /// Skips straight to `Done` for the pure-geoip case (no WiFi device known).
    pub fn geoip_only(self) -> GeolocateRequestBuilder<Done> {
        GeolocateRequestBuilder {
            request: self.request,
            _state: PhantomData,
        }
    }
}

impl Default for GeolocateRequestBuilder<WantsWifi> {
    fn default() -> Self {
        Self::new()
    }
}

impl GeolocateRequestBuilder<WantsCell> {
    pub fn cell<C: CellInfoProvider>(mut self, cell: &C) -> GeolocateRequestBuilder<Done> {
        if let Some(tower) = cell.cell_tower() {
            self.request = self.request.with_cell(tower);
        }
        GeolocateRequestBuilder {
            request: self.request,
            _state: PhantomData,
        }
    }

    pub fn no_cell(self) -> GeolocateRequestBuilder<Done> {
        GeolocateRequestBuilder {
            request: self.request,
            _state: PhantomData,
        }
    }
}

impl GeolocateRequestBuilder<Done> {
    pub fn finish(self) -> GeolocateRequest {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeWifi(Vec<WifiAccessPoint>);
    impl WifiInfoProvider for FakeWifi {
        fn access_points(&self) -> Vec<WifiAccessPoint> {
            self.0.clone()
        }
    }

    struct FakeCell(Option<CellTower>);
    impl CellInfoProvider for FakeCell {
        fn cell_tower(&self) -> Option<CellTower> {
            self.0.clone()
        }
    }

    #[test]
    fn empty_geoip_request_has_no_arrays() {
        let request = GeolocateRequestBuilder::new().geoip_only().finish();
        assert!(request.wifi_access_points.is_none());
        assert!(request.cell_towers.is_none());
    }

    #[test]
    fn wifi_and_cell_populate_respective_arrays() {
        let wifi = FakeWifi(vec![WifiAccessPoint {
            mac_address: "aa:bb:cc:dd:ee:ff".into(),
            signal_strength: -40,
        }]);
        let cell = FakeCell(Some(CellTower {
            cell_id: 1,
            mobile_country_code: 234,
            mobile_network_code: 15,
            location_area_code: 0x1a2b,
        }));

        let request = GeolocateRequestBuilder::new().wifi(&wifi).cell(&cell).finish();

        assert_eq!(request.wifi_access_points.unwrap().len(), 1);
        assert_eq!(request.cell_towers.unwrap().len(), 1);
    }
}
