//! OpenCellID query construction and XML response parsing (§6 "OpenCellID query").

use quick_xml::de::from_str;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Fixed coverage-radius assumption: OpenCellID doesn't report an accuracy figure, so every fix
/// it returns is stamped with this.
pub const COVERAGE_RADIUS_M: f64 = 3_000.0;

#[derive(Debug, Clone, Copy)]
pub struct CellFixRequest {
    pub mobile_country_code: u32,
    pub mobile_network_code: u32,
    pub location_area_code: u32,
    pub cell_id: u32,
}

pub fn request_url(base_url: &str, api_key: &str, fix: CellFixRequest) -> String {
    format!(
        "{base}?mcc={mcc}&mnc={mnc}&lac={lac}&cellid={cellid}&apiKey={key}",
        base = base_url,
        mcc = fix.mobile_country_code,
        mnc = fix.mobile_network_code,
        lac = fix.location_area_code,
        cellid = fix.cell_id,
        key = api_key,
    )
}

#[derive(Debug, Deserialize)]
struct Rsp {
    cell: Option<Cell>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    #[serde(rename = "@lat")]
    lat: f64,
    #[serde(rename = "@lon")]
    lon: f64,
}

/// (latitude, longitude), with the fixed [`COVERAGE_RADIUS_M`] as accuracy.
pub fn parse_response(body: &str) -> Result<(f64, f64)> {
    let rsp: Rsp = from_str(body)?;
    let cell = rsp
        .cell
        .ok_or_else(|| Error::Provider("OpenCellID response carried no <cell> element".into()))?;
    Ok((cell.lat, cell.lon))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_url_contains_all_four_parameters() {
        let url = request_url(
            "https://opencellid.org/cell/get",
            "KEY",
            CellFixRequest {
                mobile_country_code: 234,
                mobile_network_code: 15,
                location_area_code: 0x1a2b,
                cell_id: 0x0ffff,
            },
        );
        assert!(url.contains("mcc=234"));
        assert!(url.contains("mnc=15"));
        assert!(url.contains("lac=6699"));
        assert!(url.contains("cellid=65535"));
        assert!(url.contains("apiKey=KEY"));
    }

    #[test]
    fn parses_the_spec_example_response() {
        let (lat, lon) = parse_response(r#"<rsp><cell lat="51.5" lon="-0.12"/></rsp>"#).unwrap();
        assert_eq!(lat, 51.5);
        assert_eq!(lon, -0.12);
    }

    #[test]
    fn missing_cell_element_is_an_error() {
        assert!(parse_response("<rsp/>").is_err());
    }
}
