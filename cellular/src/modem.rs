//! EC25 AT-command serving-cell tracking, narrowed from "serving + neighbor cell telemetry across
//! GSM/WCDMA/LTE" to the (mcc, mnc, lac, cellId) *fix-3g* tuple CellSource consumes (§4.6). LTE
//! serving cells carry no LAC and so never produce a fix.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellFix {
    pub mobile_country_code: u32,
    pub mobile_network_code: u32,
    pub location_area_code: u32,
    pub cell_id: u32,
}

pub struct Ec25Modem {
    port: Box<dyn SerialPort>,
}

impl Ec25Modem {
    pub fn open(device: &str) -> Result<Self> {
        let port = serialport::new(device, 115_200)
            .timeout(Duration::from_secs(2))
            .open()
            .map_err(|e| Error::PortUnavailable(e.to_string()))?;
        Ok(Self { port })
    }

    fn send_command(&mut self, command: &str, retries: usize, timeout: Duration) -> Result<String> {
        let line = format!("{command}\r\n");

        for attempt in 0..=retries {
            if attempt > 0 {
                debug!(attempt, command, "retrying AT command");
                std::thread::sleep(Duration::from_millis(500));
            }

            let _ = self.port.flush();
            if self.port.write_all(line.as_bytes()).is_err() {
                continue;
            }

            let mut response = String::new();
            let mut buf = [0u8; 1024];
            let start = std::time::Instant::now();

            while start.elapsed() < timeout {
                match self.port.read(&mut buf) {
                    Ok(n) if n > 0 => {
                        response.push_str(&String::from_utf8_lossy(&buf[..n]));
                        if response.contains("OK") {
                            return Ok(response);
                        }
                        if response.contains("ERROR") {
                            warn!(command, "modem returned ERROR");
                            break;
                        }
                    }
                    Ok(_) => std::thread::sleep(Duration::from_millis(50)),
                    Err(e) => {
                        warn!(error = %e, "error reading from modem port");
                        break;
                    }
                }
            }
        }

        Err(Error::CommandFailed(command.to_string()))
    }

    /// Issues `AT+QENG="servingcell"` and extracts a (mcc, mnc, lac, cellId) fix if the serving
    /// cell is GSM or WCDMA (both carry a LAC; LTE's TAC doesn't map to this tuple).
    pub fn get_cell_fix(&mut self) -> Result<Option<CellFix>> {
        let response = self.send_command("AT+QENG=\"servingcell\"", 3, Duration::from_secs(5))?;
        parse_cell_fix(&response)
    }
}

fn split_quoted_fields(line: &str) -> Vec<String> {
    line.split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .collect()
}

fn parse_opt_u32(field: &str) -> Option<u32> {
    match field.trim() {
        "-" | "" => None,
        s => s.parse().ok(),
    }
}

fn parse_hex_u32(field: &str) -> Option<u32> {
    let field = field.trim();
    if field.is_empty() || field == "-" {
        return None;
    }
    u32::from_str_radix(field, 16).ok()
}

fn parse_cell_fix(response: &str) -> Result<Option<CellFix>> {
    const PREFIX: &str = "+QENG: \"servingcell\",";

    let line = response
        .lines()
        .find(|l| l.contains("+QENG: \"servingcell\""))
        .ok_or_else(|| Error::ParseFailed("no +QENG: \"servingcell\" line found".into()))?;

    let Some(idx) = line.find(PREFIX) else {
        return Err(Error::ParseFailed(line.to_string()));
    };
    let fields = split_quoted_fields(&line[idx + PREFIX.len()..]);

    if fields.len() < 2 {
        // e.g. a bare "SEARCH" state with no RAT yet.
        return Ok(None);
    }

    let rat = fields[1].as_str();
    match rat {
        "GSM" if fields.len() >= 6 => Ok(Some(CellFix {
            mobile_country_code: parse_opt_u32(&fields[2]).unwrap_or_default(),
            mobile_network_code: parse_opt_u32(&fields[3]).unwrap_or_default(),
            location_area_code: parse_hex_u32(&fields[4]).unwrap_or_default(),
            cell_id: parse_hex_u32(&fields[5]).unwrap_or_default(),
        })),
        "WCDMA" if fields.len() >= 6 => Ok(Some(CellFix {
            mobile_country_code: parse_opt_u32(&fields[2]).unwrap_or_default(),
            mobile_network_code: parse_opt_u32(&fields[3]).unwrap_or_default(),
            location_area_code: parse_hex_u32(&fields[4]).unwrap_or_default(),
            cell_id: parse_hex_u32(&fields[5]).unwrap_or_default(),
        })),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gsm_serving_cell() {
        let raw = "+QENG: \"servingcell\",\"CONNECT\",\"GSM\",234,15,1a2b,ffff,23,94,0,-61";
        let fix = parse_cell_fix(raw).unwrap().unwrap();
        assert_eq!(fix.mobile_country_code, 234);
        assert_eq!(fix.mobile_network_code, 15);
        assert_eq!(fix.location_area_code, 0x1a2b);
        assert_eq!(fix.cell_id, 0xffff);
    }

    #[test]
    fn searching_state_yields_no_fix() {
        let raw = "+QENG: \"servingcell\",\"SEARCH\"";
        assert!(parse_cell_fix(raw).unwrap().is_none());
    }

    #[test]
    fn lte_serving_cell_yields_no_fix() {
        let raw = "+QENG: \"servingcell\",\"NOCONN\",\"LTE\",\"FDD\",310,260,\"12345678\",6300,150";
        assert!(parse_cell_fix(raw).unwrap().is_none());
    }
}
