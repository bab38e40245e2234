//! NMEA-0183 sentence parsing for the modem's second serial port (§4.7): `$GPGGA` for
//! position/altitude/fix-quality, `$GPRMC` for speed-over-ground/course-over-ground. Field
//! splitting uses `nom`; the degrees-minutes conversion and checksum check are plain arithmetic,
//! combining `nom` combinators with ordinary Rust for the semantic half of parsing (the same split
//! `orb-connd`'s `mecard::parse_string` uses).

use nom::bytes::complete::take_while;
use nom::character::complete::char;
use nom::multi::separated_list0;
use nom::IResult;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GgaFix {
    pub latitude: f64,
    pub longitude: f64,
    pub fix_quality: u8,
    pub satellites: u8,
    pub altitude_m: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RmcFix {
    pub active: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub speed_mps: f64,
    pub course_deg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sentence {
    Gga(GgaFix),
    Rmc(RmcFix),
}

const KNOTS_TO_MPS: f64 = 0.514_444;

fn comma_fields(body: &str) -> IResult<&str, Vec<&str>> {
    separated_list0(char(','), take_while(|c| c != ','))(body)
}

fn checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// Splits a raw line into `(talker_sentence, body, claimed_checksum)` and validates the
/// checksum, without yet interpreting the body's fields.
fn split_and_verify(line: &str) -> Result<(&str, Vec<&str>)> {
    let line = line.trim();
    let rest = line
        .strip_prefix('$')
        .ok_or_else(|| Error::InvalidSentence(line.to_string()))?;
    let (body, claimed_hex) = rest
        .split_once('*')
        .ok_or_else(|| Error::InvalidSentence(line.to_string()))?;

    let claimed = u8::from_str_radix(claimed_hex.trim(), 16)
        .map_err(|_| Error::InvalidSentence(line.to_string()))?;
    let computed = checksum(body);
    if claimed != computed {
        return Err(Error::ChecksumMismatch(line.to_string()));
    }

    let (_, fields) = comma_fields(body).map_err(|_| Error::InvalidSentence(line.to_string()))?;
    Ok((body, fields))
}

/// Converts NMEA's `ddmm.mmmm`/`dddmm.mmmm` degrees-minutes format plus a hemisphere letter into
/// signed decimal degrees.
fn parse_coordinate(value: &str, hemisphere: &str) -> Option<f64> {
    if value.is_empty() || hemisphere.is_empty() {
        return None;
    }
    let raw: f64 = value.parse().ok()?;
    let degrees = (raw / 100.0).floor();
    let minutes = raw - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;

    match hemisphere {
        "N" | "E" => Some(decimal),
        "S" | "W" => Some(-decimal),
        _ => None,
    }
}

fn parse_gga(fields: &[&str]) -> Result<GgaFix> {
    // 0:"GPGGA" 1:time 2:lat 3:N/S 4:lon 5:E/W 6:fixq 7:sats 8:hdop 9:alt 10:"M" ...
    if fields.len() < 10 {
        return Err(Error::InvalidSentence(fields.join(",")));
    }

    let latitude = parse_coordinate(fields[2], fields[3])
        .ok_or_else(|| Error::InvalidSentence(fields.join(",")))?;
    let longitude = parse_coordinate(fields[4], fields[5])
        .ok_or_else(|| Error::InvalidSentence(fields.join(",")))?;
    let fix_quality: u8 = fields[6].parse().unwrap_or(0);
    let satellites: u8 = fields[7].parse().unwrap_or(0);
    let altitude_m = fields[9].parse::<f64>().ok();

    Ok(GgaFix {
        latitude,
        longitude,
        fix_quality,
        satellites,
        altitude_m,
    })
}

fn parse_rmc(fields: &[&str]) -> Result<RmcFix> {
    // 0:"GPRMC" 1:time 2:status 3:lat 4:N/S 5:lon 6:E/W 7:speed_knots 8:course 9:date ...
    if fields.len() < 9 {
        return Err(Error::InvalidSentence(fields.join(",")));
    }

    let active = fields[2] == "A";
    let latitude = parse_coordinate(fields[3], fields[4])
        .ok_or_else(|| Error::InvalidSentence(fields.join(",")))?;
    let longitude = parse_coordinate(fields[5], fields[6])
        .ok_or_else(|| Error::InvalidSentence(fields.join(",")))?;
    let speed_knots: f64 = fields[7].parse().unwrap_or(0.0);
    let course_deg: f64 = fields[8].parse().unwrap_or(0.0);

    Ok(RmcFix {
        active,
        latitude,
        longitude,
        speed_mps: speed_knots * KNOTS_TO_MPS,
        course_deg,
    })
}

/// Parses one newline-delimited NMEA line, validating its checksum first. Sentence types other
/// than `$GPGGA`/`$GPRMC` parse successfully as `None` rather than erroring, since the modem's
/// stream carries other talkers ($GPGSV etc.) this source has no use for.
pub fn parse_line(line: &str) -> Result<Option<Sentence>> {
    let (body, fields) = split_and_verify(line)?;
    let Some(kind) = fields.first() else {
        return Err(Error::InvalidSentence(body.to_string()));
    };

    match *kind {
        "GPGGA" => Ok(Some(Sentence::Gga(parse_gga(&fields)?))),
        "GPRMC" => Ok(Some(Sentence::Rmc(parse_rmc(&fields)?))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gga_position_and_altitude() {
        let line = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
        let sentence = parse_line(line).unwrap().unwrap();
        let Sentence::Gga(fix) = sentence else {
            panic!("expected GGA");
        };
        assert!((fix.latitude - 48.1173).abs() < 1e-3);
        assert!((fix.longitude - 11.5167).abs() < 1e-3);
        assert_eq!(fix.fix_quality, 1);
        assert_eq!(fix.satellites, 8);
        assert_eq!(fix.altitude_m, Some(545.4));
    }

    #[test]
    fn parses_rmc_speed_and_course() {
        let line = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";
        let sentence = parse_line(line).unwrap().unwrap();
        let Sentence::Rmc(fix) = sentence else {
            panic!("expected RMC");
        };
        assert!(fix.active);
        assert!((fix.speed_mps - 022.4 * KNOTS_TO_MPS).abs() < 1e-6);
        assert_eq!(fix.course_deg, 084.4);
    }

    #[test]
    fn rejects_bad_checksum() {
        let line = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*00";
        assert!(matches!(parse_line(line), Err(Error::ChecksumMismatch(_))));
    }

    #[test]
    fn unrecognised_talker_is_not_an_error() {
        let line = "$GPGSV,3,1,11,03,03,111,00,04,15,270,00*74";
        assert_eq!(parse_line(line).unwrap(), None);
    }
}
