//! Serial transport for the modem's GPS NMEA stream: arms reporting with `AT+QGPS=1` using the
//! same AT command/retry idiom as the cellular serving-cell reader, applied here to the EC25's
//! second, NMEA-only serial port, then reads newline-delimited sentences.

use std::io::{BufRead, BufReader, Write};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::nmea::{self, Sentence};

pub struct GpsModem {
    reader: BufReader<Box<dyn SerialPort>>,
}

impl GpsModem {
    /// Opens the AT-command port to arm GPS reporting, then reopens the dedicated NMEA port for
    /// streaming: the EC25 exposes these as distinct serial devices even though they're the same
    /// physical modem.
    pub fn arm_and_open(at_device: &str, nmea_device: &str) -> Result<Self> {
        Self::arm(at_device)?;

        let port = serialport::new(nmea_device, 9_600)
            .timeout(Duration::from_secs(2))
            .open()
            .map_err(|e| Error::PortUnavailable(e.to_string()))?;

        Ok(Self {
            reader: BufReader::new(port),
        })
    }

    fn arm(at_device: &str) -> Result<()> {
        let mut port = serialport::new(at_device, 115_200)
            .timeout(Duration::from_secs(2))
            .open()
            .map_err(|e| Error::PortUnavailable(e.to_string()))?;

        for attempt in 0..=2 {
            if attempt > 0 {
                debug!(attempt, "retrying AT+QGPS=1");
                std::thread::sleep(Duration::from_millis(500));
            }

            let _ = port.flush();
            if port.write_all(b"AT+QGPS=1\r\n").is_err() {
                continue;
            }

            let mut response = String::new();
            let mut buf = [0u8; 256];
            let start = std::time::Instant::now();
            while start.elapsed() < Duration::from_secs(3) {
                match port.read(&mut buf) {
                    Ok(n) if n > 0 => {
                        response.push_str(&String::from_utf8_lossy(&buf[..n]));
                        if response.contains("OK") {
                            return Ok(());
                        }
                        if response.contains("ERROR") {
                            break;
                        }
                    }
                    Ok(_) => std::thread::sleep(Duration::from_millis(50)),
                    Err(e) => {
                        warn!(error = %e, "error reading AT+QGPS response");
                        break;
                    }
                }
            }
        }

        Err(Error::ArmFailed("AT+QGPS=1".to_string()))
    }

    /// Blocks until the next `$GPGGA`/`$GPRMC` sentence parses (malformed lines, checksum
    /// failures, and other talkers are skipped), or returns `Ok(None)` on EOF.
    pub fn next_fix(&mut self) -> Result<Option<Sentence>> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self
                .reader
                .read_line(&mut line)
                .map_err(|e| Error::PortUnavailable(e.to_string()))?;
            if n == 0 {
                return Ok(None);
            }

            match nmea::parse_line(&line) {
                Ok(Some(sentence)) => return Ok(Some(sentence)),
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, line = line.trim(), "skipping unparseable NMEA line");
                    continue;
                }
            }
        }
    }
}
