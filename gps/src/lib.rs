pub mod error;
pub mod modem;
pub mod nmea;
pub mod source;

pub use error::{Error, Result};
pub use modem::GpsModem;
pub use nmea::{GgaFix, RmcFix, Sentence};
pub use source::{ModemGpsSource, ModemGpsSourceConfig};
