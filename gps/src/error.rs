use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] geoclued_core::Error),

    #[error("failed to open gps serial device: {0}")]
    PortUnavailable(String),

    #[error("failed to arm modem GPS reporting: {0}")]
    ArmFailed(String),

    #[error("invalid NMEA sentence: {0:?}")]
    InvalidSentence(String),

    #[error("NMEA checksum mismatch: {0:?}")]
    ChecksumMismatch(String),
}

pub type Result<T> = std::result::Result<T, Error>;
