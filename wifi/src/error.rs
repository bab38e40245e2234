use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] geoclued_core::Error),

    #[error(transparent)]
    Geocode(#[from] geoclued_geocode::Error),

    #[error("failed to open wpa_supplicant control socket: {0}")]
    SupplicantUnavailable(String),

    #[error("scan request failed: {0}")]
    ScanFailed(String),

    #[error("invalid scan result line: {0:?}")]
    InvalidScanLine(String),
}

pub type Result<T> = std::result::Result<T, Error>;
