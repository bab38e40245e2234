use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] geoclued_core::Error),

    #[error(transparent)]
    Geocode(#[from] geoclued_geocode::Error),

    #[error("failed to open modem serial port: {0}")]
    PortUnavailable(String),

    #[error("AT command {0:?} failed after retries")]
    CommandFailed(String),

    #[error("could not parse serving cell response: {0}")]
    ParseFailed(String),

    #[error("no 3G/2G tower reported yet")]
    NotInitialised,
}

pub type Result<T> = std::result::Result<T, Error>;
