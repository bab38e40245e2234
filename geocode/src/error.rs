use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] geoclued_core::Error),

    #[error("source not initialised")]
    NotInitialised,

    #[error("network unavailable")]
    NetworkUnavailable,

    #[error("request cancelled")]
    Cancelled,

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to parse response body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse XML response: {0}")]
    Xml(#[from] quick_xml::de::DeError),

    #[error("provider reported an error: {0}")]
    Provider(String),
}

pub type Result<T> = std::result::Result<T, Error>;
