use thiserror::Error;

/// Errors shared by every location source in the workspace.
///
/// Source-specific crates (`geoclued-wifi`, `geoclued-cellular`, ...) define their own error
/// enums for collaborator-specific failures and convert into this one at the `LocationSource`
/// boundary: per-crate `thiserror` enums feeding a looser top-level type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("latitude {0} out of range [-90, 90]")]
    InvalidLatitude(f64),

    #[error("longitude {0} out of range [-180, 180]")]
    InvalidLongitude(f64),

    #[error("accuracy {0} must be non-negative or unknown")]
    InvalidAccuracy(f64),

    /// The source has nothing to query yet (e.g. CellSource before any `fix-3g` event).
    #[error("source not initialised")]
    NotInitialised,

    /// The access network is currently unreachable; the caller should retry on the next
    /// reachable-transition rather than treat this as fatal.
    #[error("network unavailable")]
    NetworkUnavailable,

    #[error("request cancelled")]
    Cancelled,

    #[error("failed to parse provider response: {0}")]
    Parse(String),

    #[error("provider reported an error: {0}")]
    Provider(String),
}

pub type Result<T> = std::result::Result<T, Error>;
