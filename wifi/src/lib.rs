pub mod admission;
pub mod error;
pub mod query;
pub mod scan;
pub mod source;

pub use error::{Error, Result};
pub use source::{instance, Bucket, WifiSource, WifiSourceConfig};
