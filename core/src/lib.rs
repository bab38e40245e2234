pub mod accuracy;
pub mod error;
pub mod location;
pub mod merge;
pub mod source;

pub use accuracy::AccuracyLevel;
pub use error::{Error, Result};
pub use location::Location;
pub use source::{LocationSource, SourceKind, SourceState};
