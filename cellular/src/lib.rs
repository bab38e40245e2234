pub mod error;
pub mod modem;
pub mod query;
pub mod source;

pub use error::{Error, Result};
pub use modem::{CellFix, Ec25Modem};
pub use source::{instance, CellSource, CellSourceConfig};
