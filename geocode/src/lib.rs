pub mod builder;
pub mod error;
pub mod ipgeo;
pub mod model;
pub mod opencellid;
pub mod websource;

pub use builder::{CellInfoProvider, Done, GeolocateRequestBuilder, WantsCell, WantsWifi, WifiInfoProvider};
pub use error::{Error, Result};
pub use model::{
    CellTower, GeolocateCoordinates, GeolocateErrorBody, GeolocateErrorResponse, GeolocateRequest,
    GeolocateResponse, GeolocateSuccess, SubmissionCell, SubmissionItem, SubmissionRequest,
    SubmissionWifi, WifiAccessPoint,
};
pub use websource::{QueryBuilder, WebSource};
