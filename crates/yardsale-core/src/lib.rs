pub mod app_config;
pub mod config;
pub mod dates;
pub mod filters;
pub mod geo;
pub mod persist;
pub mod query;
pub mod types;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use dates::{DateRange, DateWindow};
pub use filters::{normalize_zip, SearchFilters};
pub use geo::{BoundingBox, LatLng};
pub use persist::{seed_filters, LocationCookie, StateFile};
pub use query::{MarkersQuery, QueryShape, SalesQuery};
pub use types::{Marker, Sale, SalesPage};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("invalid category: {0:?}")]
    InvalidCategory(String),

    #[error("invalid ZIP code: {0}")]
    InvalidZip(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("state file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not encode state: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("stored location has non-finite coordinates")]
    InvalidLocation,
}
