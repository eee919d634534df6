//! Local persistence used to seed the initial filters of a search session.
//!
//! Two records are kept, mirroring what the browser stores: the `la_loc`
//! location cookie (JSON, 24 hour TTL) and a snapshot of the last filter
//! state. They are read once when a session starts and written when it ends;
//! the engine itself never consults them.

use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::filters::{SearchFilters, DEFAULT_DISTANCE_MILES};
use crate::geo::LatLng;
use crate::PersistError;

pub const LOCATION_COOKIE_NAME: &str = "la_loc";
pub const LOCATION_COOKIE_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationCookie {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl LocationCookie {
    /// Cookie value as it is written to the `la_loc` cookie.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Encode`] if serialization fails.
    pub fn encode(&self) -> Result<String, PersistError> {
        serde_json::to_string(self).map_err(PersistError::Encode)
    }

    /// Parse a raw `la_loc` cookie value.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Decode`] for malformed JSON or non-finite
    /// coordinates.
    pub fn decode(raw: &str) -> Result<Self, PersistError> {
        let cookie: Self = serde_json::from_str(raw).map_err(|source| PersistError::Decode {
            context: LOCATION_COOKIE_NAME.to_owned(),
            source,
        })?;
        if !cookie.center().is_finite() {
            return Err(PersistError::InvalidLocation);
        }
        Ok(cookie)
    }

    #[must_use]
    pub fn center(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

/// A cookie together with the time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub value: LocationCookie,
    pub written_at: DateTime<Utc>,
}

impl StoredCookie {
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.written_at) < Duration::hours(LOCATION_COOKIE_TTL_HOURS)
    }
}

/// On-disk state file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<StoredCookie>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<SearchFilters>,
}

impl StateFile {
    /// Read the state file. A missing file is an empty state.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Io`] if the file exists but cannot be read and
    /// [`PersistError::Decode`] if it is not valid JSON.
    pub fn load(path: &Path) -> Result<Self, PersistError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no state file; starting fresh");
                return Ok(Self::default());
            }
            Err(e) => return Err(PersistError::Io(e)),
        };
        serde_json::from_str(&raw).map_err(|source| PersistError::Decode {
            context: path.display().to_string(),
            source,
        })
    }

    /// Write the state file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Io`] on filesystem failure.
    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(self).map_err(PersistError::Encode)?;
        std::fs::write(path, body)?;
        Ok(())
    }

    /// Record the location cookie with the current time.
    pub fn remember_location(&mut self, cookie: LocationCookie, now: DateTime<Utc>) {
        self.location = Some(StoredCookie {
            value: cookie,
            written_at: now,
        });
    }
}

/// Initial filters for a new session.
///
/// A filter snapshot wins; otherwise a fresh location cookie supplies the
/// centre; otherwise `default_center` is used.
#[must_use]
pub fn seed_filters(state: &StateFile, default_center: LatLng, now: DateTime<Utc>) -> SearchFilters {
    if let Some(snapshot) = &state.filters {
        return snapshot.clone();
    }

    match state.location.as_ref().filter(|c| c.is_fresh(now)) {
        Some(stored) => {
            let mut filters = SearchFilters::new(stored.value.center(), DEFAULT_DISTANCE_MILES);
            filters.zip.clone_from(&stored.value.zip);
            filters.city.clone_from(&stored.value.city);
            filters
        }
        None => SearchFilters::new(default_center, DEFAULT_DISTANCE_MILES),
    }
}
