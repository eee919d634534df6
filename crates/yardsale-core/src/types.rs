//! Listing records returned by the sales endpoints.
//!
//! ## Observed shape
//!
//! Sales come from a generated REST view over the listings table, so column
//! names are snake_case and every descriptive column is nullable. Only `id`,
//! `title`, `lat` and `lng` are required here: a row without coordinates can
//! never be placed on the map or cropped to a viewport, so it is rejected at
//! the boundary rather than carried around as a half-record.
//!
//! Markers are the lightweight pin projection (`id`, `title`, `lat`, `lng`).
//! When the full record for a pin has not been fetched yet, [`Sale::stub`]
//! builds a marker-only listing so the list can still render it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dates::DateWindow;
use crate::geo::LatLng;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub date_start: Option<NaiveDate>,
    #[serde(default)]
    pub date_end: Option<NaiveDate>,
    #[serde(default)]
    pub time_start: Option<String>,
    #[serde(default)]
    pub time_end: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl Sale {
    /// Marker-only listing used when no full record is cached.
    #[must_use]
    pub fn stub(marker: &Marker) -> Self {
        Self {
            id: marker.id.clone(),
            title: marker.title.clone(),
            description: None,
            address: None,
            city: None,
            state: None,
            zip_code: None,
            lat: marker.lat,
            lng: marker.lng,
            date_start: None,
            date_end: None,
            time_start: None,
            time_end: None,
            categories: Vec::new(),
            cover_image_url: None,
            status: None,
        }
    }

    #[must_use]
    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: String,
    pub title: String,
    pub lat: f64,
    pub lng: f64,
}

impl Marker {
    #[must_use]
    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

/// One page of the `/sales` endpoint after envelope validation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SalesPage {
    pub sales: Vec<Sale>,
    /// Window the server actually applied, if it differs from the request.
    pub date_window: Option<DateWindow>,
    /// Server fell back to a cheaper query (e.g. no distance ordering).
    pub degraded: bool,
    /// Total matches across all pages, when the server reports it.
    pub count: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sale_deserializes_with_nullable_columns() {
        let json = r#"{
            "id": "s1",
            "title": "Moving sale",
            "description": null,
            "lat": 38.25,
            "lng": -85.75,
            "date_start": "2026-10-17",
            "categories": ["furniture"],
            "owner_id": "ignored"
        }"#;
        let sale: Sale = serde_json::from_str(json).unwrap();
        assert_eq!(sale.id, "s1");
        assert_eq!(sale.date_start, NaiveDate::from_ymd_opt(2026, 10, 17));
        assert!(sale.description.is_none());
        assert_eq!(sale.categories, vec!["furniture".to_owned()]);
    }

    #[test]
    fn sale_without_coordinates_is_rejected() {
        let json = r#"{"id": "s1", "title": "No pin"}"#;
        assert!(serde_json::from_str::<Sale>(json).is_err());
    }

    #[test]
    fn stub_copies_marker_fields() {
        let marker = Marker {
            id: "m1".to_owned(),
            title: "Pin".to_owned(),
            lat: 1.0,
            lng: 2.0,
        };
        let stub = Sale::stub(&marker);
        assert_eq!(stub.id, "m1");
        assert_eq!(stub.position(), marker.position());
        assert!(stub.address.is_none());
    }
}
