//! Effective query shape and the request parameters derived from it.

use chrono::NaiveDate;

use crate::dates::{DateRange, DateWindow};
use crate::filters::SearchFilters;
use crate::geo::{miles_to_km, LatLng};

/// Derived description of "what is being searched". Never stored; rebuilt
/// from filters and the effective centre whenever it is needed.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryShape {
    pub center: LatLng,
    pub radius_km: f64,
    pub date_range: DateRange,
    pub window: Option<DateWindow>,
    /// Sorted, deduplicated.
    pub categories: Vec<String>,
    pub shape_hash: String,
}

impl QueryShape {
    #[must_use]
    pub fn new(
        center: LatLng,
        radius_km: f64,
        date_range: DateRange,
        categories: impl IntoIterator<Item = String>,
        today: NaiveDate,
    ) -> Self {
        let mut categories: Vec<String> = categories.into_iter().collect();
        categories.sort();
        categories.dedup();
        let window = date_range.resolve(today);
        let date_key = window.map_or_else(|| "any".to_owned(), |w| w.key());
        let shape_hash = format!(
            "{:.5},{:.5}|r{:.2}|{}|{}",
            center.lat,
            center.lng,
            radius_km,
            date_key,
            categories.join(",")
        );
        Self {
            center,
            radius_km,
            date_range,
            window,
            categories,
            shape_hash,
        }
    }

    /// Shape for `filters` searched around `center`.
    #[must_use]
    pub fn from_filters(filters: &SearchFilters, center: LatLng, today: NaiveDate) -> Self {
        Self::new(
            center,
            miles_to_km(filters.distance_miles()),
            filters.date_range,
            filters.categories().iter().cloned(),
            today,
        )
    }

    /// Resolved date key, `"any"` when unbounded.
    #[must_use]
    pub fn date_key(&self) -> String {
        self.window.map_or_else(|| "any".to_owned(), |w| w.key())
    }

    #[must_use]
    pub fn sales_query(&self, limit: u32, offset: u32) -> SalesQuery {
        SalesQuery {
            lat: self.center.lat,
            lng: self.center.lng,
            distance_km: self.radius_km,
            date_from: self.window.map(|w| w.from),
            date_to: self.window.map(|w| w.to),
            categories: self.categories.clone(),
            limit,
            offset,
        }
    }

    #[must_use]
    pub fn markers_query(&self, limit: u32) -> MarkersQuery {
        MarkersQuery {
            lat: self.center.lat,
            lng: self.center.lng,
            distance_km: self.radius_km,
            from: self.window.map(|w| w.from),
            to: self.window.map(|w| w.to),
            categories: self.categories.clone(),
            limit,
        }
    }
}

/// Parameters of `GET /sales`.
#[derive(Debug, Clone, PartialEq)]
pub struct SalesQuery {
    pub lat: f64,
    pub lng: f64,
    pub distance_km: f64,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub categories: Vec<String>,
    pub limit: u32,
    pub offset: u32,
}

impl SalesQuery {
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("lat", format!("{:.6}", self.lat)),
            ("lng", format!("{:.6}", self.lng)),
            ("distanceKm", format!("{:.2}", self.distance_km)),
        ];
        if let Some(from) = self.date_from {
            pairs.push(("dateFrom", from.to_string()));
        }
        if let Some(to) = self.date_to {
            pairs.push(("dateTo", to.to_string()));
        }
        if !self.categories.is_empty() {
            pairs.push(("categories", self.categories.join(",")));
        }
        pairs.push(("limit", self.limit.to_string()));
        pairs.push(("offset", self.offset.to_string()));
        pairs
    }
}

/// Parameters of `GET /sales/markers`.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkersQuery {
    pub lat: f64,
    pub lng: f64,
    pub distance_km: f64,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub categories: Vec<String>,
    pub limit: u32,
}

impl MarkersQuery {
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("lat", format!("{:.6}", self.lat)),
            ("lng", format!("{:.6}", self.lng)),
            ("distanceKm", format!("{:.2}", self.distance_km)),
        ];
        if let Some(from) = self.from {
            pairs.push(("from", from.to_string()));
        }
        if let Some(to) = self.to {
            pairs.push(("to", to.to_string()));
        }
        if !self.categories.is_empty() {
            pairs.push(("categories", self.categories.join(",")));
        }
        pairs.push(("limit", self.limit.to_string()));
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
    }

    #[test]
    fn shape_hash_ignores_category_order() {
        let center = LatLng::new(38.25, -85.75);
        let a = QueryShape::new(
            center,
            16.09,
            DateRange::Any,
            ["tools".to_owned(), "books".to_owned()],
            today(),
        );
        let b = QueryShape::new(
            center,
            16.09,
            DateRange::Any,
            ["books".to_owned(), "tools".to_owned(), "books".to_owned()],
            today(),
        );
        assert_eq!(a.shape_hash, b.shape_hash);
        assert_eq!(a.shape_hash, "38.25000,-85.75000|r16.09|any|books,tools");
    }

    #[test]
    fn shape_hash_includes_resolved_dates() {
        let center = LatLng::new(38.25, -85.75);
        let shape = QueryShape::new(center, 8.0, DateRange::Weekend, Vec::new(), today());
        assert!(shape.shape_hash.contains("2026-10-17..2026-10-18"));
        assert_ne!(
            shape.shape_hash,
            QueryShape::new(center, 8.0, DateRange::Any, Vec::new(), today()).shape_hash
        );
    }

    #[test]
    fn from_filters_converts_miles() {
        let filters = SearchFilters::new(LatLng::new(38.25, -85.75), 10.0);
        let shape = QueryShape::from_filters(&filters, filters.center(), today());
        assert!((shape.radius_km - 16.093_44).abs() < 1e-6);
    }

    #[test]
    fn sales_pairs_omit_unbounded_dates_and_empty_categories() {
        let shape = QueryShape::new(
            LatLng::new(38.25, -85.75),
            16.093_44,
            DateRange::Any,
            Vec::new(),
            today(),
        );
        let pairs = shape.sales_query(24, 0).to_pairs();
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["lat", "lng", "distanceKm", "limit", "offset"]);
        assert_eq!(pairs[2].1, "16.09");
    }

    #[test]
    fn markers_pairs_use_from_and_to() {
        let shape = QueryShape::new(
            LatLng::new(38.25, -85.75),
            5.0,
            DateRange::Today,
            ["toys".to_owned()],
            today(),
        );
        let pairs = shape.markers_query(1000).to_pairs();
        assert!(pairs.contains(&("from", "2026-10-14".to_owned())));
        assert!(pairs.contains(&("to", "2026-10-14".to_owned())));
        assert!(pairs.contains(&("categories", "toys".to_owned())));
    }
}
