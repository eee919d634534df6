use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dates::DateRange;
use crate::geo::LatLng;
use crate::CoreError;

pub const MIN_DISTANCE_MILES: f64 = 1.0;
pub const MAX_DISTANCE_MILES: f64 = 100.0;
pub const DEFAULT_DISTANCE_MILES: f64 = 10.0;

/// Steps offered by the empty-state "increase radius" prompt.
const DISTANCE_LADDER_MILES: [f64; 5] = [5.0, 10.0, 25.0, 50.0, 100.0];

static ZIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{5})(?:-\d{4})?$").expect("valid zip regex"));

/// User-facing search filters.
///
/// Distance is always kept inside `[MIN_DISTANCE_MILES, MAX_DISTANCE_MILES]`
/// and categories are a normalized set, so both invariants hold for any
/// value that went through the setters or through deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "distance", deserialize_with = "deserialize_distance")]
    distance_miles: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(default, deserialize_with = "deserialize_categories")]
    categories: BTreeSet<String>,
    #[serde(default, rename = "dateRange")]
    pub date_range: DateRange,
}

impl SearchFilters {
    #[must_use]
    pub fn new(center: LatLng, distance_miles: f64) -> Self {
        Self {
            lat: center.lat,
            lng: center.lng,
            distance_miles: clamp_distance(distance_miles),
            city: None,
            zip: None,
            categories: BTreeSet::new(),
            date_range: DateRange::Any,
        }
    }

    #[must_use]
    pub fn center(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }

    pub fn set_center(&mut self, center: LatLng) {
        self.lat = center.lat;
        self.lng = center.lng;
    }

    #[must_use]
    pub fn distance_miles(&self) -> f64 {
        self.distance_miles
    }

    /// Sets the distance, clamped to the supported range.
    pub fn set_distance(&mut self, miles: f64) {
        self.distance_miles = clamp_distance(miles);
    }

    #[must_use]
    pub fn categories(&self) -> &BTreeSet<String> {
        &self.categories
    }

    /// Adds the category if absent, removes it if present. Returns whether
    /// the category is selected afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCategory`] for a blank name.
    pub fn toggle_category(&mut self, name: &str) -> Result<bool, CoreError> {
        let normalized = normalize_category(name)?;
        if self.categories.remove(&normalized) {
            Ok(false)
        } else {
            self.categories.insert(normalized);
            Ok(true)
        }
    }

    /// Replaces the category set.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCategory`] if any name is blank.
    pub fn set_categories<I, S>(&mut self, names: I) -> Result<(), CoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut next = BTreeSet::new();
        for name in names {
            next.insert(normalize_category(name.as_ref())?);
        }
        self.categories = next;
        Ok(())
    }

    /// Next rung of the distance ladder above the current distance.
    #[must_use]
    pub fn larger_distance(&self) -> Option<f64> {
        DISTANCE_LADDER_MILES
            .iter()
            .copied()
            .find(|step| *step > self.distance_miles + f64::EPSILON)
    }
}

fn clamp_distance(miles: f64) -> f64 {
    if miles.is_nan() {
        return DEFAULT_DISTANCE_MILES;
    }
    miles.clamp(MIN_DISTANCE_MILES, MAX_DISTANCE_MILES)
}

fn normalize_category(name: &str) -> Result<String, CoreError> {
    let trimmed = name.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidCategory(name.to_owned()));
    }
    Ok(trimmed)
}

/// Validate a US ZIP code and return its 5-digit form.
///
/// # Errors
///
/// Returns [`CoreError::InvalidZip`] if the input is not `12345` or `12345-6789`.
pub fn normalize_zip(raw: &str) -> Result<String, CoreError> {
    let trimmed = raw.trim();
    ZIP_RE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
        .ok_or_else(|| CoreError::InvalidZip(raw.to_owned()))
}

fn deserialize_distance<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(clamp_distance(raw))
}

fn deserialize_categories<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(raw
        .iter()
        .filter_map(|name| normalize_category(name).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn louisville() -> SearchFilters {
        SearchFilters::new(LatLng::new(38.25, -85.75), 10.0)
    }

    #[test]
    fn distance_is_clamped_on_write() {
        let mut f = louisville();
        f.set_distance(500.0);
        assert!((f.distance_miles() - MAX_DISTANCE_MILES).abs() < f64::EPSILON);
        f.set_distance(0.0);
        assert!((f.distance_miles() - MIN_DISTANCE_MILES).abs() < f64::EPSILON);
        f.set_distance(f64::NAN);
        assert!((f.distance_miles() - DEFAULT_DISTANCE_MILES).abs() < f64::EPSILON);
    }

    #[test]
    fn categories_are_deduplicated_and_normalized() {
        let mut f = louisville();
        f.set_categories(["Furniture", "furniture ", "Tools"]).unwrap();
        let got: Vec<&str> = f.categories().iter().map(String::as_str).collect();
        assert_eq!(got, vec!["furniture", "tools"]);
    }

    #[test]
    fn toggle_category_adds_then_removes() {
        let mut f = louisville();
        assert!(f.toggle_category("Toys").unwrap());
        assert!(!f.toggle_category("toys").unwrap());
        assert!(f.categories().is_empty());
        assert!(matches!(
            f.toggle_category("   "),
            Err(CoreError::InvalidCategory(_))
        ));
    }

    #[test]
    fn larger_distance_walks_the_ladder() {
        let mut f = louisville();
        assert_eq!(f.larger_distance(), Some(25.0));
        f.set_distance(3.0);
        assert_eq!(f.larger_distance(), Some(5.0));
        f.set_distance(100.0);
        assert_eq!(f.larger_distance(), None);
    }

    #[test]
    fn normalize_zip_accepts_plus_four() {
        assert_eq!(normalize_zip("40202").unwrap(), "40202");
        assert_eq!(normalize_zip(" 40202-1234 ").unwrap(), "40202");
        assert!(matches!(normalize_zip("4020"), Err(CoreError::InvalidZip(_))));
        assert!(normalize_zip("abcde").is_err());
    }

    #[test]
    fn deserialization_enforces_invariants() {
        let json = r#"{"lat":38.25,"lng":-85.75,"distance":250,"categories":["A","a",""],"dateRange":"weekend"}"#;
        let f: SearchFilters = serde_json::from_str(json).unwrap();
        assert!((f.distance_miles() - MAX_DISTANCE_MILES).abs() < f64::EPSILON);
        assert_eq!(f.categories().len(), 1);
        assert_eq!(f.date_range, DateRange::Weekend);
    }
}
