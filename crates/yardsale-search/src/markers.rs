//! Idempotent marker application.
//!
//! Before the marker set is replaced, a composite key of viewport, resolved
//! dates and sorted marker ids is compared to the last applied one. An
//! identical key means the update would be a no-op; skipping it breaks the
//! loop where a no-op response re-triggers the effects that fetched it.

use sha2::{Digest, Sha256};
use yardsale_core::geo::BoundingBox;
use yardsale_core::Marker;

use crate::debounce::coalesce_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerUpdate {
    Applied,
    Unchanged,
}

#[derive(Debug, Default)]
pub struct MarkerApplyGuard {
    last_key: Option<String>,
}

/// SHA-256 over `bbox | date | sorted ids`.
#[must_use]
pub fn marker_state_key(bbox: Option<&BoundingBox>, date_key: &str, markers: &[Marker]) -> String {
    let mut ids: Vec<&str> = markers.iter().map(|m| m.id.as_str()).collect();
    ids.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(bbox.map(coalesce_key).unwrap_or_default().as_bytes());
    hasher.update(b"|");
    hasher.update(date_key.as_bytes());
    hasher.update(b"|");
    for id in ids {
        hasher.update(id.as_bytes());
        hasher.update(b",");
    }
    format!("{:x}", hasher.finalize())
}

impl MarkerApplyGuard {
    /// Record `key` and report whether it differs from the last one.
    pub fn check(&mut self, key: String) -> MarkerUpdate {
        if self.last_key.as_deref() == Some(key.as_str()) {
            tracing::trace!("marker set unchanged; skipping update");
            return MarkerUpdate::Unchanged;
        }
        self.last_key = Some(key);
        MarkerUpdate::Applied
    }

    pub fn reset(&mut self) {
        self.last_key = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(id: &str) -> Marker {
        Marker {
            id: id.to_owned(),
            title: format!("sale {id}"),
            lat: 38.25,
            lng: -85.75,
        }
    }

    fn bbox() -> BoundingBox {
        BoundingBox {
            north: 38.3,
            south: 38.2,
            east: -85.7,
            west: -85.8,
        }
    }

    #[test]
    fn key_ignores_marker_order() {
        let a = marker_state_key(Some(&bbox()), "any", &[marker("a"), marker("b")]);
        let b = marker_state_key(Some(&bbox()), "any", &[marker("b"), marker("a")]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn key_changes_with_dates_and_viewport() {
        let markers = [marker("a")];
        let base = marker_state_key(Some(&bbox()), "any", &markers);
        assert_ne!(
            base,
            marker_state_key(Some(&bbox()), "2026-10-17..2026-10-18", &markers)
        );
        assert_ne!(base, marker_state_key(None, "any", &markers));
    }

    #[test]
    fn identical_state_is_skipped() {
        let mut guard = MarkerApplyGuard::default();
        let key = marker_state_key(Some(&bbox()), "any", &[marker("a")]);
        assert_eq!(guard.check(key.clone()), MarkerUpdate::Applied);
        assert_eq!(guard.check(key.clone()), MarkerUpdate::Unchanged);
        guard.reset();
        assert_eq!(guard.check(key), MarkerUpdate::Applied);
    }
}
