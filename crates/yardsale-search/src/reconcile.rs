//! Derives the list of sales to render.
//!
//! Under map authority the list is exactly the pins the map reports as
//! visible, in the order reported. No second bounding-box filter is applied:
//! the map's own rendering decides what is in view. Under filter authority
//! the fetched result list is cropped to the last accepted viewport.

use std::collections::{HashMap, HashSet};

use yardsale_core::geo::BoundingBox;
use yardsale_core::{Marker, Sale};

/// Rendered subset cap.
pub const RENDER_CAP: usize = 24;
/// Slack on viewport edges when cropping.
pub const CROP_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibleSet {
    /// Everything in view.
    pub items: Vec<Sale>,
    /// The first `RENDER_CAP` items.
    pub rendered: Vec<Sale>,
    /// `items.len() - rendered.len()`.
    pub overflow: usize,
}

impl VisibleSet {
    #[must_use]
    pub fn new(items: Vec<Sale>, cap: usize) -> Self {
        let rendered: Vec<Sale> = items.iter().take(cap).cloned().collect();
        let overflow = items.len() - rendered.len();
        Self {
            items,
            rendered,
            overflow,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|s| s.id.as_str()).collect()
    }
}

/// Sales inside `bounds`, inclusive with [`CROP_EPSILON`] tolerance.
/// Without bounds nothing is cropped.
#[must_use]
pub fn crop_to_bounds(sales: &[Sale], bounds: Option<&BoundingBox>) -> Vec<Sale> {
    match bounds {
        None => sales.to_vec(),
        Some(b) => sales
            .iter()
            .filter(|s| b.contains(s.position(), CROP_EPSILON))
            .cloned()
            .collect(),
    }
}

/// Records for `pin_ids`, in order. Full records come from `sales`, falling
/// back to marker-only stubs; ids known to neither are skipped.
#[must_use]
pub fn hydrate_pins(
    pin_ids: &[String],
    sales: &HashMap<String, Sale>,
    markers: &HashMap<String, Marker>,
) -> Vec<Sale> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(pin_ids.len());
    for id in pin_ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        if let Some(sale) = sales.get(id) {
            out.push(sale.clone());
        } else if let Some(marker) = markers.get(id) {
            out.push(Sale::stub(marker));
        } else {
            tracing::trace!(%id, "visible pin has no known record");
        }
    }
    out
}

#[derive(Debug)]
pub struct VisibleSetReconciler {
    cap: usize,
    last_pins: Option<Vec<String>>,
    current: VisibleSet,
}

impl Default for VisibleSetReconciler {
    fn default() -> Self {
        Self::new(RENDER_CAP)
    }
}

impl VisibleSetReconciler {
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            last_pins: None,
            current: VisibleSet::default(),
        }
    }

    #[must_use]
    pub fn current(&self) -> &VisibleSet {
        &self.current
    }

    /// Map-owned recompute. Returns `false` without touching the current set
    /// when the sorted pin ids match the previous call.
    pub fn reconcile_map(
        &mut self,
        pin_ids: &[String],
        sales: &HashMap<String, Sale>,
        markers: &HashMap<String, Marker>,
    ) -> bool {
        let mut sorted = pin_ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        if self.last_pins.as_ref() == Some(&sorted) {
            return false;
        }
        self.current = VisibleSet::new(hydrate_pins(pin_ids, sales, markers), self.cap);
        self.last_pins = Some(sorted);
        true
    }

    /// Filter-owned recompute: crop `sales` to `bounds`.
    pub fn reconcile_filters(&mut self, sales: &[Sale], bounds: Option<&BoundingBox>) {
        self.last_pins = None;
        self.current = VisibleSet::new(crop_to_bounds(sales, bounds), self.cap);
    }

    /// Forget the pin guard so the next map-owned call recomputes, e.g.
    /// after fresher records arrived for the same pins.
    pub fn invalidate(&mut self) {
        self.last_pins = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sale(id: &str, lat: f64, lng: f64) -> Sale {
        Sale {
            description: Some(format!("full record {id}")),
            ..Sale::stub(&marker(id, lat, lng))
        }
    }

    fn marker(id: &str, lat: f64, lng: f64) -> Marker {
        Marker {
            id: id.to_owned(),
            title: format!("sale {id}"),
            lat,
            lng,
        }
    }

    fn by_id<T: Clone>(items: &[T], id: impl Fn(&T) -> &str) -> HashMap<String, T> {
        items.iter().map(|t| (id(t).to_owned(), t.clone())).collect()
    }

    #[test]
    fn map_mode_hydrates_reported_pins_in_order() {
        let sales = by_id(&[sale("a", 1.0, 1.0), sale("b", 2.0, 2.0)], |s| s.id.as_str());
        let markers = by_id(&[marker("a", 1.0, 1.0), marker("b", 2.0, 2.0)], |m| m.id.as_str());
        let mut r = VisibleSetReconciler::default();

        let pins = vec!["b".to_owned(), "a".to_owned()];
        assert!(r.reconcile_map(&pins, &sales, &markers));
        assert_eq!(r.current().ids(), vec!["b", "a"]);
        assert_eq!(r.current().items[0], sales["b"]);
        assert_eq!(r.current().items[1], sales["a"]);
    }

    #[test]
    fn map_mode_falls_back_to_stubs_and_skips_unknown() {
        let sales = HashMap::new();
        let markers = by_id(&[marker("a", 1.0, 1.0)], |m| m.id.as_str());
        let mut r = VisibleSetReconciler::default();
        r.reconcile_map(&["a".to_owned(), "zzz".to_owned()], &sales, &markers);
        assert_eq!(r.current().ids(), vec!["a"]);
        assert!(r.current().items[0].description.is_none());
    }

    #[test]
    fn map_mode_does_not_crop_by_bounds() {
        // A pin the map reports is shown even if it lies far from anything.
        let markers = by_id(&[marker("far", -60.0, 170.0)], |m| m.id.as_str());
        let mut r = VisibleSetReconciler::default();
        r.reconcile_map(&["far".to_owned()], &HashMap::new(), &markers);
        assert_eq!(r.current().total(), 1);
    }

    #[test]
    fn unchanged_pin_set_is_not_recomputed() {
        let markers = by_id(&[marker("a", 1.0, 1.0), marker("b", 2.0, 2.0)], |m| m.id.as_str());
        let mut r = VisibleSetReconciler::default();
        assert!(r.reconcile_map(&["a".to_owned(), "b".to_owned()], &HashMap::new(), &markers));
        assert!(!r.reconcile_map(&["b".to_owned(), "a".to_owned()], &HashMap::new(), &markers));
        r.invalidate();
        assert!(r.reconcile_map(&["a".to_owned(), "b".to_owned()], &HashMap::new(), &markers));
    }

    #[test]
    fn filter_mode_crops_across_the_antimeridian() {
        let bounds = BoundingBox {
            north: 10.0,
            south: -10.0,
            east: -170.0,
            west: 170.0,
        };
        let sales = vec![sale("in", 0.0, 175.0), sale("out", 0.0, 0.0)];
        let mut r = VisibleSetReconciler::default();
        r.reconcile_filters(&sales, Some(&bounds));
        assert_eq!(r.current().ids(), vec!["in"]);
    }

    #[test]
    fn filter_mode_without_viewport_keeps_everything() {
        let sales = vec![sale("a", 0.0, 0.0), sale("b", 50.0, 50.0)];
        let mut r = VisibleSetReconciler::default();
        r.reconcile_filters(&sales, None);
        assert_eq!(r.current().total(), 2);
    }

    #[test]
    fn rendered_subset_is_capped_and_overflow_reported() {
        let sales: Vec<Sale> = (0..30).map(|i| sale(&format!("s{i}"), 0.0, 0.0)).collect();
        let set = VisibleSet::new(sales, RENDER_CAP);
        assert_eq!(set.rendered.len(), 24);
        assert_eq!(set.overflow, 6);
        assert_eq!(set.total(), 30);
    }
}
