//! Viewport bounds debouncer.
//!
//! The map reports its bounds on every render frame, dozens of times per
//! second during a drag. Only accepted emissions are visible to the rest of
//! the engine. Acceptance rules, applied against the last accepted viewport:
//!
//! 1. Same 6-decimal coalescing key within `same_key_window` → drop.
//! 2. Area changed less than `min_area_change` and centre moved less than
//!    `min_center_move_m` → drop as noise.
//! 3. At least `leading_interval` since the last acceptance → emit now
//!    (leading edge).
//! 4. Otherwise hold the event; it is emitted by [`BoundsDebouncer::poll`]
//!    once `trailing_quiet` passes with no newer event (trailing edge).
//!
//! The final resting viewport of a movement is therefore always applied.

use std::time::{Duration, Instant};

use yardsale_core::geo::{haversine_km, BoundingBox};

use crate::port::MapViewState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebounceConfig {
    pub same_key_window: Duration,
    pub leading_interval: Duration,
    pub trailing_quiet: Duration,
    /// Relative area change below which a move may be noise (0.01 = 1 %).
    pub min_area_change: f64,
    pub min_center_move_m: f64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            same_key_window: Duration::from_millis(150),
            leading_interval: Duration::from_millis(150),
            trailing_quiet: Duration::from_millis(100),
            min_area_change: 0.01,
            min_center_move_m: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Leading,
    Trailing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedViewport {
    /// Viewport sequence number, advanced only by accepted emissions.
    pub seq: u64,
    pub view: MapViewState,
    pub edge: Edge,
}

#[derive(Debug, Clone)]
struct Accepted {
    key: String,
    bounds: BoundingBox,
    at: Instant,
}

#[derive(Debug, Clone)]
struct Pending {
    view: MapViewState,
    deadline: Instant,
}

#[derive(Debug, Default)]
pub struct BoundsDebouncer {
    config: DebounceConfig,
    last: Option<Accepted>,
    pending: Option<Pending>,
    seq: u64,
}

/// Bounds rounded to 6 decimals.
#[must_use]
pub fn coalesce_key(bounds: &BoundingBox) -> String {
    format!(
        "{:.6},{:.6},{:.6},{:.6}",
        bounds.north, bounds.south, bounds.east, bounds.west
    )
}

impl BoundsDebouncer {
    #[must_use]
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            config,
            last: None,
            pending: None,
            seq: 0,
        }
    }

    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// When the trailing edge is due, if an event is being held.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /// Feed one bounds event observed at `now`.
    pub fn offer(&mut self, view: MapViewState, now: Instant) -> Option<AcceptedViewport> {
        let key = coalesce_key(&view.bounds);

        let Some(last) = &self.last else {
            return Some(self.accept(view, key, now, Edge::Leading));
        };

        let since_last = now.saturating_duration_since(last.at);
        if key == last.key && since_last < self.config.same_key_window {
            self.pending = None;
            return None;
        }
        if self.is_noise(&last.bounds, &view.bounds) {
            // Back at (almost) the accepted viewport; whatever was held is moot.
            self.pending = None;
            return None;
        }
        if since_last >= self.config.leading_interval {
            return Some(self.accept(view, key, now, Edge::Leading));
        }

        self.pending = Some(Pending {
            view,
            deadline: now + self.config.trailing_quiet,
        });
        None
    }

    /// Emit the held event if its quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<AcceptedViewport> {
        let due = self.pending.as_ref().is_some_and(|p| now >= p.deadline);
        if !due {
            return None;
        }
        let pending = self.pending.take()?;
        let key = coalesce_key(&pending.view.bounds);
        if let Some(last) = &self.last {
            if key == last.key || self.is_noise(&last.bounds, &pending.view.bounds) {
                return None;
            }
        }
        Some(self.accept(pending.view, key, now, Edge::Trailing))
    }

    /// Forget the accepted viewport, e.g. after the map was torn down.
    pub fn reset(&mut self) {
        self.last = None;
        self.pending = None;
    }

    fn accept(
        &mut self,
        view: MapViewState,
        key: String,
        now: Instant,
        edge: Edge,
    ) -> AcceptedViewport {
        self.seq += 1;
        self.pending = None;
        self.last = Some(Accepted {
            key,
            bounds: view.bounds,
            at: now,
        });
        tracing::trace!(seq = self.seq, ?edge, "viewport accepted");
        AcceptedViewport {
            seq: self.seq,
            view,
            edge,
        }
    }

    fn is_noise(&self, prev: &BoundingBox, next: &BoundingBox) -> bool {
        let prev_area = prev.area();
        let area_change = if prev_area > 0.0 {
            ((next.area() - prev_area) / prev_area).abs()
        } else {
            f64::INFINITY
        };
        let moved_m = haversine_km(prev.center(), next.center()) * 1000.0;
        area_change < self.config.min_area_change && moved_m < self.config.min_center_move_m
    }
}
