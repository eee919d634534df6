//! A map without a screen.
//!
//! `HeadlessMap` settles every camera move instantly and reports the same
//! events a rendered map would: a viewport frame, the fit completion and the
//! ids of the pins that fall inside its bounds. The CLI runs searches through
//! it, and tests use it to drive gestures.

use yardsale_core::geo::{bbox_around, BoundingBox, LatLng};
use yardsale_core::Marker;

use crate::driver::EventSender;
use crate::port::{MapEvent, MapSurface, MapViewState};
use crate::reconcile::CROP_EPSILON;
use crate::session::SessionEvent;

const TILE_SIZE_PX: f64 = 256.0;

#[derive(Debug)]
pub struct HeadlessMap {
    tx: EventSender,
    viewport_width_px: f64,
    view: Option<MapViewState>,
    markers: Vec<Marker>,
}

impl HeadlessMap {
    #[must_use]
    pub fn new(tx: EventSender, viewport_width_px: f64) -> Self {
        Self {
            tx,
            viewport_width_px,
            view: None,
            markers: Vec::new(),
        }
    }

    #[must_use]
    pub fn view(&self) -> Option<&MapViewState> {
        self.view.as_ref()
    }

    #[must_use]
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Simulate a user drag that settles on `center`, `radius_km` across.
    pub fn pan_to(&mut self, center: LatLng, radius_km: f64) {
        let view = self.view_for(bbox_around(center, radius_km));
        self.send(MapEvent::Gesture {
            user_initiated: true,
        });
        self.view = Some(view);
        self.send(MapEvent::Viewport(view));
        self.send(MapEvent::MoveEnd);
        self.report_visible();
    }

    fn view_for(&self, bounds: BoundingBox) -> MapViewState {
        MapViewState {
            center: bounds.center(),
            zoom: zoom_for_width(bounds.width_degrees(), self.viewport_width_px),
            bounds,
        }
    }

    fn report_visible(&self) {
        let Some(view) = &self.view else {
            return;
        };
        let ids = self
            .markers
            .iter()
            .filter(|m| view.bounds.contains(m.position(), CROP_EPSILON))
            .map(|m| m.id.clone())
            .collect();
        self.send(MapEvent::VisiblePins(ids));
    }

    fn send(&self, event: MapEvent) {
        if self.tx.send(SessionEvent::Map(event)).is_err() {
            tracing::debug!("map event dropped; session closed");
        }
    }
}

impl MapSurface for HeadlessMap {
    fn fit_bounds(&mut self, bounds: BoundingBox) {
        let view = self.view_for(bounds);
        self.view = Some(view);
        self.send(MapEvent::Viewport(view));
        self.send(MapEvent::FitComplete(view));
        self.send(MapEvent::MoveEnd);
        self.report_visible();
    }

    fn set_markers(&mut self, markers: &[Marker]) {
        self.markers = markers.to_vec();
        self.report_visible();
    }
}

/// Web-mercator zoom at which `width_degrees` spans `viewport_width_px`.
fn zoom_for_width(width_degrees: f64, viewport_width_px: f64) -> f64 {
    if width_degrees <= 0.0 {
        return 0.0;
    }
    (360.0 * viewport_width_px / (TILE_SIZE_PX * width_degrees))
        .log2()
        .clamp(0.0, 22.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::event_channel;

    fn drain(rx: &mut crate::driver::EventReceiver) -> Vec<MapEvent> {
        let mut out = Vec::new();
        while let Ok(SessionEvent::Map(e)) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    #[test]
    fn fit_reports_viewport_then_completion() {
        let (tx, mut rx) = event_channel();
        let mut map = HeadlessMap::new(tx, 800.0);
        let bounds = bbox_around(LatLng::new(38.25, -85.75), 16.0);
        map.fit_bounds(bounds);

        let events = drain(&mut rx);
        assert!(matches!(events[0], MapEvent::Viewport(v) if v.bounds == bounds));
        assert!(matches!(events[1], MapEvent::FitComplete(_)));
        assert_eq!(events[2], MapEvent::MoveEnd);
        assert_eq!(events[3], MapEvent::VisiblePins(Vec::new()));
    }

    #[test]
    fn only_pins_inside_the_view_are_reported() {
        let (tx, mut rx) = event_channel();
        let mut map = HeadlessMap::new(tx, 800.0);
        map.fit_bounds(bbox_around(LatLng::new(38.25, -85.75), 10.0));
        drain(&mut rx);

        map.set_markers(&[
            Marker {
                id: "near".to_owned(),
                title: "near".to_owned(),
                lat: 38.26,
                lng: -85.74,
            },
            Marker {
                id: "far".to_owned(),
                title: "far".to_owned(),
                lat: 40.0,
                lng: -80.0,
            },
        ]);
        assert_eq!(
            drain(&mut rx),
            vec![MapEvent::VisiblePins(vec!["near".to_owned()])]
        );
    }

    #[test]
    fn pan_is_flagged_as_user_input() {
        let (tx, mut rx) = event_channel();
        let mut map = HeadlessMap::new(tx, 800.0);
        map.pan_to(LatLng::new(38.3, -85.7), 10.0);
        let events = drain(&mut rx);
        assert_eq!(
            events[0],
            MapEvent::Gesture {
                user_initiated: true
            }
        );
        assert!(events.contains(&MapEvent::MoveEnd));
    }

    #[test]
    fn zoom_shrinks_as_the_span_widens() {
        assert!(zoom_for_width(0.5, 800.0) > zoom_for_width(5.0, 800.0));
        assert!(zoom_for_width(0.0, 800.0).abs() < f64::EPSILON);
    }
}
