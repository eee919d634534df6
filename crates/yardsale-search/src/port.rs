//! Seams between the engine and the outside world.
//!
//! The engine never talks to a concrete map library or HTTP stack. A map
//! implementation pushes [`MapEvent`]s in and receives `fit_bounds` calls
//! through [`MapSurface`]; the backend is reached through [`SalesApi`].

use std::future::Future;

use thiserror::Error;
use yardsale_core::geo::{BoundingBox, LatLng};
use yardsale_core::{Marker, MarkersQuery, SalesPage, SalesQuery};

/// One frame of map camera state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapViewState {
    pub center: LatLng,
    pub zoom: f64,
    pub bounds: BoundingBox,
}

/// Events a map implementation reports.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    /// Camera moved (`onViewportChange`). Fired every frame.
    Viewport(MapViewState),
    /// A pan or zoom started. `user_initiated` is true only for genuine
    /// pointer, touch, wheel or keyboard input.
    Gesture { user_initiated: bool },
    /// Pan or zoom settled.
    MoveEnd,
    /// A `fit_bounds` animation finished (`onFitComplete`).
    FitComplete(MapViewState),
    /// Ids of the pins currently drawn on screen (`onVisiblePinsChange`).
    VisiblePins(Vec<String>),
}

pub trait MapSurface: Send {
    /// Animate the camera to `bounds`. Completion is reported as
    /// [`MapEvent::FitComplete`].
    fn fit_bounds(&mut self, bounds: BoundingBox);

    /// Replace the pins drawn on the map.
    fn set_markers(&mut self, markers: &[Marker]);
}

/// Why a fetch failed. Aborted requests never produce one of these.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchFailure {
    /// Transport, timeout or non-success status. Prior results are kept.
    #[error("fetch failed: {0}")]
    Network(String),

    /// The response did not match the expected envelope. Treated as an
    /// empty result set.
    #[error("malformed response: {0}")]
    Malformed(String),
}

pub trait SalesApi: Send + Sync + 'static {
    fn fetch_sales(
        &self,
        query: &SalesQuery,
    ) -> impl Future<Output = Result<SalesPage, FetchFailure>> + Send;

    fn fetch_markers(
        &self,
        query: &MarkersQuery,
    ) -> impl Future<Output = Result<Vec<Marker>, FetchFailure>> + Send;
}
