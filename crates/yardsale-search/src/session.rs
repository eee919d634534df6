//! One search page session.
//!
//! `SearchSession` owns the filters, the arbiter, the debouncer, the request
//! sequencer and the result caches. It is a synchronous reducer: every input
//! goes through [`SearchSession::handle`], which updates state and returns
//! the [`Command`]s the caller must run (fetches, camera moves, pin updates).
//! Responses come back as events carrying the [`RequestId`] they were issued
//! with, so staleness is decided here and nowhere else.
//!
//! Failure handling:
//!
//! - aborted requests are silent,
//! - failed fetches keep the previously displayed results,
//! - malformed responses count as an empty result set.

use std::collections::HashMap;
use std::time::Instant;

use chrono::NaiveDate;
use yardsale_core::geo::{
    approx_radius_km_for_zoom, bbox_around, radius_km_from_bounds, BoundingBox, LatLng,
};
use yardsale_core::{
    normalize_zip, CoreError, DateRange, Marker, MarkersQuery, QueryShape, Sale, SalesPage,
    SalesQuery, SearchFilters,
};

use crate::arbiter::{ArbiterEffect, ArbiterEvent, ArbiterState, Authority};
use crate::debounce::{AcceptedViewport, BoundsDebouncer, DebounceConfig};
use crate::markers::{marker_state_key, MarkerApplyGuard, MarkerUpdate};
use crate::pagination::{LoadMore, PageCache};
use crate::port::{FetchFailure, MapEvent, MapViewState};
use crate::reconcile::{VisibleSet, VisibleSetReconciler, CROP_EPSILON, RENDER_CAP};
use crate::sequencer::{Disposition, Lane, RequestId, RequestSequencer, RequestTicket};

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub page_size: u32,
    pub markers_limit: u32,
    pub render_cap: usize,
    pub debounce: DebounceConfig,
    /// Viewport width used to approximate a radius from zoom when the map
    /// reports degenerate bounds.
    pub viewport_width_px: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page_size: 24,
            markers_limit: 1000,
            render_cap: RENDER_CAP,
            debounce: DebounceConfig::default(),
            viewport_width_px: 800.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ZipSubmitted {
        zip: String,
        center: LatLng,
        city: Option<String>,
    },
    DistanceChanged {
        miles: f64,
    },
    /// The empty-state "increase radius" action.
    IncreaseRadius,
    CategoryToggled(String),
    DateRangeChanged(DateRange),
    Map(MapEvent),
    /// Timer tick for the debouncer's trailing edge.
    Tick,
    LoadMore,
    SalesLoaded {
        id: RequestId,
        offset: u32,
        append: bool,
        result: Result<SalesPage, FetchFailure>,
    },
    PrefetchLoaded {
        id: RequestId,
        offset: u32,
        result: Result<SalesPage, FetchFailure>,
    },
    MarkersLoaded {
        id: RequestId,
        result: Result<Vec<Marker>, FetchFailure>,
    },
    /// A request was aborted before it settled.
    Aborted {
        id: RequestId,
    },
}

impl SessionEvent {
    /// ZIP submission with the ZIP validated and normalized.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidZip`] for a malformed ZIP.
    pub fn zip_submitted(
        raw_zip: &str,
        center: LatLng,
        city: Option<String>,
    ) -> Result<Self, CoreError> {
        Ok(Self::ZipSubmitted {
            zip: normalize_zip(raw_zip)?,
            center,
            city,
        })
    }
}

#[derive(Debug)]
pub enum Command {
    FetchSales {
        ticket: RequestTicket,
        query: SalesQuery,
        append: bool,
    },
    Prefetch {
        ticket: RequestTicket,
        query: SalesQuery,
    },
    FetchMarkers {
        ticket: RequestTicket,
        query: MarkersQuery,
    },
    FitBounds(BoundingBox),
    ShowMarkers(Vec<Marker>),
}

/// "No results" prompt, distinct from an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmptyState {
    pub suggested_distance_miles: Option<f64>,
}

#[derive(Debug)]
pub struct SearchSession {
    config: SessionConfig,
    today: NaiveDate,
    filters: SearchFilters,
    arbiter: ArbiterState,
    debouncer: BoundsDebouncer,
    sequencer: RequestSequencer,
    pages: PageCache,
    reconciler: VisibleSetReconciler,
    marker_guard: MarkerApplyGuard,
    sales: Vec<Sale>,
    sales_by_id: HashMap<String, Sale>,
    markers: Vec<Marker>,
    markers_by_id: HashMap<String, Marker>,
    map_view: Option<MapViewState>,
    /// Bounds of the last requested programmatic fit.
    fit_target: Option<BoundingBox>,
    viewport: Option<AcceptedViewport>,
    visible_pins: Vec<String>,
    /// Shape of the last filter-driven sales fetch; pagination follows it.
    active_shape: Option<QueryShape>,
    last_markers_shape: Option<String>,
    sales_settled: bool,
    degraded: bool,
    last_error: Option<FetchFailure>,
}

impl SearchSession {
    #[must_use]
    pub fn new(filters: SearchFilters, today: NaiveDate, config: SessionConfig) -> Self {
        Self {
            debouncer: BoundsDebouncer::new(config.debounce),
            pages: PageCache::new(config.page_size),
            reconciler: VisibleSetReconciler::new(config.render_cap),
            config,
            today,
            filters,
            arbiter: ArbiterState::default(),
            sequencer: RequestSequencer::new(),
            marker_guard: MarkerApplyGuard::default(),
            sales: Vec::new(),
            sales_by_id: HashMap::new(),
            markers: Vec::new(),
            markers_by_id: HashMap::new(),
            map_view: None,
            fit_target: None,
            viewport: None,
            visible_pins: Vec::new(),
            active_shape: None,
            last_markers_shape: None,
            sales_settled: false,
            degraded: false,
            last_error: None,
        }
    }

    #[must_use]
    pub fn filters(&self) -> &SearchFilters {
        &self.filters
    }

    #[must_use]
    pub fn arbiter(&self) -> &ArbiterState {
        &self.arbiter
    }

    #[must_use]
    pub fn visible(&self) -> &VisibleSet {
        self.reconciler.current()
    }

    #[must_use]
    pub fn sales(&self) -> &[Sale] {
        &self.sales
    }

    #[must_use]
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.pages.has_more()
    }

    #[must_use]
    pub fn degraded(&self) -> bool {
        self.degraded
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&FetchFailure> {
        self.last_error.as_ref()
    }

    #[must_use]
    pub fn viewport_seq(&self) -> u64 {
        self.debouncer.seq()
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.next_deadline()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.sequencer.in_flight(Lane::Sales) || self.sequencer.in_flight(Lane::Markers)
    }

    /// Set once a sales load settled with nothing in view. Never reported
    /// while the camera is still flying to a new search.
    #[must_use]
    pub fn empty_state(&self) -> Option<EmptyState> {
        if !self.sales_settled
            || self.is_loading()
            || self.arbiter.pending_fit().is_some()
            || self.visible().total() > 0
        {
            return None;
        }
        Some(EmptyState {
            suggested_distance_miles: self.filters.larger_distance(),
        })
    }

    /// Kick off the first load for the seeded filters.
    pub fn start(&mut self, now: Instant) -> Vec<Command> {
        let center = self.filters.center();
        let effects = self.transition(ArbiterEvent::SessionStarted, now);
        let mut commands = self.run_effects(&effects, center);
        commands.push(self.fit_to(center));
        commands
    }

    pub fn handle(&mut self, event: SessionEvent, now: Instant) -> Vec<Command> {
        match event {
            SessionEvent::ZipSubmitted { zip, center, city } => {
                self.filters.set_center(center);
                self.filters.zip = Some(zip);
                self.filters.city = city;
                let effects = self.transition(ArbiterEvent::ZipSubmitted, now);
                let mut commands = self.run_effects(&effects, center);
                commands.push(self.fit_to(center));
                commands
            }
            SessionEvent::DistanceChanged { miles } => self.change_distance(miles, now),
            SessionEvent::IncreaseRadius => match self.filters.larger_distance() {
                Some(miles) => self.change_distance(miles, now),
                None => Vec::new(),
            },
            SessionEvent::CategoryToggled(name) => {
                if let Err(e) = self.filters.toggle_category(&name) {
                    tracing::warn!(error = %e, "ignoring category toggle");
                    return Vec::new();
                }
                self.refilter()
            }
            SessionEvent::DateRangeChanged(range) => {
                if self.filters.date_range == range {
                    return Vec::new();
                }
                self.filters.date_range = range;
                self.refilter()
            }
            SessionEvent::Map(map_event) => self.handle_map(map_event, now),
            SessionEvent::Tick => match self.debouncer.poll(now) {
                Some(accepted) => self.viewport_accepted(accepted),
                None => Vec::new(),
            },
            SessionEvent::LoadMore => self.load_more(),
            SessionEvent::SalesLoaded {
                id,
                offset,
                append,
                result,
            } => self.sales_loaded(&id, offset, append, result),
            SessionEvent::PrefetchLoaded { id, offset, result } => {
                self.prefetch_loaded(&id, offset, result);
                Vec::new()
            }
            SessionEvent::MarkersLoaded { id, result } => self.markers_loaded(&id, result),
            SessionEvent::Aborted { id } => {
                tracing::trace!(lane = ?id.lane, req_id = id.req_id, "request aborted");
                Vec::new()
            }
        }
    }

    fn transition(&mut self, event: ArbiterEvent, now: Instant) -> Vec<ArbiterEffect> {
        let before = self.arbiter.authority();
        let t = self.arbiter.apply(event, now);
        self.arbiter = t.state;
        if before == Authority::Filters && self.arbiter.authority() == Authority::Map {
            self.enter_map_authority();
        }
        t.effects
    }

    fn run_effects(&mut self, effects: &[ArbiterEffect], center: LatLng) -> Vec<Command> {
        let shape = self.shape_at(center);
        let mut commands = Vec::new();
        for effect in effects {
            match effect {
                ArbiterEffect::ResetPagination => {
                    self.pages.reset(shape.shape_hash.clone());
                    self.active_shape = None;
                }
                ArbiterEffect::Fetch => commands.extend(self.fetch_for_shape(&shape)),
            }
        }
        commands
    }

    fn change_distance(&mut self, miles: f64, now: Instant) -> Vec<Command> {
        self.filters.set_distance(miles);
        let center = self.effective_center();
        self.filters.set_center(center);
        let effects = self.transition(ArbiterEvent::DistanceChanged, now);
        let mut commands = self.run_effects(&effects, center);
        commands.push(self.fit_to(center));
        commands
    }

    /// Category or date change: ownership is unchanged, the query is not.
    fn refilter(&mut self) -> Vec<Command> {
        self.marker_guard.reset();
        self.last_markers_shape = None;
        match self.arbiter.authority() {
            Authority::Filters => {
                let shape = self.shape_at(self.filters.center());
                self.pages.reset(shape.shape_hash.clone());
                self.fetch_for_shape(&shape)
            }
            Authority::Map => self.fetch_viewport_markers().into_iter().collect(),
        }
    }

    fn handle_map(&mut self, event: MapEvent, now: Instant) -> Vec<Command> {
        match event {
            MapEvent::Viewport(view) => {
                self.map_view = Some(view);
                match self.debouncer.offer(view, now) {
                    Some(accepted) => self.viewport_accepted(accepted),
                    None => Vec::new(),
                }
            }
            MapEvent::Gesture { user_initiated } => {
                self.transition(ArbiterEvent::MapGesture { user_initiated }, now);
                Vec::new()
            }
            MapEvent::MoveEnd => {
                self.transition(ArbiterEvent::MoveEnd, now);
                if self.arbiter.allows_auto_search() {
                    self.fetch_viewport_markers().into_iter().collect()
                } else {
                    Vec::new()
                }
            }
            MapEvent::FitComplete(view) => self.fit_complete(view, now),
            MapEvent::VisiblePins(ids) => {
                self.visible_pins = ids;
                if self.arbiter.authority() == Authority::Map {
                    self.reconciler
                        .reconcile_map(&self.visible_pins, &self.sales_by_id, &self.markers_by_id);
                }
                Vec::new()
            }
        }
    }

    fn fit_complete(&mut self, view: MapViewState, now: Instant) -> Vec<Command> {
        self.map_view = Some(view);
        if self.arbiter.pending_fit().is_some() && !self.lands_on_fit_target(&view) {
            // Completion of a fit that a later ZIP or distance change replaced.
            tracing::debug!(
                lat = view.center.lat,
                lng = view.center.lng,
                "ignoring completion of a superseded fit"
            );
            return Vec::new();
        }

        let effects = self.transition(ArbiterEvent::FitComplete, now);
        self.fit_target = None;
        let mut commands = Vec::new();
        if effects.contains(&ArbiterEffect::Fetch) {
            // Zoom snapping can settle the camera off the requested centre;
            // the settled centre is the one searched.
            self.filters.set_center(view.center);
            let shape = self.shape_at(view.center);
            if self.active_shape_hash() == Some(shape.shape_hash.as_str()) {
                tracing::debug!(shape = %shape.shape_hash, "fit landed on the fetched shape");
            } else {
                self.pages.reset(shape.shape_hash.clone());
                commands.extend(self.fetch_for_shape(&shape));
            }
        }
        if let Some(accepted) = self.debouncer.offer(view, now) {
            commands.extend(self.viewport_accepted(accepted));
        }
        commands
    }

    fn lands_on_fit_target(&self, view: &MapViewState) -> bool {
        self.fit_target
            .is_none_or(|target| target.contains(view.center, CROP_EPSILON))
    }

    fn viewport_accepted(&mut self, accepted: AcceptedViewport) -> Vec<Command> {
        tracing::debug!(seq = accepted.seq, edge = ?accepted.edge, "viewport applied");
        self.viewport = Some(accepted);
        match self.arbiter.authority() {
            Authority::Filters => {
                self.recrop();
                Vec::new()
            }
            Authority::Map => {
                if let Some(v) = &self.viewport {
                    self.filters.set_center(v.view.center);
                }
                if self.arbiter.allows_auto_search() {
                    self.fetch_viewport_markers().into_iter().collect()
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn enter_map_authority(&mut self) {
        // The list now follows the pins; no broad list fetch may land.
        self.sequencer.cancel(Lane::Sales);
        self.sequencer.cancel(Lane::Prefetch);
        self.reconciler.invalidate();
        self.reconciler
            .reconcile_map(&self.visible_pins, &self.sales_by_id, &self.markers_by_id);
    }

    fn load_more(&mut self) -> Vec<Command> {
        if self.arbiter.authority() == Authority::Map {
            tracing::debug!("load more ignored while the map owns the list");
            return Vec::new();
        }
        let Some(shape) = self.active_shape.clone() else {
            return Vec::new();
        };
        match self.pages.load_more() {
            LoadMore::Consumed { sales, prefetch } => {
                self.append_sales(sales);
                self.recrop();
                prefetch
                    .map(|offset| self.prefetch(&shape, offset))
                    .into_iter()
                    .collect()
            }
            LoadMore::Fetch { offset } => {
                if self.sequencer.in_flight(Lane::Sales) {
                    return Vec::new();
                }
                let ticket = self.sequencer.begin(Lane::Sales, shape.shape_hash.clone());
                vec![Command::FetchSales {
                    ticket,
                    query: shape.sales_query(self.config.page_size, offset),
                    append: true,
                }]
            }
            LoadMore::Exhausted => Vec::new(),
        }
    }

    fn sales_loaded(
        &mut self,
        id: &RequestId,
        offset: u32,
        append: bool,
        result: Result<SalesPage, FetchFailure>,
    ) -> Vec<Command> {
        if self.sequencer.complete(id) == Disposition::Stale {
            return Vec::new();
        }
        let page = match result {
            Ok(page) => page,
            Err(FetchFailure::Malformed(reason)) => {
                tracing::warn!(%reason, "malformed sales response; treating as empty");
                SalesPage::default()
            }
            Err(err @ FetchFailure::Network(_)) => {
                tracing::warn!(error = %err, "sales fetch failed; keeping previous results");
                self.last_error = Some(err);
                return Vec::new();
            }
        };

        self.last_error = None;
        self.sales_settled = true;
        self.degraded = page.degraded;
        let len = page.sales.len();
        if append {
            self.append_sales(page.sales);
        } else {
            self.sales_by_id = page
                .sales
                .iter()
                .map(|s| (s.id.clone(), s.clone()))
                .collect();
            self.sales = page.sales;
        }
        tracing::debug!(count = len, offset, append, "sales applied");

        let prefetch = self.pages.after_fetch(offset, len, append);
        self.recrop();
        match (prefetch, self.active_shape.clone()) {
            (Some(next), Some(shape)) if shape.shape_hash == id.state_key => {
                vec![self.prefetch(&shape, next)]
            }
            _ => Vec::new(),
        }
    }

    fn prefetch_loaded(
        &mut self,
        id: &RequestId,
        offset: u32,
        result: Result<SalesPage, FetchFailure>,
    ) {
        if self.sequencer.complete(id) == Disposition::Stale {
            return;
        }
        match result {
            Ok(page) => self.pages.prefetch_loaded(&id.state_key, offset, page.sales),
            Err(FetchFailure::Malformed(_)) => {
                self.pages.prefetch_loaded(&id.state_key, offset, Vec::new());
            }
            Err(err) => {
                tracing::debug!(error = %err, offset, "prefetch failed");
                self.pages.prefetch_failed(offset);
            }
        }
    }

    fn markers_loaded(
        &mut self,
        id: &RequestId,
        result: Result<Vec<Marker>, FetchFailure>,
    ) -> Vec<Command> {
        if self.sequencer.complete(id) == Disposition::Stale {
            return Vec::new();
        }
        let markers = match result {
            Ok(markers) => markers,
            Err(FetchFailure::Malformed(reason)) => {
                tracing::warn!(%reason, "malformed markers response; treating as empty");
                Vec::new()
            }
            Err(err @ FetchFailure::Network(_)) => {
                tracing::warn!(error = %err, "markers fetch failed; keeping previous pins");
                self.last_error = Some(err);
                return Vec::new();
            }
        };

        let bbox = self.viewport.as_ref().map(|v| v.view.bounds);
        let date_key = self.filters.date_range.resolved_key(self.today);
        let key = marker_state_key(bbox.as_ref(), &date_key, &markers);
        if self.marker_guard.check(key) == MarkerUpdate::Unchanged {
            return Vec::new();
        }

        self.markers_by_id = markers.iter().map(|m| (m.id.clone(), m.clone())).collect();
        self.markers = markers;
        if self.arbiter.authority() == Authority::Map {
            self.reconciler.invalidate();
            self.reconciler
                .reconcile_map(&self.visible_pins, &self.sales_by_id, &self.markers_by_id);
        }
        vec![Command::ShowMarkers(self.markers.clone())]
    }

    /// Foreground sales + markers fetch for a filter-owned shape.
    fn fetch_for_shape(&mut self, shape: &QueryShape) -> Vec<Command> {
        self.active_shape = Some(shape.clone());
        self.last_markers_shape = Some(shape.shape_hash.clone());
        self.sales_settled = false;
        tracing::info!(
            lat = shape.center.lat,
            lng = shape.center.lng,
            radius_km = shape.radius_km,
            date = %shape.date_key(),
            "searching"
        );

        let sales_ticket = self.sequencer.begin(Lane::Sales, shape.shape_hash.clone());
        let markers_ticket = self.sequencer.begin(Lane::Markers, shape.shape_hash.clone());
        vec![
            Command::FetchSales {
                ticket: sales_ticket,
                query: shape.sales_query(self.config.page_size, 0),
                append: false,
            },
            Command::FetchMarkers {
                ticket: markers_ticket,
                query: shape.markers_query(self.config.markers_limit),
            },
        ]
    }

    /// Markers for the accepted viewport, skipped when the shape is the one
    /// already requested.
    fn fetch_viewport_markers(&mut self) -> Option<Command> {
        let view = self.viewport.as_ref()?.view;
        let radius_km = self.viewport_radius_km(&view);
        let shape = QueryShape::new(
            view.center,
            radius_km,
            self.filters.date_range,
            self.filters.categories().iter().cloned(),
            self.today,
        );
        if self.last_markers_shape.as_deref() == Some(shape.shape_hash.as_str()) {
            return None;
        }
        self.last_markers_shape = Some(shape.shape_hash.clone());
        let ticket = self.sequencer.begin(Lane::Markers, shape.shape_hash.clone());
        Some(Command::FetchMarkers {
            ticket,
            query: shape.markers_query(self.config.markers_limit),
        })
    }

    fn active_shape_hash(&self) -> Option<&str> {
        self.active_shape.as_ref().map(|s| s.shape_hash.as_str())
    }

    fn prefetch(&mut self, shape: &QueryShape, offset: u32) -> Command {
        let ticket = self.sequencer.begin(Lane::Prefetch, shape.shape_hash.clone());
        Command::Prefetch {
            ticket,
            query: shape.sales_query(self.config.page_size, offset),
        }
    }

    fn append_sales(&mut self, sales: Vec<Sale>) {
        for sale in sales {
            self.sales_by_id.insert(sale.id.clone(), sale.clone());
            self.sales.push(sale);
        }
    }

    fn recrop(&mut self) {
        if self.arbiter.authority() != Authority::Filters {
            return;
        }
        // Mid-flight the accepted viewport still shows the previous place, so
        // results are cropped to their own search area instead.
        let bounds = if self.arbiter.pending_fit().is_some() {
            self.active_shape
                .as_ref()
                .map(|shape| bbox_around(shape.center, shape.radius_km))
        } else {
            self.viewport.as_ref().map(|v| v.view.bounds)
        };
        self.reconciler.reconcile_filters(&self.sales, bounds.as_ref());
    }

    /// Centre for a distance change. Camera frames of a fit in progress are
    /// not user state, so the filter centre holds until the fit settles.
    fn effective_center(&self) -> LatLng {
        if self.arbiter.pending_fit().is_some() {
            return self.filters.center();
        }
        self.map_view
            .map_or_else(|| self.filters.center(), |v| v.center)
    }

    fn fit_to(&mut self, center: LatLng) -> Command {
        let bounds = self.search_bounds(center);
        self.fit_target = Some(bounds);
        Command::FitBounds(bounds)
    }

    fn shape_at(&self, center: LatLng) -> QueryShape {
        QueryShape::from_filters(&self.filters, center, self.today)
    }

    fn search_bounds(&self, center: LatLng) -> BoundingBox {
        bbox_around(center, self.shape_at(center).radius_km)
    }

    fn viewport_radius_km(&self, view: &MapViewState) -> f64 {
        if view.bounds.area() > 0.0 {
            radius_km_from_bounds(&view.bounds)
        } else {
            approx_radius_km_for_zoom(view.zoom, view.center.lat, self.config.viewport_width_px)
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
