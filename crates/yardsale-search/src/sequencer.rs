//! Per-lane request sequencing.
//!
//! Every request captures the lane's next id and a canonical state key
//! before it is issued. Starting a request aborts whatever was in flight on
//! the same lane. A response is applied only while its id is still the
//! lane's latest; anything else is dropped as stale, successful or not. This
//! is what stops an old slow response from overwriting a newer fast one.

use futures::future::{AbortHandle, AbortRegistration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    Sales,
    Markers,
    /// Background next-page fetch. Kept apart from `Sales` so it never
    /// aborts a foreground request.
    Prefetch,
}

impl Lane {
    const ALL: [Lane; 3] = [Lane::Sales, Lane::Markers, Lane::Prefetch];

    fn index(self) -> usize {
        match self {
            Lane::Sales => 0,
            Lane::Markers => 1,
            Lane::Prefetch => 2,
        }
    }
}

/// Identity of one issued request, carried back with its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId {
    pub lane: Lane,
    pub req_id: u64,
    pub state_key: String,
}

/// A freshly issued request: its identity plus the registration that ties
/// the future to the lane's abort handle.
#[derive(Debug)]
pub struct RequestTicket {
    pub id: RequestId,
    pub registration: AbortRegistration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Current,
    Stale,
}

#[derive(Debug, Default)]
struct LaneState {
    latest: u64,
    in_flight: Option<AbortHandle>,
}

#[derive(Debug, Default)]
pub struct RequestSequencer {
    lanes: [LaneState; 3],
}

impl RequestSequencer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next request id for `lane`, aborting the one in flight.
    ///
    /// A new foreground `Sales` request also invalidates any prefetch, since
    /// the page it was fetching belongs to the previous result set.
    pub fn begin(&mut self, lane: Lane, state_key: impl Into<String>) -> RequestTicket {
        if lane == Lane::Sales {
            self.cancel(Lane::Prefetch);
        }

        let slot = &mut self.lanes[lane.index()];
        if let Some(handle) = slot.in_flight.take() {
            tracing::debug!(?lane, superseded = slot.latest, "aborting in-flight request");
            handle.abort();
        }
        slot.latest += 1;
        let (handle, registration) = AbortHandle::new_pair();
        slot.in_flight = Some(handle);

        RequestTicket {
            id: RequestId {
                lane,
                req_id: slot.latest,
                state_key: state_key.into(),
            },
            registration,
        }
    }

    #[must_use]
    pub fn is_current(&self, id: &RequestId) -> bool {
        self.lanes[id.lane.index()].latest == id.req_id
    }

    /// Settle a response. Clears the in-flight handle when it is current.
    pub fn complete(&mut self, id: &RequestId) -> Disposition {
        if self.is_current(id) {
            self.lanes[id.lane.index()].in_flight = None;
            Disposition::Current
        } else {
            tracing::debug!(
                lane = ?id.lane,
                req_id = id.req_id,
                latest = self.latest_id(id.lane),
                state_key = %id.state_key,
                "dropped stale response"
            );
            Disposition::Stale
        }
    }

    /// Abort the lane's in-flight request and invalidate its id.
    pub fn cancel(&mut self, lane: Lane) {
        let slot = &mut self.lanes[lane.index()];
        if let Some(handle) = slot.in_flight.take() {
            handle.abort();
            slot.latest += 1;
        }
    }

    pub fn cancel_all(&mut self) {
        for lane in Lane::ALL {
            self.cancel(lane);
        }
    }

    #[must_use]
    pub fn latest_id(&self, lane: Lane) -> u64 {
        self.lanes[lane.index()].latest
    }

    #[must_use]
    pub fn in_flight(&self, lane: Lane) -> bool {
        self.lanes[lane.index()].in_flight.is_some()
    }
}

#[cfg(test)]
mod tests {
    use futures::future::Abortable;

    use super::*;

    #[test]
    fn ids_are_monotonic_per_lane() {
        let mut seq = RequestSequencer::new();
        let a = seq.begin(Lane::Sales, "k1");
        let b = seq.begin(Lane::Sales, "k2");
        let m = seq.begin(Lane::Markers, "k1");
        assert_eq!(a.id.req_id, 1);
        assert_eq!(b.id.req_id, 2);
        assert_eq!(m.id.req_id, 1);
    }

    #[test]
    fn older_response_arriving_late_is_stale() {
        let mut seq = RequestSequencer::new();
        let a = seq.begin(Lane::Sales, "first");
        let b = seq.begin(Lane::Sales, "second");

        assert_eq!(seq.complete(&b.id), Disposition::Current);
        assert_eq!(seq.complete(&a.id), Disposition::Stale);
        assert!(!seq.in_flight(Lane::Sales));
    }

    #[test]
    fn older_response_arriving_first_is_still_stale() {
        let mut seq = RequestSequencer::new();
        let a = seq.begin(Lane::Markers, "first");
        let b = seq.begin(Lane::Markers, "second");
        assert_eq!(seq.complete(&a.id), Disposition::Stale);
        assert!(seq.in_flight(Lane::Markers), "newer request still pending");
        assert_eq!(seq.complete(&b.id), Disposition::Current);
    }

    #[test]
    fn lanes_are_independent() {
        let mut seq = RequestSequencer::new();
        let sales = seq.begin(Lane::Sales, "s");
        let _markers = seq.begin(Lane::Markers, "m");
        assert!(seq.is_current(&sales.id));
    }

    #[tokio::test]
    async fn beginning_a_request_aborts_the_previous_one() {
        let mut seq = RequestSequencer::new();
        let first = seq.begin(Lane::Sales, "first");
        let _second = seq.begin(Lane::Sales, "second");

        let fut = Abortable::new(std::future::pending::<()>(), first.registration);
        assert!(fut.await.is_err(), "first request should have been aborted");
    }

    #[tokio::test]
    async fn foreground_sales_request_invalidates_prefetch() {
        let mut seq = RequestSequencer::new();
        let prefetch = seq.begin(Lane::Prefetch, "page-2");
        let _sales = seq.begin(Lane::Sales, "new-shape");

        assert!(!seq.is_current(&prefetch.id));
        let fut = Abortable::new(std::future::pending::<()>(), prefetch.registration);
        assert!(fut.await.is_err());
    }

    #[test]
    fn prefetch_does_not_abort_foreground() {
        let mut seq = RequestSequencer::new();
        let sales = seq.begin(Lane::Sales, "page-1");
        let _prefetch = seq.begin(Lane::Prefetch, "page-2");
        assert!(seq.is_current(&sales.id));
        assert!(seq.in_flight(Lane::Sales));
    }

    #[test]
    fn cancel_without_in_flight_keeps_the_id() {
        let mut seq = RequestSequencer::new();
        let a = seq.begin(Lane::Sales, "k");
        assert_eq!(seq.complete(&a.id), Disposition::Current);
        seq.cancel(Lane::Sales);
        assert_eq!(seq.latest_id(Lane::Sales), 1);
    }
}
