//! Control arbiter: which input owns the visible result set.
//!
//! Two sources compete for the view. Filter changes (ZIP, distance) move the
//! map programmatically and want their own query to win; user pans and zooms
//! want the list to follow the map. `mode` records why the view last changed
//! and `authority` records which source currently governs fetching and
//! display.
//!
//! The state is an immutable value. [`ArbiterState::apply`] is the only way
//! to move between states and returns the next state together with the side
//! effects the caller has to run.
//!
//! Two guards exist:
//!
//! - `programmatic_move_guard` absorbs the camera animation that follows a
//!   ZIP or distance change so it is not mistaken for a user gesture. Only a
//!   gesture flagged as user-initiated clears it.
//! - `guard_map_move` only blocks auto-search-on-move and is cleared at the
//!   end of every move or zoom.

use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Initial,
    Map,
    Zip,
    Distance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    Filters,
    Map,
}

/// Why a programmatic fit-to-bounds is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitReason {
    /// The camera is moving to the seeded filters of a new session.
    Initial,
    Zip,
    Distance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    Initial,
    SessionStarted,
    ZipSubmitted,
    DistanceChanged,
    UserGesture,
    /// A gesture arrived while the programmatic guard was up and was ignored.
    GestureAbsorbed,
    FitCompleted,
    /// Fit completion with no fit pending.
    FitIgnored,
    MoveEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterEvent {
    /// First load of a session from seeded filters. The mode stays
    /// `Initial`, but the filters own the first result set.
    SessionStarted,
    ZipSubmitted,
    DistanceChanged,
    MapGesture { user_initiated: bool },
    FitComplete,
    MoveEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterEffect {
    ResetPagination,
    /// Issue a filter-driven fetch at the current effective centre.
    Fetch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: ArbiterState,
    pub effects: Vec<ArbiterEffect>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArbiterState {
    mode: Mode,
    authority: Authority,
    programmatic_move_guard: bool,
    guard_map_move: bool,
    pending_fit: Option<FitReason>,
    last_changed_at: Option<Instant>,
    last_transition_reason: TransitionReason,
}

impl Default for ArbiterState {
    fn default() -> Self {
        Self {
            mode: Mode::Initial,
            authority: Authority::Map,
            programmatic_move_guard: false,
            guard_map_move: false,
            pending_fit: None,
            last_changed_at: None,
            last_transition_reason: TransitionReason::Initial,
        }
    }
}

impl ArbiterState {
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn authority(&self) -> Authority {
        self.authority
    }

    #[must_use]
    pub fn programmatic_move_guard(&self) -> bool {
        self.programmatic_move_guard
    }

    #[must_use]
    pub fn guard_map_move(&self) -> bool {
        self.guard_map_move
    }

    #[must_use]
    pub fn pending_fit(&self) -> Option<FitReason> {
        self.pending_fit
    }

    #[must_use]
    pub fn last_changed_at(&self) -> Option<Instant> {
        self.last_changed_at
    }

    #[must_use]
    pub fn last_transition_reason(&self) -> TransitionReason {
        self.last_transition_reason
    }

    /// Whether a settled viewport may trigger a markers fetch on its own.
    #[must_use]
    pub fn allows_auto_search(&self) -> bool {
        self.authority == Authority::Map && !self.guard_map_move
    }

    #[must_use]
    pub fn apply(&self, event: ArbiterEvent, now: Instant) -> Transition {
        let mut next = self.clone();
        let mut effects = Vec::new();

        let reason = match event {
            ArbiterEvent::SessionStarted => {
                next.begin_filter_change(Mode::Initial, FitReason::Initial);
                effects.extend([ArbiterEffect::ResetPagination, ArbiterEffect::Fetch]);
                TransitionReason::SessionStarted
            }
            ArbiterEvent::ZipSubmitted => {
                next.begin_filter_change(Mode::Zip, FitReason::Zip);
                effects.extend([ArbiterEffect::ResetPagination, ArbiterEffect::Fetch]);
                TransitionReason::ZipSubmitted
            }
            ArbiterEvent::DistanceChanged => {
                next.begin_filter_change(Mode::Distance, FitReason::Distance);
                effects.extend([ArbiterEffect::ResetPagination, ArbiterEffect::Fetch]);
                TransitionReason::DistanceChanged
            }
            ArbiterEvent::MapGesture { user_initiated } => {
                if self.programmatic_move_guard && !user_initiated {
                    TransitionReason::GestureAbsorbed
                } else {
                    next.programmatic_move_guard = false;
                    next.pending_fit = None;
                    next.mode = Mode::Map;
                    next.authority = Authority::Map;
                    TransitionReason::UserGesture
                }
            }
            ArbiterEvent::FitComplete => {
                if next.pending_fit.take().is_some() {
                    effects.push(ArbiterEffect::Fetch);
                    TransitionReason::FitCompleted
                } else {
                    TransitionReason::FitIgnored
                }
            }
            ArbiterEvent::MoveEnd => {
                next.guard_map_move = false;
                TransitionReason::MoveEnded
            }
        };

        if next.mode != self.mode || next.authority != self.authority {
            next.last_changed_at = Some(now);
        }
        next.last_transition_reason = reason;

        tracing::debug!(
            ?event,
            ?reason,
            mode = ?next.mode,
            authority = ?next.authority,
            programmatic_move_guard = next.programmatic_move_guard,
            guard_map_move = next.guard_map_move,
            "arbiter transition"
        );

        Transition {
            state: next,
            effects,
        }
    }

    fn begin_filter_change(&mut self, mode: Mode, fit: FitReason) {
        self.mode = mode;
        self.authority = Authority::Filters;
        self.programmatic_move_guard = true;
        self.guard_map_move = true;
        self.pending_fit = Some(fit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gesture(user_initiated: bool) -> ArbiterEvent {
        ArbiterEvent::MapGesture { user_initiated }
    }

    #[test]
    fn initial_state_is_map_owned_without_guards() {
        let s = ArbiterState::default();
        assert_eq!(s.mode(), Mode::Initial);
        assert_eq!(s.authority(), Authority::Map);
        assert!(!s.programmatic_move_guard());
        assert!(!s.guard_map_move());
        assert!(s.allows_auto_search());
    }

    #[test]
    fn user_pan_from_initial_takes_map_mode() {
        let now = Instant::now();
        let t = ArbiterState::default().apply(gesture(true), now);
        assert_eq!(t.state.mode(), Mode::Map);
        assert_eq!(t.state.authority(), Authority::Map);
        assert!(!t.state.programmatic_move_guard());
        assert!(t.effects.is_empty());
        assert_eq!(t.state.last_changed_at(), Some(now));
    }

    #[test]
    fn unflagged_gesture_without_guard_still_takes_map_mode() {
        let t = ArbiterState::default().apply(gesture(false), Instant::now());
        assert_eq!(t.state.mode(), Mode::Map);
        assert_eq!(t.state.last_transition_reason(), TransitionReason::UserGesture);
    }

    #[test]
    fn zip_submit_hands_authority_to_filters_and_raises_guards() {
        let t = ArbiterState::default().apply(ArbiterEvent::ZipSubmitted, Instant::now());
        assert_eq!(t.state.mode(), Mode::Zip);
        assert_eq!(t.state.authority(), Authority::Filters);
        assert!(t.state.programmatic_move_guard());
        assert!(t.state.guard_map_move());
        assert_eq!(t.state.pending_fit(), Some(FitReason::Zip));
        assert_eq!(
            t.effects,
            vec![ArbiterEffect::ResetPagination, ArbiterEffect::Fetch]
        );
        assert!(!t.state.allows_auto_search());
    }

    #[test]
    fn zip_guard_round_trip() {
        let now = Instant::now();
        let zip = ArbiterState::default().apply(ArbiterEvent::ZipSubmitted, now).state;

        // The fit animation reports camera movement that is not user-driven.
        let absorbed = zip.apply(gesture(false), now);
        assert_eq!(absorbed.state.authority(), Authority::Filters);
        assert!(absorbed.state.programmatic_move_guard());
        assert_eq!(
            absorbed.state.last_transition_reason(),
            TransitionReason::GestureAbsorbed
        );

        let fitted = absorbed.state.apply(ArbiterEvent::FitComplete, now);
        assert_eq!(fitted.effects, vec![ArbiterEffect::Fetch]);
        assert_eq!(fitted.state.authority(), Authority::Filters);
        assert!(fitted.state.programmatic_move_guard());
        assert!(fitted.state.pending_fit().is_none());

        let panned = fitted.state.apply(gesture(true), now);
        assert_eq!(panned.state.authority(), Authority::Map);
        assert_eq!(panned.state.mode(), Mode::Map);
        assert!(!panned.state.programmatic_move_guard());
    }

    #[test]
    fn fit_complete_fetches_exactly_once() {
        let now = Instant::now();
        let s = ArbiterState::default()
            .apply(ArbiterEvent::DistanceChanged, now)
            .state;
        let first = s.apply(ArbiterEvent::FitComplete, now);
        let second = first.state.apply(ArbiterEvent::FitComplete, now);
        assert_eq!(first.effects, vec![ArbiterEffect::Fetch]);
        assert!(second.effects.is_empty());
        assert_eq!(
            second.state.last_transition_reason(),
            TransitionReason::FitIgnored
        );
    }

    #[test]
    fn user_gesture_cancels_pending_fit() {
        let now = Instant::now();
        let s = ArbiterState::default()
            .apply(ArbiterEvent::ZipSubmitted, now)
            .state
            .apply(gesture(true), now)
            .state;
        assert!(s.pending_fit().is_none());
        assert!(s.apply(ArbiterEvent::FitComplete, now).effects.is_empty());
    }

    #[test]
    fn move_end_clears_only_the_move_guard() {
        let now = Instant::now();
        let s = ArbiterState::default()
            .apply(ArbiterEvent::DistanceChanged, now)
            .state
            .apply(ArbiterEvent::MoveEnd, now)
            .state;
        assert!(!s.guard_map_move());
        assert!(s.programmatic_move_guard());
        assert_eq!(s.authority(), Authority::Filters);
        assert_eq!(s.mode(), Mode::Distance);
    }

    #[test]
    fn session_start_gives_filters_the_first_result_set() {
        let t = ArbiterState::default().apply(ArbiterEvent::SessionStarted, Instant::now());
        assert_eq!(t.state.mode(), Mode::Initial);
        assert_eq!(t.state.authority(), Authority::Filters);
        assert_eq!(t.state.pending_fit(), Some(FitReason::Initial));
        assert!(t.state.programmatic_move_guard());
        assert_eq!(
            t.effects,
            vec![ArbiterEffect::ResetPagination, ArbiterEffect::Fetch]
        );
    }

    #[test]
    fn apply_leaves_the_original_state_untouched() {
        let original = ArbiterState::default();
        let _ = original.apply(ArbiterEvent::ZipSubmitted, Instant::now());
        assert_eq!(original, ArbiterState::default());
    }
}
