//! Search view synchronisation: keeps the map, the filters and the result
//! list consistent while requests race and the camera moves.

pub mod arbiter;
pub mod debounce;
pub mod driver;
pub mod headless;
pub mod markers;
pub mod pagination;
pub mod port;
pub mod reconcile;
pub mod sequencer;
pub mod session;

pub use arbiter::{ArbiterEffect, ArbiterEvent, ArbiterState, Authority, Mode};
pub use driver::{event_channel, EventReceiver, EventSender, SearchDriver};
pub use headless::HeadlessMap;
pub use port::{FetchFailure, MapEvent, MapSurface, MapViewState, SalesApi};
pub use reconcile::{VisibleSet, RENDER_CAP};
pub use sequencer::{Lane, RequestId};
pub use session::{Command, EmptyState, SearchSession, SessionConfig, SessionEvent};
