//! Async runtime around [`SearchSession`].
//!
//! The driver executes the session's commands: fetches run as spawned tokio
//! tasks wrapped in [`Abortable`] so the sequencer can cancel them, and camera
//! or pin updates go to the [`MapSurface`]. Every result flows back through a
//! single channel and is handled in arrival order.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::future::Abortable;
use tokio::sync::mpsc;
use tokio::time;

use crate::port::{MapSurface, SalesApi};
use crate::sequencer::{RequestId, RequestTicket};
use crate::session::{Command, SearchSession, SessionEvent};

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

pub struct SearchDriver<A, M> {
    session: SearchSession,
    api: Arc<A>,
    map: M,
    tx: EventSender,
    rx: EventReceiver,
    outstanding: usize,
}

impl<A, M> SearchDriver<A, M>
where
    A: SalesApi,
    M: MapSurface,
{
    /// `tx`/`rx` must come from the same [`event_channel`] the map was given.
    pub fn new(
        session: SearchSession,
        api: Arc<A>,
        map: M,
        (tx, rx): (EventSender, EventReceiver),
    ) -> Self {
        Self {
            session,
            api,
            map,
            tx,
            rx,
            outstanding: 0,
        }
    }

    pub fn session(&self) -> &SearchSession {
        &self.session
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut M {
        &mut self.map
    }

    pub fn into_session(self) -> SearchSession {
        self.session
    }

    pub fn start(&mut self) {
        let commands = self.session.start(Instant::now());
        self.execute(commands);
    }

    /// Feed one event and run whatever it asks for.
    pub fn dispatch(&mut self, event: SessionEvent) {
        if matches!(
            event,
            SessionEvent::SalesLoaded { .. }
                | SessionEvent::PrefetchLoaded { .. }
                | SessionEvent::MarkersLoaded { .. }
                | SessionEvent::Aborted { .. }
        ) {
            self.outstanding = self.outstanding.saturating_sub(1);
        }
        let commands = self.session.handle(event, Instant::now());
        self.execute(commands);
    }

    /// Process events until no request is outstanding and no debounce timer
    /// is pending.
    pub async fn run_until_idle(&mut self) {
        loop {
            if let Ok(event) = self.rx.try_recv() {
                self.dispatch(event);
                continue;
            }

            let deadline = self.session.next_deadline();
            if self.outstanding == 0 && deadline.is_none() {
                break;
            }

            let sleep = async {
                match deadline {
                    Some(at) => time::sleep_until(time::Instant::from_std(at)).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                event = self.rx.recv() => {
                    if let Some(event) = event {
                        self.dispatch(event);
                    }
                }
                () = sleep => self.dispatch(SessionEvent::Tick),
            }
        }
        tracing::debug!("search session idle");
    }

    fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::FetchSales {
                    ticket,
                    query,
                    append,
                } => {
                    let api = Arc::clone(&self.api);
                    let offset = query.offset;
                    let fetch = async move { api.fetch_sales(&query).await };
                    self.spawn(ticket, fetch, move |id, result| SessionEvent::SalesLoaded {
                        id,
                        offset,
                        append,
                        result,
                    });
                }
                Command::Prefetch { ticket, query } => {
                    let api = Arc::clone(&self.api);
                    let offset = query.offset;
                    let fetch = async move { api.fetch_sales(&query).await };
                    self.spawn(ticket, fetch, move |id, result| {
                        SessionEvent::PrefetchLoaded { id, offset, result }
                    });
                }
                Command::FetchMarkers { ticket, query } => {
                    let api = Arc::clone(&self.api);
                    let fetch = async move { api.fetch_markers(&query).await };
                    self.spawn(ticket, fetch, |id, result| SessionEvent::MarkersLoaded {
                        id,
                        result,
                    });
                }
                Command::FitBounds(bounds) => self.map.fit_bounds(bounds),
                Command::ShowMarkers(markers) => self.map.set_markers(&markers),
            }
        }
    }

    fn spawn<F, T, W>(&mut self, ticket: RequestTicket, fetch: F, wrap: W)
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
        W: FnOnce(RequestId, T) -> SessionEvent + Send + 'static,
    {
        let RequestTicket { id, registration } = ticket;
        let tx = self.tx.clone();
        self.outstanding += 1;
        tokio::spawn(async move {
            let event = match Abortable::new(fetch, registration).await {
                Ok(result) => wrap(id, result),
                Err(_aborted) => SessionEvent::Aborted { id },
            };
            if tx.send(event).is_err() {
                tracing::debug!("search driver gone; dropping response");
            }
        });
    }
}
