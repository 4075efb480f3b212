//! One stream of typed console updates, whichever transport delivered them.
//!
//! The websocket is the primary transport. Polling covers the gaps: a poll
//! tick only hits the backend when the socket is not open or has been quiet
//! for a whole polling interval.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::api::events::{ConnectionState, IncomingEvent, RealtimeClient, RealtimeConfig, RealtimeHandle};
use crate::api::models::{Batch, BatchStatus, DashboardStats};
use crate::api::queries::{Fetch, Queries};
use crate::app::Settings;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleEvent {
    Connection(ConnectionState),
    StatsUpdated(DashboardStats),
    BatchesUpdated(Vec<Batch>),
    /// A batch changed status or progress since the previous snapshot.
    BatchChanged { batch_id: String, status: BatchStatus },
    JobChanged { job_id: Option<String>, batch_id: Option<String> },
    Other(IncomingEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Websocket,
    Polling,
}

/// What a pushed event asks the feed to refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Stats,
    Batch(Option<String>),
    Job { job_id: Option<String>, batch_id: Option<String> },
    Unknown,
}

pub fn classify(event: &IncomingEvent) -> Classified {
    let kind = event.event_type.to_ascii_lowercase().replace('.', "_");
    let field = |k: &str| event.data.get(k).and_then(|v| v.as_str()).map(str::to_string);
    if kind.contains("stats") || kind.contains("dashboard") {
        Classified::Stats
    } else if kind.starts_with("batch") {
        Classified::Batch(field("batch_id").or_else(|| field("id")))
    } else if kind.starts_with("job") || kind.starts_with("call") {
        Classified::Job {
            job_id: field("job_id").or_else(|| field("id")),
            batch_id: field("batch_id"),
        }
    } else {
        Classified::Unknown
    }
}

type Snapshot = HashMap<String, (BatchStatus, u64, u64)>;

/// Compares two batch lists and reports batches whose status or counters moved.
pub fn diff_batches(previous: &Snapshot, current: &[Batch]) -> Vec<ConsoleEvent> {
    current
        .iter()
        .filter(|b| {
            previous.get(&b.id).is_none_or(|(status, done, failed)| {
                *status != b.status || *done != b.stats.completed || *failed != b.stats.failed
            })
        })
        .map(|b| ConsoleEvent::BatchChanged {
            batch_id: b.id.clone(),
            status: b.status.clone(),
        })
        .collect()
}

fn snapshot(batches: &[Batch]) -> Snapshot {
    batches
        .iter()
        .map(|b| (b.id.clone(), (b.status.clone(), b.stats.completed, b.stats.failed)))
        .collect()
}

pub struct UpdateFeed {
    pub events: mpsc::Receiver<ConsoleEvent>,
    pub transport: watch::Receiver<Transport>,
    shutdown: Arc<watch::Sender<bool>>,
}

/// Stops a feed from outside the task that is reading it.
#[derive(Clone)]
pub struct FeedStopper(Arc<watch::Sender<bool>>);

impl FeedStopper {
    pub fn stop(&self) {
        let _ = self.0.send(true);
    }
}

impl UpdateFeed {
    pub async fn recv(&mut self) -> Option<ConsoleEvent> {
        self.events.recv().await
    }

    pub fn stopper(&self) -> FeedStopper {
        FeedStopper(self.shutdown.clone())
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for UpdateFeed {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Starts the feed on `rt`. Without a realtime config only polling runs.
pub fn start(
    rt: &tokio::runtime::Handle,
    queries: Queries,
    settings: &Settings,
    realtime: Option<RealtimeConfig>,
) -> UpdateFeed {
    let (tx, events) = mpsc::channel(64);
    let (transport_tx, transport) = watch::channel(Transport::Polling);
    let (shutdown, shutdown_rx) = watch::channel(false);
    let intervals = (
        Duration::from_secs(settings.dashboard_poll_secs.max(1)),
        Duration::from_secs(settings.batch_poll_secs.max(1)),
    );
    let rt_for_ws = rt.clone();
    rt.spawn(async move {
        let ws = realtime.map(|cfg| RealtimeClient::spawn_on(&rt_for_ws, cfg));
        feed_loop(queries, ws, intervals, tx, transport_tx, shutdown_rx).await;
    });
    UpdateFeed {
        events,
        transport,
        shutdown: Arc::new(shutdown),
    }
}

enum WsSignal {
    /// `None` once the connection task has ended.
    State(Option<ConnectionState>),
    Event(Option<IncomingEvent>),
}

async fn next_ws_signal(h: &mut RealtimeHandle) -> WsSignal {
    let changed = tokio::select! {
        changed = h.state.changed() => changed.is_ok(),
        ev = h.events.recv() => return WsSignal::Event(ev),
    };
    if changed {
        WsSignal::State(Some(h.state.borrow().clone()))
    } else {
        WsSignal::State(None)
    }
}

async fn feed_loop(
    queries: Queries,
    mut ws: Option<RealtimeHandle>,
    (stats_every, batches_every): (Duration, Duration),
    tx: mpsc::Sender<ConsoleEvent>,
    transport_tx: watch::Sender<Transport>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut stats_tick = tokio::time::interval(stats_every);
    let mut batch_tick = tokio::time::interval(batches_every);
    stats_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    batch_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_push = Instant::now();
    let mut ws_open = false;
    let mut batches_seen = Snapshot::new();
    let mut first_batches = true;

    loop {
        let should_poll = |every: Duration, open: bool, last: Instant| !open || last.elapsed() >= every;
        let mut refresh_stats = false;
        let mut refresh_batches = false;

        tokio::select! {
            _ = shutdown.changed() => return,
            _ = stats_tick.tick() => refresh_stats = should_poll(stats_every, ws_open, last_push),
            _ = batch_tick.tick() => refresh_batches = should_poll(batches_every, ws_open, last_push),
            signal = async {
                match ws.as_mut() {
                    Some(h) => next_ws_signal(h).await,
                    None => std::future::pending().await,
                }
            } => match signal {
                WsSignal::State(Some(state)) => {
                    ws_open = state.is_open();
                    transport_tx.send_replace(if ws_open { Transport::Websocket } else { Transport::Polling });
                    if tx.send(ConsoleEvent::Connection(state)).await.is_err() {
                        return;
                    }
                }
                WsSignal::State(None) | WsSignal::Event(None) => {
                    ws = None;
                    ws_open = false;
                    transport_tx.send_replace(Transport::Polling);
                }
                WsSignal::Event(Some(event)) => {
                    last_push = Instant::now();
                    match classify(&event) {
                        Classified::Stats => refresh_stats = true,
                        Classified::Batch(_) => refresh_batches = true,
                        Classified::Job { job_id, batch_id } => {
                            refresh_batches = true;
                            if tx.send(ConsoleEvent::JobChanged { job_id, batch_id }).await.is_err() {
                                return;
                            }
                        }
                        Classified::Unknown => {
                            if tx.send(ConsoleEvent::Other(event)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            },
        }

        if refresh_stats {
            match queries.dashboard_stats(Fetch::Network).await {
                Ok(stats) => {
                    if tx.send(ConsoleEvent::StatsUpdated(stats)).await.is_err() {
                        return;
                    }
                }
                Err(e) => log::warn!("dashboard refresh failed: {e}"),
            }
        }
        if refresh_batches {
            match queries.batches(None, Fetch::Network).await {
                Ok(batches) => {
                    let changes = if first_batches { Vec::new() } else { diff_batches(&batches_seen, &batches) };
                    first_batches = false;
                    batches_seen = snapshot(&batches);
                    for change in changes {
                        if tx.send(change).await.is_err() {
                            return;
                        }
                    }
                    if tx.send(ConsoleEvent::BatchesUpdated(batches)).await.is_err() {
                        return;
                    }
                }
                Err(e) => log::warn!("batch refresh failed: {e}"),
            }
        }
    }
}
