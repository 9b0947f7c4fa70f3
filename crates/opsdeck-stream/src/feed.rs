//! Live event feed: snapshot, then stream, with backoff-bounded
//! reconnects and a polling fallback.
//!
//! One spawned task owns the whole connection lifecycle, so buffer
//! mutations are serialized without locks. The view side observes a
//! [`FeedState`] through a watch channel and never sees a torn update.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use opsdeck_schema::{Event, EventFilter};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backoff::{reconnect_delay, ConnectionStatus};
use crate::buffer::{BoundedBuffer, DEFAULT_CAPACITY};
use crate::channel::Channel;
use crate::interval::Poller;
use crate::snapshot::ApiClient;

/// What the view layer sees, newest event first.
#[derive(Debug, Clone)]
pub struct FeedState {
    pub events: Vec<Event>,
    pub loading: bool,
    pub error: Option<String>,
    pub status: ConnectionStatus,
}

impl FeedState {
    fn initial() -> Self {
        Self {
            events: Vec::new(),
            loading: true,
            error: None,
            status: ConnectionStatus::Connected,
        }
    }
}

/// Call-time configuration for one feed.
#[derive(Debug, Clone)]
pub struct FeedOptions {
    /// Server-side filter applied to both snapshots and the stream.
    pub filter: EventFilter,
    /// Visible buffer capacity; also the snapshot page size.
    pub capacity: usize,
    /// Cadence of the fallback poller once the retry budget is spent.
    pub poll_interval: Duration,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            filter: EventFilter::default(),
            capacity: DEFAULT_CAPACITY,
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Handle to a running feed. Dropping it (or calling [`close`]) cancels the
/// connection task, any pending reconnect sleep, and the fallback poller.
///
/// [`close`]: EventFeed::close
pub struct EventFeed {
    state_rx: watch::Receiver<FeedState>,
    cancel: CancellationToken,
}

impl EventFeed {
    pub fn spawn(client: ApiClient, options: FeedOptions) -> Self {
        let (state_tx, state_rx) = watch::channel(FeedState::initial());
        let cancel = CancellationToken::new();

        tokio::spawn(run(client, options, Arc::new(state_tx), cancel.clone()));

        Self { state_rx, cancel }
    }

    /// Watch the feed's state. The receiver always holds the latest
    /// published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.state_rx.clone()
    }

    /// Current state, cloned.
    pub fn state(&self) -> FeedState {
        self.state_rx.borrow().clone()
    }

    /// Tear the feed down. Idempotent; safe to call after the task has
    /// already stopped.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for EventFeed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    client: ApiClient,
    options: FeedOptions,
    state_tx: Arc<watch::Sender<FeedState>>,
    cancel: CancellationToken,
) {
    let mut buffer = BoundedBuffer::new(options.capacity);
    let mut last_event_id: Option<String> = None;
    let mut attempts: u32 = 0;

    // Initial snapshot. A failure is surfaced as error text but does not
    // stop the feed; the stream open below may still succeed.
    let snapshot = tokio::select! {
        _ = cancel.cancelled() => return,
        res = client.fetch_events(&options.filter, options.capacity) => res,
    };
    match snapshot {
        Ok(events) => {
            last_event_id = events.first().map(|e| e.id.clone());
            buffer.replace(events);
            let visible = buffer.to_vec();
            state_tx.send_modify(|s| {
                s.events = visible;
                s.loading = false;
                s.error = None;
                s.status = ConnectionStatus::Connected;
            });
        }
        Err(e) => {
            warn!(error = %e, "initial snapshot failed");
            state_tx.send_modify(|s| {
                s.loading = false;
                s.error = Some(e.to_string());
            });
        }
    }

    // Streaming phase: one live channel at a time; the previous channel is
    // dropped before a reconnect opens the next.
    loop {
        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            res = Channel::open_events(&client, &options.filter, last_event_id.as_deref()) => res,
        };

        match opened {
            Ok(mut channel) => {
                // Open/ready signal: retry counter resets.
                attempts = 0;
                state_tx.send_modify(|s| {
                    s.status = ConnectionStatus::Connected;
                    s.error = None;
                });

                loop {
                    let msg = tokio::select! {
                        _ = cancel.cancelled() => return,
                        msg = channel.next() => msg,
                    };
                    match msg {
                        Some(Ok(push)) => {
                            let event: Event = match push.parse() {
                                Ok(event) => event,
                                Err(e) => {
                                    // Malformed payloads are dropped, never
                                    // escalated to the reconnection policy.
                                    warn!(error = %e, "dropping malformed event payload");
                                    continue;
                                }
                            };
                            last_event_id = Some(event.id.clone());
                            buffer.insert(event);
                            let visible = buffer.to_vec();
                            state_tx.send_modify(|s| s.events = visible);
                        }
                        Some(Err(e)) => {
                            // Closed and transport failures alike hand
                            // control to the reconnection policy.
                            warn!(error = %e, "push channel failed");
                            break;
                        }
                        None => break,
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "push channel open failed");
            }
        }

        attempts += 1;
        match reconnect_delay(attempts) {
            Some(delay) => {
                debug!(attempt = attempts, ?delay, "scheduling reconnect");
                state_tx.send_modify(|s| s.status = ConnectionStatus::Reconnecting);
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => break,
        }
    }

    // Retry budget spent: degrade to polling for the rest of this feed's
    // life. Each tick replaces the visible list wholesale.
    warn!("retry budget exhausted, degrading to polling");
    state_tx.send_modify(|s| s.status = ConnectionStatus::Polling);

    let poller = Poller::spawn();
    let poll_buffer = Arc::new(Mutex::new(buffer));
    let tx = state_tx.clone();
    let filter = options.filter.clone();
    let capacity = options.capacity;
    poller.schedule(
        move || {
            let client = client.clone();
            let filter = filter.clone();
            let poll_buffer = poll_buffer.clone();
            let tx = tx.clone();
            async move {
                poll_once(&client, &filter, capacity, &poll_buffer, &tx).await;
            }
        },
        Some(options.poll_interval),
    );

    cancel.cancelled().await;
    poller.cancel();
}

async fn poll_once(
    client: &ApiClient,
    filter: &EventFilter,
    capacity: usize,
    buffer: &Mutex<BoundedBuffer<Event>>,
    state_tx: &watch::Sender<FeedState>,
) {
    match client.fetch_events(filter, capacity).await {
        Ok(events) => {
            let visible = {
                let mut buf = buffer.lock().unwrap_or_else(|e| e.into_inner());
                buf.replace(events);
                buf.to_vec()
            };
            state_tx.send_modify(|s| {
                s.events = visible;
                s.error = None;
            });
        }
        Err(e) => {
            // Keep the last-known-good list visible alongside the error.
            warn!(error = %e, "poll fetch failed");
            state_tx.send_modify(|s| s.error = Some(e.to_string()));
        }
    }
}
