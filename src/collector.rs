//! Collector orchestration
//!
//! Wires the whole pipeline: dial the collector, compose the session record
//! (probes + persisted identity + one-shot geolocation), perform the
//! handshake, then run a single event loop multiplexing the interaction
//! feed, debounce deadlines, the fixed flush cadence and inbound collector
//! frames. All interleaving happens at await points; the queue mutex keeps
//! appends atomic with respect to flush drains.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::Notify;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

use crate::batcher::{EventBatcher, DEFAULT_DEBOUNCE_WINDOW};
use crate::error::TrackError;
use crate::event::{InputField, Interaction};
use crate::geo::{LocationResolver, DEFAULT_GEO_ENDPOINT};
use crate::identity::IdentityStore;
use crate::transport::{ServerMessage, TransportState, WsTransport};
use crate::types::{EnvironmentSnapshot, Session};

/// Default collector endpoint
pub const DEFAULT_COLLECTOR_URL: &str = "ws://localhost:4100/collect";

/// Cadence of the periodic batch flush
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Collector wiring knobs
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub collector_url: String,
    /// Geolocation endpoint; `None` skips the lookup entirely
    pub geo_endpoint: Option<String>,
    pub debounce_window: Duration,
    pub flush_interval: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            collector_url: DEFAULT_COLLECTOR_URL.to_string(),
            geo_endpoint: Some(DEFAULT_GEO_ENDPOINT.to_string()),
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

/// State shared between the run loop and the host-facing handle
struct Shared {
    batcher: EventBatcher,
    /// Wakes the loop after a record or a close, so fresh debounce deadlines
    /// are picked up without waiting for the next flush tick
    bell: Notify,
    closed: AtomicBool,
}

/// Host-facing handle feeding raw interactions into the pipeline.
///
/// Immediate event classes are appended synchronously inside `record`.
/// Dropping (or closing) the handle is the page-unload analog: the run loop
/// stops scheduling without a final flush, and whatever was queued is lost
/// with it.
pub struct CollectorHandle {
    shared: Arc<Shared>,
}

impl CollectorHandle {
    /// Record one raw occurrence; never blocks, never fails
    pub fn record(&self, interaction: Interaction) {
        self.shared.batcher.record(interaction);
        self.shared.bell.notify_one();
    }

    /// Stop the run loop; further scheduling ceases
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.bell.notify_one();
    }
}

impl Drop for CollectorHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// The capture pipeline, one instance per page load.
pub struct Collector {
    config: CollectorConfig,
    env: EnvironmentSnapshot,
    identity: Arc<dyn IdentityStore>,
    shared: Arc<Shared>,
}

impl Collector {
    /// Assemble the pipeline over the fields present at load time.
    pub fn new(
        config: CollectorConfig,
        env: EnvironmentSnapshot,
        identity: Arc<dyn IdentityStore>,
        fields: Vec<InputField>,
    ) -> (Self, CollectorHandle) {
        let shared = Arc::new(Shared {
            batcher: EventBatcher::new(config.debounce_window, fields),
            bell: Notify::new(),
            closed: AtomicBool::new(false),
        });

        let collector = Self {
            config,
            env,
            identity,
            shared: Arc::clone(&shared),
        };

        (collector, CollectorHandle { shared })
    }

    /// Connect, handshake and relay until the handle is closed (`Ok`) or the
    /// connection drops (`Err(ConnectionClosed)`).
    ///
    /// There is no application-level reconnection: a dropped connection ends
    /// the run, and any batch in flight is lost. Reconnection policy belongs
    /// to the embedder.
    pub async fn run(self) -> Result<(), TrackError> {
        let (mut transport, mut frames) =
            WsTransport::connect(&self.config.collector_url).await?;

        // Session facts are gathered once, after connect; a failed lookup
        // only means fewer fields.
        let geo = match &self.config.geo_endpoint {
            Some(endpoint) => LocationResolver::new(endpoint.clone()).resolve().await,
            None => None,
        };
        let session = Session::compose(&self.env, self.identity.get(), geo);
        transport.start_session(&session).await?;

        let mut flush = interval_at(
            Instant::now() + self.config.flush_interval,
            self.config.flush_interval,
        );
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.shared.closed.load(Ordering::SeqCst) {
                tracing::debug!("handle closed, capture stopped");
                break;
            }

            let deadline = self.shared.batcher.next_deadline();

            tokio::select! {
                _ = flush.tick() => {
                    if let Some(events) = self.shared.batcher.drain_nonempty() {
                        tracing::debug!(count = events.len(), "flushing batch");
                        transport.submit(events).await?;
                    }
                }
                () = debounce_gate(deadline) => {
                    self.shared.batcher.fire_due(Instant::now());
                }
                () = self.shared.bell.notified() => {
                    // Re-evaluate deadlines and the closed flag
                }
                frame = frames.next() => match frame {
                    Some(Ok(message)) => {
                        if let Some(ServerMessage::SessionCreated { identifier }) =
                            transport.accept_frame(message).await?
                        {
                            self.identity.set(&identifier);
                        }
                        if transport.state() == TransportState::Disconnected {
                            tracing::warn!("collector closed the connection");
                            return Err(TrackError::ConnectionClosed);
                        }
                    }
                    Some(Err(error)) => return Err(error.into()),
                    None => {
                        tracing::warn!("collector connection lost");
                        return Err(TrackError::ConnectionClosed);
                    }
                }
            }
        }

        Ok(())
    }
}

/// Sleep until the earliest debounce deadline; park forever when idle (the
/// other loop arms wake us).
async fn debounce_gate(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
