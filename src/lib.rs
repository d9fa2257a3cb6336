//! Tracklet - Embeddable behavioral telemetry collector for web sessions
//!
//! Tracklet fingerprints a visitor session, captures interaction events
//! (clicks, scrolling, resizing, text input), coalesces the noisy classes
//! through a settle-after-quiet-period debounce, and streams batches to a
//! remote collector over a persistent WebSocket connection.
//!
//! ## Pipeline
//!
//! - **Probes**: pure readers deriving session facts from an injected
//!   environment snapshot
//! - **Capture**: the event batcher, owning the queue and the per-class
//!   debounce state machines
//! - **Transport**: the session handshake and batch relay, with pre-session
//!   batches buffered in order
//!
//! The host feeds raw [`Interaction`] values through a [`CollectorHandle`];
//! no browser globals are touched, so the whole pipeline runs headless.

pub mod batcher;
pub mod collector;
pub mod element;
pub mod error;
pub mod event;
pub mod geo;
pub mod identity;
pub mod probe;
pub mod transport;
pub mod types;

pub use batcher::{Debouncer, EventBatcher, EventQueue, DEFAULT_DEBOUNCE_WINDOW};
pub use collector::{
    Collector, CollectorConfig, CollectorHandle, DEFAULT_COLLECTOR_URL, DEFAULT_FLUSH_INTERVAL,
};
pub use element::{identify, DomNode, ElementDescriptor};
pub use error::TrackError;
pub use event::{mask_value, EventPayload, InputField, Interaction, TrackEvent};
pub use geo::{LocationResolver, DEFAULT_GEO_ENDPOINT};
pub use identity::{FileIdentityStore, IdentityStore, MemoryIdentityStore};
pub use transport::{ClientMessage, ServerMessage, SessionTransport, TransportState};
pub use types::{EnvironmentSnapshot, Session};

/// Client version reported alongside the crate
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Client name for diagnostics
pub const CLIENT_NAME: &str = "tracklet";
