//! Error types for tracklet

use thiserror::Error;

/// Errors that can occur while connecting to or talking with the collector.
///
/// Degradations the capture pipeline absorbs silently (unclassifiable
/// environments, failed geolocation lookups, per-event derivation faults)
/// are modeled as absence, not as errors.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("WebSocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Connection closed by collector")]
    ConnectionClosed,
}
