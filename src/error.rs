//! Error types

use thiserror::Error;

/// Playlist retrieval failure
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] ureq::Error),

    #[error("HTTP error: {0}")]
    Status(u16),

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejection reported by a media sink
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The sink refused the request (autoplay policy, codec, permissions)
    #[error("sink rejected request: {0}")]
    Rejected(String),

    /// The host cannot perform the request at all
    #[error("not supported by this sink: {0}")]
    Unsupported(&'static str),
}

/// Segment engine failure
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid stream locator: {0}")]
    InvalidLocator(#[from] url::ParseError),

    #[error("no source loaded")]
    NoSource,

    #[error("engine already destroyed")]
    Destroyed,

    #[error("failed to start segment worker: {0}")]
    Worker(#[from] std::io::Error),

    #[error("segment request failed: {0}")]
    Http(#[from] ureq::Error),

    #[error("HTTP error: {0}")]
    Status(u16),

    #[error("invalid manifest: {0}")]
    Manifest(String),
}

/// Playback session failure
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("session is detached")]
    Detached,

    #[error("no playback path for manifest {0}")]
    UnsupportedSource(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Configuration persistence failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}
