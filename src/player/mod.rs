//! Streaming playback: session state machine, HLS engine and sinks

pub mod controls;
pub mod engine;
pub mod external;
pub mod hls;
pub mod presentation;
pub mod session;
pub mod sink;

pub use controls::Controls;
pub use engine::{EngineConfig, EngineFactory, HlsEngine, HlsEngineFactory, StreamEngine};
pub use external::{ExternalPlayerConfig, ExternalPlayerSink};
pub use presentation::Presentation;
pub use session::{classify_locator, format_time, PlaybackSession, PlayerConfig, PlayerState, Route};
pub use sink::{MediaSink, Segment, SegmentFeed, SinkEvent, HLS_MIME};
