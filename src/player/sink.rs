//! Host media sink capability

use std::sync::mpsc::Receiver;

use crate::error::SinkError;

/// MIME type a sink reports when it can play HLS manifests itself
pub const HLS_MIME: &str = "application/vnd.apple.mpegurl";

/// One downloaded media segment
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub sequence: u64,
    /// Seconds of media in this segment
    pub duration: f64,
    pub uri: String,
    pub data: Vec<u8>,
}

/// Segments delivered by an engine, in playback order
pub type SegmentFeed = Receiver<Segment>;

/// Notifications a sink raises about its own state
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    /// Playback actually started
    Playing,
    Paused,
    TimeUpdate(f64),
    /// Media metadata resolved; duration is `None` for live streams
    MetadataLoaded { duration: Option<f64> },
    /// Fullscreen ended outside the player's control (e.g. Escape key)
    FullscreenExited,
    Ended,
}

/// Everything the playback session needs from its host.
///
/// How this is realized (native element, embedded player, external
/// process) is up to the host; the session only talks to this trait.
pub trait MediaSink {
    /// Bind a locator the sink resolves itself
    fn attach(&mut self, locator: &str);

    /// Bind a segment feed produced by a client-side engine
    fn attach_engine(&mut self, feed: SegmentFeed);

    /// Drop whatever source is bound, including any engine feed
    fn detach(&mut self);

    fn play(&mut self) -> Result<(), SinkError>;

    fn pause(&mut self);

    fn set_position(&mut self, seconds: f64);

    fn set_volume(&mut self, level: f32);

    fn position(&self) -> f64;

    fn duration(&self) -> Option<f64>;

    fn volume(&self) -> f32;

    /// Whether the sink can natively play this MIME type
    fn can_play_type(&self, mime: &str) -> bool;

    fn request_fullscreen(&mut self) -> Result<(), SinkError> {
        Err(SinkError::Unsupported("fullscreen"))
    }

    fn exit_fullscreen(&mut self) -> Result<(), SinkError> {
        Err(SinkError::Unsupported("fullscreen"))
    }

    /// Width of the host viewport in logical pixels
    fn viewport_width(&self) -> u32;

    /// Drain pending notifications
    fn poll_events(&mut self) -> Vec<SinkEvent> {
        Vec::new()
    }
}
