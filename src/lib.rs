//! IPTV playlist viewer core: M3U parsing, channel browsing and streaming playback

pub mod browser;
pub mod config;
pub mod debounce;
pub mod error;
pub mod loader;
pub mod m3u_parser;
pub mod models;
pub mod player;

pub use browser::ChannelBrowser;
pub use config::AppConfig;
pub use error::{ConfigError, EngineError, FetchError, PlayerError, SinkError};
pub use loader::{LoadOutcome, PlaylistLoader, RequestId};
pub use m3u_parser::{fetch_playlist, group_by_category, parse_m3u, search, try_fetch_playlist, FetchOptions};
pub use models::{Channel, ChannelGroups};
