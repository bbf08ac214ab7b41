//! Client-side adaptive streaming engine
//!
//! The engine resolves an HLS manifest, follows the media playlist and
//! downloads segments on a dedicated worker thread. Segments reach the sink
//! through a bounded channel, so a slow sink throttles the download.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use m3u8_rs::{MediaPlaylist, Playlist};
use tracing::{debug, info, warn};
use url::Url;

use super::hls::{
    parse_manifest, pending_segments, reload_interval, select_variant, sequence_restarted,
    start_index,
};
use super::sink::{Segment, SegmentFeed};
use crate::error::EngineError;

/// Master playlists nested deeper than this are rejected
const MAX_MANIFEST_DEPTH: usize = 5;
const MAX_SEGMENT_BYTES: u64 = 64 * 1024 * 1024;
const MAX_BACKOFF_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Join live streams at the edge and reload playlists more eagerly
    pub low_latency: bool,
    /// Segments buffered between the worker and the sink
    pub buffer_segments: usize,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            low_latency: true,
            buffer_segments: 4,
            request_timeout: Duration::from_secs(10),
            user_agent: crate::config::DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// A segment-fetching engine bound to one source
pub trait StreamEngine {
    fn load_source(&mut self, locator: &str) -> Result<(), EngineError>;

    /// Start retrieval and return the feed the sink should consume
    fn attach_media(&mut self) -> Result<SegmentFeed, EngineError>;

    /// Stop retrieval and release resources. Idempotent.
    ///
    /// A request already in flight may finish after this returns; its
    /// segment is only delivered if the feed is still held. Sinks drop the
    /// feed on [`MediaSink::detach`](super::sink::MediaSink::detach), so
    /// nothing reaches a later session.
    fn destroy(&mut self);
}

/// Creates engines when the host supports client-side demuxing
pub trait EngineFactory {
    fn is_supported(&self) -> bool;

    fn create(&self, config: EngineConfig) -> Box<dyn StreamEngine>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HlsEngineFactory;

impl EngineFactory for HlsEngineFactory {
    fn is_supported(&self) -> bool {
        true
    }

    fn create(&self, config: EngineConfig) -> Box<dyn StreamEngine> {
        Box::new(HlsEngine::new(config))
    }
}

/// HLS engine downloading segments on a worker thread
pub struct HlsEngine {
    config: EngineConfig,
    source: Option<Url>,
    stop_flag: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    destroyed: bool,
}

impl HlsEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            source: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: None,
            destroyed: false,
        }
    }

    fn stop_worker(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        // The worker exits at its next stop check or failed send; not joined
        self.worker = None;
    }
}

impl StreamEngine for HlsEngine {
    fn load_source(&mut self, locator: &str) -> Result<(), EngineError> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        self.source = Some(Url::parse(locator)?);
        Ok(())
    }

    fn attach_media(&mut self) -> Result<SegmentFeed, EngineError> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        let source = self.source.clone().ok_or(EngineError::NoSource)?;
        if self.worker.is_some() {
            self.stop_worker();
        }

        let (sender, receiver) = sync_channel(self.config.buffer_segments.max(1));
        let stop_flag = Arc::new(AtomicBool::new(false));
        self.stop_flag = Arc::clone(&stop_flag);

        let config = self.config.clone();
        let handle = thread::Builder::new()
            .name("hls-worker".to_string())
            .spawn(move || segment_worker(source, config, sender, stop_flag))?;
        self.worker = Some(handle);
        Ok(receiver)
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.stop_worker();
        self.source = None;
        self.destroyed = true;
        debug!("HLS engine destroyed");
    }
}

impl Drop for HlsEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn segment_worker(
    source: Url,
    config: EngineConfig,
    sender: SyncSender<Segment>,
    stop_flag: Arc<AtomicBool>,
) {
    let agent = ureq::Agent::config_builder()
        .timeout_global(Some(config.request_timeout))
        .build()
        .new_agent();

    let media_url = match resolve_media_url(&agent, &config, source.clone(), MAX_MANIFEST_DEPTH) {
        Ok(url) => url,
        Err(e) => {
            warn!(url = %source, error = %e, "Failed to resolve HLS manifest");
            return;
        }
    };
    info!(url = %media_url, "Following media playlist");

    let mut last_sequence: Option<u64> = None;
    let mut failures: u32 = 0;

    loop {
        if stop_flag.load(Ordering::SeqCst) {
            return;
        }

        let playlist = match fetch_media_playlist(&agent, &config, &media_url) {
            Ok(playlist) => playlist,
            Err(e) => {
                failures += 1;
                debug!(url = %media_url, error = %e, failures, "Playlist reload failed");
                if !sleep_unless_stopped(backoff(failures), &stop_flag) {
                    return;
                }
                continue;
            }
        };
        failures = 0;

        if let Some(last) = last_sequence {
            if sequence_restarted(&playlist, last) {
                debug!(
                    url = %media_url,
                    last,
                    media_sequence = playlist.media_sequence,
                    "Media sequence went backwards, rejoining"
                );
                last_sequence = None;
            }
        }

        let is_live = !playlist.end_list;
        let start = start_index(playlist.segments.len(), is_live, config.low_latency);
        let pending = match pending_segments(&playlist, &media_url, last_sequence, start) {
            Ok(pending) => pending,
            Err(e) => {
                warn!(url = %media_url, error = %e, "Bad segment URI in playlist");
                return;
            }
        };
        let changed = !pending.is_empty();

        for segment in pending {
            if stop_flag.load(Ordering::SeqCst) {
                return;
            }
            match fetch_bytes(&agent, &config, &segment.url) {
                Ok(data) => {
                    let segment = Segment {
                        sequence: segment.sequence,
                        duration: segment.duration,
                        uri: segment.url.to_string(),
                        data,
                    };
                    if sender.send(segment).is_err() {
                        // Sink dropped the feed
                        return;
                    }
                }
                Err(e) => {
                    // Live content is time-sensitive; skip rather than retry
                    debug!(url = %segment.url, error = %e, "Skipping segment");
                }
            }
            last_sequence = Some(segment.sequence);
        }

        if !is_live {
            info!(url = %media_url, "Reached end of playlist");
            return;
        }

        let wait = reload_interval(playlist.target_duration as f64, changed, config.low_latency);
        if !sleep_unless_stopped(wait, &stop_flag) {
            return;
        }
    }
}

fn resolve_media_url(
    agent: &ureq::Agent,
    config: &EngineConfig,
    url: Url,
    depth: usize,
) -> Result<Url, EngineError> {
    if depth == 0 {
        return Err(EngineError::Manifest("playlist nesting too deep".to_string()));
    }
    let bytes = fetch_bytes(agent, config, &url)?;
    match parse_manifest(&bytes)? {
        Playlist::MasterPlaylist(master) => {
            let variant = select_variant(&master)
                .ok_or_else(|| EngineError::Manifest("no variants in master playlist".to_string()))?;
            let next = url.join(&variant.uri)?;
            debug!(bandwidth = variant.bandwidth, url = %next, "Selected variant");
            resolve_media_url(agent, config, next, depth - 1)
        }
        Playlist::MediaPlaylist(_) => Ok(url),
    }
}

fn fetch_media_playlist(
    agent: &ureq::Agent,
    config: &EngineConfig,
    url: &Url,
) -> Result<MediaPlaylist, EngineError> {
    match parse_manifest(&fetch_bytes(agent, config, url)?)? {
        Playlist::MediaPlaylist(playlist) => Ok(playlist),
        Playlist::MasterPlaylist(_) => {
            Err(EngineError::Manifest("expected media playlist".to_string()))
        }
    }
}

fn fetch_bytes(agent: &ureq::Agent, config: &EngineConfig, url: &Url) -> Result<Vec<u8>, EngineError> {
    let mut response = agent
        .get(url.as_str())
        .header("User-Agent", &config.user_agent)
        .call()
        .map_err(|e| match e {
            ureq::Error::StatusCode(code) => EngineError::Status(code),
            other => EngineError::Http(other),
        })?;
    Ok(response
        .body_mut()
        .with_config()
        .limit(MAX_SEGMENT_BYTES)
        .read_to_vec()?)
}

fn backoff(failures: u32) -> Duration {
    let secs = 1u64 << failures.saturating_sub(1).min(5);
    Duration::from_secs(secs.min(MAX_BACKOFF_SECS))
}

/// Sleep in short slices; false if stopped meanwhile
fn sleep_unless_stopped(duration: Duration, stop_flag: &AtomicBool) -> bool {
    let slice = Duration::from_millis(100);
    let mut remaining = duration;
    while !remaining.is_zero() {
        if stop_flag.load(Ordering::SeqCst) {
            return false;
        }
        let step = remaining.min(slice);
        thread::sleep(step);
        remaining -= step;
    }
    !stop_flag.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::RecvTimeoutError;

    const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=100000
lo/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=500000
hi/index.m3u8
";

    fn live_playlist(first: u64) -> String {
        let mut text = format!(
            "#EXTM3U\n#EXT-X-TARGETDURATION:1\n#EXT-X-MEDIA-SEQUENCE:{}\n",
            first
        );
        for seq in first..first + 3 {
            text.push_str(&format!("#EXTINF:1.0,\nseg{}.ts\n", seq));
        }
        text
    }

    /// Answer loopback HTTP requests by path; `None` becomes a 404
    fn serve<F>(route: F) -> String
    where
        F: Fn(&str) -> Option<Vec<u8>> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let text = String::from_utf8_lossy(&request);
                let path = text.split_whitespace().nth(1).unwrap_or("/").to_string();
                let (status, body) = match route(&path) {
                    Some(body) => ("200 OK", body),
                    None => ("404 Not Found", Vec::new()),
                };
                let header = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = stream.write_all(header.as_bytes());
                let _ = stream.write_all(&body);
            }
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_worker_follows_live_playlist() {
        let media_fetches = Arc::new(AtomicUsize::new(0));
        let fetches = Arc::clone(&media_fetches);
        let base = serve(move |path| match path {
            "/master.m3u8" => Some(MASTER.as_bytes().to_vec()),
            "/hi/index.m3u8" => {
                // Variant resolution and first reload see 10..=12, later reloads 11..=13
                let n = fetches.fetch_add(1, Ordering::SeqCst);
                let first = if n < 2 { 10 } else { 11 };
                Some(live_playlist(first).into_bytes())
            }
            _ => path
                .strip_prefix("/hi/seg")
                .and_then(|rest| rest.strip_suffix(".ts"))
                .map(|seq| format!("segment-{}", seq).into_bytes()),
        });

        let mut engine = HlsEngine::new(EngineConfig {
            low_latency: true,
            request_timeout: Duration::from_secs(2),
            ..EngineConfig::default()
        });
        engine.load_source(&format!("{}/master.m3u8", base)).unwrap();
        let feed = engine.attach_media().unwrap();

        // Joins one segment behind the live edge
        let first = feed.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.sequence, 12);
        assert_eq!(first.data, b"segment-12");
        assert_eq!(first.uri, format!("{}/hi/seg12.ts", base));
        assert_eq!(first.duration, 1.0);

        // Reload delivers only the new sequence
        let second = feed.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(second.sequence, 13);
        assert_eq!(second.data, b"segment-13");

        engine.destroy();
        assert!(matches!(
            feed.recv_timeout(Duration::from_secs(5)),
            Err(RecvTimeoutError::Disconnected)
        ));
        assert!(media_fetches.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(2), Duration::from_secs(2));
        assert_eq!(backoff(4), Duration::from_secs(8));
        assert_eq!(backoff(20), Duration::from_secs(MAX_BACKOFF_SECS));
    }

    #[test]
    fn test_attach_requires_source() {
        let mut engine = HlsEngine::new(EngineConfig::default());
        assert!(matches!(engine.attach_media(), Err(EngineError::NoSource)));
    }

    #[test]
    fn test_invalid_locator_is_rejected() {
        let mut engine = HlsEngine::new(EngineConfig::default());
        assert!(matches!(
            engine.load_source("not a url"),
            Err(EngineError::InvalidLocator(_))
        ));
    }

    #[test]
    fn test_destroyed_engine_refuses_work() {
        let mut engine = HlsEngine::new(EngineConfig::default());
        engine.load_source("http://127.0.0.1:9/live.m3u8").unwrap();
        engine.destroy();
        engine.destroy();
        assert!(matches!(engine.attach_media(), Err(EngineError::Destroyed)));
        assert!(matches!(
            engine.load_source("http://127.0.0.1:9/live.m3u8"),
            Err(EngineError::Destroyed)
        ));
    }

    #[test]
    fn test_stop_interrupts_sleep() {
        let flag = AtomicBool::new(true);
        assert!(!sleep_unless_stopped(Duration::from_secs(60), &flag));
    }
}
