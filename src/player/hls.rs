//! HLS manifest helpers used by the segment engine

use std::time::Duration;

use m3u8_rs::{MasterPlaylist, MediaPlaylist, Playlist, VariantStream};
use url::Url;

use crate::error::EngineError;

/// Segments kept behind the live edge when joining a live stream
const LIVE_EDGE_SEGMENTS: usize = 3;
const LOW_LATENCY_EDGE_SEGMENTS: usize = 1;

/// Shortest wait between playlist reloads
const MIN_RELOAD: Duration = Duration::from_millis(500);

/// Target durations above this are treated as this
const MAX_TARGET_SECS: f64 = 60.0;

/// Whether a locator's path names an HLS manifest
pub fn is_manifest_locator(locator: &str) -> bool {
    match Url::parse(locator) {
        Ok(url) => url.path().to_ascii_lowercase().ends_with(".m3u8"),
        Err(_) => locator.to_ascii_lowercase().contains(".m3u8"),
    }
}

pub fn parse_manifest(bytes: &[u8]) -> Result<Playlist, EngineError> {
    m3u8_rs::parse_playlist_res(bytes).map_err(|e| EngineError::Manifest(format!("{:?}", e)))
}

/// Highest-bandwidth playable variant
pub fn select_variant(master: &MasterPlaylist) -> Option<&VariantStream> {
    master
        .variants
        .iter()
        .filter(|v| !v.is_i_frame)
        .max_by_key(|v| v.bandwidth)
}

/// Index of the first segment to download on the initial playlist fetch
pub fn start_index(segment_count: usize, is_live: bool, low_latency: bool) -> usize {
    if !is_live {
        return 0;
    }
    let back = if low_latency { LOW_LATENCY_EDGE_SEGMENTS } else { LIVE_EDGE_SEGMENTS };
    segment_count.saturating_sub(back)
}

/// Wait before the next media playlist reload (RFC 8216 6.3.4)
pub fn reload_interval(target_duration: f64, changed: bool, low_latency: bool) -> Duration {
    let target = if target_duration.is_finite() {
        target_duration.clamp(1.0, MAX_TARGET_SECS)
    } else {
        MAX_TARGET_SECS
    };
    let secs = if changed && !low_latency { target } else { target / 2.0 };
    Duration::from_secs_f64(secs).max(MIN_RELOAD)
}

/// Segment still to be downloaded
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRef {
    pub sequence: u64,
    pub duration: f64,
    pub url: Url,
}

/// Segments newer than `last_sequence`, or from `start` on the first fetch
pub fn pending_segments(
    playlist: &MediaPlaylist,
    base: &Url,
    last_sequence: Option<u64>,
    start: usize,
) -> Result<Vec<SegmentRef>, EngineError> {
    let mut pending = Vec::new();
    for (idx, segment) in playlist.segments.iter().enumerate() {
        let Some(sequence) = playlist.media_sequence.checked_add(idx as u64) else {
            break;
        };
        let wanted = match last_sequence {
            Some(last) => sequence > last,
            None => idx >= start,
        };
        if !wanted || segment.uri.trim().is_empty() {
            continue;
        }
        pending.push(SegmentRef {
            sequence,
            duration: segment.duration as f64,
            url: base.join(segment.uri.trim())?,
        });
    }
    Ok(pending)
}

/// Whether the playlist now ends before the last delivered sequence,
/// as happens when a live stream restarts its numbering
pub fn sequence_restarted(playlist: &MediaPlaylist, last_sequence: u64) -> bool {
    playlist
        .media_sequence
        .saturating_add(playlist.segments.len() as u64)
        <= last_sequence
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=1280x720
mid/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=1200000,RESOLUTION=854x480
https://cdn.example.com/alt/index.m3u8
";

    const LIVE: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:100
#EXTINF:6.0,
seg100.ts
#EXTINF:6.0,
seg101.ts
#EXTINF:6.0,
seg102.ts
#EXTINF:6.0,
seg103.ts
#EXTINF:6.0,
seg104.ts
";

    fn media(text: &str) -> MediaPlaylist {
        match parse_manifest(text.as_bytes()).unwrap() {
            Playlist::MediaPlaylist(pl) => pl,
            Playlist::MasterPlaylist(_) => panic!("expected media playlist"),
        }
    }

    #[test]
    fn test_manifest_locator_detection() {
        assert!(is_manifest_locator("https://example.com/live/index.m3u8"));
        assert!(is_manifest_locator("https://example.com/live/INDEX.M3U8?token=abc"));
        assert!(!is_manifest_locator("https://example.com/movie.mp4"));
        assert!(!is_manifest_locator("https://example.com/watch?file=a.m3u8"));
        assert!(is_manifest_locator("not a url/stream.m3u8"));
    }

    #[test]
    fn test_select_highest_bandwidth_variant() {
        let master = match parse_manifest(MASTER.as_bytes()).unwrap() {
            Playlist::MasterPlaylist(pl) => pl,
            Playlist::MediaPlaylist(_) => panic!("expected master playlist"),
        };
        let variant = select_variant(&master).unwrap();
        assert_eq!(variant.uri, "mid/index.m3u8");
        assert_eq!(variant.bandwidth, 2_500_000);
    }

    #[test]
    fn test_start_index_near_live_edge() {
        assert_eq!(start_index(5, true, false), 2);
        assert_eq!(start_index(5, true, true), 4);
        assert_eq!(start_index(2, true, false), 0);
        assert_eq!(start_index(5, false, true), 0);
    }

    #[test]
    fn test_reload_interval() {
        assert_eq!(reload_interval(6.0, true, false), Duration::from_secs(6));
        assert_eq!(reload_interval(6.0, false, false), Duration::from_secs(3));
        assert_eq!(reload_interval(6.0, true, true), Duration::from_secs(3));
        assert_eq!(reload_interval(0.0, false, true), MIN_RELOAD);
    }

    #[test]
    fn test_first_fetch_starts_at_index() {
        let playlist = media(LIVE);
        let base = Url::parse("https://example.com/live/index.m3u8").unwrap();
        let pending = pending_segments(&playlist, &base, None, 3).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].sequence, 103);
        assert_eq!(pending[0].url.as_str(), "https://example.com/live/seg103.ts");
        assert_eq!(pending[1].duration, 6.0);
    }

    #[test]
    fn test_reload_only_returns_new_sequences() {
        let playlist = media(LIVE);
        let base = Url::parse("https://example.com/live/index.m3u8").unwrap();
        let pending = pending_segments(&playlist, &base, Some(102), 0).unwrap();
        let sequences: Vec<u64> = pending.iter().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![103, 104]);

        assert!(pending_segments(&playlist, &base, Some(104), 0).unwrap().is_empty());
    }

    #[test]
    fn test_huge_target_duration_is_capped() {
        let max = Duration::from_secs_f64(MAX_TARGET_SECS);
        assert_eq!(reload_interval(u64::MAX as f64, true, false), max);
        assert_eq!(reload_interval(f64::INFINITY, true, false), max);
        assert_eq!(reload_interval(f64::NAN, false, true), max / 2);
    }

    #[test]
    fn test_sequence_overflow_stops_listing() {
        let text = format!(
            "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:{}\n#EXTINF:6.0,\nlast.ts\n#EXTINF:6.0,\nwrapped.ts\n",
            u64::MAX
        );
        let playlist = media(&text);
        let base = Url::parse("https://example.com/live/index.m3u8").unwrap();
        let pending = pending_segments(&playlist, &base, None, 0).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].sequence, u64::MAX);
    }

    #[test]
    fn test_sequence_restart_detection() {
        let playlist = media(LIVE);
        // Segments 100..=104
        assert!(!sequence_restarted(&playlist, 104));
        assert!(!sequence_restarted(&playlist, 100));
        assert!(sequence_restarted(&playlist, 105));
        assert!(sequence_restarted(&playlist, 5000));
    }
}
