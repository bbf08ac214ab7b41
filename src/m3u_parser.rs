//! M3U playlist parser with HTTP(S) download support

use std::collections::HashMap;
use std::io::Read;
use std::iter::Peekable;
use std::str::Chars;
use std::time::Duration;

use flate2::read::GzDecoder;
use tracing::{debug, error};

use crate::error::FetchError;
use crate::models::{Channel, ChannelGroups, DEFAULT_GROUP, UNKNOWN_NAME};

const EXTINF: &str = "#EXTINF";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Options for playlist retrieval
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub user_agent: String,
    /// Upper bound on the downloaded body, before decompression
    pub max_bytes: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: crate::config::DEFAULT_USER_AGENT.to_string(),
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Download and parse a playlist, reporting failures as empty.
///
/// Errors are logged and flattened into an empty list; use
/// [`try_fetch_playlist`] to tell a failed fetch from an empty playlist.
pub fn fetch_playlist(url: &str) -> Vec<Channel> {
    fetch_playlist_with(url, &FetchOptions::default())
}

/// Same as [`fetch_playlist`] with explicit options
pub fn fetch_playlist_with(url: &str, options: &FetchOptions) -> Vec<Channel> {
    match try_fetch_playlist(url, options) {
        Ok(channels) => channels,
        Err(e) => {
            error!(url, error = %e, "Error fetching IPTV playlist");
            Vec::new()
        }
    }
}

/// Download and parse a playlist
pub fn try_fetch_playlist(url: &str, options: &FetchOptions) -> Result<Vec<Channel>, FetchError> {
    let agent = ureq::Agent::config_builder()
        .timeout_global(Some(options.timeout))
        .build()
        .new_agent();

    let mut response = agent
        .get(url)
        .header("User-Agent", &options.user_agent)
        .call()
        .map_err(|e| match e {
            ureq::Error::StatusCode(code) => FetchError::Status(code),
            other => FetchError::Http(other),
        })?;

    let status = response.status().as_u16();
    if !(200..300).contains(&status) {
        return Err(FetchError::Status(status));
    }

    let body = response
        .body_mut()
        .with_config()
        .limit(options.max_bytes)
        .read_to_vec()?;

    let content = decode_body(body)?;
    let channels = parse_m3u(&content);
    debug!(url, count = channels.len(), "Playlist parsed");
    Ok(channels)
}

/// Decompress gzip payloads and decode text lossily
fn decode_body(body: Vec<u8>) -> Result<String, FetchError> {
    if body.starts_with(&GZIP_MAGIC) {
        let mut decoded = Vec::new();
        GzDecoder::new(body.as_slice()).read_to_end(&mut decoded)?;
        return Ok(String::from_utf8_lossy(&decoded).into_owned());
    }
    Ok(String::from_utf8(body)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
}

/// Channel under construction between an EXTINF line and its URL line
struct PendingChannel {
    name: String,
    logo: Option<String>,
    group: String,
}

/// Parse M3U content and extract channels
pub fn parse_m3u(content: &str) -> Vec<Channel> {
    let mut channels = Vec::new();
    let mut pending: Option<PendingChannel> = None;

    for line in content.lines() {
        let line = line.trim();

        if let Some(info) = line.strip_prefix(EXTINF) {
            // A second EXTINF before any URL replaces the first
            let info = info.strip_prefix(':').unwrap_or(info);
            let mut extinf = parse_extinf(info);
            pending = Some(PendingChannel {
                name: extinf.name.unwrap_or_else(|| UNKNOWN_NAME.to_string()),
                logo: extinf.attrs.remove("tvg-logo"),
                group: extinf
                    .attrs
                    .remove("group-title")
                    .unwrap_or_else(|| DEFAULT_GROUP.to_string()),
            });
        } else if !line.is_empty() && !line.starts_with('#') {
            if let Some(channel) = pending.take() {
                channels.push(Channel {
                    name: channel.name,
                    url: line.to_string(),
                    logo: channel.logo,
                    group: Some(channel.group),
                });
            }
        }
    }

    channels
}

/// Group channels by category, keeping first-seen order of groups and channels
pub fn group_by_category(channels: &[Channel]) -> ChannelGroups {
    let mut groups = ChannelGroups::new();
    for channel in channels {
        groups.push(channel.clone());
    }
    groups
}

/// Case-insensitive substring filter over channel name or group.
///
/// An empty query matches everything.
pub fn search(channels: &[Channel], query: &str) -> Vec<Channel> {
    let needle = query.to_lowercase();
    channels
        .iter()
        .filter(|channel| {
            contains_ignore_case(&channel.name, &needle)
                || channel
                    .group
                    .as_deref()
                    .is_some_and(|group| contains_ignore_case(group, &needle))
        })
        .cloned()
        .collect()
}

/// Substring check against an already lower-cased needle
fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    if haystack.is_ascii() && needle.is_ascii() {
        if needle.len() > haystack.len() {
            return false;
        }
        return haystack
            .as_bytes()
            .windows(needle.len())
            .any(|window| window.eq_ignore_ascii_case(needle.as_bytes()));
    }
    haystack.to_lowercase().contains(needle)
}

/// Attributes and display name of an EXTINF line
#[derive(Debug, Default)]
struct ExtInf {
    attrs: HashMap<String, String>,
    name: Option<String>,
}

/// Parse the part of an EXTINF line after `#EXTINF:`.
///
/// Handles quoted and unquoted values, stray quotes, and attributes placed
/// after the duration comma (`10.0,tvg-id="x",Name`).
fn parse_extinf(info: &str) -> ExtInf {
    let mut out = ExtInf::default();
    let mut chars = info.chars().peekable();

    // Duration, e.g. "-1" or "10.000000"
    skip_while(&mut chars, char::is_whitespace);
    skip_while(&mut chars, |c| c.is_ascii_digit() || c == '-' || c == '.');

    loop {
        skip_while(&mut chars, char::is_whitespace);
        match chars.peek() {
            None => break,
            Some(&',') => {
                chars.next();
                // Attributes after a comma still need a name after them
                if !starts_with_attr(chars.clone()) || !has_top_level_comma(chars.clone()) {
                    let name: String = chars.by_ref().collect();
                    let name = name.trim();
                    if !name.is_empty() {
                        out.name = Some(name.to_string());
                    }
                    break;
                }
            }
            Some(&'"') => {
                chars.next();
            }
            Some(_) => {
                let mut key = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '=' || c == ',' || c.is_whitespace() {
                        break;
                    }
                    key.push(c);
                    chars.next();
                }
                if chars.peek() != Some(&'=') {
                    continue;
                }
                chars.next();
                let value = read_value(&mut chars);
                let key = key.trim_matches('"').to_lowercase();
                if !key.is_empty() && !value.is_empty() {
                    out.attrs.insert(key, value);
                }
            }
        }
    }

    out
}

fn skip_while(chars: &mut Peekable<Chars<'_>>, pred: impl Fn(char) -> bool) {
    while let Some(&c) = chars.peek() {
        if !pred(c) {
            break;
        }
        chars.next();
    }
}

/// Whether the remaining text begins with `key=`
fn starts_with_attr(mut chars: Peekable<Chars<'_>>) -> bool {
    skip_while(&mut chars, char::is_whitespace);
    let mut key_len = 0;
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            key_len += 1;
            chars.next();
        } else {
            break;
        }
    }
    key_len > 0 && chars.peek() == Some(&'=')
}

/// Whether a comma outside quoted values remains
fn has_top_level_comma(mut chars: Peekable<Chars<'_>>) -> bool {
    let mut quoted = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' if quoted && chars.peek() == Some(&'"') => {
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => return true,
            _ => {}
        }
    }
    false
}

/// Read a quoted or unquoted attribute value
fn read_value(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut value = String::new();
    if chars.peek() == Some(&'"') {
        chars.next();
        while let Some(c) = chars.next() {
            if c == '"' {
                break;
            }
            if c == '\\' && chars.peek() == Some(&'"') {
                chars.next();
                value.push('"');
                continue;
            }
            value.push(c);
        }
    } else {
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || c == ',' {
                break;
            }
            value.push(c);
            chars.next();
        }
    }
    value
}

#[cfg(test)]
#[path = "m3u_parser_tests.rs"]
mod tests;
