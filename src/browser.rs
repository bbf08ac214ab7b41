//! Channel list view model: search, grouping and selection

use std::time::{Duration, Instant};

use tracing::debug;

use crate::debounce::Debouncer;
use crate::m3u_parser::{group_by_category, search};
use crate::models::{Channel, ChannelGroups};

/// Derived views over a loaded channel list.
///
/// The filtered list and groups are recomputed whenever the channel list
/// or the applied query changes, never edited in place.
pub struct ChannelBrowser {
    channels: Vec<Channel>,
    input: String,
    applied_query: String,
    debouncer: Debouncer<String>,
    filtered: Vec<Channel>,
    groups: ChannelGroups,
    selected: Option<usize>,
}

impl ChannelBrowser {
    pub fn new(debounce: Duration) -> Self {
        Self {
            channels: Vec::new(),
            input: String::new(),
            applied_query: String::new(),
            debouncer: Debouncer::new(debounce),
            filtered: Vec::new(),
            groups: ChannelGroups::new(),
            selected: None,
        }
    }

    /// Replace the channel list and select its first entry
    pub fn set_channels(&mut self, channels: Vec<Channel>) {
        self.selected = if channels.is_empty() { None } else { Some(0) };
        self.channels = channels;
        self.recompute();
    }

    /// Record a keystroke; the filter applies once input goes quiet
    pub fn input_query(&mut self, query: &str, now: Instant) {
        self.input = query.to_string();
        self.debouncer.push(self.input.clone(), now);
    }

    /// Apply a debounced query if its timer has fired.
    ///
    /// Returns true when the views changed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.debouncer.poll(now) {
            Some(query) => self.apply(query),
            None => false,
        }
    }

    /// Apply a query immediately, dropping any pending one
    pub fn apply_query_now(&mut self, query: &str) -> bool {
        self.debouncer.cancel();
        self.input = query.to_string();
        self.apply(query.to_string())
    }

    fn apply(&mut self, query: String) -> bool {
        if query == self.applied_query {
            return false;
        }
        self.applied_query = query;
        self.recompute();
        true
    }

    fn recompute(&mut self) {
        self.filtered = if self.applied_query.is_empty() {
            self.channels.clone()
        } else {
            search(&self.channels, &self.applied_query)
        };
        self.groups = group_by_category(&self.filtered);
        debug!(
            query = %self.applied_query,
            matches = self.filtered.len(),
            groups = self.groups.len(),
            "Channel views recomputed"
        );
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn applied_query(&self) -> &str {
        &self.applied_query
    }

    pub fn filtered(&self) -> &[Channel] {
        &self.filtered
    }

    pub fn groups(&self) -> &ChannelGroups {
        &self.groups
    }

    /// Select the channel with this URL; returns it if present
    pub fn select(&mut self, url: &str) -> Option<&Channel> {
        let idx = self.channels.iter().position(|c| c.url == url)?;
        self.selected = Some(idx);
        self.channels.get(idx)
    }

    pub fn selected(&self) -> Option<&Channel> {
        self.selected.and_then(|idx| self.channels.get(idx))
    }
}
