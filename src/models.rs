//! Data models for the IPTV viewer

use std::collections::HashMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Display name used when a metadata line carries none
pub const UNKNOWN_NAME: &str = "Unknown";

/// Category used when a channel has no group-title
pub const DEFAULT_GROUP: &str = "Other";

/// Channel parsed from a playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl Channel {
    /// Group label used for grouping, falling back to "Other"
    pub fn group_key(&self) -> &str {
        self.group.as_deref().unwrap_or(DEFAULT_GROUP)
    }
}

/// Channels grouped by category, in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelGroups {
    groups: Vec<(String, Vec<Channel>)>,
    index: HashMap<String, usize>,
}

impl ChannelGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a channel to its group, creating the group at the end if new
    pub fn push(&mut self, channel: Channel) {
        let existing = self.index.get(channel.group_key()).copied();
        match existing {
            Some(idx) => self.groups[idx].1.push(channel),
            None => {
                let key = channel.group_key().to_string();
                self.index.insert(key.clone(), self.groups.len());
                self.groups.push((key, vec![channel]));
            }
        }
    }

    pub fn get(&self, group: &str) -> Option<&[Channel]> {
        self.index
            .get(group)
            .map(|&idx| self.groups[idx].1.as_slice())
    }

    /// Group labels in first-seen order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Channel])> {
        self.groups
            .iter()
            .map(|(name, channels)| (name.as_str(), channels.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// All channels, group by group
    pub fn flatten(&self) -> Vec<Channel> {
        self.groups
            .iter()
            .flat_map(|(_, channels)| channels.iter().cloned())
            .collect()
    }
}

impl Serialize for ChannelGroups {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for (name, channels) in &self.groups {
            map.serialize_entry(name, channels)?;
        }
        map.end()
    }
}
