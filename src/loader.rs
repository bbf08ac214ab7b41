//! Background playlist loading for an event loop

use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread;

use tracing::{debug, error, info};

use crate::error::FetchError;
use crate::m3u_parser::{try_fetch_playlist, FetchOptions};
use crate::models::Channel;

/// Identifies one playlist request; later requests supersede earlier ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestId(u64);

/// Completion of the latest playlist request
#[derive(Debug)]
pub struct LoadOutcome {
    pub id: RequestId,
    pub url: String,
    pub result: Result<Vec<Channel>, FetchError>,
}

impl LoadOutcome {
    /// Channels, or an empty list if the fetch failed
    pub fn into_channels(self) -> Vec<Channel> {
        self.result.unwrap_or_default()
    }
}

/// Runs fetches on worker threads and hands back only current results.
///
/// There is no cancellation: a superseded request still runs to completion
/// and its result is dropped in [`PlaylistLoader::poll`].
pub struct PlaylistLoader {
    options: FetchOptions,
    sender: Sender<LoadOutcome>,
    receiver: Receiver<LoadOutcome>,
    latest: Option<RequestId>,
    next_id: u64,
}

impl PlaylistLoader {
    pub fn new(options: FetchOptions) -> Self {
        let (sender, receiver) = channel();
        Self {
            options,
            sender,
            receiver,
            latest: None,
            next_id: 0,
        }
    }

    /// Start fetching `url` in the background
    pub fn request(&mut self, url: &str) -> RequestId {
        let id = self.begin();
        let url = url.to_string();
        let options = self.options.clone();
        let sender = self.sender.clone();

        info!(url = %url, "Loading playlist");
        thread::spawn(move || {
            let result = try_fetch_playlist(&url, &options);
            let _ = sender.send(LoadOutcome { id, url, result });
        });
        id
    }

    fn begin(&mut self) -> RequestId {
        self.next_id += 1;
        let id = RequestId(self.next_id);
        self.latest = Some(id);
        id
    }

    /// Whether a request is still outstanding
    pub fn is_loading(&self) -> bool {
        self.latest.is_some()
    }

    /// Drain finished fetches, returning the current one if it has arrived
    pub fn poll(&mut self) -> Option<LoadOutcome> {
        let mut current = None;
        loop {
            match self.receiver.try_recv() {
                Ok(outcome) => {
                    if Some(outcome.id) != self.latest {
                        debug!(url = %outcome.url, "Discarding superseded playlist response");
                        continue;
                    }
                    self.latest = None;
                    match &outcome.result {
                        Ok(channels) => info!(url = %outcome.url, count = channels.len(), "Loaded channels"),
                        Err(e) => error!(url = %outcome.url, error = %e, "Error fetching IPTV playlist"),
                    }
                    current = Some(outcome);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        current
    }

    #[cfg(test)]
    fn complete(&self, id: RequestId, url: &str, result: Result<Vec<Channel>, FetchError>) {
        let _ = self.sender.send(LoadOutcome {
            id,
            url: url.to_string(),
            result,
        });
    }
}
