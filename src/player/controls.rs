//! Auto-hiding playback controls

use std::time::{Duration, Instant};

use crate::debounce::Debouncer;

/// Controls visibility with a hide countdown re-armed on pointer activity
#[derive(Debug, Clone)]
pub struct Controls {
    visible: bool,
    countdown: Debouncer<()>,
}

impl Controls {
    pub fn new(hide_after: Duration) -> Self {
        Self {
            visible: true,
            countdown: Debouncer::new(hide_after),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Show the controls; start a fresh countdown only while playing
    pub fn activity(&mut self, now: Instant, playing: bool) {
        self.visible = true;
        if playing {
            self.countdown.push((), now);
        } else {
            self.countdown.cancel();
        }
    }

    /// Show and keep shown
    pub fn pin(&mut self) {
        self.visible = true;
        self.countdown.cancel();
    }

    pub fn hide(&mut self) {
        self.visible = false;
        self.countdown.cancel();
    }

    /// Hide if the countdown expired; true when visibility changed
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.countdown.poll(now).is_some() && self.visible {
            self.visible = false;
            return true;
        }
        false
    }

    pub fn is_armed(&self) -> bool {
        self.countdown.is_pending()
    }
}
