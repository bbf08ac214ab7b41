//! Playback session state machine

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::controls::Controls;
use super::engine::{EngineConfig, EngineFactory, StreamEngine};
use super::hls::is_manifest_locator;
use super::presentation::Presentation;
use super::sink::{MediaSink, SinkEvent, HLS_MIME};
use crate::error::{EngineError, PlayerError};

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub controls_hide_after: Duration,
    /// Viewports narrower than this rotate when entering fullscreen
    pub narrow_viewport_width: u32,
    pub low_latency: bool,
    /// Start playback as soon as metadata resolves
    pub autoplay: bool,
    pub user_agent: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            controls_hide_after: Duration::from_secs(3),
            narrow_viewport_width: 1024,
            low_latency: true,
            autoplay: false,
            user_agent: crate::config::DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Observable session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Loading,
    Playing,
    Paused,
    Detached,
}

/// How a bound locator reaches the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Client-side engine feeds segments to the sink
    Engine,
    /// The sink resolves the manifest itself
    NativeManifest,
    /// Plain media locator handed to the sink
    Direct,
}

/// Pick a playback route; `None` when a manifest has no way to play
pub fn classify_locator(locator: &str, engine_supported: bool, native_manifest: bool) -> Option<Route> {
    if !is_manifest_locator(locator) {
        Some(Route::Direct)
    } else if engine_supported {
        Some(Route::Engine)
    } else if native_manifest {
        Some(Route::NativeManifest)
    } else {
        None
    }
}

/// `m:ss` clock; unknown or zero renders as `0:00`
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "0:00".to_string();
    }
    let total = seconds as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Waiting for metadata; `play_requested` starts playback once ready
    Loading { play_requested: bool },
    Playing,
    Paused,
}

struct Bound {
    locator: String,
    route: Route,
    engine: Option<Box<dyn StreamEngine>>,
    stage: Stage,
    position: f64,
    duration: Option<f64>,
    presentation: Presentation,
    controls: Controls,
}

enum SessionState {
    Idle,
    Bound(Bound),
    Detached,
}

/// One mounted player: owns the sink and at most one engine at a time
pub struct PlaybackSession<S: MediaSink> {
    sink: S,
    engines: Option<Box<dyn EngineFactory>>,
    config: PlayerConfig,
    volume: f32,
    state: SessionState,
}

impl<S: MediaSink> PlaybackSession<S> {
    /// `engines` is `None` when the host has no client-side demuxing
    pub fn new(sink: S, engines: Option<Box<dyn EngineFactory>>, config: PlayerConfig) -> Self {
        let volume = sink.volume();
        Self {
            sink,
            engines,
            config,
            volume,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> PlayerState {
        match &self.state {
            SessionState::Idle => PlayerState::Idle,
            SessionState::Detached => PlayerState::Detached,
            SessionState::Bound(bound) => match bound.stage {
                Stage::Loading { .. } => PlayerState::Loading,
                Stage::Playing => PlayerState::Playing,
                Stage::Paused => PlayerState::Paused,
            },
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlayerState::Playing
    }

    fn bound(&self) -> Option<&Bound> {
        match &self.state {
            SessionState::Bound(bound) => Some(bound),
            _ => None,
        }
    }

    pub fn locator(&self) -> Option<&str> {
        self.bound().map(|b| b.locator.as_str())
    }

    pub fn route(&self) -> Option<Route> {
        self.bound().map(|b| b.route)
    }

    pub fn position(&self) -> f64 {
        self.bound().map_or(0.0, |b| b.position)
    }

    pub fn duration(&self) -> Option<f64> {
        self.bound().and_then(|b| b.duration)
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn presentation(&self) -> Option<Presentation> {
        self.bound().map(|b| b.presentation)
    }

    pub fn is_fullscreen(&self) -> bool {
        self.presentation().is_some_and(Presentation::is_fullscreen)
    }

    pub fn is_landscape(&self) -> bool {
        self.presentation().is_some_and(Presentation::is_landscape)
    }

    pub fn controls_visible(&self) -> bool {
        self.bound().map_or(true, |b| b.controls.is_visible())
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Bind a new locator, tearing down the current one first
    pub fn bind(&mut self, locator: &str) -> Result<(), PlayerError> {
        let presentation = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Detached => {
                self.state = SessionState::Detached;
                warn!(locator, "Ignoring bind on a detached player");
                return Err(PlayerError::Detached);
            }
            SessionState::Bound(bound) => {
                let presentation = bound.presentation;
                self.teardown(bound);
                presentation
            }
            SessionState::Idle => Presentation::default(),
        };

        let engine_supported = self.engines.as_ref().is_some_and(|f| f.is_supported());
        let native_manifest = self.sink.can_play_type(HLS_MIME);
        let route = match classify_locator(locator, engine_supported, native_manifest) {
            Some(route) => route,
            None => {
                warn!(locator, "No playback path for manifest");
                return Err(PlayerError::UnsupportedSource(locator.to_string()));
            }
        };

        let engine = match route {
            Route::Engine => Some(self.start_engine(locator)?),
            Route::NativeManifest | Route::Direct => {
                self.sink.attach(locator);
                None
            }
        };

        info!(locator, ?route, "Source bound");
        self.state = SessionState::Bound(Bound {
            locator: locator.to_string(),
            route,
            engine,
            stage: Stage::Loading {
                play_requested: self.config.autoplay,
            },
            position: 0.0,
            duration: None,
            presentation,
            controls: Controls::new(self.config.controls_hide_after),
        });
        Ok(())
    }

    fn start_engine(&mut self, locator: &str) -> Result<Box<dyn StreamEngine>, EngineError> {
        let factory = self.engines.as_ref().ok_or(EngineError::NoSource)?;
        let mut engine = factory.create(EngineConfig {
            low_latency: self.config.low_latency,
            user_agent: self.config.user_agent.clone(),
            ..EngineConfig::default()
        });

        let attached = engine
            .load_source(locator)
            .and_then(|()| engine.attach_media());
        match attached {
            Ok(feed) => {
                self.sink.attach_engine(feed);
                Ok(engine)
            }
            Err(e) => {
                warn!(locator, error = %e, "Streaming engine failed to attach");
                engine.destroy();
                Err(e)
            }
        }
    }

    /// Release everything tied to the bound source
    fn teardown(&mut self, mut bound: Bound) {
        self.sink.pause();
        if let Some(mut engine) = bound.engine.take() {
            engine.destroy();
        }
        self.sink.set_position(0.0);
        self.sink.detach();
        bound.controls.hide();
        debug!(locator = %bound.locator, "Source torn down");
    }

    /// Tear down and refuse further binds
    pub fn unmount(&mut self) {
        if let SessionState::Bound(bound) = std::mem::replace(&mut self.state, SessionState::Detached) {
            self.teardown(bound);
        }
        info!("Player unmounted");
    }

    pub fn play(&mut self) {
        let SessionState::Bound(bound) = &mut self.state else {
            debug!("Play ignored without a source");
            return;
        };
        match bound.stage {
            Stage::Playing => {}
            Stage::Loading { .. } => {
                bound.stage = Stage::Loading { play_requested: true };
            }
            Stage::Paused => match self.sink.play() {
                Ok(()) => bound.stage = Stage::Playing,
                Err(e) => warn!(locator = %bound.locator, error = %e, "Play failed"),
            },
        }
    }

    pub fn pause(&mut self) {
        let SessionState::Bound(bound) = &mut self.state else {
            return;
        };
        match bound.stage {
            Stage::Paused => {}
            Stage::Loading { .. } => {
                bound.stage = Stage::Loading { play_requested: false };
            }
            Stage::Playing => {
                self.sink.pause();
                bound.stage = Stage::Paused;
                bound.controls.pin();
            }
        }
    }

    pub fn toggle_play(&mut self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Seek, showing the new position before the sink confirms it
    pub fn seek(&mut self, seconds: f64) {
        if !seconds.is_finite() {
            return;
        }
        let SessionState::Bound(bound) = &mut self.state else {
            return;
        };
        let mut target = seconds.max(0.0);
        if let Some(duration) = bound.duration {
            target = target.min(duration);
        }
        bound.position = target;
        self.sink.set_position(target);
    }

    pub fn set_volume(&mut self, level: f32) {
        if level.is_nan() || matches!(self.state, SessionState::Detached) {
            return;
        }
        self.volume = level.clamp(0.0, 1.0);
        self.sink.set_volume(self.volume);
    }

    pub fn enter_fullscreen(&mut self) {
        let SessionState::Bound(bound) = &mut self.state else {
            return;
        };
        if bound.presentation.is_fullscreen() {
            return;
        }
        match self.sink.request_fullscreen() {
            Ok(()) => {
                let narrow = self.sink.viewport_width() < self.config.narrow_viewport_width;
                bound.presentation = bound.presentation.enter_fullscreen(narrow);
            }
            Err(e) => warn!(error = %e, "Fullscreen failed"),
        }
    }

    pub fn exit_fullscreen(&mut self) {
        let SessionState::Bound(bound) = &mut self.state else {
            return;
        };
        if !bound.presentation.is_fullscreen() {
            return;
        }
        match self.sink.exit_fullscreen() {
            Ok(()) => bound.presentation = bound.presentation.exit_fullscreen(),
            Err(e) => warn!(error = %e, "Exit fullscreen failed"),
        }
    }

    pub fn toggle_fullscreen(&mut self) {
        if self.is_fullscreen() {
            self.exit_fullscreen();
        } else {
            self.enter_fullscreen();
        }
    }

    pub fn toggle_landscape(&mut self) {
        if let SessionState::Bound(bound) = &mut self.state {
            bound.presentation = bound.presentation.toggle_landscape();
        }
    }

    /// Pointer moved over the player
    pub fn pointer_activity(&mut self, now: Instant) {
        if let SessionState::Bound(bound) = &mut self.state {
            let playing = bound.stage == Stage::Playing;
            bound.controls.activity(now, playing);
        }
    }

    /// Pointer left the player surface
    pub fn pointer_left(&mut self) {
        if let SessionState::Bound(bound) = &mut self.state {
            if bound.stage == Stage::Playing {
                bound.controls.hide();
            }
        }
    }

    /// Fire expired timers
    pub fn tick(&mut self, now: Instant) {
        if let SessionState::Bound(bound) = &mut self.state {
            if bound.controls.tick(now) {
                debug!("Controls hidden");
            }
        }
    }

    /// Drain sink notifications, then fire expired timers
    pub fn poll(&mut self, now: Instant) {
        for event in self.sink.poll_events() {
            self.handle_sink_event(event);
        }
        self.tick(now);
    }

    pub fn handle_sink_event(&mut self, event: SinkEvent) {
        let SessionState::Bound(bound) = &mut self.state else {
            debug!(?event, "Dropping sink event without a source");
            return;
        };
        match event {
            SinkEvent::Playing => bound.stage = Stage::Playing,
            SinkEvent::Paused | SinkEvent::Ended => {
                if bound.stage == Stage::Playing {
                    bound.stage = Stage::Paused;
                    bound.controls.pin();
                }
            }
            SinkEvent::TimeUpdate(position) => bound.position = position,
            SinkEvent::MetadataLoaded { duration } => {
                bound.duration = duration.filter(|d| d.is_finite());
                if let Stage::Loading { play_requested } = bound.stage {
                    bound.stage = Stage::Paused;
                    if play_requested {
                        match self.sink.play() {
                            Ok(()) => bound.stage = Stage::Playing,
                            Err(e) => warn!(locator = %bound.locator, error = %e, "Play failed"),
                        }
                    }
                }
            }
            SinkEvent::FullscreenExited => {
                bound.presentation = bound.presentation.exit_fullscreen();
            }
        }
    }
}

impl<S: MediaSink> Drop for PlaybackSession<S> {
    fn drop(&mut self) {
        if let SessionState::Bound(bound) = std::mem::replace(&mut self.state, SessionState::Detached) {
            self.teardown(bound);
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
