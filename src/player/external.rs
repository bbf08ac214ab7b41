//! Media sink backed by an external player process
//!
//! Locators the player resolves itself are passed on its command line.
//! Engine feeds are piped to the player's stdin from a pump thread, which
//! hands the feed back when stopped so playback can resume.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::sink::{MediaSink, SegmentFeed, SinkEvent, HLS_MIME};
use crate::error::SinkError;

const PUMP_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct ExternalPlayerConfig {
    /// Program to launch, e.g. `mpv` or `ffplay`
    pub program: String,
    pub user_agent: String,
    pub viewport_width: u32,
}

enum Source {
    None,
    Locator(String),
    Feed(SegmentFeed),
    /// Feed currently owned by the pump thread
    Pumping,
}

struct Pump {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<SegmentFeed>,
}

pub struct ExternalPlayerSink {
    config: ExternalPlayerConfig,
    source: Source,
    child: Option<Child>,
    pump: Option<Pump>,
    started: Option<Instant>,
    offset: f64,
    volume: f32,
    fullscreen: bool,
    events: Vec<SinkEvent>,
}

impl ExternalPlayerSink {
    pub fn new(config: ExternalPlayerConfig) -> Self {
        Self {
            config,
            source: Source::None,
            child: None,
            pump: None,
            started: None,
            offset: 0.0,
            volume: 1.0,
            fullscreen: false,
            events: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    fn is_mpv(&self) -> bool {
        self.config.program.to_lowercase().contains("mpv")
    }

    fn build_command(&self, input: &str) -> Command {
        let mut cmd = Command::new(&self.config.program);
        if self.is_mpv() {
            cmd.arg(format!("--user-agent={}", self.config.user_agent));
            cmd.arg(format!("--volume={}", (self.volume * 100.0).round() as u32));
            if self.offset > 0.0 {
                cmd.arg(format!("--start={:.1}", self.offset));
            }
            if self.fullscreen {
                cmd.arg("--fs");
            }
        } else if self.fullscreen && self.config.program.to_lowercase().contains("ffplay") {
            cmd.arg("-fs");
        }
        cmd.arg(input);
        cmd.env("USER_AGENT", &self.config.user_agent);
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());
        cmd
    }

    fn launch(&mut self) -> Result<(), SinkError> {
        let feed = match std::mem::replace(&mut self.source, Source::None) {
            Source::Feed(feed) => Some(feed),
            Source::Pumping => self.recover_feed(),
            Source::Locator(locator) => {
                self.source = Source::Locator(locator);
                None
            }
            Source::None => None,
        };

        let mut cmd = match (&self.source, &feed) {
            (_, Some(_)) => {
                let mut cmd = self.build_command("-");
                cmd.stdin(Stdio::piped());
                cmd
            }
            (Source::Locator(locator), None) => {
                let mut cmd = self.build_command(locator);
                cmd.stdin(Stdio::null());
                cmd
            }
            _ => return Err(SinkError::Rejected("no source attached".to_string())),
        };

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                if let Some(feed) = feed {
                    self.source = Source::Feed(feed);
                }
                return Err(SinkError::Rejected(format!(
                    "failed to launch {}: {}",
                    self.config.program, e
                )));
            }
        };
        info!(program = %self.config.program, pid = child.id(), "Player launched");

        if let Some(stderr) = child.stderr.take() {
            thread::spawn(move || {
                let reader = BufReader::new(stderr);
                for line in reader.lines().map_while(Result::ok) {
                    if !line.trim().is_empty() {
                        debug!(target: "player", "{}", line);
                    }
                }
            });
        }

        if let Some(feed) = feed {
            match child.stdin.take() {
                Some(stdin) => {
                    let stop = Arc::new(AtomicBool::new(false));
                    let pump_stop = Arc::clone(&stop);
                    let handle = thread::spawn(move || pump_segments(feed, stdin, pump_stop));
                    self.pump = Some(Pump { stop, handle });
                    self.source = Source::Pumping;
                }
                None => self.source = Source::Feed(feed),
            }
        }

        self.child = Some(child);
        self.started = Some(Instant::now());
        Ok(())
    }

    fn recover_feed(&mut self) -> Option<SegmentFeed> {
        let pump = self.pump.take()?;
        pump.stop.store(true, Ordering::SeqCst);
        match pump.handle.join() {
            Ok(feed) => Some(feed),
            Err(_) => {
                warn!("Segment pump panicked");
                None
            }
        }
    }

    /// Stop the player process, keeping the source for a later launch
    fn stop(&mut self) {
        if let Some(started) = self.started.take() {
            self.offset += started.elapsed().as_secs_f64();
        }
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!(error = %e, "Player already gone");
            }
            if let Err(e) = child.wait() {
                debug!(error = %e, "Failed to reap player");
            }
        }
        if matches!(self.source, Source::Pumping) {
            self.source = match self.recover_feed() {
                Some(feed) => Source::Feed(feed),
                None => Source::None,
            };
        }
    }

    fn check_exit(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                self.child = None;
                if let Some(started) = self.started.take() {
                    self.offset += started.elapsed().as_secs_f64();
                }
                if status.success() {
                    info!("Player finished");
                    self.events.push(SinkEvent::Ended);
                } else {
                    match status.code() {
                        Some(code) => warn!(code, "Player exited with error"),
                        None => warn!("Player terminated by signal"),
                    }
                    self.events.push(SinkEvent::Paused);
                }
                if matches!(self.source, Source::Pumping) {
                    self.source = match self.recover_feed() {
                        Some(feed) => Source::Feed(feed),
                        None => Source::None,
                    };
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to wait for player"),
        }
    }
}

/// Copy segments into the player until stopped or the pipe closes
fn pump_segments(feed: SegmentFeed, mut stdin: ChildStdin, stop: Arc<AtomicBool>) -> SegmentFeed {
    while !stop.load(Ordering::SeqCst) {
        match feed.recv_timeout(PUMP_POLL) {
            Ok(segment) => {
                if let Err(e) = stdin.write_all(&segment.data) {
                    debug!(sequence = segment.sequence, error = %e, "Player pipe closed");
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Segment feed ended");
                break;
            }
        }
    }
    feed
}

impl MediaSink for ExternalPlayerSink {
    fn attach(&mut self, locator: &str) {
        self.stop();
        self.source = Source::Locator(locator.to_string());
        self.offset = 0.0;
        self.events.push(SinkEvent::MetadataLoaded { duration: None });
    }

    fn attach_engine(&mut self, feed: SegmentFeed) {
        self.stop();
        self.source = Source::Feed(feed);
        self.offset = 0.0;
        self.events.push(SinkEvent::MetadataLoaded { duration: None });
    }

    fn detach(&mut self) {
        self.stop();
        self.source = Source::None;
        self.offset = 0.0;
        self.events.clear();
    }

    fn play(&mut self) -> Result<(), SinkError> {
        if self.child.is_some() {
            return Ok(());
        }
        self.launch()?;
        self.events.push(SinkEvent::Playing);
        Ok(())
    }

    fn pause(&mut self) {
        if self.child.is_some() {
            self.stop();
            self.events.push(SinkEvent::Paused);
        }
    }

    /// Takes effect on the next launch
    fn set_position(&mut self, seconds: f64) {
        self.offset = seconds.max(0.0);
        if self.child.is_some() {
            self.started = Some(Instant::now());
        }
    }

    fn set_volume(&mut self, level: f32) {
        self.volume = level;
    }

    fn position(&self) -> f64 {
        self.offset + self.started.map_or(0.0, |s| s.elapsed().as_secs_f64())
    }

    fn duration(&self) -> Option<f64> {
        None
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn can_play_type(&self, mime: &str) -> bool {
        mime == HLS_MIME || mime.starts_with("video/") || mime.starts_with("audio/")
    }

    fn request_fullscreen(&mut self) -> Result<(), SinkError> {
        self.fullscreen = true;
        Ok(())
    }

    fn exit_fullscreen(&mut self) -> Result<(), SinkError> {
        self.fullscreen = false;
        Ok(())
    }

    fn viewport_width(&self) -> u32 {
        self.config.viewport_width
    }

    fn poll_events(&mut self) -> Vec<SinkEvent> {
        self.check_exit();
        std::mem::take(&mut self.events)
    }
}

impl Drop for ExternalPlayerSink {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;

    fn sink(program: &str) -> ExternalPlayerSink {
        ExternalPlayerSink::new(ExternalPlayerConfig {
            program: program.to_string(),
            user_agent: "test-agent".to_string(),
            viewport_width: 800,
        })
    }

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_attach_reports_metadata() {
        let mut sink = sink("mpv");
        sink.attach("https://example.com/movie.mp4");
        assert_eq!(
            sink.poll_events(),
            vec![SinkEvent::MetadataLoaded { duration: None }]
        );
        assert!(sink.poll_events().is_empty());
    }

    #[test]
    fn test_mpv_arguments() {
        let mut sink = sink("mpv");
        sink.set_volume(0.5);
        sink.set_position(12.0);
        sink.request_fullscreen().unwrap();
        let args = args(&sink.build_command("https://example.com/a.m3u8"));
        assert_eq!(
            args,
            vec![
                "--user-agent=test-agent",
                "--volume=50",
                "--start=12.0",
                "--fs",
                "https://example.com/a.m3u8",
            ]
        );
    }

    #[test]
    fn test_generic_player_gets_locator_only() {
        let sink = sink("vlc");
        let args = args(&sink.build_command("https://example.com/a.ts"));
        assert_eq!(args, vec!["https://example.com/a.ts"]);
    }

    #[test]
    fn test_play_without_source_is_rejected() {
        let mut sink = sink("mpv");
        assert!(matches!(sink.play(), Err(SinkError::Rejected(_))));
        assert!(!sink.is_running());
    }

    #[test]
    fn test_missing_program_is_rejected_and_keeps_feed() {
        let mut sink = sink("/nonexistent/iptv-viewer-test-player");
        let (_sender, receiver) = sync_channel(1);
        sink.attach_engine(receiver);
        assert!(matches!(sink.play(), Err(SinkError::Rejected(_))));
        assert!(matches!(sink.source, Source::Feed(_)));
    }

    #[test]
    fn test_pump_returns_feed_when_stopped() {
        let (sender, receiver) = sync_channel(1);
        let stop = Arc::new(AtomicBool::new(true));
        let mut child = match Command::new("cat")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(_) => return,
        };
        let stdin = child.stdin.take().unwrap();
        let feed = pump_segments(receiver, stdin, stop);
        let _ = child.wait();

        drop(sender);
        assert!(feed.recv().is_err());
    }

    #[test]
    fn test_detach_drops_engine_feed() {
        let mut sink = sink("mpv");
        let (sender, receiver) = sync_channel(1);
        sink.attach_engine(receiver);
        sink.detach();

        let segment = crate::player::sink::Segment {
            sequence: 1,
            duration: 1.0,
            uri: "seg1.ts".to_string(),
            data: Vec::new(),
        };
        assert!(sender.send(segment).is_err());
        assert!(sink.poll_events().is_empty());
    }

    #[test]
    fn test_pause_stops_running_player() {
        let mut sink = sink("sleep");
        sink.attach("30");
        if sink.play().is_err() {
            return;
        }
        assert!(sink.is_running());

        sink.pause();
        assert!(!sink.is_running());
        let events = sink.poll_events();
        assert_eq!(events.last(), Some(&SinkEvent::Paused));
        assert!(sink.position() > 0.0);
    }

    #[test]
    fn test_hls_and_video_types_supported() {
        let sink = sink("mpv");
        assert!(sink.can_play_type(HLS_MIME));
        assert!(sink.can_play_type("video/mp4"));
        assert!(!sink.can_play_type("text/html"));
        assert_eq!(sink.viewport_width(), 800);
    }
}
