use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::thread;

use crossbeam_channel::Sender;

use crate::config::PlayerConfig;
use crate::data::Item;
use crate::debug::debug_log;
use crate::event::AppEvent;
use crate::process::ProcessTerminator;

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("could not start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Recognises the player's own end-of-stream report in its diagnostic output.
///
/// The stream player keeps its window (and process) alive after the video
/// ends when asked to hold it open, so the only reliable signal is a line
/// on stderr. Kept behind a trait so an exit-code based signal can replace it.
pub trait EndOfStreamDetector: Send + Sync {
    fn is_end_of_stream(&self, line: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct MarkerDetector {
    marker: String,
}

impl MarkerDetector {
    pub fn new<S: Into<String>>(marker: S) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl EndOfStreamDetector for MarkerDetector {
    fn is_end_of_stream(&self, line: &str) -> bool {
        !self.marker.is_empty() && line.contains(&self.marker)
    }
}

/// Starts a player for one URL and arranges for its lifecycle events to be
/// sent on `events`. Returns the pid of the spawned process.
pub trait Launcher: Send + Sync {
    fn launch(&self, url: &str, events: Sender<AppEvent>) -> Result<u32, PlaybackError>;
}

pub struct StreamLauncher<D> {
    command: String,
    quality: String,
    player_args: String,
    hold_window: bool,
    detector: std::sync::Arc<D>,
}

impl StreamLauncher<MarkerDetector> {
    pub fn from_config(cfg: &PlayerConfig) -> Self {
        Self::new(cfg, MarkerDetector::new(cfg.end_marker.clone()))
    }
}

impl<D: EndOfStreamDetector + 'static> StreamLauncher<D> {
    pub fn new(cfg: &PlayerConfig, detector: D) -> Self {
        Self {
            command: cfg.command.clone(),
            quality: cfg.quality.clone(),
            player_args: cfg.player_args.clone(),
            hold_window: cfg.hold_window,
            detector: std::sync::Arc::new(detector),
        }
    }

    pub fn args(&self, url: &str) -> Vec<String> {
        let mut args = Vec::new();
        if self.hold_window {
            args.push("--player-no-close".to_string());
        }
        args.push(url.to_string());
        args.push(self.quality.clone());
        if !self.player_args.trim().is_empty() {
            args.push("--player-args".to_string());
            args.push(self.player_args.clone());
        }
        if self.hold_window {
            args.push("--verbose-player".to_string());
        }
        args
    }
}

impl<D: EndOfStreamDetector + 'static> Launcher for StreamLauncher<D> {
    fn launch(&self, url: &str, events: Sender<AppEvent>) -> Result<u32, PlaybackError> {
        let args = self.args(url);
        debug_log(format!("video: {} {:?}", self.command, args));

        let mut command = Command::new(&self.command);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|source| PlaybackError::Spawn {
            command: self.command.clone(),
            source,
        })?;
        let pid = child.id();

        if let Some(stderr) = child.stderr.take() {
            let detector = self.detector.clone();
            let events = events.clone();
            let url = url.to_string();
            thread::spawn(move || watch_diagnostics(stderr, detector.as_ref(), &url, pid, &events));
        }

        let url = url.to_string();
        thread::spawn(move || {
            let status = child.wait();
            debug_log(format!("video: {url} (pid {pid}) exited with {status:?}"));
            let _ = events.send(AppEvent::PlaybackStopped {
                url,
                pid: Some(pid),
            });
        });

        Ok(pid)
    }
}

fn watch_diagnostics<R: Read>(
    stream: R,
    detector: &dyn EndOfStreamDetector,
    url: &str,
    pid: u32,
    events: &Sender<AppEvent>,
) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut reported = false;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        if reported {
            continue;
        }
        let line = String::from_utf8_lossy(&buf);
        if detector.is_end_of_stream(&line) {
            debug_log(format!("video: end of stream for {url}"));
            reported = true;
            let _ = events.send(AppEvent::EndOfStream {
                url: url.to_string(),
                pid,
            });
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Running,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Playback {
    pub pid: u32,
    pub state: PlaybackState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Started { pid: u32 },
    Stopping { pid: u32 },
}

/// Owns the mapping from item URL to its running player.
pub struct PlaybackSupervisor {
    launcher: Box<dyn Launcher>,
    terminator: Box<dyn ProcessTerminator>,
    events: Sender<AppEvent>,
    running: HashMap<String, Playback>,
}

impl PlaybackSupervisor {
    pub fn new(
        launcher: Box<dyn Launcher>,
        terminator: Box<dyn ProcessTerminator>,
        events: Sender<AppEvent>,
    ) -> Self {
        Self {
            launcher,
            terminator,
            events,
            running: HashMap::new(),
        }
    }

    pub fn is_running(&self, url: &str) -> bool {
        self.running.contains_key(url)
    }

    pub fn playback(&self, url: &str) -> Option<Playback> {
        self.running.get(url).copied()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Stops the player of `item` if one is tracked, otherwise starts one.
    ///
    /// A started player is registered before this returns, so an immediate
    /// second toggle stops it instead of launching a duplicate. When the
    /// spawn fails a `PlaybackStopped` event is still emitted for the URL.
    pub fn toggle(&mut self, item: &Item) -> Result<Toggle, PlaybackError> {
        if let Some(pid) = self.running.get(&item.url).map(|playback| playback.pid) {
            self.stop(&item.url);
            return Ok(Toggle::Stopping { pid });
        }

        match self.launcher.launch(&item.url, self.events.clone()) {
            Ok(pid) => {
                self.running.insert(
                    item.url.clone(),
                    Playback {
                        pid,
                        state: PlaybackState::Running,
                    },
                );
                let _ = self.events.send(AppEvent::PlaybackStarted {
                    url: item.url.clone(),
                    pid,
                });
                Ok(Toggle::Started { pid })
            }
            Err(err) => {
                debug_log(format!("video: {err}"));
                let _ = self.events.send(AppEvent::PlaybackStopped {
                    url: item.url.clone(),
                    pid: None,
                });
                Err(err)
            }
        }
    }

    fn stop(&mut self, url: &str) {
        if let Some(playback) = self.running.get_mut(url) {
            playback.state = PlaybackState::Stopping;
            self.terminator.terminate_tree(playback.pid);
        }
    }

    /// The player announced the end of the stream; treat it as a stop.
    /// Markers from a player that is no longer tracked are ignored.
    pub fn handle_end_of_stream(&mut self, url: &str, pid: u32) {
        if self.running.get(url).is_some_and(|playback| playback.pid == pid) {
            self.stop(url);
        }
    }

    /// Forgets the player for `url` once it is confirmed gone. Returns whether
    /// an entry was removed; repeated or stale notifications are no-ops.
    pub fn handle_exit(&mut self, url: &str, pid: Option<u32>) -> bool {
        let matches = match (self.running.get(url), pid) {
            (Some(playback), Some(pid)) => playback.pid == pid,
            _ => false,
        };
        if matches {
            self.running.remove(url);
        }
        matches
    }

    /// Terminates every tracked player. Used on shutdown.
    pub fn stop_all(&mut self) {
        let urls: Vec<String> = self.running.keys().cloned().collect();
        for url in urls {
            self.stop(&url);
        }
    }
}
