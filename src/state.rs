//! The single owned application state the UI loop drives.

use anyhow::{Context, Result};

use crate::data::Item;
use crate::debug::debug_log;
use crate::event::AppEvent;
use crate::menu::{Intent, Menu, Viewport};
use crate::sync::{SyncEngine, SyncOutcome, SyncWorker};
use crate::video::{PlaybackState, PlaybackSupervisor, Toggle};

/// Opens a URL in an external viewer without waiting for it.
pub trait UrlOpener {
    fn open(&self, url: &str) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserOpener;

impl UrlOpener for BrowserOpener {
    fn open(&self, url: &str) -> Result<()> {
        webbrowser::open(url).with_context(|| format!("open {url}"))
    }
}

pub struct AppState {
    sync: SyncEngine,
    playback: PlaybackSupervisor,
    menu: Menu,
    opener: Box<dyn UrlOpener>,
    status: Option<String>,
    startup_pending: bool,
}

impl AppState {
    /// Shows the cached snapshot right away when there is one. The first
    /// cycle is fatal only if nothing could be shown before it.
    pub fn new(
        sync: SyncEngine,
        playback: PlaybackSupervisor,
        mut menu: Menu,
        opener: Box<dyn UrlOpener>,
    ) -> Self {
        let cached = !sync.snapshot().is_empty();
        if cached {
            menu.render_list(sync.snapshot(), |url| playback.is_running(url));
        }
        Self {
            sync,
            playback,
            menu,
            opener,
            status: None,
            startup_pending: !cached,
        }
    }

    pub fn snapshot(&self) -> &[Item] {
        self.sync.snapshot()
    }

    pub fn sync(&self) -> &SyncEngine {
        &self.sync
    }

    pub fn menu(&self) -> &Menu {
        &self.menu
    }

    pub fn playback(&self) -> &PlaybackSupervisor {
        &self.playback
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn set_status<S: Into<String>>(&mut self, message: S) {
        self.status = Some(message.into());
    }

    pub fn clear_status(&mut self) {
        self.status = None;
    }

    /// True until the first cycle has completed, successfully or not.
    pub fn is_waiting_for_first_sync(&self) -> bool {
        self.startup_pending
    }

    /// Starts a cycle unless one is already outstanding.
    pub fn request_sync(&mut self, worker: &SyncWorker) -> bool {
        if !self.sync.try_begin() {
            debug_log("sync: cycle already in flight, skipping");
            return false;
        }
        worker.spawn_cycle(self.menu.viewport().row_max());
        true
    }

    /// Applies one background event. Returns an error only when the startup
    /// cycle fails with nothing on screen.
    pub fn handle_event(&mut self, event: AppEvent) -> Result<Option<SyncOutcome>> {
        match event {
            AppEvent::PlaybackStarted { url, pid } => {
                if self
                    .playback
                    .playback(&url)
                    .is_some_and(|playback| playback.pid == pid)
                {
                    self.menu.playback_changed(self.sync.snapshot(), &url, true);
                }
                Ok(None)
            }
            AppEvent::PlaybackStopped { url, pid } => {
                self.playback.handle_exit(&url, pid);
                if self.playback.is_running(&url) {
                    debug_log(format!("ui: stale exit for {url} ({pid:?})"));
                } else {
                    self.menu.playback_changed(self.sync.snapshot(), &url, false);
                }
                Ok(None)
            }
            AppEvent::EndOfStream { url, pid } => {
                let live = self.playback.playback(&url).is_some_and(|playback| {
                    playback.pid == pid && playback.state == PlaybackState::Running
                });
                self.playback.handle_end_of_stream(&url, pid);
                if live {
                    self.menu.playback_changed(self.sync.snapshot(), &url, false);
                }
                Ok(None)
            }
            AppEvent::SyncFetched(result) => self.apply_sync(result),
        }
    }

    fn apply_sync(&mut self, result: Result<Vec<Item>>) -> Result<Option<SyncOutcome>> {
        let startup = std::mem::replace(&mut self.startup_pending, false);
        match self.sync.finish(result) {
            Ok(outcome) => {
                if outcome.changed {
                    let playback = &self.playback;
                    self.menu
                        .snapshot_replaced(self.sync.snapshot(), |url| playback.is_running(url));
                }
                Ok(Some(outcome))
            }
            Err(err) if startup && !self.menu.is_active() => {
                Err(err.context("load subscription feed"))
            }
            Err(err) => {
                debug_log(format!("sync: refresh failed: {err:#}"));
                self.status = Some(format!("Refresh failed: {err:#}"));
                Ok(None)
            }
        }
    }

    /// Acts on the current selection: toggles playback for a row or the
    /// detail item, or opens its URL.
    pub fn activate(&mut self) {
        let Some(intent) = self.menu.select(self.sync.snapshot()) else {
            return;
        };
        match intent {
            Intent::Toggle(item) => match self.playback.toggle(&item) {
                Ok(Toggle::Started { .. }) => {
                    self.menu.playback_changed(self.sync.snapshot(), &item.url, true);
                    self.status = Some(format!("Playing {}", item.title));
                }
                Ok(Toggle::Stopping { .. }) => {
                    self.menu.playback_changed(self.sync.snapshot(), &item.url, false);
                    self.status = Some(format!("Stopped {}", item.title));
                }
                Err(err) => {
                    self.status = Some(format!("Playback failed: {err}"));
                }
            },
            Intent::Open(url) => match self.opener.open(&url) {
                Ok(()) => self.status = Some(format!("Opened {url}")),
                Err(err) => {
                    debug_log(format!("ui: {err:#}"));
                    self.status = Some(format!("Could not open {url}: {err:#}"));
                }
            },
        }
    }

    pub fn forward(&mut self) -> bool {
        self.menu.forward(self.sync.snapshot())
    }

    pub fn back(&mut self) -> bool {
        let playback = &self.playback;
        self.menu
            .back(self.sync.snapshot(), |url| playback.is_running(url))
    }

    pub fn up(&mut self) {
        self.menu.move_up();
    }

    pub fn down(&mut self) {
        self.menu.move_down();
    }

    pub fn jump_to(&mut self, index: usize) {
        self.menu.jump_to(index);
    }

    pub fn resize(&mut self, viewport: Viewport) {
        let playback = &self.playback;
        self.menu
            .resize(viewport, self.sync.snapshot(), |url| playback.is_running(url));
    }

    /// Terminates every player. Called once on quit.
    pub fn shutdown(&mut self) {
        self.playback.stop_all();
    }
}
