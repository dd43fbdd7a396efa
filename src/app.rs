use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Sender};

use crate::auth::{self, CookieCredentialProvider, CredentialProvider, SystemClipboard};
use crate::config::{self, Config};
use crate::data::FeedSource;
use crate::debug::debug_log;
use crate::event::AppEvent;
use crate::feed;
use crate::menu::{Indicators, Menu, Viewport};
use crate::parser::Parser;
use crate::process::SystemTerminator;
use crate::state::{AppState, BrowserOpener};
use crate::storage::{self, KeyValueStore, MemoryStore};
use crate::sync::{self, SyncEngine, SyncWorker};
use crate::ui;
use crate::video::{PlaybackSupervisor, StreamLauncher};

/// Command-line adjustments applied on top of the loaded config.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub quality: Option<String>,
    pub clear_cache: bool,
}

pub fn run(opts: RunOptions) -> Result<()> {
    let mut cfg = config::load(config::LoadOptions::default()).context("load config")?;
    if let Some(quality) = opts.quality {
        cfg.player.quality = quality;
    }

    let store = open_store();
    if opts.clear_cache {
        sync::clear_cache(store.as_ref()).context("clear cached feed")?;
        debug_log("app: cleared cached feed");
    }

    let (events_tx, events_rx) = unbounded();
    let (width, height) = crossterm::terminal::size().unwrap_or((80, 24));
    let state = startup_state(
        &cfg,
        store,
        events_tx.clone(),
        ui::viewport_for(width, height),
    );

    let cookie_path = auth::default_cookie_path().context("resolve cookie file location")?;
    let mut credentials = CookieCredentialProvider::new(cookie_path, SystemClipboard);
    let token = credentials.session_token()?;

    let client = feed::Client::new(feed::ClientConfig {
        base_url: cfg.feed.base_url.clone(),
        user_agent: user_agent(&cfg),
        page_size: cfg.feed.page_size,
        timeout: cfg.feed.timeout,
        http_client: None,
    })
    .context("create feed client")?;
    let source: Arc<dyn FeedSource> = Arc::new(client);
    let parser = Arc::new(Parser::new(&cfg.feed.base_url));
    let worker = SyncWorker::new(source, parser, token, events_tx);

    let mut model = ui::Model::new(ui::Options {
        state,
        worker,
        events: events_rx,
        ui: cfg.ui.clone(),
        refresh_interval: cfg.sync.refresh_interval,
    });
    model.run()
}

/// Seeds the menu from the cached snapshot. Nothing here touches
/// credentials or the network.
fn startup_state(
    cfg: &Config,
    store: Arc<dyn KeyValueStore>,
    events: Sender<AppEvent>,
    viewport: Viewport,
) -> AppState {
    let supervisor = PlaybackSupervisor::new(
        Box::new(StreamLauncher::from_config(&cfg.player)),
        Box::new(SystemTerminator),
        events,
    );
    let menu = Menu::new(
        Indicators {
            on: cfg.ui.indicator_on.clone(),
            off: cfg.ui.indicator_off.clone(),
        },
        viewport,
    );
    AppState::new(
        SyncEngine::cold_start(store),
        supervisor,
        menu,
        Box::new(BrowserOpener),
    )
}

/// The persistent cache is optional: without it every start begins empty.
fn open_store() -> Arc<dyn KeyValueStore> {
    match storage::Store::open(storage::Options::default()) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            debug_log(format!("app: using in-memory cache: {err:#}"));
            Arc::new(MemoryStore::new())
        }
    }
}

fn user_agent(cfg: &Config) -> String {
    if cfg.feed.user_agent.trim().is_empty() {
        format!("subtube/{}", crate::VERSION)
    } else {
        cfg.feed.user_agent.clone()
    }
}
