use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use subtube::data::{FeedSource, Item, SessionToken};
use subtube::event::AppEvent;
use subtube::menu::{Indicators, Menu, Viewport};
use subtube::parser::Parser;
use subtube::process::ProcessTerminator;
use subtube::state::{AppState, UrlOpener};
use subtube::storage::{KeyValueStore, MemoryStore, SNAPSHOT_KEY};
use subtube::sync::{fingerprint, SyncEngine, SyncWorker};
use subtube::video::{Launcher, PlaybackError, PlaybackSupervisor};

const BASE: &str = "https://www.youtube.com";

const TWO_VIDEOS: &str = r#"<html><body>
<div class="yt-lockup"><a href="/watch?v=a" title="Title A">Title A</a></div>
<div class="yt-lockup"><a href="/watch?v=b" title="Title B">Title B</a></div>
</body></html>"#;

struct StaticFeed {
    pages: Mutex<Vec<String>>,
    calls: Mutex<usize>,
}

impl StaticFeed {
    fn new(html: &str) -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(vec![html.to_string()]),
            calls: Mutex::new(0),
        })
    }
}

impl FeedSource for StaticFeed {
    fn fetch_pages(&self, _token: &SessionToken, _visible_rows: usize) -> Result<Vec<String>> {
        *self.calls.lock() += 1;
        Ok(self.pages.lock().clone())
    }
}

#[derive(Default)]
struct FakeLauncher {
    spawned: Mutex<Vec<String>>,
}

struct SharedLauncher(Arc<FakeLauncher>);

impl Launcher for SharedLauncher {
    fn launch(&self, url: &str, _events: Sender<AppEvent>) -> Result<u32, PlaybackError> {
        let mut spawned = self.0.spawned.lock();
        spawned.push(url.to_string());
        Ok(4000 + spawned.len() as u32)
    }
}

#[derive(Default)]
struct FakeTerminator {
    killed: Mutex<Vec<u32>>,
}

struct SharedTerminator(Arc<FakeTerminator>);

impl ProcessTerminator for SharedTerminator {
    fn terminate_tree(&self, pid: u32) {
        self.0.killed.lock().push(pid);
    }
}

struct NoBrowser;

impl UrlOpener for NoBrowser {
    fn open(&self, _url: &str) -> Result<()> {
        Ok(())
    }
}

struct Harness {
    state: AppState,
    store: Arc<MemoryStore>,
    worker: SyncWorker,
    events: Receiver<AppEvent>,
    launcher: Arc<FakeLauncher>,
    terminator: Arc<FakeTerminator>,
}

impl Harness {
    fn new(feed: Arc<StaticFeed>) -> Self {
        Self::with_store(feed, Arc::new(MemoryStore::new()))
    }

    fn with_store(feed: Arc<StaticFeed>, store: Arc<MemoryStore>) -> Self {
        let (tx, rx) = unbounded();
        let launcher = Arc::new(FakeLauncher::default());
        let terminator = Arc::new(FakeTerminator::default());
        let supervisor = PlaybackSupervisor::new(
            Box::new(SharedLauncher(launcher.clone())),
            Box::new(SharedTerminator(terminator.clone())),
            tx.clone(),
        );
        let menu = Menu::new(
            Indicators::default(),
            Viewport {
                width: 80,
                height: 24,
            },
        );
        let state = AppState::new(
            SyncEngine::cold_start(store.clone()),
            supervisor,
            menu,
            Box::new(NoBrowser),
        );
        let worker = SyncWorker::new(
            feed,
            Arc::new(Parser::new(BASE)),
            SessionToken::new("SID=1; HSID=2; SSID=3; LOGIN_INFO=4"),
            tx,
        );
        Self {
            state,
            store,
            worker,
            events: rx,
            launcher,
            terminator,
        }
    }

    /// Runs one background cycle to completion and applies its result.
    fn sync(&mut self) -> Option<subtube::sync::SyncOutcome> {
        assert!(self.state.request_sync(&self.worker));
        loop {
            let event = self
                .events
                .recv_timeout(Duration::from_secs(5))
                .expect("sync result");
            let is_sync = matches!(event, AppEvent::SyncFetched(_));
            let outcome = self.state.handle_event(event).expect("apply event");
            if is_sync {
                return outcome;
            }
        }
    }

    fn drain(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.state.handle_event(event).expect("apply event");
        }
    }
}

fn watch(id: &str) -> String {
    format!("{BASE}/watch?v={id}")
}

#[test]
fn first_cycle_populates_cache_and_list() {
    let mut harness = Harness::new(StaticFeed::new(TWO_VIDEOS));
    let outcome = harness.sync().expect("outcome");
    assert!(outcome.changed);

    let snapshot = harness.state.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].url, watch("a"));
    assert_eq!(snapshot[1].title, "Title B");

    let expected = fingerprint(&[Item::new(watch("a"), ""), Item::new(watch("b"), "")]);
    assert_eq!(harness.state.sync().fingerprint(), Some(&expected));

    assert_eq!(harness.store.write_count(), 2);
    assert!(harness.store.get(SNAPSHOT_KEY).unwrap().is_some());

    let rows = harness.state.menu().rows();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| !row.playing && row.label.starts_with(" ◯ ")));
    assert_eq!(harness.state.menu().render_count(), 1);
}

#[test]
fn identical_cycle_neither_writes_nor_renders() {
    let mut harness = Harness::new(StaticFeed::new(TWO_VIDEOS));
    harness.sync();
    let cached = harness.store.get(SNAPSHOT_KEY).unwrap();
    let writes = harness.store.write_count();
    let renders = harness.state.menu().render_count();

    let outcome = harness.sync().expect("outcome");
    assert!(!outcome.changed);
    assert_eq!(harness.store.write_count(), writes);
    assert_eq!(harness.store.get(SNAPSHOT_KEY).unwrap(), cached);
    assert_eq!(harness.state.menu().render_count(), renders);
}

#[test]
fn restart_shows_cached_list_before_network() {
    let store = Arc::new(MemoryStore::new());
    {
        let mut harness = Harness::with_store(StaticFeed::new(TWO_VIDEOS), store.clone());
        harness.sync();
    }
    let harness = Harness::with_store(StaticFeed::new("<html></html>"), store);
    assert_eq!(harness.state.menu().rows().len(), 2);
    assert!(!harness.state.is_waiting_for_first_sync());
}

#[test]
fn only_one_cycle_runs_at_a_time() {
    let feed = StaticFeed::new(TWO_VIDEOS);
    let mut harness = Harness::new(feed.clone());
    assert!(harness.state.request_sync(&harness.worker));
    assert!(!harness.state.request_sync(&harness.worker));
    let event = harness
        .events
        .recv_timeout(Duration::from_secs(5))
        .expect("sync result");
    harness.state.handle_event(event).unwrap();
    assert_eq!(*feed.calls.lock(), 1);
    assert!(!harness.state.sync().is_in_flight());
}

#[test]
fn selecting_a_row_flips_indicator_until_player_exits() {
    let mut harness = Harness::new(StaticFeed::new(TWO_VIDEOS));
    harness.sync();

    harness.state.activate();
    assert!(harness.state.menu().rows()[0].playing);
    assert!(harness.state.menu().rows()[0].label.starts_with(" ◉ "));
    assert!(!harness.state.menu().rows()[1].playing);
    harness.drain();
    assert!(harness.state.menu().rows()[0].playing);

    let exit = || AppEvent::PlaybackStopped {
        url: watch("a"),
        pid: Some(4001),
    };
    harness.state.handle_event(exit()).unwrap();
    assert!(!harness.state.menu().rows()[0].playing);
    harness.state.handle_event(exit()).unwrap();
    assert!(!harness.state.menu().rows()[0].playing);
    assert_eq!(harness.state.playback().running_count(), 0);
}

#[test]
fn rapid_double_toggle_spawns_once() {
    let mut harness = Harness::new(StaticFeed::new(TWO_VIDEOS));
    harness.sync();

    harness.state.activate();
    harness.state.activate();
    assert_eq!(harness.launcher.spawned.lock().len(), 1);
    assert_eq!(*harness.terminator.killed.lock(), vec![4001]);
    assert!(!harness.state.menu().rows()[0].playing);

    harness
        .state
        .handle_event(AppEvent::PlaybackStopped {
            url: watch("a"),
            pid: Some(4001),
        })
        .unwrap();
    assert!(!harness.state.playback().is_running(&watch("a")));
}

#[test]
fn exit_for_url_missing_from_snapshot_is_dropped() {
    let mut harness = Harness::new(StaticFeed::new(TWO_VIDEOS));
    harness.sync();
    harness
        .state
        .handle_event(AppEvent::PlaybackStopped {
            url: watch("zzz"),
            pid: Some(1),
        })
        .unwrap();
    assert!(harness.state.menu().rows().iter().all(|row| !row.playing));
}

#[test]
fn detail_round_trip_keeps_selection() {
    let mut harness = Harness::new(StaticFeed::new(TWO_VIDEOS));
    harness.sync();
    harness.state.down();
    assert!(harness.state.forward());
    assert_eq!(
        harness.state.menu().detail_item().map(|item| item.url.clone()),
        Some(watch("b"))
    );
    assert!(harness.state.back());
    assert_eq!(harness.state.menu().selected(), 1);
}

#[test]
fn quitting_stops_every_player() {
    let mut harness = Harness::new(StaticFeed::new(TWO_VIDEOS));
    harness.sync();
    harness.state.activate();
    harness.state.down();
    harness.state.activate();
    harness.state.shutdown();
    let mut killed = harness.terminator.killed.lock().clone();
    killed.sort_unstable();
    assert_eq!(killed, vec![4001, 4002]);
}
