use std::fmt;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use sha2::{Digest, Sha256};

use crate::data::{FeedSource, Item, SessionToken, Snapshot};
use crate::debug::debug_log;
use crate::event::AppEvent;
use crate::parser::Parser;
use crate::storage::{KeyValueStore, FINGERPRINT_KEY, SNAPSHOT_KEY};

/// Digest over the ordered item URLs, used only to detect feed changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn fingerprint(items: &[Item]) -> Fingerprint {
    let mut hasher = Sha256::new();
    for item in items {
        hasher.update((item.url.len() as u64).to_le_bytes());
        hasher.update(item.url.as_bytes());
    }
    Fingerprint(hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub changed: bool,
}

/// Owns the live snapshot and keeps it, the persisted cache and the
/// persisted fingerprint consistent with each other.
pub struct SyncEngine {
    store: Arc<dyn KeyValueStore>,
    snapshot: Snapshot,
    fingerprint: Option<Fingerprint>,
    in_flight: bool,
}

impl SyncEngine {
    /// Loads the cached snapshot and fingerprint. Unreadable cache entries
    /// are treated as absent so the next cycle rewrites them.
    pub fn cold_start(store: Arc<dyn KeyValueStore>) -> Self {
        let snapshot = match load_snapshot(store.as_ref()) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                debug_log(format!("sync: ignoring cached snapshot: {err:#}"));
                None
            }
        };
        let fingerprint = match &snapshot {
            Some(items) => match store.get(FINGERPRINT_KEY) {
                Ok(Some(raw)) => Some(Fingerprint(String::from_utf8_lossy(&raw).into_owned())),
                Ok(None) => Some(fingerprint(items)),
                Err(err) => {
                    debug_log(format!("sync: ignoring cached fingerprint: {err:#}"));
                    Some(fingerprint(items))
                }
            },
            None => None,
        };
        Self {
            store,
            snapshot: snapshot.unwrap_or_default(),
            fingerprint,
            in_flight: false,
        }
    }

    pub fn snapshot(&self) -> &[Item] {
        &self.snapshot
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Claims the single in-flight slot. Returns false when a cycle is
    /// already outstanding.
    pub fn try_begin(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Completes the outstanding cycle. Failures leave snapshot, fingerprint
    /// and cache untouched; an unchanged fingerprint writes nothing.
    pub fn finish(&mut self, fetched: Result<Vec<Item>>) -> Result<SyncOutcome> {
        self.in_flight = false;
        let items = fetched?;
        let next = fingerprint(&items);
        if self.fingerprint.as_ref() == Some(&next) {
            debug_log(format!("sync: unchanged ({next})"));
            return Ok(SyncOutcome { changed: false });
        }

        let encoded = serde_json::to_vec_pretty(&items).context("sync: encode snapshot")?;
        self.store.set_many(&[
            (SNAPSHOT_KEY, encoded.as_slice()),
            (FINGERPRINT_KEY, next.as_str().as_bytes()),
        ])?;
        debug_log(format!("sync: {} items, fingerprint {next}", items.len()));
        self.snapshot = items;
        self.fingerprint = Some(next);
        Ok(SyncOutcome { changed: true })
    }
}

fn load_snapshot(store: &dyn KeyValueStore) -> Result<Option<Snapshot>> {
    let Some(raw) = store.get(SNAPSHOT_KEY)? else {
        return Ok(None);
    };
    let items: Snapshot = serde_json::from_slice(&raw).context("sync: decode cached snapshot")?;
    Ok(Some(items))
}

pub fn clear_cache(store: &dyn KeyValueStore) -> Result<()> {
    store.remove(SNAPSHOT_KEY)?;
    store.remove(FINGERPRINT_KEY)?;
    Ok(())
}

/// Fetches all pages, concatenates them in page order and parses the result
/// as one document.
pub fn fetch_items(
    source: &dyn FeedSource,
    parser: &Parser,
    token: &SessionToken,
    visible_rows: usize,
) -> Result<Vec<Item>> {
    let pages = source
        .fetch_pages(token, visible_rows)
        .context("fetch subscription feed")?;
    let html = pages.concat();
    Ok(parser.parse(&html))
}

/// Everything a background cycle needs, shared between cycles.
#[derive(Clone)]
pub struct SyncWorker {
    source: Arc<dyn FeedSource>,
    parser: Arc<Parser>,
    token: SessionToken,
    events: Sender<AppEvent>,
}

impl SyncWorker {
    pub fn new(
        source: Arc<dyn FeedSource>,
        parser: Arc<Parser>,
        token: SessionToken,
        events: Sender<AppEvent>,
    ) -> Self {
        Self {
            source,
            parser,
            token,
            events,
        }
    }

    /// Runs one fetch on a worker thread and posts the result as
    /// `AppEvent::SyncFetched`.
    pub fn spawn_cycle(&self, visible_rows: usize) {
        let worker = self.clone();
        thread::spawn(move || {
            let result = fetch_items(
                worker.source.as_ref(),
                &worker.parser,
                &worker.token,
                visible_rows,
            );
            let _ = worker.events.send(AppEvent::SyncFetched(result));
        });
    }
}
