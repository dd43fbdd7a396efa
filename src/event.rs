use anyhow::Error;

use crate::data::Item;

/// Messages delivered to the UI thread by background workers.
#[derive(Debug)]
pub enum AppEvent {
    /// A player process was spawned and registered for `url`.
    PlaybackStarted { url: String, pid: u32 },
    /// The player for `url` is gone. `pid` is `None` when it never started.
    PlaybackStopped { url: String, pid: Option<u32> },
    /// The player reported the end of the stream but kept running.
    EndOfStream { url: String, pid: u32 },
    /// A sync worker finished fetching and parsing. Whether the list changed
    /// comes back as the `SyncOutcome` returned by `AppState::handle_event`.
    SyncFetched(Result<Vec<Item>, Error>),
}

impl AppEvent {
    pub fn url(&self) -> Option<&str> {
        match self {
            AppEvent::PlaybackStarted { url, .. }
            | AppEvent::PlaybackStopped { url, .. }
            | AppEvent::EndOfStream { url, .. } => Some(url),
            AppEvent::SyncFetched(_) => None,
        }
    }
}
