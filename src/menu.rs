//! List and detail views over the current snapshot.
//!
//! The menu holds no terminal handle. It produces row labels and detail
//! lines sized for a viewport, and the UI draws whatever it reports.

use crate::data::{index_of, Item};
use crate::text::{display_width, truncate, wrap};

pub const NO_DESCRIPTION: &str = "No description available.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    List,
    Detail(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailAction {
    Playback,
    OpenUrl,
}

/// What the caller should do after a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Toggle(Item),
    Open(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u16,
    pub height: u16,
}

impl Viewport {
    /// Usable columns for row text.
    pub fn col_max(&self) -> usize {
        usize::from(self.width.saturating_sub(4))
    }

    /// Rows available for list entries.
    pub fn row_max(&self) -> usize {
        usize::from(self.height.saturating_sub(2))
    }
}

#[derive(Debug, Clone)]
pub struct Indicators {
    pub on: String,
    pub off: String,
}

impl Default for Indicators {
    fn default() -> Self {
        Self {
            on: " ◉ ".into(),
            off: " ◯ ".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub playing: bool,
    pub label: String,
    body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailLine {
    pub text: String,
    pub action: Option<DetailAction>,
}

impl DetailLine {
    fn text<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            action: None,
        }
    }

    fn action<S: Into<String>>(text: S, action: DetailAction) -> Self {
        Self {
            text: text.into(),
            action: Some(action),
        }
    }
}

#[derive(Debug, Clone)]
struct DetailState {
    item: Item,
    playing: bool,
    action: DetailAction,
}

pub struct Menu {
    indicators: Indicators,
    viewport: Viewport,
    mode: Mode,
    selected: usize,
    rows: Vec<Row>,
    detail: Option<DetailState>,
    list_stale: bool,
    renders: usize,
}

impl Menu {
    pub fn new(indicators: Indicators, viewport: Viewport) -> Self {
        Self {
            indicators,
            viewport,
            mode: Mode::List,
            selected: 0,
            rows: Vec::new(),
            detail: None,
            list_stale: false,
            renders: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// True once a snapshot with at least one item has been rendered.
    pub fn is_active(&self) -> bool {
        !self.rows.is_empty() || self.detail.is_some()
    }

    /// Number of full list renders so far.
    pub fn render_count(&self) -> usize {
        self.renders
    }

    pub fn is_list_stale(&self) -> bool {
        self.list_stale
    }

    /// Rebuilds every row from `items`, keeping the selection cursor.
    pub fn render_list(&mut self, items: &[Item], running: impl Fn(&str) -> bool) {
        let visible = items.len().min(self.viewport.row_max());
        self.rows = items
            .iter()
            .take(visible)
            .enumerate()
            .map(|(idx, item)| {
                let mut row = Row {
                    playing: running(&item.url),
                    label: String::new(),
                    body: row_body(idx, item),
                };
                row.label = self.label_for(&row);
                row
            })
            .collect();
        self.selected = self.selected.min(self.rows.len().saturating_sub(1));
        self.list_stale = false;
        self.renders += 1;
    }

    /// A new snapshot arrived. Rendered immediately in the list view; in
    /// the detail view the list is only marked stale so the user is not
    /// disrupted. Returns whether a render happened.
    pub fn snapshot_replaced(&mut self, items: &[Item], running: impl Fn(&str) -> bool) -> bool {
        match self.mode {
            Mode::List => {
                self.render_list(items, running);
                true
            }
            Mode::Detail(_) => {
                self.list_stale = true;
                false
            }
        }
    }

    pub fn resize(&mut self, viewport: Viewport, items: &[Item], running: impl Fn(&str) -> bool) {
        if viewport == self.viewport {
            return;
        }
        self.viewport = viewport;
        match self.mode {
            Mode::List => self.render_list(items, running),
            Mode::Detail(_) => self.list_stale = true,
        }
    }

    fn label_for(&self, row: &Row) -> String {
        let indicator = if row.playing {
            &self.indicators.on
        } else {
            &self.indicators.off
        };
        // The indicator glyph renders as a single cell but is counted as
        // wide, so the budget is widened by the difference.
        let slack = display_width(indicator).saturating_sub(indicator.chars().count());
        let label = format!("{indicator}{}", row.body);
        truncate(&label, self.viewport.col_max() + slack).to_string()
    }

    fn set_row_playing(&mut self, index: usize, playing: bool) {
        let Some(row) = self.rows.get(index) else {
            return;
        };
        if row.playing == playing {
            return;
        }
        let mut row = row.clone();
        row.playing = playing;
        row.label = self.label_for(&row);
        self.rows[index] = row;
    }

    pub fn move_up(&mut self) {
        match self.mode {
            Mode::List => self.selected = self.selected.saturating_sub(1),
            Mode::Detail(_) => self.set_detail_action(DetailAction::Playback),
        }
    }

    pub fn move_down(&mut self) {
        match self.mode {
            Mode::List => {
                if self.selected + 1 < self.rows.len() {
                    self.selected += 1;
                }
            }
            Mode::Detail(_) => self.set_detail_action(DetailAction::OpenUrl),
        }
    }

    pub fn jump_to(&mut self, index: usize) {
        if self.mode == Mode::List && index < self.rows.len() {
            self.selected = index;
        }
    }

    fn set_detail_action(&mut self, action: DetailAction) {
        if let Some(detail) = self.detail.as_mut() {
            detail.action = action;
        }
    }

    pub fn detail_action(&self) -> Option<DetailAction> {
        self.detail.as_ref().map(|detail| detail.action)
    }

    pub fn detail_item(&self) -> Option<&Item> {
        self.detail.as_ref().map(|detail| &detail.item)
    }

    /// Resolves the current selection into an intent. The detail view acts
    /// on the item it was opened with, even if the snapshot changed since.
    pub fn select(&self, items: &[Item]) -> Option<Intent> {
        match self.mode {
            Mode::List => {
                if self.selected < self.rows.len() {
                    items.get(self.selected).cloned().map(Intent::Toggle)
                } else {
                    None
                }
            }
            Mode::Detail(_) => {
                let detail = self.detail.as_ref()?;
                match detail.action {
                    DetailAction::Playback => Some(Intent::Toggle(detail.item.clone())),
                    DetailAction::OpenUrl => Some(Intent::Open(detail.item.url.clone())),
                }
            }
        }
    }

    /// Enters the detail view for the selected row.
    pub fn forward(&mut self, items: &[Item]) -> bool {
        if self.mode != Mode::List {
            return false;
        }
        let Some(item) = items.get(self.selected) else {
            return false;
        };
        let playing = self
            .rows
            .get(self.selected)
            .is_some_and(|row| row.playing);
        self.detail = Some(DetailState {
            item: item.clone(),
            playing,
            action: DetailAction::Playback,
        });
        self.mode = Mode::Detail(self.selected);
        true
    }

    /// Returns to the list on the row that was selected before, rendering
    /// it first if a sync landed while the detail view was open.
    pub fn back(&mut self, items: &[Item], running: impl Fn(&str) -> bool) -> bool {
        let Mode::Detail(index) = self.mode else {
            return false;
        };
        self.mode = Mode::List;
        self.detail = None;
        self.selected = index;
        if self.list_stale {
            self.render_list(items, running);
        } else {
            self.selected = self.selected.min(self.rows.len().saturating_sub(1));
        }
        true
    }

    /// Applies a playback state change for `url` to whichever view shows it.
    /// Unknown URLs are ignored.
    pub fn playback_changed(&mut self, items: &[Item], url: &str, playing: bool) {
        if let Some(detail) = self.detail.as_mut() {
            if detail.item.url == url {
                detail.playing = playing;
            }
        }
        if self.list_stale {
            return;
        }
        if let Some(index) = index_of(items, url) {
            self.set_row_playing(index, playing);
        }
    }

    /// Lines of the detail view, padded so the last one sits on the bottom
    /// row of the viewport.
    pub fn detail_lines(&self) -> Vec<DetailLine> {
        let Some(detail) = self.detail.as_ref() else {
            return Vec::new();
        };
        let item = &detail.item;
        let width = self.viewport.col_max().max(1);
        let mut lines = Vec::new();

        lines.extend(wrap(&item.title, width).into_iter().map(DetailLine::text));
        lines.push(DetailLine::text(""));

        let mut uploader = item.username.clone().unwrap_or_else(|| "Unknown uploader".into());
        if item.verified == Some(true) {
            uploader.push_str(" (verified)");
        }
        lines.push(DetailLine::text(truncate(&uploader, width)));
        lines.push(DetailLine::text(""));

        let description = item
            .description
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or(NO_DESCRIPTION);
        lines.extend(wrap(description, width).into_iter().map(DetailLine::text));
        lines.push(DetailLine::text(""));

        lines.push(DetailLine::text(truncate(&item.url, width)));
        lines.push(DetailLine::text(""));

        let playback = if detail.playing { "stop" } else { "play" };
        lines.push(DetailLine::action(playback, DetailAction::Playback));
        lines.push(DetailLine::action("open in browser", DetailAction::OpenUrl));

        let footer = footer_text(item);
        let total = usize::from(self.viewport.height);
        let padding = total.saturating_sub(lines.len() + 1);
        lines.extend(std::iter::repeat_with(|| DetailLine::text("")).take(padding));
        lines.push(DetailLine::text(truncate(&footer, width)));
        lines
    }
}

fn row_body(index: usize, item: &Item) -> String {
    match item.duration.as_deref().filter(|d| !d.is_empty()) {
        Some(duration) => format!("{:02}. [{}] {}", index + 1, duration, item.title),
        None => format!("{:02}. {}", index + 1, item.title),
    }
}

fn footer_text(item: &Item) -> String {
    let parts: Vec<&str> = [item.published_time.as_deref(), item.views.as_deref()]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect();
    parts.join(" · ")
}
