use std::io::{self, Stdout};
use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::Receiver;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Text};
use ratatui::widgets::{Block, List, ListItem, ListState, Padding, Paragraph};
use ratatui::{Frame, Terminal};

use crate::config::UIConfig;
use crate::debug::debug_log;
use crate::event::AppEvent;
use crate::menu::{Mode, Viewport};
use crate::state::AppState;
use crate::sync::SyncWorker;

pub const LOADING_TEXT: &str = "Retrieving list of videos ...";
pub const EMPTY_TEXT: &str = "No videos in your subscription feed.";

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const STATUS_LINES: u16 = 1;
const NUMERIC_JUMP_TIMEOUT: Duration = Duration::from_millis(800);

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

struct NumericJump {
    value: usize,
    last_input: Instant,
}

#[derive(Debug, Clone, Copy)]
struct Palette {
    fg: Option<Color>,
    bg: Option<Color>,
}

impl Palette {
    fn from_config(cfg: &UIConfig) -> Self {
        Self {
            fg: parse_color(cfg.fg.as_deref()),
            bg: parse_color(cfg.bg.as_deref()),
        }
    }

    fn base(&self) -> Style {
        let mut style = Style::default();
        if let Some(fg) = self.fg {
            style = style.fg(fg);
        }
        if let Some(bg) = self.bg {
            style = style.bg(bg);
        }
        style
    }

    fn selected(&self) -> Style {
        self.base().add_modifier(Modifier::REVERSED)
    }
}

fn parse_color(name: Option<&str>) -> Option<Color> {
    let name = name?.trim();
    if name.is_empty() {
        return None;
    }
    match Color::from_str(name) {
        Ok(color) => Some(color),
        Err(_) => {
            debug_log(format!("ui: unknown colour {name:?}, using terminal default"));
            None
        }
    }
}

/// Size the menu lays itself out for: the terminal minus the status line.
pub fn viewport_for(width: u16, height: u16) -> Viewport {
    Viewport {
        width,
        height: height.saturating_sub(STATUS_LINES),
    }
}

pub struct Options {
    pub state: AppState,
    pub worker: SyncWorker,
    pub events: Receiver<AppEvent>,
    pub ui: UIConfig,
    pub refresh_interval: Option<Duration>,
}

pub struct Model {
    state: AppState,
    worker: SyncWorker,
    events: Receiver<AppEvent>,
    palette: Palette,
    refresh_interval: Option<Duration>,
    last_sync: Instant,
    spinner: Spinner,
    numeric_jump: Option<NumericJump>,
    needs_redraw: bool,
}

impl Model {
    pub fn new(opts: Options) -> Self {
        Self {
            state: opts.state,
            worker: opts.worker,
            events: opts.events,
            palette: Palette::from_config(&opts.ui),
            refresh_interval: opts.refresh_interval,
            last_sync: Instant::now(),
            spinner: Spinner::new(),
            numeric_jump: None,
            needs_redraw: true,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);
        self.state.shutdown();

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let size = terminal.size()?;
        self.state.resize(viewport_for(size.width, size.height));
        self.start_sync();

        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.poll_async()? {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        if self.handle_key(key) {
                            break;
                        }
                    }
                    Event::Resize(width, height) => {
                        self.state.resize(viewport_for(width, height));
                        self.mark_dirty();
                    }
                    _ => {}
                }
            }

            if self.poll_async()? {
                self.mark_dirty();
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.state.sync().is_in_flight() {
                    if self.spinner.advance() {
                        self.mark_dirty();
                    }
                } else {
                    self.spinner.reset();
                }
                self.refresh_if_due();
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn start_sync(&mut self) {
        if self.state.request_sync(&self.worker) {
            self.last_sync = Instant::now();
            self.mark_dirty();
        }
    }

    fn refresh_if_due(&mut self) {
        let Some(interval) = self.refresh_interval else {
            return;
        };
        if self.state.sync().is_in_flight() || self.last_sync.elapsed() < interval {
            return;
        }
        debug_log("sync: periodic refresh");
        self.start_sync();
    }

    /// Drains every pending background event. Fails only for a fatal
    /// startup sync error.
    fn poll_async(&mut self) -> Result<bool> {
        let mut changed = false;
        while let Ok(event) = self.events.try_recv() {
            if let Some(url) = event.url() {
                debug_log(format!("ui: event for {url}: {event:?}"));
            }
            self.state.handle_event(event)?;
            changed = true;
        }
        Ok(changed)
    }

    /// Returns true when the user asked to quit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return true;
        }
        let in_detail = matches!(self.state.menu().mode(), Mode::Detail(_));
        let mut dirty = true;
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Esc if !in_detail => return true,
            KeyCode::Esc | KeyCode::Left | KeyCode::Char('h') => {
                dirty = self.state.back();
            }
            KeyCode::Right | KeyCode::Char('l') => {
                dirty = self.state.forward();
            }
            KeyCode::Up | KeyCode::Char('k') => self.state.up(),
            KeyCode::Down | KeyCode::Char('j') => self.state.down(),
            KeyCode::Enter | KeyCode::Char(' ') => self.state.activate(),
            KeyCode::Char('r') => {
                if self.state.sync().is_in_flight() {
                    self.state.set_status("Refresh already in progress.");
                } else {
                    self.state.set_status("Refreshing subscriptions…");
                    self.start_sync();
                }
            }
            KeyCode::Char(ch) if ch.is_ascii_digit() && !in_detail => {
                self.jump_to_digit(ch);
            }
            _ => dirty = false,
        }
        if dirty {
            self.mark_dirty();
        }
        false
    }

    fn jump_to_digit(&mut self, ch: char) {
        let Some(digit) = ch.to_digit(10) else {
            return;
        };
        let digit = digit as usize;
        let now = Instant::now();
        let value = match &self.numeric_jump {
            Some(jump) if now.duration_since(jump.last_input) <= NUMERIC_JUMP_TIMEOUT => {
                jump.value.saturating_mul(10).saturating_add(digit)
            }
            _ if digit == 0 => 10,
            _ => digit,
        };
        self.numeric_jump = Some(NumericJump {
            value,
            last_input: now,
        });

        let rows = self.state.menu().rows().len();
        if rows == 0 {
            return;
        }
        let target = value.saturating_sub(1);
        if target < rows {
            self.state.jump_to(target);
            self.state.clear_status();
        } else {
            self.state
                .set_status(format!("Only {rows} video{} listed.", if rows == 1 { "" } else { "s" }));
        }
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(self.palette.base()), full);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(STATUS_LINES)])
            .split(full);

        if !self.state.menu().is_active() {
            self.draw_placeholder(frame, layout[0]);
        } else {
            match self.state.menu().mode() {
                Mode::List => self.draw_list(frame, layout[0]),
                Mode::Detail(_) => self.draw_detail(frame, layout[0]),
            }
        }
        self.draw_status(frame, layout[1]);
    }

    fn draw_placeholder(&self, frame: &mut Frame<'_>, area: Rect) {
        let text = if self.state.is_waiting_for_first_sync() || self.state.sync().is_in_flight() {
            LOADING_TEXT
        } else {
            EMPTY_TEXT
        };
        let paragraph = Paragraph::new(text)
            .style(self.palette.base())
            .block(Block::default().padding(Padding::horizontal(2)));
        frame.render_widget(paragraph, area);
    }

    fn draw_list(&self, frame: &mut Frame<'_>, area: Rect) {
        let menu = self.state.menu();
        let items: Vec<ListItem> = menu
            .rows()
            .iter()
            .map(|row| ListItem::new(row.label.clone()))
            .collect();
        let list = List::new(items)
            .style(self.palette.base())
            .highlight_style(self.palette.selected())
            .block(Block::default().padding(Padding::new(2, 2, 1, 1)));
        let mut state = ListState::default();
        state.select(Some(menu.selected()));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_detail(&self, frame: &mut Frame<'_>, area: Rect) {
        let menu = self.state.menu();
        let active = menu.detail_action();
        let lines: Vec<Line> = menu
            .detail_lines()
            .into_iter()
            .map(|line| {
                let style = match line.action {
                    Some(action) if Some(action) == active => self.palette.selected(),
                    Some(_) => self.palette.base().add_modifier(Modifier::BOLD),
                    None => self.palette.base(),
                };
                Line::styled(line.text, style)
            })
            .collect();
        let paragraph = Paragraph::new(Text::from(lines))
            .style(self.palette.base())
            .block(Block::default().padding(Padding::horizontal(2)));
        frame.render_widget(paragraph, area);
    }

    fn draw_status(&self, frame: &mut Frame<'_>, area: Rect) {
        let message = self.state.status().unwrap_or_default();
        let text = if self.state.sync().is_in_flight() {
            format!("{} {}", self.spinner.frame(), message).trim().to_string()
        } else {
            message.to_string()
        };
        let line = Paragraph::new(text).style(self.palette.base().add_modifier(Modifier::DIM));
        frame.render_widget(line, area);
    }
}
