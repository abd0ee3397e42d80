use std::io::{self, Stdout};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, window_size, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Padding, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::wrap;
use unicode_width::UnicodeWidthStr;

use copypasta::{ClipboardContext, ClipboardProvider};

use crate::config::Config;
use crate::controller::{DominanceChange, Effects, FeedController, Jump};
use crate::data::{self, AuthorService, FeedService, VideoService};
use crate::feed::{FeedQuery, FetchRequest};
use crate::library::{self, AuthorSummary, FeedType, Video, VideosPage};
use crate::nav::{Location, NavigationCoordinator};
use crate::player::{spawn_inline_player, InlineSession, LaunchOptions};
use crate::session::SessionFlags;
use crate::visibility::Viewport;

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

/// Overlay descriptions are clipped to this many characters until expanded.
const DESCRIPTION_PREVIEW_CHARS: usize = 100;
/// Fraction of the remaining distance covered per animation tick.
const SCROLL_EASING: f64 = 0.35;

const TABS: [(FeedType, &str); 4] = [
    (FeedType::All, "All"),
    (FeedType::Liked, "Liked"),
    (FeedType::Favorite, "Favorites"),
    (FeedType::Following, "Following"),
];

const HELP_LINE: &str = "j/k scroll · space play · m mute · ←/→ seek · e expand · y share · q quit";

struct Spinner {
    index: usize,
    last_advance: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_advance: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        if self.last_advance.elapsed() >= Duration::from_millis(80) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_advance = Instant::now();
            return true;
        }
        false
    }

    fn reset(&mut self) {
        self.index = 0;
    }
}

enum AsyncResponse {
    Page {
        request: FetchRequest,
        result: Result<VideosPage>,
    },
    DeepLinkLookup {
        id: String,
        result: Result<Option<Video>>,
    },
    FollowedAuthors {
        result: Result<Vec<AuthorSummary>>,
    },
}

pub struct Options {
    pub config: Config,
    pub client: Arc<library::Client>,
    pub feed_service: Arc<dyn FeedService>,
    pub video_service: Arc<dyn VideoService>,
    pub author_service: Arc<dyn AuthorService>,
    pub location: Location,
    pub status_message: String,
}

pub struct Model {
    config: Config,
    client: Arc<library::Client>,
    feed_service: Arc<dyn FeedService>,
    video_service: Arc<dyn VideoService>,
    author_service: Arc<dyn AuthorService>,

    controller: FeedController,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,

    player: Option<InlineSession>,
    pending_player: Option<DominanceChange>,

    viewport: Viewport,
    video_area: Rect,
    progress_area: Rect,
    scroll_offset: f64,
    target_offset: f64,
    pending_observe: bool,

    followed_authors: Vec<AuthorSummary>,
    description_expanded: bool,
    status_message: String,
    status_since: Instant,
    spinner: Spinner,
    needs_redraw: bool,
}

impl Model {
    pub fn new(options: Options) -> Self {
        let Options {
            config,
            client,
            feed_service,
            video_service,
            author_service,
            location,
            status_message,
        } = options;

        let feed_type = location
            .segments()
            .next()
            .and_then(FeedType::from_path_segment)
            .unwrap_or(FeedType::All);
        let nav = NavigationCoordinator::new(feed_type.base_path(), location);
        let author_id = nav.location().query_value("authorId").map(str::to_string);
        let limit = if nav.has_deep_link() {
            config.feed.deep_link_limit
        } else {
            config.feed.page_size
        };
        let query = FeedQuery::new(feed_type)
            .with_author(author_id)
            .with_limit(limit);

        let (mut controller, initial_request) =
            FeedController::new(query, nav, SessionFlags::new());
        controller.set_steady_limit(config.feed.page_size);

        let (response_tx, response_rx) = unbounded();

        let mut model = Self {
            config,
            client,
            feed_service,
            video_service,
            author_service,
            controller,
            response_tx,
            response_rx,
            player: None,
            pending_player: None,
            viewport: Viewport::new(24),
            video_area: Rect::default(),
            progress_area: Rect::default(),
            scroll_offset: 0.0,
            target_offset: 0.0,
            pending_observe: false,
            followed_authors: Vec::new(),
            description_expanded: false,
            status_message,
            status_since: Instant::now(),
            spinner: Spinner::new(),
            needs_redraw: true,
        };
        match model.controller.pending_deep_link().map(str::to_string) {
            Some(id) => model.spawn_deep_link_fetch(initial_request, id),
            None => model.spawn_fetch(initial_request),
        }
        model.spawn_author_refresh();
        model
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        self.shutdown_player();
        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(60);

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }
            if self.pump_player_events() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }
            if let Some(change) = self.pending_player.take() {
                // The first page can land before the layout is known; the
                // player spawn was parked until an area existed.
                self.swap_player(change);
                self.mark_dirty();
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(8));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                self.set_status(format!("Error: {err:#}"));
                            }
                        }
                    }
                    Event::Mouse(mouse) => self.handle_mouse(mouse),
                    _ => {}
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                self.tick();
            }
        }

        Ok(())
    }

    fn tick(&mut self) {
        if self.animate_scroll() {
            self.pending_observe = true;
            self.mark_dirty();
        }
        if self.pending_observe {
            self.pending_observe = false;
            self.pump_observations();
        }

        if self.controller.store().is_loading() {
            if self.spinner.advance() {
                self.mark_dirty();
            }
        } else {
            self.spinner.reset();
        }

        if self.status_message != HELP_LINE
            && self.status_since.elapsed() >= self.config.ui.status_ttl
        {
            self.status_message = HELP_LINE.to_string();
            self.mark_dirty();
        }
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.status_since = Instant::now();
        self.mark_dirty();
    }

    // --- async plumbing -----------------------------------------------------

    fn spawn_fetch(&self, request: FetchRequest) {
        let service = self.feed_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.list_videos(&request.opts);
            let _ = tx.send(AsyncResponse::Page { request, result });
        });
    }

    /// Initial fetch for a deep-linked entry: pages are collected until the
    /// target id is present, since the server caps single requests well below
    /// the deep-link budget.
    fn spawn_deep_link_fetch(&self, request: FetchRequest, id: String) {
        let service = self.feed_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = data::collect_until_present(service.as_ref(), &request.opts, &id);
            let _ = tx.send(AsyncResponse::Page { request, result });
        });
    }

    fn spawn_deep_link_lookup(&self, id: String) {
        let service = self.video_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.get_video(&id);
            let _ = tx.send(AsyncResponse::DeepLinkLookup { id, result });
        });
    }

    fn spawn_author_refresh(&self) {
        let service = self.author_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.list_following();
            let _ = tx.send(AsyncResponse::FollowedAuthors { result });
        });
    }

    fn poll_async(&mut self) -> bool {
        let mut handled = false;
        while let Ok(response) = self.response_rx.try_recv() {
            handled = true;
            match response {
                AsyncResponse::Page { request, result } => match result {
                    Ok(page) => {
                        let effects = self.controller.apply_page(&request, page);
                        self.process_effects(effects);
                    }
                    Err(err) => {
                        if self.controller.apply_error(&request, format!("{err:#}")) {
                            self.set_status(format!("Load failed: {err:#} (r to retry)"));
                        }
                    }
                },
                AsyncResponse::DeepLinkLookup { id, result } => match result {
                    Ok(Some(_)) => {
                        self.set_status(format!(
                            "Video {id} exists but is outside this feed; showing latest clips."
                        ));
                    }
                    Ok(None) => {
                        self.set_status("Video not found; showing latest clips.");
                    }
                    Err(err) => {
                        self.set_status(format!("Video lookup failed: {err:#}"));
                    }
                },
                AsyncResponse::FollowedAuthors { result } => match result {
                    Ok(authors) => {
                        self.followed_authors = authors;
                    }
                    Err(err) => {
                        crate::debug::log(format!("author refresh failed: {err:#}"));
                    }
                },
            }
        }
        handled
    }

    fn process_effects(&mut self, effects: Effects) {
        let Effects {
            dominance,
            fetch,
            jump,
            deep_link_missing,
            location,
        } = effects;

        if let Some(request) = fetch {
            self.spawn_fetch(request);
        }
        if let Some(jump) = jump {
            self.apply_jump(jump);
        }
        if let Some(id) = deep_link_missing {
            self.spawn_deep_link_lookup(id);
        }
        if let Some(change) = dominance {
            self.swap_player(change);
        }
        if location.is_some() {
            self.mark_dirty();
        }
    }

    // --- scrolling and visibility ------------------------------------------

    fn apply_jump(&mut self, jump: Jump) {
        self.target_offset = self.viewport.offset_for(jump.index);
        if !jump.animated {
            self.scroll_offset = self.target_offset;
        }
        self.pending_observe = true;
        self.mark_dirty();
    }

    fn animate_scroll(&mut self) -> bool {
        let delta = self.target_offset - self.scroll_offset;
        if delta.abs() < 0.5 {
            if delta != 0.0 {
                self.scroll_offset = self.target_offset;
                return true;
            }
            return false;
        }
        let step = (delta * SCROLL_EASING).abs().max(1.0);
        self.scroll_offset += step.copysign(delta);
        true
    }

    fn pump_observations(&mut self) {
        let len = self.controller.store().len();
        if len == 0 {
            return;
        }
        let batch = self.viewport.observe(self.scroll_offset, len);
        let effects = self.controller.observe(&batch);
        self.process_effects(effects);
    }

    // --- playback ----------------------------------------------------------

    fn swap_player(&mut self, change: DominanceChange) {
        if self.video_area.width < 2 || self.video_area.height < 2 {
            self.pending_player = Some(change);
            return;
        }

        if let (Some(prev), Some(player)) = (change.prev, self.player.as_mut()) {
            self.controller.deactivate(prev, player);
        }
        if let Some(session) = self.player.take() {
            let _ = session.stop_blocking();
        }
        self.description_expanded = false;

        let Some(video) = self.controller.store().videos().get(change.next) else {
            return;
        };
        let url = self.client.video_url(video);
        let title = video.author.nickname.clone();

        match self.spawn_player(&url, &title) {
            Ok(session) => {
                self.player = Some(session);
                if let Some(player) = self.player.as_mut() {
                    self.controller.activate(change.next, player);
                }
            }
            Err(err) => {
                self.set_status(format!("Player failed: {err:#}"));
            }
        }
        self.mark_dirty();
    }

    fn spawn_player(&self, url: &str, title: &str) -> Result<InlineSession> {
        let area = self.video_area;
        let (pixel_width, pixel_height) = match window_size() {
            Ok(ws) if ws.columns > 0 && ws.rows > 0 && ws.width > 0 && ws.height > 0 => {
                let cell_w = f64::from(ws.width) / f64::from(ws.columns);
                let cell_h = f64::from(ws.height) / f64::from(ws.rows);
                (
                    (cell_w * f64::from(area.width)) as i32,
                    (cell_h * f64::from(area.height)) as i32,
                )
            }
            _ => (
                i32::from(area.width) * 8,
                i32::from(area.height) * 16,
            ),
        };

        spawn_inline_player(LaunchOptions {
            mpv_path: &self.config.player.mpv_path,
            url,
            title,
            loop_file: self.config.player.loop_file,
            col: area.x,
            row: area.y,
            term_cols: i32::from(area.width),
            term_rows: i32::from(area.height),
            pixel_width,
            pixel_height,
        })
    }

    fn pump_player_events(&mut self) -> bool {
        let Some(player) = self.player.as_mut() else {
            return false;
        };

        if let Some(status) = player.try_status() {
            match status {
                Ok(_) => {}
                Err(err) => crate::debug::log(format!("player exited: {err:#}")),
            }
            self.player = None;
            return true;
        }

        let events = player.poll_events();
        if events.is_empty() {
            return false;
        }
        for event in events {
            self.controller.handle_media_event(event);
        }
        true
    }

    fn shutdown_player(&mut self) {
        if let Some(session) = self.player.take() {
            let _ = session.stop_blocking();
        }
    }

    // --- input -------------------------------------------------------------

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
            KeyCode::Char('j') | KeyCode::Down => self.step(true),
            KeyCode::Char('k') | KeyCode::Up => self.step(false),
            KeyCode::Char('m') => self.toggle_mute(),
            KeyCode::Char(' ') | KeyCode::Enter => self.toggle_playback(),
            KeyCode::Left => self.seek(false),
            KeyCode::Right => self.seek(true),
            KeyCode::Char('e') => {
                self.description_expanded = !self.description_expanded;
                self.mark_dirty();
            }
            KeyCode::Char('y') => self.copy_share_link()?,
            KeyCode::Char('r') => self.retry(),
            KeyCode::Char(digit @ '1'..='4') => {
                let index = digit as usize - '1' as usize;
                let (feed_type, _) = TABS[index];
                self.switch_tab(feed_type);
            }
            _ => {}
        }
        Ok(false)
    }

    fn step(&mut self, forward: bool) {
        let jump = if forward {
            self.controller.step_next()
        } else {
            self.controller.step_prev()
        };
        if let Some(jump) = jump {
            self.apply_jump(jump);
        }
    }

    fn toggle_mute(&mut self) {
        let Some(player) = self.player.as_mut() else {
            return;
        };
        let muted = self.controller.toggle_mute(player);
        let message = if muted { "Muted" } else { "Sound on" };
        self.set_status(message);
    }

    fn toggle_playback(&mut self) {
        let Some(player) = self.player.as_mut() else {
            return;
        };
        self.controller.toggle_active(player);
        self.mark_dirty();
    }

    fn seek(&mut self, forward: bool) {
        let Some(player) = self.player.as_mut() else {
            return;
        };
        self.controller.seek_step(forward, player);
        self.mark_dirty();
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        if mouse.kind != MouseEventKind::Down(MouseButton::Left) {
            return;
        }
        if mouse.row < self.progress_area.y
            || mouse.row >= self.progress_area.y.saturating_add(self.progress_area.height)
        {
            return;
        }
        let Some(fraction) = click_fraction(self.progress_area, mouse.column) else {
            return;
        };
        let Some(player) = self.player.as_mut() else {
            return;
        };
        self.controller.seek_fraction(fraction, player);
        self.mark_dirty();
    }

    fn copy_share_link(&mut self) -> Result<()> {
        let origin = self.client.base_url().as_str().trim_end_matches('/').to_string();
        let url = self.controller.share_url(&origin);
        let mut clipboard =
            ClipboardContext::new().map_err(|err| anyhow!("create clipboard context: {err}"))?;
        clipboard
            .set_contents(url.clone())
            .map_err(|err| anyhow!("copy share link: {err}"))?;
        self.set_status(format!("Copied {url}"));
        Ok(())
    }

    fn switch_tab(&mut self, feed_type: FeedType) {
        if feed_type == self.controller.store().query().feed_type {
            return;
        }
        let author_id = self.controller.store().query().author_id.clone();
        let query = FeedQuery::new(feed_type)
            .with_author(author_id)
            .with_limit(self.config.feed.page_size);

        self.shutdown_player();
        let request = self.controller.switch_feed(query);
        self.scroll_offset = 0.0;
        self.target_offset = 0.0;
        self.description_expanded = false;
        self.spawn_fetch(request);
        if feed_type == FeedType::Following && self.followed_authors.is_empty() {
            self.spawn_author_refresh();
        }
        self.set_status(format!("Loading {}…", feed_type.display_name()));
    }

    fn retry(&mut self) {
        if self.controller.store().error().is_none() {
            return;
        }
        if self.controller.store().is_empty() {
            let query = self.controller.store().query().clone();
            let request = self.controller.switch_feed(query);
            match self.controller.pending_deep_link().map(str::to_string) {
                Some(id) => self.spawn_deep_link_fetch(request, id),
                None => self.spawn_fetch(request),
            }
        } else if let Some(request) = self.controller.retry_more() {
            self.spawn_fetch(request);
        }
        self.set_status("Retrying…");
    }

    // --- drawing -----------------------------------------------------------

    fn draw(&mut self, frame: &mut Frame) {
        let size = frame.size();
        frame.render_widget(
            Block::default().style(Style::default().bg(COLOR_BG)),
            size,
        );

        let overlay_height = if self.description_expanded { 9 } else { 6 };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(5),
                Constraint::Length(overlay_height),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_video(frame, chunks[1]);
        self.draw_overlay(frame, chunks[2]);
        self.draw_progress(frame, chunks[3]);
        self.draw_status(frame, chunks[4]);
    }

    fn draw_header(&mut self, frame: &mut Frame, area: Rect) {
        let current = self.controller.store().query().feed_type;
        let mut spans = Vec::new();
        for (index, (feed_type, label)) in TABS.iter().enumerate() {
            let text = if *feed_type == FeedType::Following && !self.followed_authors.is_empty() {
                format!(" {} {} ({}) ", index + 1, label, self.followed_authors.len())
            } else {
                format!(" {} {} ", index + 1, label)
            };
            let style = if *feed_type == current {
                Style::default()
                    .fg(COLOR_BG)
                    .bg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(COLOR_TEXT_SECONDARY)
            };
            spans.push(Span::styled(text, style));
            spans.push(Span::raw(" "));
        }

        let location = self.controller.location().to_string();
        let left_width: usize = spans.iter().map(|span| span.content.width()).sum();
        let total = area.width as usize;
        let right_width = location.width();
        if left_width + right_width < total {
            spans.push(Span::raw(" ".repeat(total - left_width - right_width)));
        }
        spans.push(Span::styled(
            location,
            Style::default().fg(COLOR_TEXT_SECONDARY),
        ));

        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn draw_video(&mut self, frame: &mut Frame, area: Rect) {
        let len = self.controller.store().len();
        let active = self.controller.active_index();
        let loading_initial = self.controller.store().is_loading_initial();
        let load_error = self.controller.store().error().map(str::to_string);

        let title = if len > 0 {
            format!(" {} / {} ", active + 1, len)
        } else {
            String::new()
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(COLOR_BORDER_FOCUSED))
            .style(Style::default().bg(COLOR_PANEL_BG))
            .title(title)
            .title_alignment(Alignment::Right);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        if inner != self.video_area {
            // Resize: the scroll geometry is measured in viewport heights.
            self.video_area = inner;
            self.viewport = Viewport::new(inner.height.max(1));
            self.target_offset = self.viewport.offset_for(active);
            self.scroll_offset = self.target_offset;
            self.pending_observe = true;
        }

        let message: Option<(String, Color)> = if loading_initial {
            Some((format!("{} Loading…", self.spinner.frame()), COLOR_TEXT_SECONDARY))
        } else if len == 0 {
            match load_error {
                Some(err) => Some((format!("Load failed: {err} (r to retry)"), COLOR_ERROR)),
                None => Some(("No videos found".to_string(), COLOR_TEXT_SECONDARY)),
            }
        } else if self
            .controller
            .active_playback()
            .map(|playback| playback.is_gated())
            .unwrap_or(false)
        {
            Some(("▶ Press Space to start playback".to_string(), COLOR_ACCENT))
        } else if self.player.is_none() {
            Some(("▍ player not running".to_string(), COLOR_TEXT_SECONDARY))
        } else {
            // mpv paints the interior through the kitty graphics protocol.
            None
        };

        if let Some((text, color)) = message {
            let centered = Rect {
                x: inner.x,
                y: inner.y + inner.height / 2,
                width: inner.width,
                height: 1,
            };
            frame.render_widget(
                Paragraph::new(text)
                    .alignment(Alignment::Center)
                    .style(Style::default().fg(color)),
                centered,
            );
        }
    }

    fn draw_overlay(&mut self, frame: &mut Frame, area: Rect) {
        let Some(video) = self.controller.active_video() else {
            frame.render_widget(
                Block::default().style(Style::default().bg(COLOR_BG)),
                area,
            );
            return;
        };

        let mut lines = Vec::new();

        let initial = video
            .author
            .nickname
            .chars()
            .next()
            .map(|c| c.to_uppercase().to_string())
            .unwrap_or_else(|| "?".to_string());
        let mut author_spans = vec![
            Span::styled(
                format!(" {initial} "),
                Style::default()
                    .fg(COLOR_BG)
                    .bg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" "),
            Span::styled(
                video.author.nickname.clone(),
                Style::default()
                    .fg(COLOR_TEXT_PRIMARY)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("  @{}", video.author.unique_id),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ),
        ];
        if video.is_following {
            author_spans.push(Span::styled(
                "  · Following",
                Style::default().fg(COLOR_SUCCESS),
            ));
        }
        lines.push(Line::from(author_spans));

        let description = video.description.as_deref().unwrap_or("").trim();
        if !description.is_empty() {
            let (text, truncated) = if self.description_expanded {
                (description.to_string(), false)
            } else {
                truncate_chars(description, DESCRIPTION_PREVIEW_CHARS)
            };
            let width = area.width.saturating_sub(2).max(16) as usize;
            let max_lines = if self.description_expanded { 6 } else { 2 };
            for wrapped in wrap(&text, width).into_iter().take(max_lines) {
                lines.push(Line::from(Span::styled(
                    wrapped.into_owned(),
                    Style::default().fg(COLOR_TEXT_PRIMARY),
                )));
            }
            if truncated {
                lines.push(Line::from(Span::styled(
                    "… (e to expand)",
                    Style::default().fg(COLOR_TEXT_SECONDARY),
                )));
            }
        }

        let mut meta = vec![
            Span::styled(
                format!("♥ {}", format_count(video.digg_count)),
                Style::default().fg(COLOR_ERROR),
            ),
            Span::styled(
                format!("  ▶ {}", format_count(video.play_count)),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ),
            Span::styled(
                format!("  · {}", relative_time(video.create_time)),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ),
        ];
        let muted = self.controller.global_muted()
            || self
                .controller
                .active_playback()
                .map(|playback| playback.state().fallback_muted)
                .unwrap_or(false);
        if muted {
            meta.push(Span::styled(
                "  · muted (m)",
                Style::default().fg(COLOR_ACCENT),
            ));
        }
        let store = self.controller.store();
        if !store.is_empty()
            && !store.has_more()
            && self.controller.active_index() + 1 == store.len()
        {
            meta.push(Span::styled(
                "  · No more videos",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ));
        }
        lines.push(Line::from(meta));

        let block = Block::default()
            .borders(Borders::NONE)
            .padding(Padding::horizontal(1))
            .style(Style::default().bg(COLOR_BG));
        frame.render_widget(
            Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
            area,
        );
    }

    fn draw_progress(&mut self, frame: &mut Frame, area: Rect) {
        self.progress_area = area;
        let (progress, duration) = self
            .controller
            .active_playback()
            .map(|playback| {
                let state = playback.state();
                (state.progress_secs, state.duration_secs)
            })
            .unwrap_or((0.0, 0.0));

        let ratio = if duration > 0.0 {
            (progress / duration).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let label = if duration > 0.0 {
            format!("{} / {}", format_clock(progress), format_clock(duration))
        } else {
            String::new()
        };
        frame.render_widget(
            Gauge::default()
                .gauge_style(Style::default().fg(COLOR_ACCENT).bg(COLOR_BORDER_IDLE))
                .ratio(ratio)
                .label(label),
            area,
        );
    }

    fn draw_status(&mut self, frame: &mut Frame, area: Rect) {
        let mut spans = Vec::new();
        if self.controller.store().is_loading() {
            spans.push(Span::styled(
                format!("{} ", self.spinner.frame()),
                Style::default().fg(COLOR_ACCENT),
            ));
        }
        spans.push(Span::styled(
            self.status_message.clone(),
            Style::default().fg(COLOR_TEXT_SECONDARY),
        ));
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }
}

// --- formatting helpers -----------------------------------------------------

/// Compact count rendering: 999 → "999", 1_234 → "1.2K", 3_400_000 → "3.4M".
fn format_count(count: Option<i64>) -> String {
    let count = count.unwrap_or(0);
    let (value, suffix) = if count.abs() >= 1_000_000 {
        (count as f64 / 1_000_000.0, "M")
    } else if count.abs() >= 1_000 {
        (count as f64 / 1_000.0, "K")
    } else {
        return count.to_string();
    };
    let rendered = format!("{value:.1}");
    let rendered = rendered.strip_suffix(".0").unwrap_or(&rendered);
    format!("{rendered}{suffix}")
}

fn format_clock(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

fn relative_time(when: DateTime<Utc>) -> String {
    relative_time_from(when, Utc::now())
}

fn relative_time_from(when: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - when).num_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3_599 => format!("{}m ago", secs / 60),
        3_600..=86_399 => format!("{}h ago", secs / 3_600),
        86_400..=604_799 => format!("{}d ago", secs / 86_400),
        _ => format!("{}w ago", secs / 604_800),
    }
}

/// Clip to `limit` characters on a char boundary. Returns the clipped string
/// and whether anything was removed.
fn truncate_chars(text: &str, limit: usize) -> (String, bool) {
    if text.chars().count() <= limit {
        return (text.to_string(), false);
    }
    (text.chars().take(limit).collect(), true)
}

/// Horizontal click position on the progress row as a playback fraction.
fn click_fraction(area: Rect, column: u16) -> Option<f64> {
    if area.width == 0 || column < area.x || column >= area.x.saturating_add(area.width) {
        return None;
    }
    let span = f64::from(area.width - 1).max(1.0);
    Some((f64::from(column - area.x) / span).clamp(0.0, 1.0))
}
