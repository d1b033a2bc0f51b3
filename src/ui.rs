// Terminal client: one live-polling table per page plus a debounced search page.
// Each view owns its cache; only the source is shared. Forms and deletes go
// through the source's write actions.

use crate::cache::CollectionCache;
use crate::config::ClientConfig;
use crate::entities::{Domain, Owner, Pet, Record, Visit};
use crate::form::{delete_action, entity_name, RecordForm};
use crate::gate::{Debouncer, RequestGate};
use crate::live::{LiveTable, PollHandle};
use crate::query::{parse_query, ParsedQuery, SearchDomain};
use crate::search::{Page as ResultPage, SearchEngine, SearchResult};
use crate::source::{ClinicClient, CollectionSource};
use anyhow::Result;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use serde_json::{Map, Value};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

const REDRAW_EVERY: Duration = Duration::from_millis(250);
const FAST_SCROLL: isize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Owners,
    Pets,
    Visits,
    Search,
}

impl Page {
    pub const ALL: [Page; 4] = [Page::Owners, Page::Pets, Page::Visits, Page::Search];

    pub fn next(&self) -> Self {
        match self {
            Page::Owners => Page::Pets,
            Page::Pets => Page::Visits,
            Page::Visits => Page::Search,
            Page::Search => Page::Owners,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Owners => Page::Search,
            Page::Pets => Page::Owners,
            Page::Visits => Page::Pets,
            Page::Search => Page::Visits,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Owners => "Owners",
            Page::Pets => "Pets",
            Page::Visits => "Visits",
            Page::Search => "Search",
        }
    }
}

// ============================================================================
// ROW RENDERING
// ============================================================================

/// How a record shows up as a table row.
pub trait TableRow: Record {
    const HEADERS: &'static [&'static str];
    const WIDTHS: &'static [u16];

    fn cells(&self) -> Vec<String>;
}

fn join_ids(ids: &[i64]) -> String {
    if ids.is_empty() {
        return "-".to_string();
    }
    ids.iter().map(i64::to_string).collect::<Vec<_>>().join(", ")
}

impl TableRow for Owner {
    const HEADERS: &'static [&'static str] = &["ID", "First name", "Last name", "Age", "Phone", "Pets"];
    const WIDTHS: &'static [u16] = &[6, 16, 16, 5, 14, 14];

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.first_name.clone(),
            self.last_name.clone(),
            self.age.to_string(),
            self.phone.clone().unwrap_or_else(|| "-".to_string()),
            join_ids(&self.pet_ids),
        ]
    }
}

impl TableRow for Pet {
    const HEADERS: &'static [&'static str] =
        &["ID", "Name", "Species", "Age", "Born", "Condition", "Owners"];
    const WIDTHS: &'static [u16] = &[6, 16, 12, 5, 12, 20, 12];

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.name.clone(),
            self.species.clone(),
            self.age.to_string(),
            self.birth_date.format("%Y-%m-%d").to_string(),
            self.condition.clone(),
            join_ids(&self.owner_ids),
        ]
    }
}

impl TableRow for Visit {
    const HEADERS: &'static [&'static str] = &["ID", "Pet", "Date", "Diagnosis", "Treatment"];
    const WIDTHS: &'static [u16] = &[6, 6, 12, 30, 30];

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.pet_id.to_string(),
            self.date.format("%Y-%m-%d").to_string(),
            self.diagnosis.clone(),
            self.treatment.clone(),
        ]
    }
}

// ============================================================================
// APP STATE
// ============================================================================

/// Search page input and the latest applied results.
#[derive(Debug, Clone, Default)]
pub struct SearchView {
    pub input: String,
    pub domain: SearchDomain,
    pub page: usize,
    pub results: Vec<SearchResult>,
    pub error: Option<String>,
}

pub struct App<S> {
    pub current_page: Page,
    pub show_detail: bool,
    source: Arc<S>,
    owners: LiveTable<Owner, Arc<S>>,
    pets: LiveTable<Pet, Arc<S>>,
    visits: LiveTable<Visit, Arc<S>>,
    engine: SearchEngine<Arc<S>>,
    debouncer: Debouncer,
    search_gate: RequestGate,
    search: Arc<Mutex<SearchView>>,
    per_page: usize,
    polls: Vec<PollHandle>,
    form: Arc<Mutex<Option<RecordForm>>>,
    pending_delete: Option<(Domain, i64)>,
    write_error: Arc<Mutex<Option<String>>>,
}

impl<S: CollectionSource + ClinicClient> App<S> {
    pub fn new(source: S, config: &ClientConfig) -> Self {
        let source = Arc::new(source);
        let ttl = config.cache_ttl();
        let cache = || Arc::new(CollectionCache::new(Arc::clone(&source), ttl));

        App {
            current_page: Page::Owners,
            show_detail: false,
            owners: LiveTable::new(cache()),
            pets: LiveTable::new(cache()),
            visits: LiveTable::new(cache()),
            engine: SearchEngine::new(cache()),
            source: Arc::clone(&source),
            debouncer: Debouncer::new(config.debounce()),
            search_gate: RequestGate::new(),
            search: Arc::new(Mutex::new(SearchView {
                page: 1,
                ..SearchView::default()
            })),
            per_page: config.per_page.max(1),
            polls: Vec::new(),
            form: Arc::new(Mutex::new(None)),
            pending_delete: None,
            write_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn start_polling(&mut self, interval: Duration) {
        self.polls = vec![
            self.owners.spawn_polling(interval),
            self.pets.spawn_polling(interval),
            self.visits.spawn_polling(interval),
        ];
        info!(?interval, "polling started");
    }

    /// Dropping the handles aborts the timers.
    pub fn stop_polling(&mut self) {
        self.polls.clear();
    }

    pub fn owners(&self) -> &LiveTable<Owner, Arc<S>> {
        &self.owners
    }

    pub fn pets(&self) -> &LiveTable<Pet, Arc<S>> {
        &self.pets
    }

    pub fn visits(&self) -> &LiveTable<Visit, Arc<S>> {
        &self.visits
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn move_selection(&self, delta: isize) {
        match self.current_page {
            Page::Owners => self.owners.move_selection(delta),
            Page::Pets => self.pets.move_selection(delta),
            Page::Visits => self.visits.move_selection(delta),
            Page::Search => {}
        }
    }

    /// Error shown in the status bar: a failed write first, then the
    /// current page's fetch error.
    pub fn status(&self) -> Option<String> {
        if let Some(err) = lock(&self.write_error).clone() {
            return Some(err);
        }

        match self.current_page {
            Page::Owners => self.owners.last_error(),
            Page::Pets => self.pets.last_error(),
            Page::Visits => self.visits.last_error(),
            Page::Search => self.search_view().error,
        }
    }

    pub fn dismiss_status(&self) {
        if lock(&self.write_error).take().is_some() {
            return;
        }

        match self.current_page {
            Page::Owners => self.owners.dismiss_error(),
            Page::Pets => self.pets.dismiss_error(),
            Page::Visits => self.visits.dismiss_error(),
            Page::Search => self.lock_search().error = None,
        }
    }

    pub fn search_view(&self) -> SearchView {
        self.lock_search().clone()
    }

    pub fn push_char(&self, c: char) {
        {
            let mut view = self.lock_search();
            view.input.push(c);
            view.page = 1;
        }
        self.schedule_search(true);
    }

    pub fn pop_char(&self) {
        {
            let mut view = self.lock_search();
            view.input.pop();
            view.page = 1;
        }
        self.schedule_search(true);
    }

    pub fn cycle_domain(&self) {
        {
            let mut view = self.lock_search();
            view.domain = match view.domain {
                SearchDomain::Any => SearchDomain::Only(Domain::Owners),
                SearchDomain::Only(Domain::Owners) => SearchDomain::Only(Domain::Pets),
                SearchDomain::Only(Domain::Pets) => SearchDomain::Only(Domain::Visits),
                SearchDomain::Only(Domain::Visits) => SearchDomain::Any,
            };
            view.page = 1;
        }
        self.schedule_search(false);
    }

    pub fn change_result_page(&self, delta: isize) {
        {
            let mut view = self.lock_search();
            let page = (view.page as isize + delta).max(1);
            view.page = page as usize;
        }
        self.schedule_search(false);
    }

    fn current_query(&self) -> Option<ParsedQuery> {
        let view = self.lock_search();
        if view.input.trim().is_empty() {
            return None;
        }

        Some(
            parse_query(&view.input)
                .with_domain(view.domain)
                .with_page(view.page)
                .with_per_page(self.per_page),
        )
    }

    /// Run the current query in the background. Only the newest search may
    /// write its results.
    fn schedule_search(&self, debounce: bool) {
        let Some(query) = self.current_query() else {
            self.search_gate.issue();
            let mut view = self.lock_search();
            view.results.clear();
            view.error = None;
            return;
        };

        let engine = self.engine.clone();
        let debouncer = self.debouncer.clone();
        let gate = self.search_gate.clone();
        let view = Arc::clone(&self.search);

        tokio::spawn(async move {
            if debounce && !debouncer.settle().await {
                return;
            }

            let ticket = gate.issue();
            let outcome = engine.search(&query).await;
            if !gate.is_current(ticket) {
                debug!(query = %query.raw, "stale search dropped");
                return;
            }

            let mut view = lock(&view);
            match outcome {
                Ok(results) => {
                    view.results = results;
                    view.error = None;
                }
                Err(err) => view.error = Some(err.to_string()),
            }
        });
    }

    fn lock_search(&self) -> MutexGuard<'_, SearchView> {
        lock(&self.search)
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    pub fn form(&self) -> Option<RecordForm> {
        lock(&self.form).clone()
    }

    pub fn pending_delete(&self) -> Option<(Domain, i64)> {
        self.pending_delete
    }

    fn page_domain(&self) -> Option<Domain> {
        match self.current_page {
            Page::Owners => Some(Domain::Owners),
            Page::Pets => Some(Domain::Pets),
            Page::Visits => Some(Domain::Visits),
            Page::Search => None,
        }
    }

    fn selected_key(&self) -> Option<i64> {
        match self.current_page {
            Page::Owners => self.owners.view(|t| t.selected()),
            Page::Pets => self.pets.view(|t| t.selected()),
            Page::Visits => self.visits.view(|t| t.selected()),
            Page::Search => None,
        }
    }

    pub fn open_create_form(&self) {
        if let Some(domain) = self.page_domain() {
            *lock(&self.form) = Some(RecordForm::create(domain));
        }
    }

    pub fn open_edit_form(&self) {
        let form = match self.current_page {
            Page::Owners => self.owners.selected_row().map(|row| RecordForm::edit(&row)),
            Page::Pets => self.pets.selected_row().map(|row| RecordForm::edit(&row)),
            Page::Visits => self.visits.selected_row().map(|row| RecordForm::edit(&row)),
            Page::Search => None,
        };
        if form.is_some() {
            *lock(&self.form) = form;
        }
    }

    pub fn close_form(&self) {
        *lock(&self.form) = None;
    }

    /// Send the open form. It closes on success; on failure it stays open
    /// with the endpoint's message.
    pub fn submit_form(&self) {
        let (action, params) = {
            let mut guard = lock(&self.form);
            let Some(form) = guard.as_mut() else {
                return;
            };
            if form.submitting {
                return;
            }
            form.submitting = true;
            form.error = None;
            (form.action(), form.params())
        };

        self.spawn_write(action, params, true);
    }

    /// Ask for confirmation before deleting the selected row.
    pub fn request_delete(&mut self) {
        if let (Some(domain), Some(id)) = (self.page_domain(), self.selected_key()) {
            self.pending_delete = Some((domain, id));
        }
    }

    pub fn confirm_delete(&mut self) {
        if let Some((domain, id)) = self.pending_delete.take() {
            let mut params = Map::new();
            params.insert("id".to_string(), Value::from(id));
            self.spawn_write(delete_action(domain), params, false);
        }
    }

    fn spawn_write(&self, action: &'static str, params: Map<String, Value>, from_form: bool) {
        let source = Arc::clone(&self.source);
        let form = Arc::clone(&self.form);
        let write_error = Arc::clone(&self.write_error);
        let owners = self.owners.clone();
        let pets = self.pets.clone();
        let visits = self.visits.clone();
        let engine = self.engine.clone();

        tokio::spawn(async move {
            match source.call(action, params).await {
                Ok(_) => {
                    info!(action, "write applied");
                    if from_form {
                        *lock(&form) = None;
                    }
                    *lock(&write_error) = None;

                    // Ownership links and cascades touch more than one collection.
                    for domain in Domain::ALL {
                        engine.cache().invalidate(domain).await;
                    }
                    let (o, p, v) = tokio::join!(owners.refresh(), pets.refresh(), visits.refresh());
                    if o.is_err() || p.is_err() || v.is_err() {
                        debug!(action, "refresh after write failed");
                    }
                }
                Err(err) => {
                    warn!(action, error = %err, "write failed");
                    let message = err.to_string();
                    if from_form {
                        if let Some(open) = lock(&form).as_mut() {
                            open.submitting = false;
                            open.error = Some(message.clone());
                        }
                    }
                    *lock(&write_error) = Some(message);
                }
            }
        });
    }

    fn handle_form_key(&self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.close_form(),
            KeyCode::Enter => self.submit_form(),
            KeyCode::Tab | KeyCode::Down => with_form(&self.form, RecordForm::focus_next),
            KeyCode::BackTab | KeyCode::Up => with_form(&self.form, RecordForm::focus_previous),
            KeyCode::Backspace => with_form(&self.form, RecordForm::pop_char),
            KeyCode::Char(c) => with_form(&self.form, |form| form.push_char(c)),
            _ => {}
        }
    }

    /// Apply one key press. Returns `true` when the client should exit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return true;
        }

        if lock(&self.form).is_some() {
            self.handle_form_key(key);
            return false;
        }

        if self.pending_delete.is_some() {
            if key.code == KeyCode::Char('y') {
                self.confirm_delete();
            } else {
                self.pending_delete = None;
            }
            return false;
        }

        match key.code {
            KeyCode::Tab => self.next_page(),
            KeyCode::BackTab => self.previous_page(),
            _ if self.current_page == Page::Search => return self.handle_search_key(key),
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Enter => self.toggle_detail(),
            KeyCode::Char('x') => self.dismiss_status(),
            KeyCode::Char('n') => self.open_create_form(),
            KeyCode::Char('e') => self.open_edit_form(),
            KeyCode::Char('d') => self.request_delete(),
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::PageDown => self.move_selection(FAST_SCROLL),
            KeyCode::PageUp => self.move_selection(-FAST_SCROLL),
            KeyCode::Home => self.move_selection(isize::MIN / 2),
            KeyCode::End => self.move_selection(isize::MAX / 2),
            _ => {}
        }
        false
    }

    fn handle_search_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc if self.search_view().input.is_empty() => return true,
            KeyCode::Esc => {
                self.lock_search().input.clear();
                self.schedule_search(false);
            }
            KeyCode::Char(c) => self.push_char(c),
            KeyCode::Backspace => self.pop_char(),
            KeyCode::F(2) => self.cycle_domain(),
            KeyCode::PageDown | KeyCode::Right => self.change_result_page(1),
            KeyCode::PageUp | KeyCode::Left => self.change_result_page(-1),
            KeyCode::Delete => self.dismiss_status(),
            _ => {}
        }
        false
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn with_form(form: &Mutex<Option<RecordForm>>, f: impl FnOnce(&mut RecordForm)) {
    if let Some(form) = lock(form).as_mut() {
        if !form.submitting {
            f(form);
        }
    }
}

// ============================================================================
// TERMINAL LOOP
// ============================================================================

pub async fn run<S: CollectionSource + ClinicClient>(source: S, config: &ClientConfig) -> Result<()> {
    let mut app = App::new(source, config);
    app.start_polling(config.poll_interval());

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    app.stop_polling();
    res
}

async fn run_app<B: Backend, S: CollectionSource + ClinicClient>(
    terminal: &mut Terminal<B>,
    app: &mut App<S>,
) -> Result<()> {
    let mut events = EventStream::new();
    let mut redraw = tokio::time::interval(REDRAW_EVERY);

    loop {
        terminal.draw(|f| draw(f, app))?;

        tokio::select! {
            _ = redraw.tick() => {}
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    if app.handle_key(key) {
                        return Ok(());
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err.into()),
                None => return Ok(()),
            },
        }
    }
}

fn draw<S: CollectionSource + ClinicClient>(f: &mut Frame, app: &App<S>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::Owners => render_live(f, chunks[1], app.owners(), app.show_detail),
        Page::Pets => render_live(f, chunks[1], app.pets(), app.show_detail),
        Page::Visits => render_live(f, chunks[1], app.visits(), app.show_detail),
        Page::Search => render_search(f, chunks[1], &app.search_view()),
    }

    render_status_bar(f, chunks[2], app);

    if let Some(form) = app.form() {
        render_form(f, chunks[1], &form);
    }
}

fn render_header<S: CollectionSource + ClinicClient>(f: &mut Frame, area: Rect, app: &App<S>) {
    let mut tab_spans = vec![];
    for (i, page) in Page::ALL.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!(
            "{} owners, {} pets, {} visits",
            app.owners().view(|t| t.len()),
            app.pets().view(|t| t.len()),
            app.visits().view(|t| t.len()),
        ),
        Style::default().fg(Color::White),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_live<R: TableRow, S: CollectionSource>(
    f: &mut Frame,
    area: Rect,
    table: &LiveTable<R, S>,
    show_detail: bool,
) {
    if show_detail {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(area);

        render_table(f, chunks[0], table);
        render_detail_panel(f, chunks[1], table.selected_row().as_ref());
    } else {
        render_table(f, area, table);
    }
}

fn render_table<R: TableRow, S: CollectionSource>(f: &mut Frame, area: Rect, live: &LiveTable<R, S>) {
    let header_cells = R::HEADERS.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let (rows, selected) = live.view(|t| (t.rows().to_vec(), t.selected_index()));
    let body = rows.iter().map(|row| {
        let cells = row
            .cells()
            .into_iter()
            .zip(R::WIDTHS)
            .map(|(text, width)| Cell::from(truncate(&text, *width as usize)));
        Row::new(cells).height(1)
    });

    let widths: Vec<Constraint> = R::WIDTHS.iter().map(|w| Constraint::Length(*w)).collect();
    let table = Table::new(body, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(format!(" {} ", capitalize(R::DOMAIN.as_str()))),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("→ ");

    let mut state = TableState::default();
    state.select(selected);
    f.render_stateful_widget(table, area, &mut state);
}

fn render_detail_panel<R: TableRow>(f: &mut Frame, area: Rect, row: Option<&R>) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Details ");

    let Some(row) = row else {
        f.render_widget(Paragraph::new("No row selected").block(block), area);
        return;
    };

    let mut content = vec![Line::from("")];
    for (label, value) in R::HEADERS.iter().zip(row.cells()) {
        content.push(Line::from(vec![
            Span::styled(
                format!("  {}: ", label),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::raw(value),
        ]));
    }
    content.push(Line::from(""));
    content.push(Line::from(Span::styled(
        "  Press Enter to close",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )));

    f.render_widget(Paragraph::new(content).block(block), area);
}

fn render_form(f: &mut Frame, area: Rect, form: &RecordForm) {
    let height = (form.fields.len() as u16 + 6).min(area.height);
    let width = 64.min(area.width);
    let popup = Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    };

    let mut content = vec![Line::from("")];
    for (i, field) in form.fields.iter().enumerate() {
        let focused = i == form.focus;
        let label_style = if focused {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Cyan)
        };
        let mut spans = vec![
            Span::styled(format!("  {:<20}", field.label), label_style),
            Span::raw(field.value.clone()),
        ];
        if focused {
            spans.push(Span::styled("_", Style::default().fg(Color::Yellow)));
        }
        content.push(Line::from(spans));
    }
    content.push(Line::from(""));

    let footer = match (&form.error, form.submitting) {
        (_, true) => Span::styled("  Saving...", Style::default().fg(Color::DarkGray)),
        (Some(error), false) => Span::styled(
            format!("  {}", truncate(error, width.saturating_sub(4) as usize)),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
        (None, false) => Span::styled(
            "  Enter save | Esc cancel | ↑/↓ field",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ),
    };
    content.push(Line::from(footer));

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(format!(" {} ", form.title()));

    f.render_widget(Clear, popup);
    f.render_widget(Paragraph::new(content).block(block), popup);
}

fn render_search(f: &mut Frame, area: Rect, view: &SearchView) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let scope = match view.domain {
        SearchDomain::Any => "all",
        SearchDomain::Only(domain) => domain.as_str(),
    };
    let input = Paragraph::new(Line::from(vec![
        Span::raw(" "),
        Span::raw(view.input.clone()),
        Span::styled("_", Style::default().fg(Color::Yellow)),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(format!(" Search in {} (page {}) ", scope, view.page)),
    );
    f.render_widget(input, chunks[0]);

    let mut lines = Vec::new();
    for result in &view.results {
        match result {
            SearchResult::Owners(page) => lines.extend(page_lines(page)),
            SearchResult::Pets(page) => lines.extend(page_lines(page)),
            SearchResult::Visits(page) => lines.extend(page_lines(page)),
        }
        lines.push(Line::from(""));
    }
    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            "  Type to search. #12 finds by id; quote \"two words\" to keep them together.",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let results = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Results "),
    );
    f.render_widget(results, chunks[1]);
}

fn page_lines<R: TableRow>(page: &ResultPage<R>) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(Span::styled(
        format!(
            "  {} ({} found, page {})",
            capitalize(page.domain.as_str()),
            page.total,
            page.page
        ),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    ))];

    lines.extend(
        page.data
            .iter()
            .map(|row| Line::from(format!("    {}", row.cells().join(" | ")))),
    );
    lines
}

fn render_status_bar<S: CollectionSource + ClinicClient>(f: &mut Frame, area: Rect, app: &App<S>) {
    let mut status_spans = Vec::new();

    if let Some((domain, id)) = app.pending_delete() {
        status_spans.push(Span::styled(
            format!(" Delete {} #{}? ", entity_name(domain), id),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
        status_spans.push(Span::styled("y", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" confirm, any other key cancels"));
        let bar = Paragraph::new(vec![Line::from(status_spans)])
            .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::White)));
        f.render_widget(bar, area);
        return;
    }

    if let Some(message) = app.status() {
        status_spans.push(Span::styled(
            format!(" {} ", truncate(&message, 60)),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
        let dismiss = if app.current_page == Page::Search { "Del" } else { "x" };
        status_spans.push(Span::raw("("));
        status_spans.push(Span::styled(dismiss, Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" dismiss) | "));
    }

    let hints: &[(&str, &str)] = if app.current_page == Page::Search {
        &[("F2", " Scope | "), ("←/→", " Page | "), ("Tab", " Switch | "), ("Esc", " Clear/Quit")]
    } else {
        &[
            ("Enter", " Details | "),
            ("n", " New | "),
            ("e", " Edit | "),
            ("d", " Delete | "),
            ("Tab", " Page | "),
            ("↑/↓", " Nav | "),
            ("q", " Quit"),
        ]
    };
    for (key, label) in hints {
        status_spans.push(Span::styled(*key, Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(*label));
    }

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
