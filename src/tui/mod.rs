use std::io;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::cursor::{Hide, Show};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Paragraph, Row, Table, TableState};
use ratatui::{Frame, Terminal};

use crate::domains::registry::{LifecycleState, WorktreeRegistry};
use crate::domains::session::SessionLiveness;
use crate::domains::status::{self, StatusSnapshot};

const REFRESH_INTERVAL: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

struct App {
    snapshot: StatusSnapshot,
    table_state: TableState,
    last_refresh: Instant,
}

impl App {
    fn new(snapshot: StatusSnapshot) -> Self {
        let mut table_state = TableState::default();
        if !snapshot.entries.is_empty() {
            table_state.select(Some(0));
        }
        Self {
            snapshot,
            table_state,
            last_refresh: Instant::now(),
        }
    }

    fn select_next(&mut self) {
        let len = self.snapshot.entries.len();
        if len == 0 {
            return;
        }
        let next = match self.table_state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.table_state.select(Some(next));
    }

    fn select_prev(&mut self) {
        let len = self.snapshot.entries.len();
        if len == 0 {
            return;
        }
        let prev = match self.table_state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.table_state.select(Some(prev));
    }

    fn replace_snapshot(&mut self, snapshot: StatusSnapshot) {
        let selected = self.table_state.selected();
        self.snapshot = snapshot;
        self.last_refresh = Instant::now();
        let len = self.snapshot.entries.len();
        let clamped = match selected {
            Some(i) if len > 0 => Some(i.min(len - 1)),
            _ if len > 0 => Some(0),
            _ => None,
        };
        self.table_state.select(clamped);
    }
}

/// The interactive dashboard: a periodic re-collection of the status
/// projection. It owns no authoritative data of its own.
pub async fn run(registry: &WorktreeRegistry) -> Result<()> {
    let snapshot = status::collect(registry).await?;
    let mut app = App::new(snapshot);

    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, Hide)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &mut app, registry).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), Show, LeaveAlternateScreen)?;

    result
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    registry: &WorktreeRegistry,
) -> Result<()> {
    loop {
        terminal.draw(|f| draw(f, app))?;

        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                    KeyCode::Char('j') | KeyCode::Down => app.select_next(),
                    KeyCode::Char('k') | KeyCode::Up => app.select_prev(),
                    KeyCode::Char('r') => {
                        app.replace_snapshot(status::collect(registry).await?);
                    }
                    _ => {}
                }
            }
        }

        if app.last_refresh.elapsed() >= REFRESH_INTERVAL {
            app.replace_snapshot(status::collect(registry).await?);
        }
    }
}

fn draw(f: &mut Frame, app: &mut App) {
    let [table_area, footer_area] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(1)]).areas(f.area());

    draw_table(f, app, table_area);

    let footer = Paragraph::new(Line::from(
        " j/k navigate   r refresh   q quit ",
    ))
    .style(Style::default().fg(Color::DarkGray));
    f.render_widget(footer, footer_area);
}

fn draw_table(f: &mut Frame, app: &mut App, area: Rect) {
    let header = Row::new(vec!["Branch", "State", "Session", "Issue", "Services", "Path"])
        .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = app
        .snapshot
        .entries
        .iter()
        .map(|entry| {
            let state_style = Style::default().fg(state_color(entry.worktree.state));
            Row::new(vec![
                entry.worktree.branch.clone(),
                entry.worktree.state.as_str().to_string(),
                session_label(entry.session).to_string(),
                entry
                    .worktree
                    .issue_reference
                    .clone()
                    .unwrap_or_else(|| "-".into()),
                entry.services.clone().unwrap_or_else(|| "-".into()),
                entry.worktree.path.display().to_string(),
            ])
            .style(state_style)
        })
        .collect();

    let title = format!(
        " {} - {} worktrees (refreshed {}) ",
        app.snapshot.project,
        app.snapshot.entries.len(),
        app.snapshot.collected_at.format("%H:%M:%S")
    );

    let table = Table::new(
        rows,
        [
            Constraint::Min(16),
            Constraint::Length(16),
            Constraint::Length(10),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Min(20),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title))
    .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    f.render_stateful_widget(table, area, &mut app.table_state);
}

fn state_color(state: LifecycleState) -> Color {
    match state {
        LifecycleState::Ready => Color::Green,
        LifecycleState::Failed => Color::Red,
        LifecycleState::Orphaned => Color::Yellow,
        _ => Color::Cyan,
    }
}

fn session_label(liveness: SessionLiveness) -> &'static str {
    match liveness {
        SessionLiveness::Attached => "attached",
        SessionLiveness::Detached => "detached",
        SessionLiveness::Absent => "-",
    }
}
