use std::io;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{
    Bar, BarChart, BarGroup, Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use player_value_terminal::batch::PREDICTED_VALUE_COLUMN;
use player_value_terminal::config::AppConfig;
use player_value_terminal::features::{ATTRIBUTE_SPECS, Position};
use player_value_terminal::lookup::{PrecomputedDataset, PrecomputedRow};
use player_value_terminal::model;
use player_value_terminal::report::EdaReport;
use player_value_terminal::state::{AppState, InputMode, POSITION_FIELD, SearchOutcome, Tab};
use player_value_terminal::valuation::{format_compact, format_currency};

const BIG_STEP: i64 = 10;

struct ChannelWriter {
    sender: mpsc::Sender<String>,
}

impl io::Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = self.sender.send(String::from_utf8_lossy(buf).to_string());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Clone)]
struct ChannelWriterFactory {
    sender: mpsc::Sender<String>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for ChannelWriterFactory {
    type Writer = ChannelWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ChannelWriter {
            sender: self.sender.clone(),
        }
    }
}

struct App {
    state: AppState,
    should_quit: bool,
}

impl App {
    fn new(state: AppState) -> Self {
        Self {
            state,
            should_quit: false,
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        match self.state.input_mode {
            InputMode::Search => self.on_search_key(key),
            InputMode::BatchPath => self.on_batch_path_key(key),
            InputMode::Normal => self.on_normal_key(key),
        }
    }

    fn on_search_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => {
                self.state.run_search();
                self.state.input_mode = InputMode::Normal;
            }
            KeyCode::Esc => self.state.input_mode = InputMode::Normal,
            KeyCode::Backspace => {
                self.state.search_query.pop();
            }
            KeyCode::Char(c) => self.state.search_query.push(c),
            _ => {}
        }
    }

    fn on_batch_path_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => {
                self.state.input_mode = InputMode::Normal;
                self.state.load_batch();
            }
            KeyCode::Esc => self.state.input_mode = InputMode::Normal,
            KeyCode::Backspace => {
                self.state.batch.path_input.pop();
            }
            KeyCode::Char(c) => self.state.batch.path_input.push(c),
            _ => {}
        }
    }

    fn on_normal_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('?') => self.state.help_overlay = !self.state.help_overlay,
            KeyCode::Esc => self.state.help_overlay = false,
            KeyCode::Tab => self.state.next_tab(),
            KeyCode::BackTab => self.state.prev_tab(),
            KeyCode::Char('1') => self.state.tab = Tab::Manual,
            KeyCode::Char('2') => self.state.tab = Tab::Batch,
            KeyCode::Char('3') => self.state.tab = Tab::Eda,
            KeyCode::Char('/') => self.state.input_mode = InputMode::Search,
            KeyCode::Char('j') | KeyCode::Down => self.state.scroll_down(),
            KeyCode::Char('k') | KeyCode::Up => self.state.scroll_up(),
            _ => match self.state.tab {
                Tab::Manual => self.on_manual_key(key),
                Tab::Batch => self.on_batch_key(key),
                Tab::Eda => {}
            },
        }
    }

    fn on_manual_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('h') | KeyCode::Left => self.state.form.adjust(-1),
            KeyCode::Char('l') | KeyCode::Right => self.state.form.adjust(1),
            KeyCode::Char('H') => self.state.form.adjust(-BIG_STEP),
            KeyCode::Char('L') => self.state.form.adjust(BIG_STEP),
            KeyCode::Char('p') | KeyCode::Enter => self.state.predict_manual(),
            _ => {}
        }
    }

    fn on_batch_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('o') => self.state.input_mode = InputMode::BatchPath,
            KeyCode::Enter => self.state.load_batch(),
            KeyCode::Char('s') => self.state.save_batch_csv(),
            KeyCode::Char('x') => self.state.export_batch_xlsx(),
            _ => {}
        }
    }
}

fn main() -> Result<()> {
    let config = AppConfig::from_env();

    let (log_tx, log_rx) = mpsc::channel();
    let ui_layer = tracing_subscriber::fmt::layer()
        .with_writer(ChannelWriterFactory { sender: log_tx })
        .with_ansi(false)
        .with_target(false)
        .without_time();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(ui_layer)
        .init();

    let model = model::shared_model(&config.model_path)
        .with_context(|| format!("loading model from {}", config.model_path.display()))?;
    let precomputed = PrecomputedDataset::load(&config.predictions_path);
    let report = EdaReport::load(&config.report_path);
    info!("player value terminal ready");

    let mut app = App::new(AppState::new(model, precomputed, report, &config));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app, log_rx);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    log_rx: mpsc::Receiver<String>,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    loop {
        while let Ok(line) = log_rx.try_recv() {
            if let Some(entry) = console_entry(&line) {
                app.state.push_log(entry);
            }
        }

        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            app.on_key(key);
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

/// Turns a formatted tracing line (`" WARN message"`) into a console entry (`"[WARN] message"`).
fn console_entry(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (level, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match level {
        "TRACE" | "DEBUG" | "INFO" | "WARN" | "ERROR" => {
            Some(format!("[{level}] {}", rest.trim_start()))
        }
        _ => Some(line.to_string()),
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(9),
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(5),
            Constraint::Length(1),
        ])
        .split(frame.size());

    let header = Paragraph::new(header_text(&app.state))
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    render_search(frame, chunks[1], &app.state);

    let titles = Tab::ALL
        .iter()
        .map(|tab| format!("{} {}", tab.index() + 1, tab.title()))
        .collect::<Vec<_>>();
    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::ALL))
        .select(app.state.tab.index())
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, chunks[2]);

    match app.state.tab {
        Tab::Manual => render_manual(frame, chunks[3], &app.state),
        Tab::Batch => render_batch(frame, chunks[3], &app.state),
        Tab::Eda => render_eda(frame, chunks[3], &app.state),
    }

    let console = Paragraph::new(console_text(&app.state))
        .block(Block::default().title("Console").borders(Borders::ALL));
    frame.render_widget(console, chunks[4]);

    let footer = Paragraph::new(footer_text(&app.state));
    frame.render_widget(footer, chunks[5]);

    if app.state.help_overlay {
        render_help_overlay(frame, frame.size());
    }
}

fn header_text(state: &AppState) -> String {
    let line1 = "  ⚽  PLAYER VALUE ESTIMATOR".to_string();
    let line2 = format!(
        "  {} model inputs | known players: {}",
        state.model().feature_names().len(),
        if state.search_available() {
            state.precomputed.len().to_string()
        } else {
            state.precomputed.status().describe()
        }
    );
    format!("{line1}\n{line2}")
}

fn footer_text(state: &AppState) -> String {
    match state.input_mode {
        InputMode::Search => "Type player name | Enter Search | Esc Cancel".to_string(),
        InputMode::BatchPath => "Type CSV path | Enter Load | Esc Cancel".to_string(),
        InputMode::Normal => match state.tab {
            Tab::Manual => {
                "Tab/1-3 Switch | j/k Field | h/l Adjust | H/L Step x10 | p Predict | / Search | ? Help | q Quit".to_string()
            }
            Tab::Batch => {
                "Tab/1-3 Switch | o Path | Enter Load | s Save CSV | x Export XLSX | j/k Scroll | / Search | ? Help | q Quit".to_string()
            }
            Tab::Eda => "Tab/1-3 Switch | j/k Scroll | / Search | ? Help | q Quit".to_string(),
        },
    }
}

fn render_search(frame: &mut Frame, area: Rect, state: &AppState) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(30),
            Constraint::Percentage(45),
            Constraint::Percentage(25),
        ])
        .split(area);

    let editing = state.input_mode == InputMode::Search;
    let cursor = if editing { "_" } else { "" };
    let status = match &state.search {
        SearchOutcome::Idle => "Press / to search known players".to_string(),
        SearchOutcome::Unavailable(reason) => format!("Search unavailable: {reason}"),
        SearchOutcome::NoMatches => "No player found".to_string(),
        SearchOutcome::Found(rows) => format!("{} match(es)", rows.len()),
    };
    let mut lines = vec![format!("Name: {}{cursor}", state.search_query), String::new(), status];
    if let Some(summary) = &state.comparison {
        lines.push(String::new());
        lines.push(format!(
            "Model MAE {} | within 20%: {:.0}%",
            format_compact(summary.mean_abs_error),
            summary.within_20_pct * 100.0
        ));
    }
    let input_style = if editing {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let input = Paragraph::new(lines.join("\n"))
        .style(input_style)
        .block(Block::default().title("Player Search").borders(Borders::ALL));
    frame.render_widget(input, columns[0]);

    let found: &[PrecomputedRow] = match &state.search {
        SearchOutcome::Found(rows) => rows.as_slice(),
        _ => &[],
    };
    let rows = found.iter().map(|row| {
        Row::new(vec![
            Cell::from(row.player_name.clone()),
            Cell::from(optional_currency(row.actual_value)),
            Cell::from(optional_currency(row.predicted_value)),
        ])
    });
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(44),
            Constraint::Percentage(28),
            Constraint::Percentage(28),
        ],
    )
    .header(
        Row::new(vec!["Player", "Actual", "Predicted"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().title("Matches").borders(Borders::ALL));
    frame.render_widget(table, columns[1]);

    let block = Block::default().title("Actual vs Predicted").borders(Borders::ALL);
    match found.first() {
        Some(row) => {
            let chart = value_bar_chart(row.actual_value, row.predicted_value).block(block);
            frame.render_widget(chart, columns[2]);
        }
        None => frame.render_widget(Paragraph::new("").block(block), columns[2]),
    }
}

fn value_bar_chart(actual: Option<f64>, predicted: Option<f64>) -> BarChart<'static> {
    let bar = |label: &'static str, value: Option<f64>, color: Color| {
        let value = value.unwrap_or(0.0).max(0.0);
        Bar::default()
            .label(label.into())
            .value(value.round() as u64)
            .text_value(format_compact(value))
            .style(Style::default().fg(color))
    };
    let bars = [
        bar("Actual", actual, Color::Cyan),
        bar("Predicted", predicted, Color::Green),
    ];
    BarChart::default()
        .data(BarGroup::default().bars(&bars))
        .bar_width(9)
        .bar_gap(2)
}

fn optional_currency(value: Option<f64>) -> String {
    value.map(format_currency).unwrap_or_else(|| "-".to_string())
}

fn render_manual(frame: &mut Frame, area: Rect, state: &AppState) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    let selected_style = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
    let mut lines: Vec<Line> = ATTRIBUTE_SPECS
        .iter()
        .zip(state.form.values)
        .enumerate()
        .map(|(idx, (spec, value))| {
            let text = format!(
                "{} {:<26} {:>6}  [{}-{}]",
                if state.form.selected == idx { ">" } else { " " },
                spec.label,
                value,
                spec.min,
                spec.max
            );
            if state.form.selected == idx {
                Line::from(Span::styled(text, selected_style))
            } else {
                Line::from(text)
            }
        })
        .collect();
    let position = format!(
        "{} {:<26} {:>6}  [{} codes]",
        if state.form.selected == POSITION_FIELD { ">" } else { " " },
        "Position",
        state.form.position().code(),
        Position::ALL.len()
    );
    lines.push(if state.form.selected == POSITION_FIELD {
        Line::from(Span::styled(position, selected_style))
    } else {
        Line::from(position)
    });

    let form = Paragraph::new(lines)
        .block(Block::default().title("Player Attributes").borders(Borders::ALL));
    frame.render_widget(form, columns[0]);

    let (text, style) = match &state.manual_result {
        None => (
            "Press p to estimate the market value".to_string(),
            Style::default(),
        ),
        Some(Ok(result)) => (
            format!(
                "Estimated Market Value: {}\n\nlog1p(value): {:.4}\nPosition: {}",
                format_currency(result.predicted_value),
                result.predicted_log,
                state.form.position()
            ),
            Style::default().fg(Color::Green),
        ),
        Some(Err(err)) => (format!("Prediction failed: {err}"), Style::default().fg(Color::Red)),
    };
    let result = Paragraph::new(text)
        .style(style)
        .block(Block::default().title("Estimate").borders(Borders::ALL));
    frame.render_widget(result, columns[1]);
}

fn render_batch(frame: &mut Frame, area: Rect, state: &AppState) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .split(area);

    let editing = state.input_mode == InputMode::BatchPath;
    let mut status = vec![format!(
        "CSV: {}{}",
        state.batch.path_input,
        if editing { "_" } else { "" }
    )];
    let mut style = if editing {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    if let Some(err) = &state.batch.error {
        status.push(err.clone());
        style = Style::default().fg(Color::Red);
    } else if let Some(path) = &state.batch.saved_to {
        status.push(format!("Saved {}", path.display()));
    } else if let Some(prediction) = &state.batch.prediction {
        status.push(format!("Scored at {}", prediction.created_at()));
    }
    let input = Paragraph::new(status.join("\n"))
        .style(style)
        .block(Block::default().title("Upload").borders(Borders::ALL));
    frame.render_widget(input, sections[0]);

    let Some(prediction) = &state.batch.prediction else {
        let empty = Paragraph::new("Press o to enter a CSV path, then Enter to predict")
            .block(Block::default().title("Predictions").borders(Borders::ALL));
        frame.render_widget(empty, sections[1]);
        return;
    };

    let view = prediction.display_table();
    let visible = sections[1].height.saturating_sub(3) as usize;
    let (start, end) = visible_range(state.batch.scroll, view.rows.len(), visible.max(1));
    let value_col = view.headers.iter().position(|h| h == PREDICTED_VALUE_COLUMN);
    let rows = view.rows[start..end].iter().map(|row| {
        Row::new(
            row.iter()
                .enumerate()
                .map(|(idx, cell)| {
                    if Some(idx) == value_col
                        && let Ok(value) = cell.parse::<f64>()
                    {
                        return Cell::from(format_currency(value));
                    }
                    Cell::from(cell.clone())
                })
                .collect::<Vec<_>>(),
        )
    });
    let widths = vec![Constraint::Min(8); view.headers.len().max(1)];
    let table = Table::new(rows, widths)
        .header(
            Row::new(view.headers.clone()).style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(
            Block::default()
                .title(format!("Predictions ({}-{} of {})", start + 1, end, view.rows.len()))
                .borders(Borders::ALL),
        );
    frame.render_widget(table, sections[1]);

    let summary = prediction.summary();
    let text = format!(
        "Rows: {} | Total: {} | Mean: {} | Top: {} ({})",
        summary.rows,
        format_compact(summary.total_value),
        format_compact(summary.mean_value),
        summary.top_label.as_deref().unwrap_or("-"),
        format_compact(summary.max_value)
    );
    let footer = Paragraph::new(text).block(Block::default().borders(Borders::ALL));
    frame.render_widget(footer, sections[2]);
}

fn visible_range(selected: usize, total: usize, visible: usize) -> (usize, usize) {
    if total == 0 {
        return (0, 0);
    }
    if total <= visible {
        return (0, total);
    }

    let mut start = selected.saturating_sub(visible / 2);
    if start + visible > total {
        start = total - visible;
    }
    (start, start + visible)
}

fn render_eda(frame: &mut Frame, area: Rect, state: &AppState) {
    let widget = match &state.report {
        Ok(report) => Paragraph::new(report.lines.join("\n"))
            .scroll((state.eda_scroll, 0))
            .block(
                Block::default()
                    .title(report.title.clone().unwrap_or_else(|| "EDA Report".to_string()))
                    .borders(Borders::ALL),
            ),
        Err(err) => Paragraph::new(eda_unavailable_text(err))
            .style(Style::default().fg(Color::Yellow))
            .block(Block::default().title("EDA Report").borders(Borders::ALL)),
    };
    frame.render_widget(widget, area);
}

fn eda_unavailable_text(reason: &str) -> String {
    format!("EDA report unavailable.\n\n{reason}")
}

fn console_text(state: &AppState) -> String {
    if state.logs.is_empty() {
        return "No messages yet".to_string();
    }
    state
        .logs
        .iter()
        .rev()
        .take(3)
        .cloned()
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 70, area);
    frame.render_widget(Clear, popup_area);

    let text = [
        "Player Value Estimator - Help",
        "",
        "Global:",
        "  Tab / 1-3    Switch tab",
        "  /            Search known players",
        "  j/k or ↑/↓   Move/scroll",
        "  ?            Toggle help",
        "  q            Quit",
        "",
        "Manual Input:",
        "  h/l or ←/→   Adjust field",
        "  H/L          Adjust x10",
        "  p / Enter    Estimate value",
        "",
        "Batch Prediction:",
        "  o            Edit CSV path",
        "  Enter        Load and predict",
        "  s            Save predicted_players.csv",
        "  x            Export XLSX",
    ]
    .join("\n");

    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eda_placeholder_carries_the_load_error() {
        let text = eda_unavailable_text("EDA report unavailable at /tmp/eda.html: permission denied");
        assert!(text.starts_with("EDA report unavailable."));
        assert!(text.ends_with("permission denied"));
        assert!(!text.contains("not found"));
    }

    #[test]
    fn console_entry_prefixes_level() {
        assert_eq!(
            console_entry("  WARN player predictions unavailable\n").as_deref(),
            Some("[WARN] player predictions unavailable")
        );
        assert_eq!(console_entry("plain").as_deref(), Some("plain"));
        assert_eq!(console_entry("   \n"), None);
    }

    #[test]
    fn visible_range_clamps_to_total() {
        assert_eq!(visible_range(0, 0, 5), (0, 0));
        assert_eq!(visible_range(9, 10, 4), (6, 10));
        assert_eq!(visible_range(1, 3, 5), (0, 3));
    }
}
