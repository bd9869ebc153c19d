use anyhow::Result;
use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Style, Stylize};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};
use scopeguard::defer;
use std::io::stdout;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::monitor::HistoryMap;
use crate::state::Snapshot;

/// Run the TUI application until the user quits or the token is cancelled
pub async fn run_tui(
    histories: HistoryMap,
    addresses: Vec<String>,
    settings: Settings,
    cancel: CancellationToken,
) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;

    // Ensure terminal is restored on any exit (success, error, or panic)
    defer! {
        let _ = disable_raw_mode();
        let _ = stdout().execute(LeaveAlternateScreen);
    }

    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;

    // Poll at the refresh interval, capped so quit keys and external
    // cancellation stay responsive
    let tick_rate = settings.refresh_interval.min(Duration::from_millis(500));

    loop {
        if cancel.is_cancelled() {
            break;
        }

        // One snapshot per address, each under its own lock; never two
        // locks at once
        let rows: Vec<(String, Snapshot)> = addresses
            .iter()
            .filter_map(|address| {
                histories
                    .get(address)
                    .map(|history| (address.clone(), history.lock().snapshot()))
            })
            .collect();

        terminal.draw(|f| draw_ui(f, &rows, &settings))?;

        // Handle input with timeout
        if event::poll(tick_rate)?
            && let Event::Key(key) = event::read()?
        {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => {
                    cancel.cancel();
                    break;
                }
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    cancel.cancel();
                    break;
                }
                _ => {}
            }
        }
    }

    Ok(())
}

fn fmt_ms(value: Option<f64>) -> String {
    match value {
        Some(ms) => format!("{:.2}", ms),
        None => "-".to_string(),
    }
}

fn draw_ui(f: &mut ratatui::Frame, rows: &[(String, Snapshot)], settings: &Settings) {
    let area = f.area();

    // Layout: table + status bar
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(area);

    let title = format!(
        "pingmon \u{2500}\u{2500} {} target{} \u{2500}\u{2500} {:.0}s interval",
        rows.len(),
        if rows.len() == 1 { "" } else { "s" },
        settings.probe_interval.as_secs_f64()
    );

    let block = Block::default().title(title).borders(Borders::ALL);

    let header = Row::new(vec![
        Cell::from("Host").style(Style::default().bold()),
        Cell::from("Last").style(Style::default().bold()),
        Cell::from("Avg").style(Style::default().bold()),
        Cell::from("Min").style(Style::default().bold()),
        Cell::from("Max").style(Style::default().bold()),
        Cell::from("Sent").style(Style::default().bold()),
        Cell::from("Drops").style(Style::default().bold()),
        Cell::from("Loss%").style(Style::default().bold()),
    ])
    .height(1);

    let table_rows = rows.iter().map(|(address, snap)| {
        let loss = snap
            .loss_pct
            .map(|pct| format!("{:.1}", pct))
            .unwrap_or_else(|| "-".to_string());
        Row::new(vec![
            Cell::from(address.clone()),
            Cell::from(fmt_ms(snap.last_latency_ms)),
            Cell::from(fmt_ms(snap.window_avg_ms)),
            Cell::from(fmt_ms(snap.window_min_ms)),
            Cell::from(fmt_ms(snap.window_max_ms)),
            Cell::from(snap.attempted.to_string()),
            Cell::from(snap.dropped.to_string()),
            Cell::from(loss),
        ])
    });

    let widths = [
        Constraint::Min(20),
        Constraint::Length(9),
        Constraint::Length(9),
        Constraint::Length(9),
        Constraint::Length(9),
        Constraint::Length(7),
        Constraint::Length(7),
        Constraint::Length(7),
    ];

    let table = Table::new(table_rows, widths).header(header).block(block);
    f.render_widget(table, chunks[0]);

    let status_bar = Paragraph::new("q quit").style(Style::default().dim());
    f.render_widget(status_bar, chunks[1]);
}
