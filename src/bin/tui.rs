mod tui_app;

use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame, Terminal,
};
use tokio::sync::mpsc;
use tui_app::{
    fetch_rate, fetch_report, format_pct, format_secs, truncate, AppState, BucketResponse,
    ConnectionStatus, GroupBy, RateResponse,
};

enum AppMsg {
    Report {
        seq: u64,
        result: Result<Vec<BucketResponse>, String>,
    },
    Rate(Result<RateResponse, String>),
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:3001".to_string());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("failed to build HTTP client");

    let mut app = AppState::new(base_url);
    let (tx, mut rx) = mpsc::unbounded_channel();

    // Initial fetches before first render
    request_report(&client, &mut app, &tx, GroupBy::Daily);
    request_rate(&client, &app, &tx);

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &mut app, &client, &tx, &mut rx).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

/// Spawn a report fetch tagged with a fresh sequence number. The response is
/// applied only if no newer request was issued in the meantime.
fn request_report(
    client: &reqwest::Client,
    app: &mut AppState,
    tx: &mpsc::UnboundedSender<AppMsg>,
    group_by: GroupBy,
) {
    let seq = app.begin_request(group_by);
    let client = client.clone();
    let base_url = app.base_url.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        let result = fetch_report(&client, &base_url, group_by).await;
        let _ = tx.send(AppMsg::Report { seq, result });
    });
}

fn request_rate(client: &reqwest::Client, app: &AppState, tx: &mpsc::UnboundedSender<AppMsg>) {
    let client = client.clone();
    let base_url = app.base_url.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        let result = fetch_rate(&client, &base_url).await;
        let _ = tx.send(AppMsg::Rate(result));
    });
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    client: &reqwest::Client,
    tx: &mpsc::UnboundedSender<AppMsg>,
    rx: &mut mpsc::UnboundedReceiver<AppMsg>,
) -> io::Result<()> {
    let refresh_interval = Duration::from_secs(30);
    let mut last_tick = std::time::Instant::now();

    loop {
        // Apply any completed fetches
        while let Ok(msg) = rx.try_recv() {
            match msg {
                AppMsg::Report { seq, result } => app.apply_report(seq, result),
                AppMsg::Rate(result) => app.apply_rate(result),
            }
        }

        terminal.draw(|f| render(f, app))?;

        let timeout = Duration::from_millis(250);
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                        KeyCode::Char('d') | KeyCode::Char('D') => {
                            request_report(client, app, tx, GroupBy::Daily);
                        }
                        KeyCode::Char('w') | KeyCode::Char('W') => {
                            request_report(client, app, tx, GroupBy::Weekly);
                        }
                        KeyCode::Char('m') | KeyCode::Char('M') => {
                            request_report(client, app, tx, GroupBy::Monthly);
                        }
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            let group_by = app.group_by;
                            request_report(client, app, tx, group_by);
                            request_rate(client, app, tx);
                            last_tick = std::time::Instant::now();
                        }
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= refresh_interval {
            let group_by = app.group_by;
            request_report(client, app, tx, group_by);
            request_rate(client, app, tx);
            last_tick = std::time::Instant::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState) {
    let area = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Length(3), // KPI cards
            Constraint::Min(0),    // bucket table
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_kpis(f, app, chunks[1]);
    render_buckets_table(f, app, chunks[2]);
    render_footer(f, chunks[3]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };

    let rate_str = match &app.rate {
        Some(r) => format!("{:.0} PLN/BTC ({} src)", r.rate, r.sources),
        None => "rate: —".to_string(),
    };
    let rate_color = if app.rate_error.is_some() {
        Color::Yellow
    } else {
        Color::White
    };
    let rate_marker = if app.rate_error.is_some() { " ⚠ stale" } else { "" };

    let title_spans = vec![
        Span::styled(
            " Offers Dashboard  ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  "),
        Span::styled(
            format!("group: {}", app.group_by.as_str()),
            Style::default().fg(Color::White),
        ),
        Span::raw("  │  "),
        Span::styled(
            format!("{rate_str}{rate_marker}"),
            Style::default().fg(rate_color),
        ),
    ];

    let paragraph = Paragraph::new(Line::from(title_spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );

    f.render_widget(paragraph, area);
}

fn render_kpis(f: &mut Frame, app: &AppState, area: Rect) {
    let kpis = app.kpis();
    let profit_fiat = app.profit_fiat();

    let spans = vec![
        Span::styled("volume ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{:.2} PLN", kpis.total_volume),
            Style::default().fg(Color::White),
        ),
        Span::raw("  │  "),
        Span::styled("profit ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{} sats", kpis.total_profit_sats),
            Style::default().fg(Color::Green),
        ),
        Span::styled(
            format!(" (≈{profit_fiat:.2} PLN)"),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw("  │  "),
        Span::styled("success ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format_pct(kpis.success_percentage),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw("  │  "),
        Span::styled("avg reserve ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format_secs(kpis.avg_reserved_seconds),
            Style::default().fg(Color::White),
        ),
    ];

    let paragraph = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                " TOTALS ",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    );

    f.render_widget(paragraph, area);
}

fn render_buckets_table(f: &mut Frame, app: &AppState, area: Rect) {
    let header_cells = ["Bucket", "Succ%", "S", "F", "Profit", "Volume", "Vol sats", "Resv", "Paid"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    // Most recent bucket on top
    let rows: Vec<Row> = app
        .rows
        .iter()
        .rev()
        .map(|b| {
            let pct_color = match b.success_percentage {
                Some(p) if p >= 90.0 => Color::Green,
                Some(p) if p >= 70.0 => Color::Yellow,
                Some(_) => Color::Red,
                None => Color::DarkGray,
            };

            Row::new(vec![
                Cell::from(b.date.clone()).style(Style::default().fg(Color::White)),
                Cell::from(format_pct(b.success_percentage)).style(Style::default().fg(pct_color)),
                Cell::from(b.success.to_string()).style(Style::default().fg(Color::Green)),
                Cell::from(b.failed.to_string()).style(Style::default().fg(Color::Red)),
                Cell::from(b.profit.to_string()),
                Cell::from(format!("{:.2}", b.volume)),
                Cell::from(b.volume_sats.to_string()).style(Style::default().fg(Color::DarkGray)),
                Cell::from(format_secs(b.avg_reserved_seconds)),
                Cell::from(format_secs(b.avg_total_seconds)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(7),
            Constraint::Length(5),
            Constraint::Length(5),
            Constraint::Length(9),
            Constraint::Length(10),
            Constraint::Length(11),
            Constraint::Length(6),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                " BUCKETS ",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    );

    f.render_widget(table, area);
}

fn render_footer(f: &mut Frame, area: Rect) {
    let line = Line::from(vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[d/w/m] ", Style::default().fg(Color::Yellow)),
        Span::raw("granularity  "),
        Span::styled("[r] ", Style::default().fg(Color::Yellow)),
        Span::raw("refresh  "),
        Span::styled("auto-refresh: 30s", Style::default().fg(Color::DarkGray)),
    ]);
    let paragraph = Paragraph::new(line).style(Style::default().fg(Color::White));
    f.render_widget(paragraph, area);
}
