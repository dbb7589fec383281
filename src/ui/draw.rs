//! Frame layout and widgets for the dashboard.

use std::time::Duration;

use hedging_client::{HedgeConfig, InstanceAddress};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table, Wrap},
};

use super::styles::*;
use crate::app::{App, Method, Mode};

const ADDRESS_WIDTH: usize = 24;
const TREND_POINTS: usize = 12;
const TREND_GLYPHS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

const KEYS: [&[(&str, &str)]; 3] = [
    &[
        ("↑/↓", "select instance"),
        ("Space", "call selected"),
        ("Tab", "hedged / single"),
    ],
    &[
        ("+/-", "hedge width"),
        ("r", "run call"),
        ("m", "GET / POST"),
        ("b", "batch"),
    ],
    &[("[/]", "batch size"), ("s", "reset stats"), ("q", "quit")],
];

pub fn draw_ui(frame: &mut Frame, app: &App) {
    let [title, summary, body, keys] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(6),
        Constraint::Min(0),
        Constraint::Length(5),
    ])
    .areas(frame.area());
    let [left, right] =
        Layout::horizontal([Constraint::Percentage(58), Constraint::Percentage(42)]).areas(body);

    frame.render_widget(
        panel(" hedge-dash :: hedged requests across replicas ").title_style(header_style()),
        title,
    );
    render_summary(frame, summary, app);
    render_instances(frame, left, app);
    render_sidebar(frame, right, app);
    render_keys(frame, keys);
}

/// Bordered block with the dashboard's title styling.
fn panel(title: &str) -> Block<'_> {
    Block::default()
        .title(title)
        .title_style(title_style())
        .borders(Borders::ALL)
        .border_style(border_style())
}

/// `label  value` line, label muted.
fn field<'a>(label: &'a str, value: impl Into<String>, style: Style) -> Line<'a> {
    Line::from(vec![
        Span::styled(format!("{label:<9}"), muted_style()),
        Span::styled(value.into(), style),
    ])
}

fn separator() -> Span<'static> {
    Span::styled("  │  ", muted_style())
}

/// Text bar such as `[████░░░░]` for a ratio between 0 and 1.
fn meter(ratio: f64, cells: usize) -> String {
    let filled = ((ratio.clamp(0.0, 1.0)) * cells as f64).round() as usize;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(cells - filled))
}

fn human_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    match secs {
        0..=59 => format!("{secs}s"),
        60..=3599 => format!("{}m {:02}s", secs / 60, secs % 60),
        _ => format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60),
    }
}

fn render_summary(frame: &mut Frame, area: Rect, app: &App) {
    let success_rate = app.success_rate();
    let rate_style = match success_rate {
        r if r > 95.0 => success_style(),
        r if r > 80.0 => highlight_style(),
        _ => error_style(),
    };
    let errors_style = if app.session.errors > 0 {
        error_style()
    } else {
        text_style()
    };

    let counters = Line::from(vec![
        Span::styled("up ", muted_style()),
        Span::styled(human_duration(app.session_uptime()), text_style()),
        separator(),
        Span::styled("calls ", muted_style()),
        Span::styled(app.session.calls.to_string(), text_style()),
        separator(),
        Span::styled("won ", muted_style()),
        Span::styled(app.session.successes.to_string(), success_style()),
        separator(),
        Span::styled("failed ", muted_style()),
        Span::styled(app.session.errors.to_string(), errors_style),
    ]);
    let throughput = Line::from(vec![
        Span::styled(
            format!("{:.1} calls/s", app.calls_per_second()),
            highlight_style(),
        ),
        separator(),
        Span::styled("mean ", muted_style()),
        Span::styled(format!("{:.0} ms", app.average_latency()), text_style()),
        separator(),
        Span::styled(meter(success_rate / 100.0, 15), rate_style),
        Span::styled(format!(" {success_rate:.1}% ok"), text_style()),
    ]);

    frame.render_widget(
        Paragraph::new(vec![counters, throughput]).block(panel(" Session ")),
        area,
    );
}

fn render_instances(frame: &mut Frame, area: Rect, app: &App) {
    let total_wins: u64 = app.stats_snapshot.values().map(|s| s.wins).sum();

    let header = Row::new(
        ["Instance", "Wins", "Avg ms", "Errors", "Trend", "Share"]
            .map(|h| Cell::from(h).style(table_header_style())),
    )
    .bottom_margin(1);

    let rows = app.instances.iter().enumerate().map(|(idx, address)| {
        let stats = app.stats_snapshot.get(address).cloned().unwrap_or_default();
        let share = if total_wins > 0 {
            stats.wins as f64 / total_wins as f64
        } else {
            0.0
        };
        let share_style = match share {
            s if s > 0.5 => success_style(),
            s if s > 0.2 => highlight_style(),
            _ => Style::default(),
        };

        let row = Row::new([
            Cell::from(short_address(address)),
            Cell::from(stats.wins.to_string()).style(if stats.wins > 0 {
                success_style()
            } else {
                Style::default()
            }),
            Cell::from(format!("{:.1}", stats.avg_latency_ms)),
            Cell::from(stats.errors.to_string()).style(if stats.errors > 0 {
                error_style()
            } else {
                Style::default()
            }),
            Cell::from(trend(app, address))
                .style(latency_style(stats.avg_latency_ms, 300.0, 600.0)),
            Cell::from(format!("{} {:.0}%", meter(share, 10), share * 100.0))
                .style(share_style),
        ]);

        if idx == app.selected_idx {
            row.style(selected_row_style())
        } else {
            row
        }
    });

    let title = match app.mode {
        Mode::Hedged => format!(
            " Instances (racing {} of {}) ",
            app.width,
            app.instances.len()
        ),
        Mode::SingleInstance => " Instances ".to_string(),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(ADDRESS_WIDTH as u16),
            Constraint::Length(6),
            Constraint::Length(8),
            Constraint::Length(7),
            Constraint::Length(TREND_POINTS as u16 + 2),
            Constraint::Min(18),
        ],
    )
    .header(header)
    .block(panel(&title))
    .column_spacing(2);

    frame.render_widget(table, area);
}

/// Drops the scheme and keeps the tail of addresses that do not fit the column.
fn short_address(address: &InstanceAddress) -> String {
    let bare = address
        .as_str()
        .trim_start_matches("http://")
        .trim_start_matches("https://");
    let len = bare.chars().count();
    if len <= ADDRESS_WIDTH {
        return bare.to_string();
    }
    let tail: String = bare.chars().skip(len - (ADDRESS_WIDTH - 1)).collect();
    format!("…{tail}")
}

/// Sparkline of the most recent winning latencies of `address`.
fn trend(app: &App, address: &InstanceAddress) -> String {
    let Some(history) = app.latency_history.get(address).filter(|h| !h.is_empty()) else {
        return "─".repeat(TREND_POINTS);
    };

    let recent: Vec<u64> = history
        .iter()
        .skip(history.len().saturating_sub(TREND_POINTS))
        .copied()
        .collect();
    let lo = recent.iter().copied().min().unwrap_or(0);
    let hi = recent.iter().copied().max().unwrap_or(0);
    let span = (hi - lo).max(1) as f64;

    recent
        .iter()
        .map(|&ms| {
            let level = ((ms - lo) as f64 / span * 7.0) as usize;
            TREND_GLYPHS[level.min(7)]
        })
        .collect()
}

fn render_sidebar(frame: &mut Frame, area: Rect, app: &App) {
    let mut constraints = vec![Constraint::Length(7), Constraint::Min(0)];
    if app.batch.running {
        constraints.push(Constraint::Length(3));
    }
    constraints.push(Constraint::Length(4));

    let areas = Layout::vertical(constraints).split(area);

    render_controls(frame, areas[0], app);
    render_last_call(frame, areas[1], app);
    if app.batch.running {
        render_batch(frame, areas[2], app);
    }
    render_hedge_settings(frame, areas[areas.len() - 1], app);
}

fn render_controls(frame: &mut Frame, area: Rect, app: &App) {
    let mode_style = match app.mode {
        Mode::Hedged => highlight_style(),
        Mode::SingleInstance => success_style(),
    };
    let request = match app.method {
        Method::Get => format!("GET {}", app.target.path),
        Method::Post => format!("POST {} (json)", app.target.path),
    };
    let selected = app
        .selected_instance()
        .map(short_address)
        .unwrap_or_else(|| "-".into());
    let (batch, batch_style) = if app.batch.running {
        (
            format!("running {}/{}", app.batch.done, app.batch.size),
            success_style(),
        )
    } else {
        (format!("off, size {}", app.batch.size), muted_style())
    };

    let lines = vec![
        field("mode", app.mode_string(), mode_style),
        field("request", request, text_style()),
        field("selected", selected, text_style()),
        field("batch", batch, batch_style),
    ];

    frame.render_widget(
        Paragraph::new(lines)
            .block(panel(" Controls "))
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn render_last_call(frame: &mut Frame, area: Rect, app: &App) {
    let winner = app
        .last_instance
        .as_ref()
        .map(short_address)
        .unwrap_or_else(|| "-".into());
    let (latency, style) = match app.last_latency_ms {
        Some(ms) => (format!("{ms:.1} ms"), latency_style(ms, 200.0, 500.0)),
        None => ("-".to_string(), muted_style()),
    };

    let lines = vec![
        field("result", app.last_message.clone(), text_style()),
        field("winner", winner, success_style()),
        field("latency", latency, style),
    ];

    frame.render_widget(
        Paragraph::new(lines)
            .block(panel(" Last call "))
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn render_batch(frame: &mut Frame, area: Rect, app: &App) {
    let ratio = if app.batch.size > 0 {
        app.batch.done as f64 / app.batch.size as f64
    } else {
        0.0
    };

    let gauge = Gauge::default()
        .block(panel(" Batch "))
        .gauge_style(success_style())
        .ratio(ratio.clamp(0.0, 1.0))
        .label(format!("{}/{}", app.batch.done, app.batch.size));

    frame.render_widget(gauge, area);
}

fn render_hedge_settings(frame: &mut Frame, area: Rect, app: &App) {
    let width = match app.mode {
        Mode::Hedged => app.width,
        Mode::SingleInstance => 1,
    };
    let per_call = HedgeConfig::with_width(width);
    let timeout = app
        .client
        .config()
        .overall_timeout
        .map(|t| format!("{} ms", t.as_millis()))
        .unwrap_or_else(|| "none".into());

    let lines = vec![
        Line::from(vec![
            Span::styled("service ", muted_style()),
            Span::styled(app.target.service.clone(), text_style()),
            separator(),
            Span::styled("known ", muted_style()),
            Span::styled(app.instances.len().to_string(), text_style()),
        ]),
        Line::from(vec![
            Span::styled("width ", muted_style()),
            Span::styled(per_call.desired_width.to_string(), success_style()),
            separator(),
            Span::styled("budget ", muted_style()),
            Span::styled(per_call.selection_budget.to_string(), text_style()),
            separator(),
            Span::styled("timeout ", muted_style()),
            Span::styled(timeout, text_style()),
        ]),
    ];

    frame.render_widget(Paragraph::new(lines).block(panel(" Hedge ")), area);
}

fn render_keys(frame: &mut Frame, area: Rect) {
    let lines: Vec<Line> = KEYS
        .iter()
        .map(|row| {
            let mut spans = vec![Span::raw(" ")];
            for (i, (key, action)) in row.iter().enumerate() {
                if i > 0 {
                    spans.push(separator());
                }
                spans.push(Span::styled(*key, highlight_style()));
                spans.push(Span::styled(format!(" {action}"), muted_style()));
            }
            Line::from(spans)
        })
        .collect();

    frame.render_widget(Paragraph::new(lines).block(panel(" Keys ")), area);
}
