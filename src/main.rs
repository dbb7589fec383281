//! `hedge-dash`: a terminal dashboard that fires hedged HTTP calls at the replicas
//! listed in `HEDGE_INSTANCES` and shows which one wins.
//!
//! Calls run either hedged (width adjustable at runtime) or against the selected
//! instance alone, one at a time or in batches. Set `HEDGE_LOG_FILE` to capture the
//! library's tracing output.

mod app;
mod dispatch;
mod env;
mod ui;

use std::{fs::File, sync::Mutex, time::Duration};

use app::{App, AppEvent, Mode};
use color_eyre::{eyre::WrapErr, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use dispatch::spawn_call;
use env::{build_clients, target_from_env, width_from_env};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use ui::draw_ui;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_logging()?;

    let target = target_from_env()?;
    let clients = build_clients(&target, width_from_env(target.instances.len()))?;
    let mut app = App::new(clients, target);

    let mut terminal = ratatui::init();
    terminal.clear()?;

    let result = run_app(&mut terminal, &mut app).await;

    ratatui::restore();

    result
}

/// Logs go to a file so they don't tear through the terminal UI.
fn init_logging() -> Result<()> {
    let Ok(path) = std::env::var("HEDGE_LOG_FILE") else {
        return Ok(());
    };
    let file = File::create(&path).wrap_err_with(|| format!("cannot open log file {path}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();

    Ok(())
}

async fn run_app(terminal: &mut ratatui::DefaultTerminal, app: &mut App) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<AppEvent>();

    loop {
        while let Ok(AppEvent::CallFinished {
            instance,
            latency_ms,
            ok,
            message,
        }) = rx.try_recv()
        {
            app.record_call(instance, latency_ms, ok, message);
        }

        terminal.draw(|frame| draw_ui(frame, app))?;

        if app.wants_batch_call() {
            spawn_call(app, tx.clone());
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        if let Event::Key(KeyEvent {
            code,
            kind: KeyEventKind::Press,
            ..
        }) = event::read()?
        {
            if handle_key(app, code, &tx) == Flow::Quit {
                return Ok(());
            }
        }
    }
}

#[derive(PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn handle_key(app: &mut App, code: KeyCode, tx: &mpsc::UnboundedSender<AppEvent>) -> Flow {
    match code {
        KeyCode::Char('q') | KeyCode::Esc => return Flow::Quit,
        KeyCode::Up => app.select_prev(),
        KeyCode::Down => app.select_next(),
        KeyCode::Tab => app.toggle_mode(),
        KeyCode::Char('m') => app.toggle_method(),
        KeyCode::Char('r') => spawn_call(app, tx.clone()),
        KeyCode::Char(' ') => {
            app.mode = Mode::SingleInstance;
            spawn_call(app, tx.clone());
        }
        KeyCode::Char('b') => app.toggle_batch(),
        KeyCode::Char('+' | '=') => app.adjust_width(1),
        KeyCode::Char('-' | '_') => app.adjust_width(-1),
        KeyCode::Char('[' | ',') => app.resize_batch(false),
        KeyCode::Char(']' | '.') => app.resize_batch(true),
        KeyCode::Char('s') => app.reset_stats(),
        _ => {}
    }
    Flow::Continue
}
