//! solicita - Terminal client for logistics service requests
//!
//! Walks the user through creating a service request for a client and then
//! completing it with residue lines and service or transport details. The
//! form is saved as it is typed, so an interrupted request is restored on
//! the next start.

use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use solicita::application::{App, RunMode, SessionContext, TaskRunner, Wizard};
use solicita::infrastructure::{
    Cli, Command, Config, DraftAction, DraftStore, FileDraftStore, HttpBackend, SessionStore,
};
use solicita::presentation::{render_ui, InputHandler};
use std::error::Error;
use std::fs::{self, OpenOptions};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info};

/// How long the event loop waits for a key before checking on background tasks.
const TICK: Duration = Duration::from_millis(100);

/// Entry point for the solicita terminal client.
///
/// Parses the command line, sets up logging and either runs a maintenance
/// subcommand or the interactive wizard.
///
/// # Errors
///
/// Returns an error if the data directory or log file cannot be created,
/// if terminal setup fails, or if a maintenance subcommand fails.
fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = Config::from_cli(&cli);
    init_logging(&config)?;

    match cli.command.unwrap_or(Command::Tui) {
        Command::Tui => run_tui(&config),
        Command::Draft { action: DraftAction::Show } => {
            let draft = FileDraftStore::new(config.draft_path()).load();
            println!("{}", serde_json::to_string_pretty(&draft)?);
            Ok(())
        }
        Command::Draft { action: DraftAction::Clear } => {
            FileDraftStore::new(config.draft_path()).clear()?;
            println!("Draft cleared");
            Ok(())
        }
        Command::Logout => {
            SessionStore::new(config.session_path()).clear()?;
            println!("Signed out");
            Ok(())
        }
    }
}

/// Sends log output to a file; the terminal belongs to the UI.
fn init_logging(config: &Config) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(&config.data_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_path())?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.log_level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}

fn run_tui(config: &Config) -> Result<(), Box<dyn Error>> {
    let backend = HttpBackend::new(&config.api_url, config.timeout)?;
    info!(api_url = %config.api_url, "starting");

    let tasks = TaskRunner::new(Arc::new(backend), RunMode::Background);
    let wizard = Wizard::resume(Box::new(FileDraftStore::new(config.draft_path())));
    let session = SessionContext::new(Some(SessionStore::new(config.session_path())));
    let mut app = App::new(wizard, session, tasks);
    app.start();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        error!(error = %err, "terminal loop failed");
        println!("{err:?}");
    }
    info!("exiting");

    Ok(())
}

/// Main application event loop.
///
/// Redraws, waits up to one tick for a key, then applies whatever the
/// background tasks have finished. Runs until the user quits.
///
/// # Errors
///
/// Returns an IO error if terminal operations fail.
fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| render_ui(f, app))?;

        if event::poll(TICK)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    InputHandler::handle_key_event(app, key.code, key.modifiers);
                }
            }
        }
        app.poll_tasks();

        if app.should_quit {
            return Ok(());
        }
    }
}
