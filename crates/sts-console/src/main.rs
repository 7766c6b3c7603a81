//! sts-console - terminal console for simple-test-server

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use sts_client::config::{BACKEND_URL_ENV, DEFAULT_BACKEND_URL};
use sts_client::{ApiClient, ClientConfig};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use sts_console::app::App;
use sts_console::data;
use sts_console::events::{AppEvent, EventHandler, handle_key};
use sts_console::history::DEFAULT_HISTORY;
use sts_console::ui;
use sts_console::views::ViewOptions;

#[derive(Parser)]
#[command(name = "sts-console")]
#[command(about = "Terminal console for simple-test-server protocol containers")]
#[command(version)]
struct Cli {
    /// Backend origin
    #[arg(short, long, env = BACKEND_URL_ENV, default_value = DEFAULT_BACKEND_URL)]
    backend: String,

    /// Log lines fetched per request
    #[arg(long, default_value = "500")]
    tail: u32,

    /// Messages kept per live stream
    #[arg(long, default_value_t = DEFAULT_HISTORY)]
    history: usize,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Redraw interval in milliseconds
    #[arg(long, default_value = "100")]
    tick_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs must not land on the alternate screen
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sts_console=info,sts_client=info"));
    match &cli.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
                .with(filter)
                .init();
        }
        None => tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::stderr))
            .with(filter)
            .init(),
    }

    let client = ApiClient::new(ClientConfig::new(&cli.backend)?)?;
    info!(backend = %cli.backend, "Starting console");

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run application
    let result = run_app(&mut terminal, client, &cli).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    client: ApiClient,
    cli: &Cli,
) -> anyhow::Result<()> {
    let mut event_handler = EventHandler::new(Duration::from_millis(cli.tick_ms));
    let options = ViewOptions {
        history: cli.history,
        log_tail: cli.tail,
    };
    let mut app = App::new(client, event_handler.sender(), options);
    app.start();

    while app.running {
        terminal.draw(|frame| ui::draw(frame, &app))?;

        match event_handler.next().await {
            Some(AppEvent::Key(key)) => handle_key(&mut app, key),
            Some(AppEvent::Data(event)) => data::apply_data_event(&mut app, event),
            Some(AppEvent::Resize(..) | AppEvent::Tick) => {}
            None => break,
        }
    }

    app.shutdown();
    info!("Console stopped");
    Ok(())
}
