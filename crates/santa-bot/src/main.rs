// Secret Santa bot entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, stdout carries the chat)
// 2. Load config
// 3. Open database
// 4. Serve the console until input ends or Ctrl+C

use std::sync::Arc;

use anyhow::Context;
use santa_bot::console::{self, Exit};
use santa_bot::dispatch::Dispatcher;
use santa_core::config;
use santa_core::SessionStore;
use tokio::io::BufReader;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Secret Santa bot starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!("Config loaded: database={}", config.database.path);

    // 3. Open database
    let store = Arc::new(
        SessionStore::open(&config.database.path).context("failed to open database")?,
    );
    info!("Database opened at {}", config.database.path);

    let dispatcher = Dispatcher::new(store, &config);

    // 4. Console session
    info!("Bot ready, reading `<user_id> <text>` lines from stdin");
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match console::serve(stdin, &dispatcher, &mut stdout, shutdown).await {
        Ok(Exit::InputClosed) => info!("Secret Santa bot shut down cleanly"),
        Ok(Exit::Interrupted) => {
            info!("Ctrl+C received, shutting down");
            // A pending stdin read holds a runtime thread that dropping the
            // runtime would wait on.
            std::process::exit(0);
        }
        Err(e) => error!("Dispatch loop error: {}", e),
    }

    Ok(())
}

/// Initialize tracing to log to a file (stdout is the chat transcript).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("santa-bot.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("santa_bot=info,santa_core=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
