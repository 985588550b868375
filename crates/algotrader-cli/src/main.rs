//! AlgoTrader CLI - terminal front end for the AlgoTrader dashboard.
//!
//! Every command starts by rehydrating the saved session. Commands that map
//! to a protected view go through the route guard before anything is fetched.

mod commands;
mod prompt;

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use algotrader_core::app::App;
use algotrader_core::auth::DEFAULT_INITIAL_BALANCE;
use algotrader_core::routing::{Navigation, Route};

/// Directory for a daily rolling log file, in addition to stderr
const LOG_DIR_ENV: &str = "ALGOTRADER_LOG_DIR";

const LOG_FILE_PREFIX: &str = "algotrader.log";

pub const NOT_LOGGED_IN: &str = "Not logged in. Run 'algotrader login' first.";

#[derive(Debug, Parser)]
#[command(name = "algotrader", version, about = "AlgoTrader dashboard in the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in and save the session on this device
    Login {
        #[arg(long, short)]
        username: Option<String>,
    },
    /// Create an account and sign in
    Register {
        #[arg(long, short)]
        username: String,
        #[arg(long, short)]
        email: String,
        #[arg(long, default_value_t = DEFAULT_INITIAL_BALANCE)]
        initial_balance: f64,
    },
    /// Sign out and forget the saved session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Strategy and backtest overview
    Dashboard,
    /// List strategies, or show one
    Strategies { id: Option<i64> },
    /// Create a strategy
    StrategyCreate {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        active: Option<bool>,
        #[arg(long)]
        short_ma: Option<u32>,
        #[arg(long)]
        long_ma: Option<u32>,
        #[command(flatten)]
        trading: TradingArgs,
    },
    /// Edit a strategy
    StrategyUpdate {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        active: Option<bool>,
        #[arg(long)]
        short_ma: Option<u32>,
        #[arg(long)]
        long_ma: Option<u32>,
        #[command(flatten)]
        trading: TradingArgs,
    },
    /// Delete a strategy
    StrategyDelete { id: i64 },
    /// List backtests, or show one
    Backtests { id: Option<i64> },
}

/// Ticker, sizing and exit levels for create and update
#[derive(Debug, clap::Args)]
struct TradingArgs {
    #[arg(long)]
    symbol: Option<String>,
    #[arg(long)]
    position_size: Option<f64>,
    #[arg(long)]
    stop_loss: Option<f64>,
    #[arg(long)]
    take_profit: Option<f64>,
}

impl Command {
    /// The view this command stands for. `None` for commands that act on the
    /// session without showing a view.
    fn route(&self) -> Option<Route> {
        match self {
            Command::Login { .. } => Some(Route::Login),
            Command::Register { .. } => Some(Route::Register),
            Command::Logout => None,
            Command::Whoami | Command::Dashboard => Some(Route::Dashboard),
            Command::Strategies { id: None } | Command::StrategyCreate { .. } => {
                Some(Route::Strategies)
            }
            Command::Strategies { id: Some(id) }
            | Command::StrategyUpdate { id, .. }
            | Command::StrategyDelete { id } => Some(Route::StrategyDetail(*id)),
            Command::Backtests { id: None } => Some(Route::Backtests),
            Command::Backtests { id: Some(id) } => Some(Route::BacktestDetail(*id)),
        }
    }
}

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the log file on drop and must be held until
/// exit.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir.trim(), LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing();
    info!("AlgoTrader CLI starting");

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Apply the route guard. Returns an exit code when the command must not run.
fn guard(app: &App, route: Route) -> Result<Option<ExitCode>> {
    match app.open(route) {
        Navigation::Render(_) => Ok(None),
        Navigation::Redirect { from, to } => {
            info!(from = %from, to = %to, "Redirected by route guard");
            eprintln!("{}", NOT_LOGGED_IN);
            Ok(Some(ExitCode::FAILURE))
        }
        Navigation::Placeholder(_) => anyhow::bail!("Session is still loading"),
        Navigation::NotFound => anyhow::bail!("Unknown view"),
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut app = App::new()?;
    app.start().await?;

    if let Some(route) = cli.command.route() {
        if let Some(code) = guard(&app, route)? {
            return Ok(code);
        }
    }

    match cli.command {
        Command::Login { username } => commands::login(&mut app, username).await,
        Command::Register {
            username,
            email,
            initial_balance,
        } => commands::register(&mut app, &username, &email, initial_balance).await,
        Command::Logout => commands::logout(&app).await,
        Command::Whoami => commands::whoami(&app),
        Command::Dashboard => commands::dashboard(&app).await,
        Command::Strategies { id: None } => commands::list_strategies(&app).await,
        Command::Strategies { id: Some(id) } => commands::show_strategy(&app, id).await,
        Command::StrategyCreate {
            name,
            description,
            active,
            short_ma,
            long_ma,
            trading,
        } => {
            let edit = commands::StrategyEdit {
                name: None,
                description,
                active,
                short_ma,
                long_ma,
                symbol: trading.symbol,
                position_size: trading.position_size,
                stop_loss: trading.stop_loss,
                take_profit: trading.take_profit,
            };
            commands::create_strategy(&app, name, edit).await
        }
        Command::StrategyUpdate {
            id,
            name,
            description,
            active,
            short_ma,
            long_ma,
            trading,
        } => {
            let edit = commands::StrategyEdit {
                name,
                description,
                active,
                short_ma,
                long_ma,
                symbol: trading.symbol,
                position_size: trading.position_size,
                stop_loss: trading.stop_loss,
                take_profit: trading.take_profit,
            };
            commands::update_strategy(&app, id, edit).await
        }
        Command::StrategyDelete { id } => commands::delete_strategy(&app, id).await,
        Command::Backtests { id: None } => commands::list_backtests(&app).await,
        Command::Backtests { id: Some(id) } => commands::show_backtest(&app, id).await,
    }
}
