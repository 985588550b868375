//! Command handlers. Each runs after the route guard has let it through.

use std::process::ExitCode;

use anyhow::Result;
use tracing::{debug, warn};

use algotrader_core::api::ApiError;
use algotrader_core::app::App;
use algotrader_core::auth::{RegisterRequest, SessionError};
use algotrader_core::models::{Backtest, Strategy, StrategyUpdate};
use algotrader_core::utils::{format_currency, format_date, format_percent, truncate_string};

use crate::prompt;
use crate::NOT_LOGGED_IN;

/// Name column width in list output
const NAME_WIDTH: usize = 28;

/// Backtests shown on the dashboard
const RECENT_BACKTESTS: usize = 5;

// ============================================================================
// Session commands
// ============================================================================

pub async fn login(app: &mut App, username: Option<String>) -> Result<ExitCode> {
    let username = match username {
        Some(username) => username,
        None => prompt::line("Username", app.config.last_username.as_deref())?,
    };
    let password = prompt::password("Password")?;

    match app.store().login(&username, &password).await {
        Ok(user) => {
            println!("Logged in as {}", user.display_name());
            remember(app, username.trim());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(session_failure(&e)),
    }
}

pub async fn register(
    app: &mut App,
    username: &str,
    email: &str,
    initial_balance: f64,
) -> Result<ExitCode> {
    let password = prompt::password("Password")?;
    let confirm = prompt::password("Confirm password")?;
    let request = RegisterRequest::new(username, email, &password, &confirm)
        .with_initial_balance(initial_balance);

    match app.store().register(&request).await {
        Ok(user) => {
            println!("Account created. Logged in as {}", user.display_name());
            remember(app, username);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(session_failure(&e)),
    }
}

pub async fn logout(app: &App) -> Result<ExitCode> {
    let was_signed_in = app.store().snapshot().authenticated;
    match app.store().logout().await {
        Ok(()) if was_signed_in => println!("Logged out"),
        Ok(()) => println!("Not logged in"),
        Err(e) => return Ok(session_failure(&e)),
    }
    Ok(ExitCode::SUCCESS)
}

pub fn whoami(app: &App) -> Result<ExitCode> {
    let session = app.store().snapshot();
    let Some(user) = session.user else {
        eprintln!("{}", NOT_LOGGED_IN);
        return Ok(ExitCode::FAILURE);
    };
    println!("{} (id {})", user.display_name(), user.id);
    if let Some(email) = &user.email {
        println!("Email:    {}", email);
    }
    println!("Backend:  {}", app.store().backend_name());
    Ok(ExitCode::SUCCESS)
}

fn remember(app: &mut App, username: &str) {
    if let Err(e) = app.remember_username(username) {
        warn!(error = %e, "Failed to save last username");
    }
}

fn session_failure(err: &SessionError) -> ExitCode {
    debug!(error = %err, "Session operation failed");
    eprintln!("{}", err.display_message());
    ExitCode::FAILURE
}

// ============================================================================
// Data commands
// ============================================================================

pub async fn dashboard(app: &App) -> Result<ExitCode> {
    let api = app.api();
    let (strategies, backtests) = futures::join!(api.list_strategies(), api.list_backtests());
    let strategies = match strategies {
        Ok(strategies) => strategies,
        Err(e) => return Ok(api_failure(&e, "Failed to load strategies")),
    };
    let backtests = match backtests {
        Ok(backtests) => backtests,
        Err(e) => return Ok(api_failure(&e, "Failed to load backtests")),
    };

    if let Some(user) = app.store().snapshot().user {
        println!("Welcome back, {}", user.display_name());
        println!();
    }

    let active = strategies.iter().filter(|s| s.is_active).count();
    println!(
        "Strategies: {} ({} active, {} inactive)",
        strategies.len(),
        active,
        strategies.len() - active
    );
    println!("Backtests:  {}", backtests.len());

    let best = backtests
        .iter()
        .max_by(|a, b| a.profit_loss_percent.total_cmp(&b.profit_loss_percent));
    if let Some(best) = best {
        println!(
            "Best run:   {} {}",
            best.name,
            format_percent(best.profit_loss_percent)
        );
    }

    if !backtests.is_empty() {
        let mut recent: Vec<&Backtest> = backtests.iter().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        println!();
        println!("Recent backtests");
        print_backtest_rows(recent.into_iter().take(RECENT_BACKTESTS));
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn list_strategies(app: &App) -> Result<ExitCode> {
    let strategies = match app.api().list_strategies().await {
        Ok(strategies) => strategies,
        Err(e) => return Ok(api_failure(&e, "Failed to load strategies")),
    };
    if strategies.is_empty() {
        println!("No strategies yet");
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{:>5}  {:<width$}  {:<8}  {:>8}",
        "ID",
        "Name",
        "Status",
        "MA",
        width = NAME_WIDTH
    );
    for strategy in &strategies {
        println!(
            "{:>5}  {:<width$}  {:<8}  {:>8}",
            strategy.id,
            truncate_string(&strategy.name, NAME_WIDTH),
            strategy.status_label(),
            format!(
                "{}/{}",
                strategy.parameters.short_ma, strategy.parameters.long_ma
            ),
            width = NAME_WIDTH
        );
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn show_strategy(app: &App, id: i64) -> Result<ExitCode> {
    match app.api().get_strategy(id).await {
        Ok(strategy) => {
            print_strategy(&strategy);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(api_failure(&e, "Failed to load strategy")),
    }
}

/// Fields to change on a strategy; `None` keeps the current value.
#[derive(Debug, Default)]
pub struct StrategyEdit {
    pub name: Option<String>,
    pub description: Option<String>,
    pub active: Option<bool>,
    pub short_ma: Option<u32>,
    pub long_ma: Option<u32>,
    pub symbol: Option<String>,
    pub position_size: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

impl StrategyEdit {
    fn apply(self, update: &mut StrategyUpdate) {
        if let Some(name) = self.name {
            update.name = name;
        }
        if let Some(description) = self.description {
            update.description = description;
        }
        if let Some(active) = self.active {
            update.is_active = active;
        }
        if let Some(short_ma) = self.short_ma {
            update.parameters.short_ma = short_ma;
        }
        if let Some(long_ma) = self.long_ma {
            update.parameters.long_ma = long_ma;
        }
        let parameters = &mut update.parameters;
        if let Some(symbol) = self.symbol {
            parameters.symbol = Some(symbol.trim().to_uppercase());
        }
        if self.position_size.is_some() {
            parameters.position_size = self.position_size;
        }
        if self.stop_loss.is_some() {
            parameters.stop_loss = self.stop_loss;
        }
        if self.take_profit.is_some() {
            parameters.take_profit = self.take_profit;
        }
    }
}

pub async fn create_strategy(app: &App, name: String, edit: StrategyEdit) -> Result<ExitCode> {
    let mut strategy = StrategyUpdate::new(name);
    edit.apply(&mut strategy);
    if let Err(message) = strategy.validate() {
        eprintln!("{}", message);
        return Ok(ExitCode::FAILURE);
    }

    match app.api().create_strategy(&strategy).await {
        Ok(created) => {
            println!("Strategy created");
            print_strategy(&created);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(api_failure(&e, "Failed to create strategy")),
    }
}

pub async fn update_strategy(app: &App, id: i64, edit: StrategyEdit) -> Result<ExitCode> {
    let strategy = match app.api().get_strategy(id).await {
        Ok(strategy) => strategy,
        Err(e) => return Ok(api_failure(&e, "Failed to load strategy")),
    };

    let mut update = strategy.to_update();
    edit.apply(&mut update);
    if let Err(message) = update.validate() {
        eprintln!("{}", message);
        return Ok(ExitCode::FAILURE);
    }

    match app.api().update_strategy(id, &update).await {
        Ok(updated) => {
            println!("Strategy updated");
            print_strategy(&updated);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(api_failure(&e, "Failed to update strategy")),
    }
}

pub async fn delete_strategy(app: &App, id: i64) -> Result<ExitCode> {
    match app.api().delete_strategy(id).await {
        Ok(()) => {
            println!("Strategy {} deleted", id);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(api_failure(&e, "Failed to delete strategy")),
    }
}

pub async fn list_backtests(app: &App) -> Result<ExitCode> {
    let backtests = match app.api().list_backtests().await {
        Ok(backtests) => backtests,
        Err(e) => return Ok(api_failure(&e, "Failed to load backtests")),
    };
    if backtests.is_empty() {
        println!("No backtests yet");
    } else {
        print_backtest_rows(backtests.iter());
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn show_backtest(app: &App, id: i64) -> Result<ExitCode> {
    let detail = match app.api().get_backtest(id).await {
        Ok(detail) => detail,
        Err(e) => return Ok(api_failure(&e, "Failed to load backtest")),
    };
    let bt = &detail.backtest;

    println!("{} (#{})", bt.name, bt.id);
    println!(
        "Strategy:      {} (#{})",
        detail.strategy.name, detail.strategy.id
    );
    println!(
        "Period:        {} to {} ({} days)",
        format_date(bt.start_date),
        format_date(bt.end_date),
        bt.duration_days()
    );
    println!("Initial:       {}", format_currency(bt.initial_capital));
    println!("Final:         {}", format_currency(bt.final_capital));
    println!(
        "Profit/loss:   {} ({})",
        format_currency(bt.profit_loss),
        format_percent(bt.profit_loss_percent)
    );
    println!("Max drawdown:  {:.2}%", bt.max_drawdown);
    if let Some(sharpe) = bt.sharpe_ratio {
        println!("Sharpe ratio:  {:.2}", sharpe);
    }
    println!("Trades:        {}", detail.trade_count());
    Ok(ExitCode::SUCCESS)
}

fn print_strategy(strategy: &Strategy) {
    println!("{} (#{})", strategy.name, strategy.id);
    println!("Status:       {}", strategy.status_label());
    if let Some(description) = strategy.description.as_deref().filter(|d| !d.is_empty()) {
        println!("Description:  {}", description);
    }
    println!(
        "Moving avg:   short {} / long {}",
        strategy.parameters.short_ma, strategy.parameters.long_ma
    );
    let parameters = &strategy.parameters;
    if let Some(symbol) = &parameters.symbol {
        println!("Symbol:       {}", symbol);
    }
    if let Some(size) = parameters.position_size {
        println!("Position:     {}", size);
    }
    if let Some(stop_loss) = parameters.stop_loss {
        println!("Stop loss:    {}%", stop_loss);
    }
    if let Some(take_profit) = parameters.take_profit {
        println!("Take profit:  {}%", take_profit);
    }
    if strategy
        .indicators
        .as_object()
        .is_some_and(|indicators| !indicators.is_empty())
    {
        match serde_json::to_string_pretty(&strategy.indicators) {
            Ok(indicators) => println!("Indicators:   {}", indicators),
            Err(e) => debug!(error = %e, "Failed to format indicators"),
        }
    }
    if let Some(updated) = strategy.updated_at.or(strategy.created_at) {
        println!("Updated:      {}", format_date(updated.date()));
    }
}

fn print_backtest_rows<'a>(backtests: impl Iterator<Item = &'a Backtest>) {
    println!(
        "{:>5}  {:<width$}  {:>14}  {:>9}",
        "ID",
        "Name",
        "Final",
        "Return",
        width = NAME_WIDTH
    );
    for bt in backtests {
        println!(
            "{:>5}  {:<width$}  {:>14}  {:>9}",
            bt.id,
            truncate_string(&bt.name, NAME_WIDTH),
            format_currency(bt.final_capital),
            format_percent(bt.profit_loss_percent),
            width = NAME_WIDTH
        );
    }
}

fn api_failure(err: &ApiError, fallback: &str) -> ExitCode {
    warn!(error = %err, "Request failed");
    if err.is_auth_failure() {
        eprintln!("Session expired or not permitted. Run 'algotrader login' again.");
    } else if matches!(err, ApiError::Network(_)) {
        eprintln!("Unable to connect to server. Check your internet connection.");
    } else {
        eprintln!("{}", err.display_message(fallback));
    }
    ExitCode::FAILURE
}
