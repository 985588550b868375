//! Data models for AlgoTrader entities.
//!
//! - `User`, `UserId`: the identity record held by the session
//! - `Strategy`, `StrategyParameters`, `StrategyUpdate`: trading strategies
//! - `Backtest`: results of running a strategy over historical data

pub mod backtest;
pub mod strategy;
pub mod user;

pub use backtest::{Backtest, BacktestDetail};
pub use strategy::{Strategy, StrategyParameters, StrategyUpdate};
pub use user::{User, UserId};
