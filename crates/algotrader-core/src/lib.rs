//! Core library for the AlgoTrader client.
//!
//! Holds everything a front end needs to talk to the trading backend: the
//! REST client, the session store and its identity backends, the route guard,
//! and configuration.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod models;
pub mod routing;
pub mod utils;
