//! REST API client module for the AlgoTrader backend.
//!
//! This module provides the `ApiClient` for authentication calls and for the
//! strategy and backtest endpoints. Requests carry a shared bearer credential
//! attached by the session store.

pub mod client;
pub mod error;

pub use client::{ApiClient, DEFAULT_BASE_URL};
pub use error::ApiError;
