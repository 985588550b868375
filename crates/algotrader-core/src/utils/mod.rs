//! Formatting helpers shared by the front ends.

pub mod format;

pub use format::{format_currency, format_date, format_percent, truncate_string};
