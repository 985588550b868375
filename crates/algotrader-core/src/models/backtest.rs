//! Backtest result records.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::Strategy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backtest {
    pub id: i64,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub profit_loss: f64,
    pub profit_loss_percent: f64,
    pub max_drawdown: f64,
    #[serde(default)]
    pub sharpe_ratio: Option<f64>,
    pub created_at: Option<NaiveDateTime>,
    pub strategy_id: i64,
}

impl Backtest {
    pub fn is_profitable(&self) -> bool {
        self.profit_loss > 0.0
    }

    /// Length of the tested window in days, inclusive of both ends.
    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

/// A backtest together with the strategy it ran and its raw series.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BacktestDetail {
    pub backtest: Backtest,
    pub strategy: Strategy,
    #[serde(default)]
    pub trades_data: serde_json::Value,
    #[serde(default)]
    pub equity_curve: serde_json::Value,
}

impl BacktestDetail {
    /// Number of recorded trades, when the backend sent them as a list.
    pub fn trade_count(&self) -> usize {
        self.trades_data.as_array().map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "id": 3,
            "name": "SPY 2023",
            "start_date": "2023-01-01",
            "end_date": "2023-12-31",
            "initial_capital": 10000.0,
            "final_capital": 11250.5,
            "profit_loss": 1250.5,
            "profit_loss_percent": 12.505,
            "max_drawdown": -8.2,
            "sharpe_ratio": null,
            "created_at": "2024-01-02T09:30:00.000001",
            "strategy_id": 7
        }"#
    }

    #[test]
    fn test_parse_backend_backtest() {
        let backtest: Backtest = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(backtest.id, 3);
        assert_eq!(backtest.strategy_id, 7);
        assert_eq!(backtest.sharpe_ratio, None);
        assert!(backtest.is_profitable());
        assert_eq!(backtest.duration_days(), 365);
    }

    #[test]
    fn test_parse_backtest_detail() {
        let json = format!(
            r#"{{"backtest": {}, "strategy": {{"id": 7, "name": "Cross", "created_at": null, "updated_at": null}},
                "trades_data": [{{"type": "buy"}}, {{"type": "sell"}}], "equity_curve": []}}"#,
            sample_json()
        );
        let detail: BacktestDetail = serde_json::from_str(&json).unwrap();
        assert_eq!(detail.strategy.name, "Cross");
        assert_eq!(detail.trade_count(), 2);
    }
}
