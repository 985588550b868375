//! Trading strategy records.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

const DEFAULT_SHORT_MA: u32 = 20;
const DEFAULT_LONG_MA: u32 = 50;

/// Strategy settings stored under `parameters`.
///
/// The moving-average windows drive the crossover backtest; `symbol` picks the
/// ticker it runs on (the backend falls back to SPY when unset). Sizing and
/// exit levels are stored but not interpreted here. Keys this client does not
/// know are carried in `extra` so a fetch-modify-save cycle never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParameters {
    #[serde(default = "default_short_ma")]
    pub short_ma: u32,
    #[serde(default = "default_long_ma")]
    pub long_ma: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_short_ma() -> u32 {
    DEFAULT_SHORT_MA
}

fn default_long_ma() -> u32 {
    DEFAULT_LONG_MA
}

impl Default for StrategyParameters {
    fn default() -> Self {
        Self {
            short_ma: DEFAULT_SHORT_MA,
            long_ma: DEFAULT_LONG_MA,
            symbol: None,
            position_size: None,
            stop_loss: None,
            take_profit: None,
            extra: serde_json::Map::new(),
        }
    }
}

impl StrategyParameters {
    pub fn validate(&self) -> Result<(), String> {
        if self.short_ma == 0 {
            return Err("Short moving average window must be at least 1".to_string());
        }
        if self.short_ma >= self.long_ma {
            return Err(
                "Short moving average window must be smaller than the long window".to_string(),
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: StrategyParameters,
    /// Indicator settings are stored by the backend but never interpreted here.
    #[serde(default)]
    pub indicators: serde_json::Value,
    #[serde(default)]
    pub is_active: bool,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl Strategy {
    /// Editable copy of this strategy's fields, ready for a full update.
    pub fn to_update(&self) -> StrategyUpdate {
        StrategyUpdate {
            name: self.name.clone(),
            description: self.description.clone().unwrap_or_default(),
            parameters: self.parameters.clone(),
            indicators: if self.indicators.is_null() {
                serde_json::Value::Object(Default::default())
            } else {
                self.indicators.clone()
            },
            is_active: self.is_active,
        }
    }

    pub fn status_label(&self) -> &'static str {
        if self.is_active {
            "Active"
        } else {
            "Inactive"
        }
    }
}

/// Full set of strategy fields sent on create and update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyUpdate {
    pub name: String,
    pub description: String,
    pub parameters: StrategyParameters,
    pub indicators: serde_json::Value,
    pub is_active: bool,
}

impl StrategyUpdate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            parameters: StrategyParameters::default(),
            indicators: serde_json::Value::Object(Default::default()),
            is_active: false,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Strategy name is required".to_string());
        }
        self.parameters.validate()
    }
}
