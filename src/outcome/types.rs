//! Trade outcome types

use crate::alert::{AlertEvent, AlertKind};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Why a simulated trade was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    Timeout,
    EndOfData,
}

impl ExitReason {
    pub const ALL: [ExitReason; 5] = [
        ExitReason::TakeProfit,
        ExitReason::StopLoss,
        ExitReason::TrailingStop,
        ExitReason::Timeout,
        ExitReason::EndOfData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::Timeout => "timeout",
            ExitReason::EndOfData => "end_of_data",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExitReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExitReason::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown exit reason '{s}'"))
    }
}

/// Result of replaying the exit policy over one intrabar path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub exit_reason: ExitReason,
    /// Realized return in percent
    pub result_pct: Decimal,
    /// Best unrealized return seen, in percent (>= 0)
    pub max_gain: Decimal,
    /// Worst unrealized return seen, in percent (<= 0)
    pub max_drawdown: Decimal,
    pub hold_minutes: i64,
}

/// Fixed evaluation horizons after the alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Horizon {
    OneHour,
    FourHours,
    OneDay,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::OneHour, Horizon::FourHours, Horizon::OneDay];

    pub fn duration(&self) -> Duration {
        match self {
            Horizon::OneHour => Duration::hours(1),
            Horizon::FourHours => Duration::hours(4),
            Horizon::OneDay => Duration::hours(24),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Horizon::OneHour => "1h",
            Horizon::FourHours => "4h",
            Horizon::OneDay => "24h",
        }
    }
}

/// Directional return at each horizon; `None` when the path did not reach it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HorizonReturns {
    pub one_hour: Option<Decimal>,
    pub four_hours: Option<Decimal>,
    pub one_day: Option<Decimal>,
}

impl HorizonReturns {
    pub fn get(&self, horizon: Horizon) -> Option<Decimal> {
        match horizon {
            Horizon::OneHour => self.one_hour,
            Horizon::FourHours => self.four_hours,
            Horizon::OneDay => self.one_day,
        }
    }

    pub fn set(&mut self, horizon: Horizon, value: Option<Decimal>) {
        match horizon {
            Horizon::OneHour => self.one_hour = value,
            Horizon::FourHours => self.four_hours = value,
            Horizon::OneDay => self.one_day = value,
        }
    }
}

/// Immutable outcome of one alert. At most one exists per alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub alert_id: Uuid,
    pub symbol: String,
    pub kind: AlertKind,
    pub alert_time: DateTime<Utc>,
    /// Price at alert time, before slippage
    pub alert_price: Decimal,
    /// Slippage-adjusted fill price
    pub entry_price: Decimal,
    pub exit_reason: ExitReason,
    pub result_pct: Decimal,
    pub max_gain: Decimal,
    pub max_drawdown: Decimal,
    pub hold_minutes: i64,
    pub volume_ratio: Option<Decimal>,
    pub horizons: HorizonReturns,
    pub settled_at: DateTime<Utc>,
}

impl Settlement {
    pub fn new(
        alert: &AlertEvent,
        entry_price: Decimal,
        trade: TradeOutcome,
        horizons: HorizonReturns,
        settled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            alert_id: alert.id,
            symbol: alert.symbol.clone(),
            kind: alert.kind,
            alert_time: alert.sent_at,
            alert_price: alert.price_after,
            entry_price,
            exit_reason: trade.exit_reason,
            result_pct: trade.result_pct,
            max_gain: trade.max_gain,
            max_drawdown: trade.max_drawdown,
            hold_minutes: trade.hold_minutes,
            volume_ratio: alert.volume_ratio,
            horizons,
            settled_at,
        }
    }
}
