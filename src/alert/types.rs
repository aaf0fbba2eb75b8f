//! Alert types

use crate::quote::Quote;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A stored price sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub symbol: String,
    pub price: Decimal,
    pub volume: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl From<&Quote> for PriceObservation {
    fn from(q: &Quote) -> Self {
        Self {
            symbol: q.symbol.clone(),
            price: q.price,
            volume: q.volume,
            timestamp: q.timestamp,
        }
    }
}

/// Per-symbol alert threshold override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    pub symbol: String,
    /// Absolute percent move that triggers an alert
    pub threshold_pct: Decimal,
    /// Disabled rows are kept but ignored
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Direction of a price move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn of(percent_change: Decimal) -> Self {
        if percent_change > Decimal::ZERO {
            Direction::Up
        } else {
            Direction::Down
        }
    }
}

/// Alert classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Threshold move confirmed by volume, upward
    VolumeSpikeUp,
    /// Threshold move confirmed by volume, downward
    VolumeSpikeDown,
    /// Very large upward move without volume confirmation
    ExtremeUp,
    /// Very large downward move without volume confirmation
    ExtremeDown,
}

/// Report grouping of alert kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertCategory {
    VolumeSpike,
    Extreme,
}

impl AlertKind {
    pub fn volume_spike(direction: Direction) -> Self {
        match direction {
            Direction::Up => AlertKind::VolumeSpikeUp,
            Direction::Down => AlertKind::VolumeSpikeDown,
        }
    }

    pub fn extreme(direction: Direction) -> Self {
        match direction {
            Direction::Up => AlertKind::ExtremeUp,
            Direction::Down => AlertKind::ExtremeDown,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            AlertKind::VolumeSpikeUp | AlertKind::ExtremeUp => Direction::Up,
            AlertKind::VolumeSpikeDown | AlertKind::ExtremeDown => Direction::Down,
        }
    }

    /// Up alerts are simulated as long trades, down alerts as short trades
    pub fn is_up(&self) -> bool {
        self.direction() == Direction::Up
    }

    pub fn category(&self) -> AlertCategory {
        match self {
            AlertKind::VolumeSpikeUp | AlertKind::VolumeSpikeDown => AlertCategory::VolumeSpike,
            AlertKind::ExtremeUp | AlertKind::ExtremeDown => AlertCategory::Extreme,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::VolumeSpikeUp => "volume_spike_up",
            AlertKind::VolumeSpikeDown => "volume_spike_down",
            AlertKind::ExtremeUp => "extreme_up",
            AlertKind::ExtremeDown => "extreme_down",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "volume_spike_up" => Ok(AlertKind::VolumeSpikeUp),
            "volume_spike_down" => Ok(AlertKind::VolumeSpikeDown),
            "extreme_up" => Ok(AlertKind::ExtremeUp),
            "extreme_down" => Ok(AlertKind::ExtremeDown),
            other => Err(format!("unknown alert kind '{other}'")),
        }
    }
}

/// A classified move that passed the cooldown gate but has not been sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCandidate {
    pub symbol: String,
    pub kind: AlertKind,
    pub price_before: Decimal,
    pub price_after: Decimal,
    pub percent_change: Decimal,
    pub volume: Option<u64>,
    pub volume_ratio: Option<Decimal>,
}

impl AlertCandidate {
    /// Turn the candidate into the immutable event after a successful send
    pub fn into_event(self, sent_at: DateTime<Utc>) -> AlertEvent {
        AlertEvent {
            id: Uuid::new_v4(),
            symbol: self.symbol,
            kind: self.kind,
            price_before: self.price_before,
            price_after: self.price_after,
            percent_change: self.percent_change,
            volume: self.volume,
            volume_ratio: self.volume_ratio,
            sent_at,
        }
    }
}

/// A notified alert. One row per successful notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: Uuid,
    pub symbol: String,
    pub kind: AlertKind,
    pub price_before: Decimal,
    pub price_after: Decimal,
    pub percent_change: Decimal,
    pub volume: Option<u64>,
    pub volume_ratio: Option<Decimal>,
    pub sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in [
            AlertKind::VolumeSpikeUp,
            AlertKind::VolumeSpikeDown,
            AlertKind::ExtremeUp,
            AlertKind::ExtremeDown,
        ] {
            assert_eq!(kind.as_str().parse::<AlertKind>().unwrap(), kind);
        }
        assert!("spike_up".parse::<AlertKind>().is_err());
    }

    #[test]
    fn test_kind_direction_and_category() {
        assert!(AlertKind::ExtremeUp.is_up());
        assert!(!AlertKind::VolumeSpikeDown.is_up());
        assert_eq!(AlertKind::VolumeSpikeDown.category(), AlertCategory::VolumeSpike);
        assert_eq!(AlertKind::ExtremeDown.category(), AlertCategory::Extreme);
    }

    #[test]
    fn test_direction_of_zero_is_down() {
        assert_eq!(Direction::of(dec!(0.1)), Direction::Up);
        assert_eq!(Direction::of(dec!(0)), Direction::Down);
        assert_eq!(Direction::of(dec!(-2)), Direction::Down);
    }

    #[test]
    fn test_candidate_into_event() {
        let candidate = AlertCandidate {
            symbol: "ABC".to_string(),
            kind: AlertKind::ExtremeUp,
            price_before: dec!(10),
            price_after: dec!(11.6),
            percent_change: dec!(16),
            volume: None,
            volume_ratio: None,
        };
        let now = Utc::now();
        let event = candidate.clone().into_event(now);
        assert_eq!(event.symbol, candidate.symbol);
        assert_eq!(event.kind, AlertKind::ExtremeUp);
        assert_eq!(event.sent_at, now);
    }
}
