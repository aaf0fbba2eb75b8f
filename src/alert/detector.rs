//! Alert detection
//!
//! Compares each symbol's current observation with its lookback baseline,
//! classifies the move through an ordered rule table and applies the
//! cooldown gate. Pure: no I/O, no clock, no cross-symbol state.

use super::{AlertCandidate, AlertKind, Direction, PriceObservation};
use crate::config::DetectionConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};

/// Thresholds used to classify moves
#[derive(Debug, Clone)]
pub struct DetectionParams {
    /// Threshold percent for symbols without an AlertConfig
    pub default_threshold_pct: Decimal,
    /// Volume ratio required for volume confirmation
    pub volume_multiplier: Decimal,
    /// Absolute move that alerts without volume confirmation
    pub extreme_pct: Decimal,
}

impl From<&DetectionConfig> for DetectionParams {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            default_threshold_pct: config.default_threshold_pct,
            volume_multiplier: config.volume_multiplier,
            extreme_pct: config.extreme_pct,
        }
    }
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            default_threshold_pct: dec!(5.0),
            volume_multiplier: dec!(2.0),
            extreme_pct: dec!(15.0),
        }
    }
}

/// Everything one detection pass looks at, keyed by symbol
#[derive(Debug)]
pub struct DetectionInput<'a> {
    pub current: &'a HashMap<String, PriceObservation>,
    pub baseline: &'a HashMap<String, PriceObservation>,
    pub avg_volume: &'a HashMap<String, u64>,
    /// Symbols with an alert inside the cooldown window
    pub cooldown: &'a HashSet<String>,
    /// Enabled per-symbol thresholds
    pub thresholds: &'a HashMap<String, Decimal>,
}

/// Measured move of one symbol
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveMetrics {
    pub percent_change: Decimal,
    pub volume_ratio: Option<Decimal>,
}

impl MoveMetrics {
    /// `None` when the baseline price is zero
    pub fn measure(
        current: &PriceObservation,
        baseline: &PriceObservation,
        avg_volume: Option<u64>,
    ) -> Option<Self> {
        if baseline.price.is_zero() {
            return None;
        }
        let percent_change = (current.price - baseline.price) / baseline.price * dec!(100);
        let volume_ratio = match (current.volume, avg_volume) {
            (Some(volume), Some(avg)) if avg > 0 => Some(Decimal::from(volume) / Decimal::from(avg)),
            _ => None,
        };
        Some(Self {
            percent_change,
            volume_ratio,
        })
    }
}

/// One row of the classification table
struct ClassificationRule {
    name: &'static str,
    matches: fn(&MoveMetrics, threshold: Decimal, params: &DetectionParams) -> bool,
    kind: fn(Direction) -> AlertKind,
}

/// Classification priority: first match wins, later rules are suppressed.
const CLASSIFICATION_RULES: [ClassificationRule; 2] = [
    ClassificationRule {
        name: "volume_confirmed",
        matches: |m, threshold, params| {
            m.percent_change.abs() >= threshold
                && m.volume_ratio.is_some_and(|r| r >= params.volume_multiplier)
        },
        kind: AlertKind::volume_spike,
    },
    ClassificationRule {
        name: "extreme_move",
        matches: |m, _, params| m.percent_change.abs() >= params.extreme_pct,
        kind: AlertKind::extreme,
    },
];

/// Classifies price moves and applies the cooldown gate
#[derive(Debug, Clone, Default)]
pub struct AlertDetector {
    params: DetectionParams,
}

impl AlertDetector {
    pub fn new(params: DetectionParams) -> Self {
        Self { params }
    }

    /// Classify a move against `threshold`; `None` when no rule matches
    pub fn classify(&self, metrics: &MoveMetrics, threshold: Decimal) -> Option<AlertKind> {
        let direction = Direction::of(metrics.percent_change);
        CLASSIFICATION_RULES
            .iter()
            .find(|rule| (rule.matches)(metrics, threshold, &self.params))
            .map(|rule| {
                tracing::trace!(rule = rule.name, "Classification rule matched");
                (rule.kind)(direction)
            })
    }

    /// Run detection over every symbol that has both a current and a
    /// baseline observation. Emits at most one candidate per symbol, sorted
    /// by symbol.
    pub fn detect(&self, input: &DetectionInput<'_>) -> Vec<AlertCandidate> {
        let mut candidates: Vec<AlertCandidate> = input
            .current
            .iter()
            .filter_map(|(symbol, current)| {
                let baseline = input.baseline.get(symbol)?;
                let metrics =
                    MoveMetrics::measure(current, baseline, input.avg_volume.get(symbol).copied())?;
                let threshold = input
                    .thresholds
                    .get(symbol)
                    .copied()
                    .unwrap_or(self.params.default_threshold_pct);
                let kind = self.classify(&metrics, threshold)?;

                if input.cooldown.contains(symbol) {
                    tracing::debug!(%symbol, %kind, "Alert suppressed by cooldown");
                    return None;
                }

                Some(AlertCandidate {
                    symbol: symbol.clone(),
                    kind,
                    price_before: baseline.price,
                    price_after: current.price,
                    percent_change: metrics.percent_change,
                    volume: current.volume,
                    volume_ratio: metrics.volume_ratio,
                })
            })
            .collect();

        candidates.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        candidates
    }
}
