//! Trade outcome simulator
//!
//! Replays a take-profit / stop-loss / trailing-stop / timeout exit policy
//! over an intrabar path. Deterministic: the same path and policy always
//! produce the same outcome.

use super::{ExitReason, Horizon, HorizonReturns, TradeOutcome};
use crate::config::SimulationConfig;
use crate::quote::IntrabarSample;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Exit thresholds, all in percent of the entry price
#[derive(Debug, Clone)]
pub struct ExitPolicy {
    pub take_profit_pct: Decimal,
    /// Negative
    pub stop_loss_pct: Decimal,
    pub trailing_trigger_pct: Decimal,
    pub trailing_gap_pct: Decimal,
    pub max_hold_minutes: i64,
    pub slippage_pct: Decimal,
    pub interval_minutes: i64,
}

impl From<&SimulationConfig> for ExitPolicy {
    fn from(config: &SimulationConfig) -> Self {
        Self {
            take_profit_pct: config.take_profit_pct,
            stop_loss_pct: config.stop_loss_pct,
            trailing_trigger_pct: config.trailing_trigger_pct,
            trailing_gap_pct: config.trailing_gap_pct,
            max_hold_minutes: config.max_hold_hours * 60,
            slippage_pct: config.slippage_pct,
            interval_minutes: config.interval_minutes,
        }
    }
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self::from(&SimulationConfig::default())
    }
}

/// Signed percent return of `price` against `entry`, flipped for shorts
fn gain(entry: Decimal, price: Decimal, is_long: bool) -> Decimal {
    let raw = (price - entry) / entry * dec!(100);
    if is_long {
        raw
    } else {
        -raw
    }
}

/// Walk state plus the current sample's gains
#[derive(Debug, Clone, Copy)]
struct Step {
    /// Gain at the favorable extreme of the sample
    best: Decimal,
    /// Gain at the adverse extreme of the sample
    worst: Decimal,
    close: Decimal,
    hold_minutes: i64,
    trailing_active: bool,
    trailing_level: Decimal,
}

struct ExitRule {
    reason: ExitReason,
    /// Realized result when the rule fires
    fires: fn(&ExitPolicy, &Step) -> Option<Decimal>,
}

/// Exit check order: first rule that fires closes the trade.
const EXIT_RULES: [ExitRule; 4] = [
    ExitRule {
        reason: ExitReason::TakeProfit,
        fires: |p, s| (s.best >= p.take_profit_pct).then_some(p.take_profit_pct),
    },
    ExitRule {
        reason: ExitReason::StopLoss,
        fires: |p, s| (s.worst <= p.stop_loss_pct).then_some(p.stop_loss_pct),
    },
    ExitRule {
        reason: ExitReason::TrailingStop,
        fires: |_, s| (s.trailing_active && s.worst <= s.trailing_level).then_some(s.trailing_level),
    },
    ExitRule {
        reason: ExitReason::Timeout,
        fires: |p, s| (s.hold_minutes >= p.max_hold_minutes).then_some(s.close),
    },
];

impl ExitPolicy {
    /// Entry price after an unfavorable fill
    pub fn slipped_entry(&self, price: Decimal, is_long: bool) -> Decimal {
        let slip = self.slippage_pct / dec!(100);
        if is_long {
            price * (Decimal::ONE + slip)
        } else {
            price * (Decimal::ONE - slip)
        }
    }

    /// Replay the policy over `path`.
    ///
    /// Returns `None` for an empty path or a non-positive entry; the caller
    /// defers settlement rather than inventing a result.
    pub fn simulate(
        &self,
        entry: Decimal,
        is_long: bool,
        path: &[IntrabarSample],
    ) -> Option<TradeOutcome> {
        if path.is_empty() || entry <= Decimal::ZERO {
            return None;
        }

        let mut max_gain = Decimal::ZERO;
        let mut max_drawdown = Decimal::ZERO;
        let mut trailing_active = false;
        let mut trailing_level = self.stop_loss_pct;
        let mut last = None;
        let opened = path[0].timestamp;

        for sample in path {
            let (favorable, adverse) = if is_long {
                (sample.high, sample.low)
            } else {
                (sample.low, sample.high)
            };
            let best = gain(entry, favorable, is_long);
            let worst = gain(entry, adverse, is_long);
            let close = gain(entry, sample.close, is_long);

            max_gain = max_gain.max(best);
            max_drawdown = max_drawdown.min(worst);

            if !trailing_active && max_gain >= self.trailing_trigger_pct {
                trailing_active = true;
                trailing_level = Decimal::ZERO;
            }
            if trailing_active {
                trailing_level = trailing_level.max(max_gain - self.trailing_gap_pct);
            }

            let step = Step {
                best,
                worst,
                close,
                hold_minutes: (sample.timestamp - opened).num_minutes() + self.interval_minutes,
                trailing_active,
                trailing_level,
            };

            if let Some((reason, result_pct)) = EXIT_RULES
                .iter()
                .find_map(|rule| (rule.fires)(self, &step).map(|r| (rule.reason, r)))
            {
                return Some(TradeOutcome {
                    exit_reason: reason,
                    result_pct,
                    max_gain,
                    max_drawdown,
                    hold_minutes: step.hold_minutes,
                });
            }
            last = Some(step);
        }

        last.map(|step| TradeOutcome {
            exit_reason: ExitReason::EndOfData,
            result_pct: step.close,
            max_gain,
            max_drawdown,
            hold_minutes: step.hold_minutes,
        })
    }
}

/// Directional return at each fixed horizon, from the close of the last
/// sample at or before `alert_time + horizon`. Measured against the
/// un-slipped alert price.
pub fn horizon_returns(
    alert_price: Decimal,
    is_long: bool,
    alert_time: DateTime<Utc>,
    path: &[IntrabarSample],
) -> HorizonReturns {
    let mut returns = HorizonReturns::default();
    if alert_price <= Decimal::ZERO {
        return returns;
    }
    for horizon in Horizon::ALL {
        let target = alert_time + horizon.duration();
        let value = path
            .iter()
            .take_while(|s| s.timestamp <= target)
            .last()
            .map(|s| gain(alert_price, s.close, is_long));
        returns.set(horizon, value);
    }
    returns
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).unwrap()
    }

    /// Samples 5 minutes apart from `start()`
    fn path(bars: &[(Decimal, Decimal, Decimal)]) -> Vec<IntrabarSample> {
        bars.iter()
            .enumerate()
            .map(|(i, &(high, low, close))| {
                IntrabarSample::new(start() + Duration::minutes(5 * i as i64), high, low, close)
            })
            .collect()
    }

    fn flat(n: usize) -> Vec<(Decimal, Decimal, Decimal)> {
        vec![(dec!(100.5), dec!(99.5), dec!(100)); n]
    }

    #[test]
    fn test_take_profit() {
        let outcome = ExitPolicy::default()
            .simulate(dec!(100), true, &path(&[(dec!(104), dec!(99), dec!(103))]))
            .unwrap();
        assert_eq!(outcome.exit_reason, ExitReason::TakeProfit);
        assert_eq!(outcome.result_pct, dec!(3));
        assert_eq!(outcome.max_gain, dec!(4));
    }

    #[test]
    fn test_stop_loss_on_first_sample() {
        let outcome = ExitPolicy::default()
            .simulate(dec!(100), true, &path(&[(dec!(101), dec!(96), dec!(97))]))
            .unwrap();
        assert_eq!(outcome.exit_reason, ExitReason::StopLoss);
        assert_eq!(outcome.result_pct, dec!(-3));
        assert_eq!(outcome.max_drawdown, dec!(-4));
        assert_eq!(outcome.hold_minutes, 5);
    }

    #[test]
    fn test_take_profit_wins_over_stop_loss_in_same_sample() {
        let outcome = ExitPolicy::default()
            .simulate(dec!(100), true, &path(&[(dec!(105), dec!(95), dec!(100))]))
            .unwrap();
        assert_eq!(outcome.exit_reason, ExitReason::TakeProfit);
    }

    #[test]
    fn test_trailing_stop_ratchets() {
        let bars = [
            (dec!(102.5), dec!(101.6), dec!(102)),
            // level = 2.5 - 1 = 1.5; low 101.8 is above it
            (dec!(102.2), dec!(101.8), dec!(102)),
            // low 101.4 -> 1.4 <= 1.5
            (dec!(102.0), dec!(101.4), dec!(101.5)),
        ];
        let outcome = ExitPolicy::default().simulate(dec!(100), true, &path(&bars)).unwrap();
        assert_eq!(outcome.exit_reason, ExitReason::TrailingStop);
        assert_eq!(outcome.result_pct, dec!(1.5));
        assert_eq!(outcome.hold_minutes, 15);
    }

    #[test]
    fn test_trailing_level_never_moves_down() {
        let bars = [
            (dec!(102.8), dec!(102), dec!(102.5)),
            (dec!(102.1), dec!(101.9), dec!(102)),
            (dec!(102.0), dec!(101.7), dec!(101.8)),
        ];
        let outcome = ExitPolicy::default().simulate(dec!(100), true, &path(&bars)).unwrap();
        // level fixed at 2.8 - 1 = 1.8 from the first sample
        assert_eq!(outcome.exit_reason, ExitReason::TrailingStop);
        assert_eq!(outcome.result_pct, dec!(1.8));
        assert_eq!(outcome.hold_minutes, 15);
    }

    #[test]
    fn test_timeout_settles_at_close() {
        let policy = ExitPolicy {
            max_hold_minutes: 15,
            ..Default::default()
        };
        let mut bars = flat(2);
        bars.push((dec!(101), dec!(99.8), dec!(100.7)));
        bars.extend(flat(5));
        let outcome = policy.simulate(dec!(100), true, &path(&bars)).unwrap();
        assert_eq!(outcome.exit_reason, ExitReason::Timeout);
        assert_eq!(outcome.result_pct, dec!(0.7));
        assert_eq!(outcome.hold_minutes, 15);
    }

    #[test]
    fn test_hold_counts_wall_clock_across_gaps() {
        let policy = ExitPolicy {
            max_hold_minutes: 240,
            ..Default::default()
        };
        // one hour of bars, then the next session opens 23h30 after the first bar
        let mut samples = path(&flat(12));
        let next_open = start() + Duration::minutes(23 * 60 + 30);
        samples.push(IntrabarSample::new(next_open, dec!(100.5), dec!(99.5), dec!(100.2)));
        samples.push(IntrabarSample::new(
            next_open + Duration::minutes(5),
            dec!(100.5),
            dec!(99.5),
            dec!(100),
        ));

        let outcome = policy.simulate(dec!(100), true, &samples).unwrap();
        assert_eq!(outcome.exit_reason, ExitReason::Timeout);
        assert_eq!(outcome.hold_minutes, 23 * 60 + 35);
        assert_eq!(outcome.result_pct, dec!(0.2));
    }

    #[test]
    fn test_end_of_data() {
        let mut bars = flat(3);
        bars.push((dec!(100.6), dec!(99.9), dec!(100.4)));
        let outcome = ExitPolicy::default().simulate(dec!(100), true, &path(&bars)).unwrap();
        assert_eq!(outcome.exit_reason, ExitReason::EndOfData);
        assert_eq!(outcome.result_pct, dec!(0.4));
        assert_eq!(outcome.hold_minutes, 20);
        assert_eq!(outcome.max_gain, dec!(0.6));
        assert_eq!(outcome.max_drawdown, dec!(-0.5));
    }

    #[test]
    fn test_short_uses_low_as_favorable() {
        let outcome = ExitPolicy::default()
            .simulate(dec!(100), false, &path(&[(dec!(101), dec!(96.5), dec!(97))]))
            .unwrap();
        assert_eq!(outcome.exit_reason, ExitReason::TakeProfit);
        assert_eq!(outcome.max_gain, dec!(3.5));
        assert_eq!(outcome.max_drawdown, dec!(-1));

        let outcome = ExitPolicy::default()
            .simulate(dec!(100), false, &path(&[(dec!(103.2), dec!(99.5), dec!(103))]))
            .unwrap();
        assert_eq!(outcome.exit_reason, ExitReason::StopLoss);
    }

    #[test]
    fn test_empty_path_defers() {
        assert!(ExitPolicy::default().simulate(dec!(100), true, &[]).is_none());
    }

    #[test]
    fn test_simulation_is_deterministic() {
        let bars = [
            (dec!(101.2), dec!(99.1), dec!(100.9)),
            (dec!(102.4), dec!(100.2), dec!(101.9)),
            (dec!(102.6), dec!(100.9), dec!(101.0)),
        ];
        let policy = ExitPolicy::default();
        let first = policy.simulate(dec!(100.1), true, &path(&bars));
        let second = policy.simulate(dec!(100.1), true, &path(&bars));
        assert_eq!(first, second);
    }

    #[test]
    fn test_slipped_entry() {
        let policy = ExitPolicy::default();
        assert_eq!(policy.slipped_entry(dec!(100), true), dec!(100.1));
        assert_eq!(policy.slipped_entry(dec!(100), false), dec!(99.9));
    }

    #[test]
    fn test_horizon_returns() {
        let samples = vec![
            IntrabarSample::new(start() + Duration::minutes(30), dec!(101), dec!(99), dec!(101)),
            IntrabarSample::new(start() + Duration::hours(1), dec!(103), dec!(101), dec!(102)),
            IntrabarSample::new(start() + Duration::hours(3), dec!(99), dec!(97), dec!(98)),
        ];
        let up = horizon_returns(dec!(100), true, start(), &samples);
        assert_eq!(up.one_hour, Some(dec!(2)));
        assert_eq!(up.four_hours, Some(dec!(-2)));
        assert_eq!(up.one_day, Some(dec!(-2)));

        let down = horizon_returns(dec!(100), false, start(), &samples);
        assert_eq!(down.one_hour, Some(dec!(-2)));

        let late = horizon_returns(dec!(100), true, start() - Duration::hours(2), &samples);
        assert_eq!(late.one_hour, None);
    }
}
