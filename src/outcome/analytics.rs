//! Outcome aggregation and reporting
//!
//! Pure functions over a window of settlements: per-category and per-horizon
//! summaries, best/worst rankings and a verdict on the volume-spike strategy.

use super::{ExitReason, Horizon, Settlement};
use crate::alert::{AlertCategory, AlertKind};
use crate::notify::html_escape;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt::Write;

/// Report grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    All,
    VolumeSpike,
    Extreme,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::All, Category::VolumeSpike, Category::Extreme];

    pub fn contains(&self, kind: AlertKind) -> bool {
        match self {
            Category::All => true,
            Category::VolumeSpike => kind.category() == AlertCategory::VolumeSpike,
            Category::Extreme => kind.category() == AlertCategory::Extreme,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::All => "ALL ALERTS",
            Category::VolumeSpike => "VOLUME SPIKE",
            Category::Extreme => "EXTREME MOVES",
        }
    }
}

/// Mean, median and win rate of a list of returns
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean: Option<Decimal>,
    /// Element at index `len / 2` of the sorted list (upper middle for even counts)
    pub median: Option<Decimal>,
    /// Fraction of strictly positive returns, 0..=1
    pub win_rate: Option<Decimal>,
}

impl Summary {
    pub fn of(values: &[Decimal]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let count = values.len();
        let n = Decimal::from(count);
        let mut sorted = values.to_vec();
        sorted.sort();
        let wins = values.iter().filter(|v| **v > Decimal::ZERO).count();
        Self {
            count,
            mean: Some(values.iter().sum::<Decimal>() / n),
            median: Some(sorted[count / 2]),
            win_rate: Some(Decimal::from(wins) / n),
        }
    }
}

/// Statistics of one category
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryStats {
    pub category: Category,
    pub count: usize,
    /// Summary of simulated trade results
    pub trade: Summary,
    pub total_pnl: Decimal,
    pub exit_counts: Vec<(ExitReason, usize)>,
    pub horizons: Vec<(Horizon, Summary)>,
}

impl CategoryStats {
    fn compute(category: Category, settlements: &[&Settlement]) -> Self {
        let results: Vec<Decimal> = settlements.iter().map(|s| s.result_pct).collect();
        let exit_counts = ExitReason::ALL
            .into_iter()
            .map(|reason| {
                let n = settlements.iter().filter(|s| s.exit_reason == reason).count();
                (reason, n)
            })
            .collect();
        let horizons = Horizon::ALL
            .into_iter()
            .map(|h| {
                let values: Vec<Decimal> =
                    settlements.iter().filter_map(|s| s.horizons.get(h)).collect();
                (h, Summary::of(&values))
            })
            .collect();

        Self {
            category,
            count: settlements.len(),
            trade: Summary::of(&results),
            total_pnl: results.iter().sum(),
            exit_counts,
            horizons,
        }
    }

    pub fn horizon(&self, horizon: Horizon) -> Summary {
        self.horizons
            .iter()
            .find(|(h, _)| *h == horizon)
            .map(|(_, s)| *s)
            .unwrap_or_default()
    }

    pub fn exits(&self, reason: ExitReason) -> usize {
        self.exit_counts
            .iter()
            .find(|(r, _)| *r == reason)
            .map_or(0, |(_, n)| *n)
    }
}

/// One entry of the best/worst lists
#[derive(Debug, Clone, PartialEq)]
pub struct RankedOutcome {
    pub symbol: String,
    pub kind: AlertKind,
    pub alert_time: DateTime<Utc>,
    pub result_pct: Decimal,
    pub volume_ratio: Option<Decimal>,
}

impl From<&Settlement> for RankedOutcome {
    fn from(s: &Settlement) -> Self {
        Self {
            symbol: s.symbol.clone(),
            kind: s.kind,
            alert_time: s.alert_time,
            result_pct: s.result_pct,
            volume_ratio: s.volume_ratio,
        }
    }
}

/// Verdict on the volume-spike strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Profitable,
    PositiveMedianLowWinRate,
    NeedsTuning,
    NoData,
}

impl Verdict {
    fn judge(volume: &CategoryStats) -> Self {
        match (volume.trade.median, volume.trade.win_rate) {
            (None, _) | (_, None) => Verdict::NoData,
            (Some(median), Some(win)) if median > Decimal::ZERO && win > dec!(0.5) => {
                Verdict::Profitable
            }
            (Some(median), _) if median > Decimal::ZERO => Verdict::PositiveMedianLowWinRate,
            _ => Verdict::NeedsTuning,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Verdict::Profitable => "Volume spike strategy profitable",
            Verdict::PositiveMedianLowWinRate => "Positive median, but low win rate",
            Verdict::NeedsTuning => "Needs parameter tuning",
            Verdict::NoData => "No volume spike data yet",
        }
    }
}

/// Aggregated report over a window of settlements
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub total: usize,
    pub categories: Vec<CategoryStats>,
    pub best: Vec<RankedOutcome>,
    pub worst: Vec<RankedOutcome>,
    pub verdict: Verdict,
}

/// Aggregate settlements into report statistics
pub fn aggregate(settlements: &[Settlement], top_n: usize) -> Stats {
    let categories: Vec<CategoryStats> = Category::ALL
        .into_iter()
        .map(|category| {
            let members: Vec<&Settlement> = settlements
                .iter()
                .filter(|s| category.contains(s.kind))
                .collect();
            CategoryStats::compute(category, &members)
        })
        .collect();

    let mut ranked: Vec<&Settlement> = settlements.iter().collect();
    ranked.sort_by(|a, b| b.result_pct.cmp(&a.result_pct).then_with(|| a.symbol.cmp(&b.symbol)));
    let best = ranked.iter().take(top_n).map(|s| RankedOutcome::from(*s)).collect();
    let worst = ranked
        .iter()
        .rev()
        .take(top_n)
        .map(|s| RankedOutcome::from(*s))
        .collect();

    let verdict = categories
        .iter()
        .find(|c| c.category == Category::VolumeSpike)
        .map_or(Verdict::NoData, Verdict::judge);

    Stats {
        total: settlements.len(),
        categories,
        best,
        worst,
        verdict,
    }
}

fn pct(value: Option<Decimal>) -> String {
    value.map_or_else(|| "    n/a".to_string(), |v| format!("{:+7.2}%", v))
}

fn rate(value: Option<Decimal>) -> String {
    value.map_or_else(|| " n/a".to_string(), |v| format!("{:3.0}%", v * dec!(100)))
}

impl Stats {
    pub fn category(&self, category: Category) -> Option<&CategoryStats> {
        self.categories.iter().find(|c| c.category == category)
    }

    /// Format as table for CLI output
    pub fn format_table(&self, days: i64) -> String {
        let mut out = String::new();
        let rule = "═".repeat(54);
        let thin = "─".repeat(54);

        let _ = writeln!(out, "\n{rule}");
        let _ = writeln!(out, "          ALERT PERFORMANCE REPORT (last {days} days)");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Settled alerts:   {}", self.total);

        for c in &self.categories {
            let _ = writeln!(out, "\n{} ({} alerts)", c.category.label(), c.count);
            let _ = writeln!(out, "{thin}");
            let _ = writeln!(out, "Window  |    Mean |  Median | Win");
            for (h, s) in &c.horizons {
                let _ = writeln!(
                    out,
                    "{:<7} | {} | {} | {}",
                    h.label(),
                    pct(s.mean),
                    pct(s.median),
                    rate(s.win_rate)
                );
            }
            let _ = writeln!(
                out,
                "{:<7} | {} | {} | {}",
                "trade",
                pct(c.trade.mean),
                pct(c.trade.median),
                rate(c.trade.win_rate)
            );
            let _ = writeln!(out, "Total P&L:        {:+.2}%", c.total_pnl);
            let exits: Vec<String> = c
                .exit_counts
                .iter()
                .filter(|(_, n)| *n > 0)
                .map(|(r, n)| format!("{r}={n}"))
                .collect();
            if !exits.is_empty() {
                let _ = writeln!(out, "Exits:            {}", exits.join(" "));
            }
        }

        for (title, list) in [("TOP PERFORMERS", &self.best), ("WORST", &self.worst)] {
            let _ = writeln!(out, "\n{title}");
            let _ = writeln!(out, "{thin}");
            for r in list {
                let vol = r
                    .volume_ratio
                    .map(|v| format!(" ({:.1}x vol)", v))
                    .unwrap_or_default();
                let _ = writeln!(out, "{:<8} {:+.2}%{vol}", r.symbol, r.result_pct);
            }
        }

        let _ = writeln!(out, "\nVERDICT: {}", self.verdict.describe());
        let _ = writeln!(out, "{rule}");
        out
    }

    /// Report wrapped for the HTML notification channel
    pub fn format_message(&self, days: i64) -> String {
        format!(
            "📊 <b>ALERT PERFORMANCE REPORT</b>\n<pre>{}</pre>",
            html_escape(self.format_table(days).trim())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::HorizonReturns;
    use uuid::Uuid;

    fn settlement(symbol: &str, kind: AlertKind, result: Decimal, reason: ExitReason) -> Settlement {
        let now = Utc::now();
        Settlement {
            alert_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            kind,
            alert_time: now,
            alert_price: dec!(10),
            entry_price: dec!(10.01),
            exit_reason: reason,
            result_pct: result,
            max_gain: result.max(Decimal::ZERO),
            max_drawdown: result.min(Decimal::ZERO),
            hold_minutes: 60,
            volume_ratio: None,
            horizons: HorizonReturns {
                one_hour: Some(result),
                four_hours: None,
                one_day: Some(-result),
            },
            settled_at: now,
        }
    }

    #[test]
    fn test_summary_mean_median_win_rate() {
        let s = Summary::of(&[dec!(5), dec!(-2), dec!(1)]);
        assert_eq!(s.count, 3);
        assert_eq!(s.mean, Some(dec!(4) / dec!(3)));
        assert_eq!(s.win_rate, Some(dec!(2) / dec!(3)));
        assert_eq!(s.median, Some(dec!(1)));
    }

    #[test]
    fn test_median_indexes_by_integer_division() {
        // sorted [-1, 2, 3, 8]; index 4/2 = 2
        let s = Summary::of(&[dec!(8), dec!(-1), dec!(3), dec!(2)]);
        assert_eq!(s.median, Some(dec!(3)));
    }

    #[test]
    fn test_empty_summary() {
        let s = Summary::of(&[]);
        assert_eq!(s.count, 0);
        assert!(s.mean.is_none() && s.median.is_none() && s.win_rate.is_none());
    }

    #[test]
    fn test_aggregate_by_category() {
        let settlements = vec![
            settlement("AAA", AlertKind::VolumeSpikeUp, dec!(3), ExitReason::TakeProfit),
            settlement("BBB", AlertKind::VolumeSpikeDown, dec!(-3), ExitReason::StopLoss),
            settlement("CCC", AlertKind::ExtremeUp, dec!(1.5), ExitReason::TrailingStop),
        ];
        let stats = aggregate(&settlements, 5);

        let all = stats.category(Category::All).unwrap();
        assert_eq!(all.count, 3);
        assert_eq!(all.total_pnl, dec!(1.5));
        assert_eq!(all.exits(ExitReason::StopLoss), 1);
        assert_eq!(all.horizon(Horizon::OneHour).count, 3);
        assert_eq!(all.horizon(Horizon::FourHours).count, 0);

        let volume = stats.category(Category::VolumeSpike).unwrap();
        assert_eq!(volume.count, 2);
        assert_eq!(volume.trade.win_rate, Some(dec!(0.5)));

        let extreme = stats.category(Category::Extreme).unwrap();
        assert_eq!(extreme.trade.mean, Some(dec!(1.5)));
    }

    #[test]
    fn test_best_and_worst_lists() {
        let settlements: Vec<Settlement> = (0..8)
            .map(|i| {
                settlement(
                    &format!("S{i}"),
                    AlertKind::ExtremeUp,
                    Decimal::from(i) - dec!(4),
                    ExitReason::Timeout,
                )
            })
            .collect();
        let stats = aggregate(&settlements, 3);
        let best: Vec<_> = stats.best.iter().map(|r| r.symbol.as_str()).collect();
        let worst: Vec<_> = stats.worst.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(best, vec!["S7", "S6", "S5"]);
        assert_eq!(worst, vec!["S0", "S1", "S2"]);
    }

    #[test]
    fn test_verdicts() {
        let profitable = vec![
            settlement("A", AlertKind::VolumeSpikeUp, dec!(2), ExitReason::Timeout),
            settlement("B", AlertKind::VolumeSpikeUp, dec!(1), ExitReason::Timeout),
            settlement("C", AlertKind::VolumeSpikeUp, dec!(-1), ExitReason::Timeout),
        ];
        assert_eq!(aggregate(&profitable, 5).verdict, Verdict::Profitable);

        // sorted [-1, -1, 2, 3] -> median 2, win rate 50%
        let low_win = vec![
            settlement("A", AlertKind::VolumeSpikeUp, dec!(3), ExitReason::Timeout),
            settlement("B", AlertKind::VolumeSpikeUp, dec!(2), ExitReason::Timeout),
            settlement("C", AlertKind::VolumeSpikeUp, dec!(-1), ExitReason::Timeout),
            settlement("D", AlertKind::VolumeSpikeUp, dec!(-1), ExitReason::Timeout),
        ];
        assert_eq!(aggregate(&low_win, 5).verdict, Verdict::PositiveMedianLowWinRate);

        let losing = vec![settlement("A", AlertKind::VolumeSpikeDown, dec!(-3), ExitReason::StopLoss)];
        assert_eq!(aggregate(&losing, 5).verdict, Verdict::NeedsTuning);

        let extreme_only = vec![settlement("A", AlertKind::ExtremeUp, dec!(3), ExitReason::TakeProfit)];
        assert_eq!(aggregate(&extreme_only, 5).verdict, Verdict::NoData);
    }

    #[test]
    fn test_format_table_mentions_sections() {
        let settlements = vec![settlement("AAA", AlertKind::VolumeSpikeUp, dec!(3), ExitReason::TakeProfit)];
        let table = aggregate(&settlements, 5).format_table(7);
        assert!(table.contains("last 7 days"));
        assert!(table.contains("VOLUME SPIKE (1 alerts)"));
        assert!(table.contains("take_profit=1"));
        assert!(table.contains("VERDICT: Volume spike strategy profitable"));
    }

    #[test]
    fn test_format_message_is_valid_channel_html() {
        let settlements = vec![settlement("AT&T", AlertKind::VolumeSpikeUp, dec!(3), ExitReason::TakeProfit)];
        let msg = aggregate(&settlements, 5).format_message(7);
        assert!(msg.contains("Total P&amp;L:"));
        assert!(msg.contains("AT&amp;T"));
        let without_entities = msg.replace("&amp;", "");
        assert!(!without_entities.contains('&'));

        let empty = aggregate(&[], 5).format_message(7);
        assert!(!empty.replace("&amp;", "").contains('&'));
    }
}
