//! Telegram HTML message formatting

use crate::alert::{AlertCandidate, AlertKind};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

fn headline(kind: AlertKind) -> (&'static str, &'static str) {
    match kind {
        AlertKind::VolumeSpikeUp => ("🚀📈", "VOLUME SPIKE UP"),
        AlertKind::VolumeSpikeDown => ("🔻📉", "VOLUME SPIKE DOWN"),
        AlertKind::ExtremeUp => ("🚨📈", "EXTREME MOVE UP"),
        AlertKind::ExtremeDown => ("🚨📉", "EXTREME MOVE DOWN"),
    }
}

fn signed(value: Decimal) -> String {
    if value > Decimal::ZERO {
        format!("+{:.2}", value)
    } else {
        format!("{:.2}", value)
    }
}

/// Escape the characters Telegram HTML treats as markup
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Format an alert for the notification channel
pub fn format_alert_message(
    candidate: &AlertCandidate,
    name: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    let (emoji, title) = headline(candidate.kind);
    let symbol = html_escape(&candidate.symbol);
    let name = name.map_or_else(|| symbol.clone(), html_escape);
    let volume_line = match candidate.volume_ratio {
        Some(ratio) => format!("\n📊 Volume: <b>{:.1}x</b> average", ratio),
        None => String::new(),
    };

    format!(
        "{emoji} <b>{title}: {symbol}</b> {emoji}\n\
         \n\
         <b>{name}</b>\n\
         \n\
         💰 Previous price: <code>${before:.2}</code>\n\
         💵 Current price: <code>${after:.2}</code>\n\
         📈 Change: <b>{change}%</b>{volume_line}\n\
         \n\
         🕐 {time}\n\
         \n\
         <a href=\"https://finance.yahoo.com/quote/{symbol}\">View on Yahoo Finance →</a>",
        before = candidate.price_before,
        after = candidate.price_after,
        change = signed(candidate.percent_change),
        time = now.format("%Y-%m-%d %H:%M UTC"),
    )
}

/// Message used to verify the channel end to end
pub fn format_test_message() -> String {
    "🧪 Test alert from price-sentinel!\n\nIf you see this, notifications work.".to_string()
}
