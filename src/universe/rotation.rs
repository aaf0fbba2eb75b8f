//! Rotation scheduler
//!
//! Each run samples a bounded slice of the active universe. The slice start
//! is derived from a wall-clock slot so consecutive runs walk the universe
//! and every active symbol is covered once enough slots have passed.

use super::{Symbol, SymbolUniverse};
use crate::config::RotationConfig;
use chrono::{DateTime, Timelike, Utc};

/// The symbols scheduled for one run
#[derive(Debug, Clone)]
pub struct Slice {
    /// Rotation phase: `(slot * slice_size) mod universe_cap`
    pub offset: usize,
    /// Number of active symbols the slice was cut from
    pub active_count: usize,
    /// Scheduled symbols, in universe order starting at the phase
    pub symbols: Vec<Symbol>,
}

impl Slice {
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }
}

/// Slot index of `now` within the UTC day, e.g. `hour * 4 + minute / 15`.
pub fn time_slot(now: DateTime<Utc>, slot_minutes: u32) -> usize {
    let per_hour = 60 / slot_minutes.max(1);
    (now.hour() * per_hour + now.minute() / slot_minutes.max(1)) as usize
}

/// Pick this run's slice of the active universe.
///
/// `universe` must already be in its stable order (insertion order). The
/// phase uses the fixed `universe_cap` rather than the live universe size so
/// it does not jump when symbols are added or removed.
pub fn select_slice(universe: &[Symbol], config: &RotationConfig, now: DateTime<Utc>) -> Slice {
    let slot = time_slot(now, config.slot_minutes);
    let offset = (slot * config.slice_size) % config.universe_cap.max(1);

    let active: Vec<&Symbol> = universe.iter().filter(|s| s.is_active(now)).collect();
    let active_count = active.len();
    if active_count == 0 {
        return Slice {
            offset,
            active_count,
            symbols: vec![],
        };
    }

    let start = offset % active_count;
    let take = config.slice_size.min(active_count);
    let symbols = active
        .iter()
        .cycle()
        .skip(start)
        .take(take)
        .map(|s| (*s).clone())
        .collect();

    Slice {
        offset,
        active_count,
        symbols,
    }
}

/// Read the whole universe page by page.
///
/// Any read failure aborts: without the universe there is nothing to schedule.
pub async fn load_universe(
    universe: &dyn SymbolUniverse,
    page_size: usize,
) -> anyhow::Result<Vec<Symbol>> {
    let page_size = page_size.max(1);
    let mut all = Vec::new();
    let mut offset = 0;
    loop {
        let page = universe.fetch_symbols(page_size, offset).await?;
        let len = page.len();
        all.extend(page);
        if len < page_size {
            break;
        }
        offset += len;
    }
    tracing::debug!(symbols = all.len(), "Loaded symbol universe");
    Ok(all)
}
