use chrono::NaiveDate;
use serde::Serialize;

use crate::medications::MedicationStore;
use crate::models::AdherenceCounters;

/// What the day-boundary check changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyResetOutcome {
    /// Taken flags cleared.
    pub cleared: usize,
    pub previous: Option<NaiveDate>,
    pub today: NaiveDate,
}

/// Clear every taken flag on the first check of a new calendar day.
///
/// Idempotent within a day. The adherence counters (taken, total, streak)
/// are cumulative and left untouched; only `last_reset` moves.
pub fn check_daily_reset(
    store: &mut MedicationStore,
    counters: &mut AdherenceCounters,
    today: NaiveDate,
) -> Option<DailyResetOutcome> {
    if !counters.needs_reset(today) {
        return None;
    }

    let previous = counters.last_reset;
    let cleared = store.clear_taken_flags();
    counters.last_reset = Some(today);

    tracing::info!(
        cleared,
        previous = ?previous,
        %today,
        "Daily reset applied"
    );
    Some(DailyResetOutcome {
        cleared,
        previous,
        today,
    })
}
