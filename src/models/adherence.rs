use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Running adherence totals.
///
/// Historical: the daily reset never touches these, only the per-medication
/// taken flags. `taken <= total` holds because both move together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdherenceCounters {
    pub taken: u64,
    pub total: u64,
    pub streak: u64,
    /// Calendar day the taken flags were last cleared.
    #[serde(default)]
    pub last_reset: Option<NaiveDate>,
}

impl AdherenceCounters {
    /// Fresh counters whose reset boundary is already `today`.
    pub fn starting(today: NaiveDate) -> Self {
        Self {
            last_reset: Some(today),
            ..Self::default()
        }
    }

    pub fn record_confirmation(&mut self) {
        self.taken += 1;
        self.total += 1;
        self.streak += 1;
    }

    /// Whole-number adherence rate, 0 when nothing was ever scheduled.
    pub fn adherence_percent(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.taken as f64 / self.total as f64) * 100.0).round() as u32
    }

    pub fn needs_reset(&self, today: NaiveDate) -> bool {
        self.last_reset != Some(today)
    }
}
