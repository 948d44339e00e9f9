use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ReminderKind, TimeOfDay};

// ═══════════════════════════════════════════════════════════
// Timings
// ═══════════════════════════════════════════════════════════

/// Reminder cadence. `Default` is the production schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderTimings {
    /// Seconds between `reschedule_all` passes.
    pub reschedule_period_secs: i64,
    /// A pre-notice is armed only when the wake-up is strictly further
    /// away than this.
    pub pre_notice_lead_minutes: i64,
    /// Gap between escalation repeats.
    pub escalation_interval_minutes: i64,
    /// Repeats after the initial reminder before the loop expires.
    pub escalation_max_repetitions: u32,
}

impl Default for ReminderTimings {
    fn default() -> Self {
        Self {
            reschedule_period_secs: 60,
            pre_notice_lead_minutes: 15,
            escalation_interval_minutes: 5,
            escalation_max_repetitions: 6,
        }
    }
}

impl ReminderTimings {
    pub fn reschedule_period(&self) -> Duration {
        Duration::seconds(self.reschedule_period_secs)
    }

    pub fn pre_notice_lead(&self) -> Duration {
        Duration::minutes(self.pre_notice_lead_minutes)
    }

    pub fn escalation_interval(&self) -> Duration {
        Duration::minutes(self.escalation_interval_minutes)
    }

    /// Total nagging window after the initial reminder.
    pub fn escalation_window(&self) -> Duration {
        self.escalation_interval() * self.escalation_max_repetitions as i32
    }
}

// ═══════════════════════════════════════════════════════════
// Per-medication state
// ═══════════════════════════════════════════════════════════

/// Where a medication's reminder is in its daily life cycle.
///
/// Confirmation is not a state: a confirmed medication's slot is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderState {
    /// Waiting for the due time, with an optional informational pre-notice.
    Armed {
        due: NaiveDateTime,
        pre_notice: Option<NaiveDateTime>,
    },
    /// Fired unconfirmed; repeating every escalation interval.
    Escalating {
        fired_at: NaiveDateTime,
        next_repeat: NaiveDateTime,
        repetitions: u32,
    },
    /// Ceiling reached. The medication stays unconfirmed, nagging stops.
    Expired { fired_at: NaiveDateTime },
}

impl ReminderState {
    /// Earliest instant this state needs attention, if any.
    pub fn deadline(&self) -> Option<NaiveDateTime> {
        match *self {
            Self::Armed { due, pre_notice } => Some(pre_notice.map_or(due, |p| p.min(due))),
            Self::Escalating { next_repeat, .. } => Some(next_repeat),
            Self::Expired { .. } => None,
        }
    }

    pub fn has_fired(&self) -> bool {
        !matches!(self, Self::Armed { .. })
    }
}

/// One medication's entry in the runtime schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderSlot {
    /// Time of day the slot was armed for; an edit to a different time
    /// invalidates the slot.
    pub scheduled_for: TimeOfDay,
    /// Calendar day the slot belongs to.
    pub day: NaiveDate,
    pub pre_notice_sent: bool,
    pub state: ReminderState,
}

// ═══════════════════════════════════════════════════════════
// Reports
// ═══════════════════════════════════════════════════════════

/// What one `reschedule_all` pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Wake-ups (re-)armed this pass.
    pub armed: usize,
    /// Of those, how many also carry a pre-notice.
    pub pre_notices: usize,
    /// Unconfirmed medications whose time already passed today.
    pub skipped_past: usize,
    /// Medications left alone because their wake-up already fired today.
    pub already_fired: usize,
    /// Slots dropped because the medication was confirmed or removed.
    pub cancelled: usize,
}

/// Result of handing an elapsed wake-up to `on_fired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FireOutcome {
    /// Reminder emitted, escalation started.
    Reminded,
    /// Medication confirmed or removed in the meantime; nothing emitted.
    Stale,
    /// No armed wake-up for this id.
    NotArmed,
}

/// A notification the scheduler emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderEvent {
    pub medication_id: Uuid,
    pub kind: ReminderKind,
    pub at: NaiveDateTime,
    /// Escalation repeat number (1-based), 0 for the other kinds.
    pub repetition: u32,
}
