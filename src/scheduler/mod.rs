//! Reminder Scheduler
//!
//! Turns each unconfirmed medication's time of day into a one-shot wake-up,
//! and once a wake-up fires, nags on a bounded escalation loop until the
//! medication is confirmed or the ceiling is reached.
//!
//! ## Model
//! ```text
//! (none) ──pass──▶ Armed ──due──▶ Escalating ──6th repeat──▶ Expired
//!                    │                │
//!                    └──confirm───────┴──▶ (slot dropped)
//! ```
//!
//! The scheduler is driven entirely by explicit `now` values: a periodic
//! `reschedule_all` pass plus `fire_due` for elapsed deadlines. It holds
//! medication ids only and never mutates a medication. The daily reset
//! lives alongside it because every pass starts with the day-boundary
//! check.

pub mod daily_reset;
pub mod engine;
pub mod types;

pub use daily_reset::{check_daily_reset, DailyResetOutcome};
pub use engine::ReminderScheduler;
pub use types::*;
