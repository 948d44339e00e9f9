use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime, Timelike};
use uuid::Uuid;

use super::types::*;
use crate::medications::MedicationStore;
use crate::models::{AlertSeverity, Medication, ReminderKind};
use crate::notify::NotificationSink;

/// Pending wake-ups and escalation loops, keyed by medication id.
///
/// Invariant: at most one slot per medication, so at most one pending
/// notification per medication.
#[derive(Debug, Default)]
pub struct ReminderScheduler {
    timings: ReminderTimings,
    slots: HashMap<Uuid, ReminderSlot>,
}

fn minutes_since_midnight(now: NaiveDateTime) -> i64 {
    i64::from(now.hour()) * 60 + i64::from(now.minute())
}

/// Alert + speech + tone for a due or escalating medication.
fn emit_reminder(sink: &dyn NotificationSink, med: &Medication) {
    sink.emit_alert(
        &format!("Time to take {} ({})", med.name, med.dosage),
        AlertSeverity::Warning,
    );
    sink.speak(&format!("Time to take your {}", med.name));
    sink.play_tone();
}

impl ReminderScheduler {
    pub fn new(timings: ReminderTimings) -> Self {
        Self {
            timings,
            slots: HashMap::new(),
        }
    }

    pub fn timings(&self) -> &ReminderTimings {
        &self.timings
    }

    pub fn slot(&self, id: Uuid) -> Option<&ReminderSlot> {
        self.slots.get(&id)
    }

    pub fn state(&self, id: Uuid) -> Option<ReminderState> {
        self.slots.get(&id).map(|s| s.state)
    }

    /// Slots that still expect to notify (armed or escalating).
    pub fn active_count(&self) -> usize {
        self.slots
            .values()
            .filter(|s| s.state.deadline().is_some())
            .count()
    }

    /// Earliest instant any slot needs attention.
    pub fn next_deadline(&self) -> Option<NaiveDateTime> {
        self.slots.values().filter_map(|s| s.state.deadline()).min()
    }

    // ── Periodic pass ───────────────────────────

    /// Re-arm one wake-up per unconfirmed medication due later today.
    ///
    /// Times already passed are skipped, not fired late. A medication whose
    /// wake-up already fired today for the same time keeps its escalation.
    /// Slots of confirmed or removed medications are dropped, as are
    /// previous-day slots unless still escalating across midnight.
    pub fn reschedule_all(&mut self, store: &MedicationStore, now: NaiveDateTime) -> PassReport {
        let today = now.date();
        let now_minutes = minutes_since_midnight(now);
        let mut report = PassReport::default();

        let before = self.slots.len();
        self.slots.retain(|id, slot| {
            let current = slot.day == today
                || matches!(slot.state, ReminderState::Escalating { .. });
            current && store.get(*id).is_some_and(|m| !m.taken)
        });
        report.cancelled = before - self.slots.len();

        for med in store.records().iter().filter(|m| !m.taken) {
            let minutes_until = med.time_minutes() - now_minutes;
            if minutes_until < 0 {
                report.skipped_past += 1;
                continue;
            }

            let previous = self
                .slots
                .get(&med.id)
                .filter(|s| s.scheduled_for == med.time);
            if previous.is_some_and(|s| s.state.has_fired()) {
                report.already_fired += 1;
                continue;
            }
            let pre_notice_sent = previous.is_some_and(|s| s.pre_notice_sent);
            // A pre-notice that came due since the last pass is still owed.
            let owed = previous.and_then(|s| match s.state {
                ReminderState::Armed { pre_notice, .. } => pre_notice,
                _ => None,
            });

            let due = now + Duration::minutes(minutes_until);
            let pre_notice = if pre_notice_sent {
                None
            } else if minutes_until > self.timings.pre_notice_lead_minutes {
                Some(due - self.timings.pre_notice_lead())
            } else {
                owed
            };
            if pre_notice.is_some() {
                report.pre_notices += 1;
            }

            self.slots.insert(
                med.id,
                ReminderSlot {
                    scheduled_for: med.time,
                    day: today,
                    pre_notice_sent,
                    state: ReminderState::Armed { due, pre_notice },
                },
            );
            report.armed += 1;
            tracing::debug!(medication_id = %med.id, %due, minutes_until, "Wake-up armed");
        }

        tracing::debug!(
            armed = report.armed,
            skipped_past = report.skipped_past,
            already_fired = report.already_fired,
            cancelled = report.cancelled,
            "Reschedule pass complete"
        );
        report
    }

    // ── Cancellation ────────────────────────────

    /// Drop the wake-up and any escalation for `id`. No-op when nothing
    /// is pending.
    pub fn cancel(&mut self, id: Uuid) -> bool {
        let cancelled = self.slots.remove(&id).is_some();
        if cancelled {
            tracing::debug!(medication_id = %id, "Reminder cancelled");
        }
        cancelled
    }

    pub fn on_confirmed(&mut self, id: Uuid) -> bool {
        self.cancel(id)
    }

    /// Drop every slot (session end).
    pub fn cancel_all(&mut self) -> usize {
        let count = self.slots.len();
        self.slots.clear();
        count
    }

    // ── Firing ──────────────────────────────────

    /// Handle every deadline at or before `now`, earliest first.
    pub fn fire_due(
        &mut self,
        store: &MedicationStore,
        sink: &dyn NotificationSink,
        now: NaiveDateTime,
    ) -> Vec<ReminderEvent> {
        let mut due: Vec<(NaiveDateTime, Uuid)> = self
            .slots
            .iter()
            .filter_map(|(id, s)| s.state.deadline().filter(|d| *d <= now).map(|d| (d, *id)))
            .collect();
        due.sort();

        let mut events = Vec::new();
        for (_, id) in due {
            let Some(slot) = self.slots.get(&id).copied() else {
                continue;
            };
            match slot.state {
                ReminderState::Armed { due, pre_notice } => {
                    if due <= now {
                        if self.on_fired(id, store, sink, now) == FireOutcome::Reminded {
                            events.push(ReminderEvent {
                                medication_id: id,
                                kind: ReminderKind::Due,
                                at: now,
                                repetition: 0,
                            });
                        }
                    } else if pre_notice.is_some_and(|p| p <= now) {
                        events.extend(self.send_pre_notice(id, store, sink, now));
                    }
                }
                ReminderState::Escalating { .. } => {
                    events.extend(self.repeat(id, store, sink, now));
                }
                ReminderState::Expired { .. } => {}
            }
        }
        events
    }

    /// An armed wake-up elapsed. Remind and start escalating, unless the
    /// medication was confirmed or removed meanwhile (stale fire).
    pub fn on_fired(
        &mut self,
        id: Uuid,
        store: &MedicationStore,
        sink: &dyn NotificationSink,
        now: NaiveDateTime,
    ) -> FireOutcome {
        let Some(ReminderState::Armed { due, .. }) = self.state(id) else {
            return FireOutcome::NotArmed;
        };
        let Some(med) = store.get(id).filter(|m| !m.taken) else {
            self.slots.remove(&id);
            tracing::debug!(medication_id = %id, "Stale wake-up ignored");
            return FireOutcome::Stale;
        };

        emit_reminder(sink, med);
        tracing::info!(medication_id = %id, scheduled = %med.time, "Reminder fired");

        let state = self.settle(
            id,
            ReminderState::Escalating {
                fired_at: due,
                next_repeat: due + self.timings.escalation_interval(),
                repetitions: 0,
            },
            now,
        );
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.state = state;
        }
        FireOutcome::Reminded
    }

    fn send_pre_notice(
        &mut self,
        id: Uuid,
        store: &MedicationStore,
        sink: &dyn NotificationSink,
        now: NaiveDateTime,
    ) -> Option<ReminderEvent> {
        let Some(med) = store.get(id).filter(|m| !m.taken) else {
            self.slots.remove(&id);
            return None;
        };
        let slot = self.slots.get_mut(&id)?;
        if let ReminderState::Armed { pre_notice, .. } = &mut slot.state {
            *pre_notice = None;
        }
        slot.pre_notice_sent = true;

        sink.emit_alert(
            &format!(
                "Reminder: {} in {} minutes",
                med.name, self.timings.pre_notice_lead_minutes
            ),
            AlertSeverity::Info,
        );
        tracing::debug!(medication_id = %id, "Pre-notice sent");
        Some(ReminderEvent {
            medication_id: id,
            kind: ReminderKind::PreNotice,
            at: now,
            repetition: 0,
        })
    }

    fn repeat(
        &mut self,
        id: Uuid,
        store: &MedicationStore,
        sink: &dyn NotificationSink,
        now: NaiveDateTime,
    ) -> Option<ReminderEvent> {
        let Some(ReminderState::Escalating {
            fired_at,
            next_repeat,
            repetitions,
        }) = self.state(id)
        else {
            return None;
        };
        let Some(med) = store.get(id).filter(|m| !m.taken) else {
            self.slots.remove(&id);
            tracing::debug!(medication_id = %id, "Escalation stopped: medication confirmed");
            return None;
        };

        emit_reminder(sink, med);
        let repetition = repetitions + 1;
        tracing::info!(
            medication_id = %id,
            repetition,
            max = self.timings.escalation_max_repetitions,
            "Reminder repeated"
        );

        let state = self.settle(
            id,
            ReminderState::Escalating {
                fired_at,
                next_repeat: next_repeat + self.timings.escalation_interval(),
                repetitions: repetition,
            },
            now,
        );
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.state = state;
        }
        Some(ReminderEvent {
            medication_id: id,
            kind: ReminderKind::Escalation,
            at: now,
            repetition,
        })
    }

    /// Count repeats that elapsed without a tick (suspended process, clock
    /// jump) toward the ceiling without emitting them, then expire if the
    /// ceiling is reached.
    fn settle(&self, id: Uuid, state: ReminderState, now: NaiveDateTime) -> ReminderState {
        let ReminderState::Escalating {
            fired_at,
            mut next_repeat,
            mut repetitions,
        } = state
        else {
            return state;
        };

        let max = self.timings.escalation_max_repetitions;
        let mut skipped = 0;
        while repetitions < max && next_repeat <= now {
            repetitions += 1;
            next_repeat += self.timings.escalation_interval();
            skipped += 1;
        }
        if skipped > 0 {
            tracing::warn!(medication_id = %id, skipped, "Missed escalation repeats folded");
        }

        if repetitions >= max {
            tracing::info!(medication_id = %id, "Escalation expired without confirmation");
            ReminderState::Expired { fired_at }
        } else {
            ReminderState::Escalating {
                fired_at,
                next_repeat,
                repetitions,
            }
        }
    }
}
