//! Reminder Session: owns the medication list, the adherence counters and
//! the scheduler, and wires them to the clock, storage and notifications.
//!
//! Every mutation goes through here so that storage and pending reminders
//! never drift apart: confirmations cancel their escalation, edits that
//! move a time cancel the old wake-up, deletions drop theirs.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use crate::clock::Clock;
use crate::medications::{MedicationError, MedicationStore, UpdateOutcome};
use crate::models::{AdherenceCounters, AlertSeverity, Medication, MedicationInput};
use crate::notify::NotificationSink;
use crate::persistence::{Persistence, PersistenceError};
use crate::scheduler::{
    check_daily_reset, PassReport, ReminderEvent, ReminderScheduler, ReminderTimings,
};

/// Confirmed medications listed in the summary.
const RECENT_LIMIT: usize = 5;

/// Snapshot for the `status` view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub adherence_percent: u32,
    pub streak: u64,
    pub taken: u64,
    pub total: u64,
    /// Unconfirmed medications today.
    pub pending: usize,
    /// Earliest unconfirmed medication.
    pub next: Option<Medication>,
    /// Most recent confirmations, newest first.
    pub recent: Vec<Medication>,
}

pub struct ReminderSession {
    store: MedicationStore,
    counters: AdherenceCounters,
    scheduler: ReminderScheduler,
    persistence: Box<dyn Persistence>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    /// When the next periodic pass is owed. `None` before `start`.
    next_pass: Option<NaiveDateTime>,
}

impl ReminderSession {
    pub fn new(
        persistence: Box<dyn Persistence>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        timings: ReminderTimings,
    ) -> Self {
        Self {
            store: MedicationStore::new(),
            counters: AdherenceCounters::default(),
            scheduler: ReminderScheduler::new(timings),
            persistence,
            sink,
            clock,
            next_pass: None,
        }
    }

    pub fn store(&self) -> &MedicationStore {
        &self.store
    }

    pub fn counters(&self) -> &AdherenceCounters {
        &self.counters
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    // ═══════════════════════════════════════════
    // Life cycle
    // ═══════════════════════════════════════════

    /// Restore state, apply the day boundary, arm today's wake-ups and
    /// surface low stock.
    pub fn start(&mut self) -> Result<PassReport, PersistenceError> {
        let report = self.load()?;
        self.check_refill_alerts();
        tracing::info!(
            medications = self.store.len(),
            armed = report.armed,
            "Reminder session started"
        );
        Ok(report)
    }

    /// Restore state and run the first pass without any stock alerts.
    /// One-shot commands use this and report stock for what they touch.
    pub fn load(&mut self) -> Result<PassReport, PersistenceError> {
        let stored = self.persistence.load()?;
        self.store = MedicationStore::from_records(stored.medications);
        self.counters = stored.counters;
        Ok(self.run_pass(self.clock.now()))
    }

    /// One cooperative step: run the periodic pass if owed, then deliver
    /// every elapsed pre-notice, reminder and repeat.
    pub fn tick(&mut self) -> Vec<ReminderEvent> {
        let now = self.clock.now();
        if self.next_pass.map_or(true, |at| now >= at) {
            self.run_pass(now);
        }
        self.scheduler.fire_due(&self.store, self.sink.as_ref(), now)
    }

    /// When `tick` next has work to do.
    pub fn next_deadline(&self) -> Option<NaiveDateTime> {
        match (self.next_pass, self.scheduler.next_deadline()) {
            (Some(pass), Some(deadline)) => Some(pass.min(deadline)),
            (pass, deadline) => pass.or(deadline),
        }
    }

    /// Cancel every timer and write the final state.
    pub fn shutdown(&mut self) {
        let cancelled = self.scheduler.cancel_all();
        self.next_pass = None;
        self.persist();
        tracing::info!(cancelled, "Reminder session stopped");
    }

    fn run_pass(&mut self, now: NaiveDateTime) -> PassReport {
        if check_daily_reset(&mut self.store, &mut self.counters, now.date()).is_some() {
            self.persist();
        }
        let report = self.scheduler.reschedule_all(&self.store, now);
        self.next_pass = Some(now + self.scheduler.timings().reschedule_period());
        report
    }

    // ═══════════════════════════════════════════
    // Mutations
    // ═══════════════════════════════════════════

    pub fn add(&mut self, input: &MedicationInput) -> Result<Medication, MedicationError> {
        let now = self.clock.now();
        let med = self.store.add(input, now)?.clone();
        self.persist();
        self.run_pass(now);
        self.sink
            .emit_alert("Medication added successfully!", AlertSeverity::Success);
        self.alert_if_low_stock(&med);
        Ok(med)
    }

    pub fn update(
        &mut self,
        id: Uuid,
        input: &MedicationInput,
    ) -> Result<UpdateOutcome, MedicationError> {
        let now = self.clock.now();
        let outcome = self.store.update(id, input, now)?;
        if outcome.time_changed {
            self.scheduler.cancel(id);
        }
        self.persist();
        self.run_pass(now);
        self.sink
            .emit_alert("Medication updated successfully!", AlertSeverity::Success);
        if let Some(med) = self.store.get(id) {
            self.alert_if_low_stock(med);
        }
        Ok(outcome)
    }

    pub fn remove(&mut self, id: Uuid) -> Result<Medication, MedicationError> {
        let med = self.store.remove(id)?;
        self.scheduler.cancel(id);
        self.persist();
        self.sink.emit_alert("Medication deleted", AlertSeverity::Success);
        Ok(med)
    }

    /// Mark `id` taken, count it and stop its reminders.
    pub fn confirm(&mut self, id: Uuid) -> Result<Medication, MedicationError> {
        let now = self.clock.now();
        let med = self.store.mark_taken(id, now)?.clone();
        self.counters.record_confirmation();
        self.persist();
        self.scheduler.on_confirmed(id);

        tracing::info!(medication_id = %id, streak = self.counters.streak, "Medication confirmed");
        self.sink.emit_alert(
            &format!("{} marked as taken!", med.name),
            AlertSeverity::Success,
        );
        self.sink.speak(&format!("Great! {} confirmed.", med.name));
        Ok(med)
    }

    /// Confirm the earliest pending medication. `None` when everything is
    /// already taken.
    pub fn confirm_next(&mut self) -> Result<Option<Medication>, MedicationError> {
        let Some(id) = self.store.next_pending().map(|m| m.id) else {
            tracing::debug!("Confirm-next with nothing pending");
            return Ok(None);
        };
        self.confirm(id).map(Some)
    }

    /// Resolve a user-typed selector (id, id prefix or name) to an id.
    pub fn resolve(&self, selector: &str) -> Result<Uuid, MedicationError> {
        self.store.resolve(selector).map(|m| m.id)
    }

    // ═══════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════

    pub fn summary(&self) -> DashboardSummary {
        DashboardSummary {
            adherence_percent: self.counters.adherence_percent(),
            streak: self.counters.streak,
            taken: self.counters.taken,
            total: self.counters.total,
            pending: self.store.pending().len(),
            next: self.store.next_pending().cloned(),
            recent: self
                .store
                .recent_taken(RECENT_LIMIT)
                .into_iter()
                .cloned()
                .collect(),
        }
    }

    pub fn check_refill_alerts(&self) -> usize {
        let low = self.store.low_stock();
        for med in &low {
            self.alert_if_low_stock(med);
        }
        low.len()
    }

    fn alert_if_low_stock(&self, med: &Medication) {
        if !med.is_low_stock() {
            return;
        }
        self.sink.emit_alert(
            &format!(
                "Low stock: {} ({} pills left)",
                med.name,
                med.stock.unwrap_or_default()
            ),
            AlertSeverity::Warning,
        );
    }

    /// Surface a message through the notification sink.
    pub fn notify(&self, message: &str, severity: AlertSeverity) {
        self.sink.emit_alert(message, severity);
    }

    /// Save failures are logged; reminders keep running on in-memory state.
    fn persist(&mut self) {
        if let Err(e) = self.persistence.save(self.store.records(), &self.counters) {
            tracing::warn!(error = %e, "Failed to save medications");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notify::RecordingSink;
    use crate::persistence::{MemoryPersistence, SqlitePersistence, StoredState};
    use crate::scheduler::ReminderState;
    use crate::models::ReminderKind;
    use chrono::{Duration, NaiveDate};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    struct Harness {
        session: ReminderSession,
        clock: Arc<ManualClock>,
        sink: Arc<RecordingSink>,
    }

    impl Harness {
        fn new(start: NaiveDateTime) -> Self {
            Self::with_persistence(start, Box::new(MemoryPersistence::new()))
        }

        fn with_persistence(start: NaiveDateTime, persistence: Box<dyn Persistence>) -> Self {
            let clock = Arc::new(ManualClock::new(start));
            let sink = Arc::new(RecordingSink::new());
            let session = ReminderSession::new(
                persistence,
                sink.clone(),
                clock.clone(),
                ReminderTimings::default(),
            );
            Self {
                session,
                clock,
                sink,
            }
        }

        /// Step through every deadline up to `target`, as the runtime loop would.
        fn run_until(&mut self, target: NaiveDateTime) -> Vec<ReminderEvent> {
            let mut events = Vec::new();
            while let Some(deadline) = self.session.next_deadline() {
                if deadline > target {
                    break;
                }
                self.clock.set(deadline.max(self.clock.now()));
                events.extend(self.session.tick());
            }
            self.clock.set(target);
            events.extend(self.session.tick());
            events
        }

        fn add(&mut self, name: &str, time: &str) -> Uuid {
            self.session
                .add(&MedicationInput {
                    name: name.into(),
                    dosage: "10mg".into(),
                    time: time.into(),
                    ..Default::default()
                })
                .unwrap()
                .id
        }
    }

    fn count(events: &[ReminderEvent], kind: ReminderKind) -> usize {
        events.iter().filter(|e| e.kind == kind).count()
    }

    #[test]
    fn full_day_without_confirmation() {
        let mut h = Harness::new(at(7, 0));
        h.session.start().unwrap();
        let id = h.add("Aspirin", "08:00");

        let events = h.run_until(at(9, 0));
        assert_eq!(count(&events, ReminderKind::PreNotice), 1);
        assert_eq!(count(&events, ReminderKind::Due), 1);
        assert_eq!(count(&events, ReminderKind::Escalation), 6);
        assert!(matches!(
            h.session.scheduler().state(id),
            Some(ReminderState::Expired { .. })
        ));
        assert_eq!(h.sink.tone_count(), 7);
    }

    #[test]
    fn confirming_during_escalation_stops_reminders() {
        let mut h = Harness::new(at(7, 0));
        h.session.start().unwrap();
        let id = h.add("Aspirin", "08:00");

        let before = h.run_until(at(8, 11));
        assert_eq!(count(&before, ReminderKind::Escalation), 2);

        let med = h.session.confirm(id).unwrap();
        assert!(med.taken);
        assert_eq!(med.taken_at, Some(at(8, 11)));
        assert_eq!(h.sink.speech().last().unwrap(), "Great! Aspirin confirmed.");

        let after = h.run_until(at(10, 0));
        assert!(after.is_empty());
        assert!(h.session.scheduler().state(id).is_none());
    }

    #[test]
    fn confirm_counts_once() {
        let mut h = Harness::new(at(7, 0));
        h.session.start().unwrap();
        let id = h.add("Aspirin", "08:00");

        h.session.confirm(id).unwrap();
        assert!(matches!(
            h.session.confirm(id),
            Err(MedicationError::AlreadyTaken(_))
        ));

        let counters = h.session.counters();
        assert_eq!((counters.taken, counters.total, counters.streak), (1, 1, 1));
    }

    #[test]
    fn confirm_next_picks_earliest_pending() {
        let mut h = Harness::new(at(6, 0));
        h.session.start().unwrap();
        h.add("Evening", "20:00");
        let morning = h.add("Morning", "07:00");

        let confirmed = h.session.confirm_next().unwrap().unwrap();
        assert_eq!(confirmed.id, morning);

        h.session.confirm_next().unwrap();
        assert!(h.session.confirm_next().unwrap().is_none());
        assert_eq!(h.session.counters().taken, 2);
    }

    #[test]
    fn missed_time_is_not_fired_on_start() {
        let now = at(8, 5);
        let stored = {
            let mut store = MedicationStore::new();
            store
                .add(
                    &MedicationInput {
                        name: "Aspirin".into(),
                        dosage: "81mg".into(),
                        time: "08:00".into(),
                        ..Default::default()
                    },
                    at(6, 0),
                )
                .unwrap();
            StoredState {
                medications: store.records().to_vec(),
                counters: AdherenceCounters::starting(now.date()),
            }
        };
        let mut h = Harness::with_persistence(now, Box::new(MemoryPersistence::with_state(stored)));

        let report = h.session.start().unwrap();
        assert_eq!(report.skipped_past, 1);
        let events = h.run_until(at(12, 0));
        assert!(events.is_empty());
        assert!(h.sink.alerts_containing("Time to take").is_empty());
    }

    #[test]
    fn editing_time_rearms_and_cancels_escalation() {
        let mut h = Harness::new(at(7, 0));
        h.session.start().unwrap();
        let id = h.add("Aspirin", "08:00");
        h.run_until(at(8, 1));

        h.session
            .update(
                id,
                &MedicationInput {
                    name: "Aspirin".into(),
                    dosage: "10mg".into(),
                    time: "09:00".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(matches!(
            h.session.scheduler().state(id),
            Some(ReminderState::Armed { .. })
        ));

        h.sink.clear();
        let events = h.run_until(at(8, 59));
        // no 08:00 repeats after the edit, only the new pre-notice
        assert_eq!(count(&events, ReminderKind::Escalation), 0);
        assert_eq!(count(&events, ReminderKind::PreNotice), 1);
    }

    #[test]
    fn removing_cancels_pending_reminder() {
        let mut h = Harness::new(at(7, 0));
        h.session.start().unwrap();
        let id = h.add("Aspirin", "08:00");

        h.session.remove(id).unwrap();
        assert!(h.session.scheduler().state(id).is_none());
        assert!(h.run_until(at(9, 0)).is_empty());
    }

    #[test]
    fn midnight_resets_taken_flags_but_not_counters() {
        let mut h = Harness::new(at(7, 0));
        h.session.start().unwrap();
        let id = h.add("Aspirin", "08:00");
        h.session.confirm(id).unwrap();

        let next_morning = at(7, 30) + Duration::days(1);
        let events = h.run_until(next_morning);
        assert!(events.is_empty());

        assert!(!h.session.store().get(id).unwrap().taken);
        assert_eq!(h.session.counters().taken, 1);
        assert_eq!(h.session.counters().last_reset, Some(next_morning.date()));
        // armed again for the new day
        assert!(matches!(
            h.session.scheduler().state(id),
            Some(ReminderState::Armed { .. })
        ));
    }

    #[test]
    fn escalation_runs_across_midnight() {
        let mut h = Harness::new(at(23, 0));
        h.session.start().unwrap();
        let id = h.add("Statin", "23:50");

        let events = h.run_until(at(0, 30) + Duration::days(1));
        assert_eq!(count(&events, ReminderKind::Due), 1);
        let repeats: Vec<NaiveDateTime> = events
            .iter()
            .filter(|e| e.kind == ReminderKind::Escalation)
            .map(|e| e.at)
            .collect();
        assert_eq!(repeats.len(), 6);
        assert_eq!(repeats[1], at(0, 0) + Duration::days(1));
        assert_eq!(repeats[5], at(0, 20) + Duration::days(1));
        assert!(!h.session.store().get(id).unwrap().taken);
    }

    #[test]
    fn add_after_midnight_applies_daily_reset_first() {
        let mut h = Harness::new(at(23, 59) + Duration::seconds(30));
        h.session.start().unwrap();
        let early = h.add("Levothyroxine", "00:30");
        h.session.confirm(early).unwrap();

        // before the next periodic pass is owed
        h.clock.set(at(0, 0) + Duration::days(1) + Duration::seconds(10));
        h.add("Vitamin D", "09:00");

        assert!(!h.session.store().get(early).unwrap().taken);
        assert_eq!(
            h.session.counters().last_reset,
            Some(at(0, 0).date() + Duration::days(1))
        );
        assert!(matches!(
            h.session.scheduler().state(early),
            Some(ReminderState::Armed { .. })
        ));
    }

    #[test]
    fn edit_after_midnight_applies_daily_reset_first() {
        let mut h = Harness::new(at(23, 59) + Duration::seconds(30));
        h.session.start().unwrap();
        let id = h.add("Levothyroxine", "00:30");
        h.session.confirm(id).unwrap();

        h.clock.set(at(0, 0) + Duration::days(1) + Duration::seconds(10));
        h.session
            .update(
                id,
                &MedicationInput {
                    name: "Levothyroxine".into(),
                    dosage: "25mcg".into(),
                    time: "00:30".into(),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(!h.session.store().get(id).unwrap().taken);
        assert!(matches!(
            h.session.scheduler().state(id),
            Some(ReminderState::Armed { .. })
        ));
    }

    #[test]
    fn low_stock_alert_on_start_and_add() {
        let mut h = Harness::new(at(7, 0));
        h.session.start().unwrap();
        h.session
            .add(&MedicationInput {
                name: "Metformin".into(),
                dosage: "500mg".into(),
                time: "08:00".into(),
                stock: Some(3),
                refill_alert: Some(5),
                ..Default::default()
            })
            .unwrap();

        let alerts = h.sink.alerts_containing("Low stock");
        assert_eq!(
            alerts,
            vec![(
                "Low stock: Metformin (3 pills left)".to_string(),
                AlertSeverity::Warning
            )]
        );
    }

    fn stored_low_stock(now: NaiveDateTime) -> StoredState {
        let mut store = MedicationStore::new();
        store
            .add(
                &MedicationInput {
                    name: "Metformin".into(),
                    dosage: "500mg".into(),
                    time: "08:00".into(),
                    stock: Some(2),
                    refill_alert: Some(5),
                    ..Default::default()
                },
                at(6, 0),
            )
            .unwrap();
        StoredState {
            medications: store.records().to_vec(),
            counters: AdherenceCounters::starting(now.date()),
        }
    }

    #[test]
    fn load_arms_without_stock_alerts() {
        let now = at(7, 0);
        let mut h = Harness::with_persistence(
            now,
            Box::new(MemoryPersistence::with_state(stored_low_stock(now))),
        );

        let report = h.session.load().unwrap();
        assert_eq!(report.armed, 1);
        assert!(h.sink.alerts_containing("Low stock").is_empty());
    }

    #[test]
    fn add_and_edit_alert_only_for_the_touched_medication() {
        let now = at(7, 0);
        let mut h = Harness::with_persistence(
            now,
            Box::new(MemoryPersistence::with_state(stored_low_stock(now))),
        );
        h.session.load().unwrap();

        let other = h.add("Aspirin", "09:00");
        assert!(h.sink.alerts_containing("Low stock").is_empty());

        h.session
            .update(
                other,
                &MedicationInput {
                    name: "Aspirin".into(),
                    dosage: "81mg".into(),
                    time: "09:00".into(),
                    stock: Some(1),
                    refill_alert: Some(3),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(
            h.sink.alerts_containing("Low stock"),
            vec![(
                "Low stock: Aspirin (1 pills left)".to_string(),
                AlertSeverity::Warning
            )]
        );
    }

    #[test]
    fn start_alerts_each_low_stock_medication_once() {
        let now = at(7, 0);
        let mut h = Harness::with_persistence(
            now,
            Box::new(MemoryPersistence::with_state(stored_low_stock(now))),
        );
        h.session.start().unwrap();
        assert_eq!(h.sink.alerts_containing("Low stock").len(), 1);
    }

    #[test]
    fn summary_reflects_counters_and_pending() {
        let mut h = Harness::new(at(7, 0));
        h.session.start().unwrap();
        let a = h.add("A", "08:00");
        h.add("B", "12:00");
        h.add("C", "20:00");

        h.clock.set(at(8, 2));
        h.session.confirm(a).unwrap();

        let summary = h.session.summary();
        assert_eq!(summary.adherence_percent, 100);
        assert_eq!(summary.streak, 1);
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.next.unwrap().name, "B");
        assert_eq!(summary.recent.len(), 1);
        assert_eq!(summary.recent[0].id, a);
    }

    #[test]
    fn state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medicare.db");

        let id = {
            let mut h = Harness::with_persistence(
                at(7, 0),
                Box::new(SqlitePersistence::open(&path).unwrap()),
            );
            h.session.start().unwrap();
            let id = h.add("Aspirin", "08:00");
            h.session.confirm(id).unwrap();
            h.session.shutdown();
            id
        };

        let mut h = Harness::with_persistence(
            at(9, 0),
            Box::new(SqlitePersistence::open(&path).unwrap()),
        );
        h.session.start().unwrap();
        assert!(h.session.store().get(id).unwrap().taken);
        assert_eq!(h.session.counters().streak, 1);
    }

    struct BrokenPersistence;

    impl Persistence for BrokenPersistence {
        fn load(&self) -> Result<StoredState, PersistenceError> {
            Ok(StoredState::default())
        }

        fn save(&mut self, _: &[Medication], _: &AdherenceCounters) -> Result<(), PersistenceError> {
            let err = serde_json::from_str::<AdherenceCounters>("disk full").unwrap_err();
            Err(PersistenceError::Serialize(err))
        }
    }

    #[test]
    fn save_failure_does_not_stop_reminders() {
        let mut h = Harness::with_persistence(at(7, 50), Box::new(BrokenPersistence));
        h.session.start().unwrap();
        h.add("Aspirin", "08:00");

        let events = h.run_until(at(8, 0));
        assert_eq!(count(&events, ReminderKind::Due), 1);
    }

    #[test]
    fn shutdown_cancels_timers() {
        let mut h = Harness::new(at(7, 0));
        h.session.start().unwrap();
        h.add("Aspirin", "08:00");
        h.session.shutdown();
        assert_eq!(h.session.next_deadline(), None);
    }
}
