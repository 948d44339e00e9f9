//! Medication Store: the in-memory medication list and its queries.
//!
//! The store owns every `Medication` record. Records are created from
//! validated input, mutated in place on edit/confirm, removed on delete,
//! and have their taken flags cleared by the daily reset. Nothing here
//! knows about timers; the scheduler reads the store by id.

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Medication, MedicationInput, ValidationError};

/// Shortest id prefix accepted by `resolve`.
const MIN_ID_PREFIX: usize = 4;

#[derive(Error, Debug)]
pub enum MedicationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Medication not found: {0}")]
    NotFound(String),

    #[error("{selector:?} matches {count} medications, use a longer id")]
    Ambiguous { selector: String, count: usize },

    #[error("{0} is already marked as taken today")]
    AlreadyTaken(String),
}

/// Result of an edit, used by the session to decide whether the
/// pending wake-up must be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub time_changed: bool,
}

// ═══════════════════════════════════════════
// Store
// ═══════════════════════════════════════════

/// Ordered medication list (insertion order is the persisted order).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MedicationStore {
    medications: Vec<Medication>,
}

impl MedicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(medications: Vec<Medication>) -> Self {
        Self { medications }
    }

    pub fn records(&self) -> &[Medication] {
        &self.medications
    }

    pub fn len(&self) -> usize {
        self.medications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.medications.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&Medication> {
        self.medications.iter().find(|m| m.id == id)
    }

    fn get_mut(&mut self, id: Uuid) -> Result<&mut Medication, MedicationError> {
        self.medications
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| MedicationError::NotFound(id.to_string()))
    }

    // ── Mutations ───────────────────────────────

    /// Validate and append a new medication, not yet taken.
    pub fn add(
        &mut self,
        input: &MedicationInput,
        now: NaiveDateTime,
    ) -> Result<&Medication, MedicationError> {
        let valid = input.validate()?;
        let medication = Medication {
            id: Uuid::new_v4(),
            name: valid.name,
            dosage: valid.dosage,
            time: valid.time,
            frequency: valid.frequency,
            taken: false,
            taken_at: None,
            stock: valid.stock,
            refill_alert: valid.refill_alert,
            created_at: now,
            updated_at: None,
        };
        tracing::info!(medication_id = %medication.id, time = %medication.time, "Medication added");
        self.medications.push(medication);
        let idx = self.medications.len() - 1;
        Ok(&self.medications[idx])
    }

    /// Replace the editable fields. Taken state and creation time survive.
    pub fn update(
        &mut self,
        id: Uuid,
        input: &MedicationInput,
        now: NaiveDateTime,
    ) -> Result<UpdateOutcome, MedicationError> {
        let valid = input.validate()?;
        let med = self.get_mut(id)?;
        let time_changed = med.time != valid.time;

        med.name = valid.name;
        med.dosage = valid.dosage;
        med.time = valid.time;
        med.frequency = valid.frequency;
        med.stock = valid.stock;
        med.refill_alert = valid.refill_alert;
        med.updated_at = Some(now);

        tracing::info!(medication_id = %id, time_changed, "Medication updated");
        Ok(UpdateOutcome { time_changed })
    }

    pub fn remove(&mut self, id: Uuid) -> Result<Medication, MedicationError> {
        let idx = self
            .medications
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| MedicationError::NotFound(id.to_string()))?;
        tracing::info!(medication_id = %id, "Medication removed");
        Ok(self.medications.remove(idx))
    }

    /// Flag a medication as taken now. Rejects a second confirmation
    /// on the same day.
    pub fn mark_taken(
        &mut self,
        id: Uuid,
        now: NaiveDateTime,
    ) -> Result<&Medication, MedicationError> {
        let med = self.get_mut(id)?;
        if med.taken {
            return Err(MedicationError::AlreadyTaken(med.name.clone()));
        }
        med.taken = true;
        med.taken_at = Some(now);
        Ok(&*med)
    }

    /// Clear every taken flag. Returns how many were set.
    pub fn clear_taken_flags(&mut self) -> usize {
        let mut cleared = 0;
        for med in self.medications.iter_mut().filter(|m| m.taken) {
            med.taken = false;
            cleared += 1;
        }
        cleared
    }

    // ── Queries ─────────────────────────────────

    /// Find one medication by full id, id prefix, or exact name
    /// (case-insensitive).
    pub fn resolve(&self, selector: &str) -> Result<&Medication, MedicationError> {
        let selector = selector.trim();
        if let Ok(id) = Uuid::parse_str(selector) {
            return self
                .get(id)
                .ok_or_else(|| MedicationError::NotFound(selector.to_string()));
        }

        let lowered = selector.to_lowercase();
        let by_prefix: Vec<&Medication> = if lowered.len() >= MIN_ID_PREFIX {
            self.medications
                .iter()
                .filter(|m| m.id.to_string().starts_with(&lowered))
                .collect()
        } else {
            Vec::new()
        };

        let matches = if by_prefix.is_empty() {
            self.medications
                .iter()
                .filter(|m| m.name.eq_ignore_ascii_case(selector))
                .collect()
        } else {
            by_prefix
        };

        match matches.as_slice() {
            [] => Err(MedicationError::NotFound(selector.to_string())),
            [one] => Ok(*one),
            many => Err(MedicationError::Ambiguous {
                selector: selector.to_string(),
                count: many.len(),
            }),
        }
    }

    /// All medications ordered by time of day.
    pub fn list_by_time(&self) -> Vec<&Medication> {
        let mut sorted: Vec<&Medication> = self.medications.iter().collect();
        sorted.sort_by_key(|m| m.time);
        sorted
    }

    /// Unconfirmed medications ordered by time of day.
    pub fn pending(&self) -> Vec<&Medication> {
        let mut pending: Vec<&Medication> = self.medications.iter().filter(|m| !m.taken).collect();
        pending.sort_by_key(|m| m.time);
        pending
    }

    /// Earliest unconfirmed medication.
    pub fn next_pending(&self) -> Option<&Medication> {
        self.pending().into_iter().next()
    }

    /// The last `limit` confirmed medications, most recent first.
    pub fn recent_taken(&self, limit: usize) -> Vec<&Medication> {
        let mut taken: Vec<&Medication> = self.medications.iter().filter(|m| m.taken).collect();
        taken.sort_by(|a, b| b.taken_at.cmp(&a.taken_at));
        taken.truncate(limit);
        taken
    }

    pub fn low_stock(&self) -> Vec<&Medication> {
        self.medications.iter().filter(|m| m.is_low_stock()).collect()
    }
}
