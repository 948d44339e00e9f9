//! CSV exports of the daily schedule and the confirmation history.

use std::borrow::Cow;

use crate::models::Medication;

pub const HISTORY_HEADER: &str = "Medication,Dosage,Time Scheduled,Time Taken,Status";

const TAKEN_AT_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Quote a field when it contains a separator, quote or line break.
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// `time,name,dosage` per medication, ordered by time of day. No header.
pub fn schedule_csv(medications: &[Medication]) -> String {
    let mut sorted: Vec<&Medication> = medications.iter().collect();
    sorted.sort_by_key(|m| m.time);

    let mut out = String::new();
    for med in sorted {
        out.push_str(&format!(
            "{},{},{}\n",
            med.time,
            csv_field(&med.name),
            csv_field(&med.dosage)
        ));
    }
    out
}

/// Every medication ever confirmed, most recent first.
///
/// Status reflects today's flag: a medication confirmed on an earlier day
/// and not yet today reads `Missed`.
pub fn history_csv(medications: &[Medication]) -> String {
    let mut history: Vec<&Medication> = medications.iter().filter(|m| m.taken_at.is_some()).collect();
    history.sort_by(|a, b| b.taken_at.cmp(&a.taken_at));

    let mut out = String::from(HISTORY_HEADER);
    out.push('\n');
    for med in history {
        let taken_at = med
            .taken_at
            .map(|t| t.format(TAKEN_AT_FORMAT).to_string())
            .unwrap_or_default();
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            csv_field(&med.name),
            csv_field(&med.dosage),
            med.time,
            taken_at,
            if med.taken { "Taken" } else { "Missed" }
        ));
    }
    out
}
