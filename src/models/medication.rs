use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

/// Strict 24-hour `HH:MM`.
static TIME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([01]\d|2[0-3]):([0-5]\d)$").unwrap());

/// Characters stripped from free-text fields before they are stored.
static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[<>]").unwrap());

/// Frequency label stored when the user leaves it blank.
pub const DEFAULT_FREQUENCY: &str = "daily";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Medication name is required")]
    EmptyName,

    #[error("Dosage is required")]
    EmptyDosage,

    #[error("Valid time is required (HH:MM), got {0:?}")]
    InvalidTime(String),
}

// ═══════════════════════════════════════════
// TimeOfDay
// ═══════════════════════════════════════════

/// Daily recurring time, minute precision, no date component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn minutes_since_midnight(&self) -> i64 {
        i64::from(self.hour) * 60 + i64::from(self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = TIME_PATTERN
            .captures(s)
            .ok_or_else(|| ValidationError::InvalidTime(s.to_string()))?;
        let hour = caps[1]
            .parse()
            .map_err(|_| ValidationError::InvalidTime(s.to_string()))?;
        let minute = caps[2]
            .parse()
            .map_err(|_| ValidationError::InvalidTime(s.to_string()))?;
        Ok(Self { hour, minute })
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ═══════════════════════════════════════════
// Medication record
// ═══════════════════════════════════════════

/// A medication the user takes once a day at `time`.
///
/// Field names follow the persisted JSON layout (camelCase).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub id: Uuid,
    pub name: String,
    pub dosage: String,
    pub time: TimeOfDay,
    pub frequency: String,
    pub taken: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refill_alert: Option<u32>,
    pub created_at: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
}

impl Medication {
    pub fn time_minutes(&self) -> i64 {
        self.time.minutes_since_midnight()
    }

    /// Stock is tracked, a threshold is set, and stock has fallen to it.
    pub fn is_low_stock(&self) -> bool {
        match (self.stock, self.refill_alert) {
            (Some(stock), Some(threshold)) => stock > 0 && threshold > 0 && stock <= threshold,
            _ => false,
        }
    }
}

// ═══════════════════════════════════════════
// User input
// ═══════════════════════════════════════════

/// Raw add/edit form values, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MedicationInput {
    pub name: String,
    pub dosage: String,
    pub time: String,
    #[serde(default)]
    pub frequency: String,
    #[serde(default)]
    pub stock: Option<u32>,
    #[serde(default)]
    pub refill_alert: Option<u32>,
}

/// Input that passed validation; every field is ready to store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedMedication {
    pub name: String,
    pub dosage: String,
    pub time: TimeOfDay,
    pub frequency: String,
    pub stock: Option<u32>,
    pub refill_alert: Option<u32>,
}

impl MedicationInput {
    pub fn validate(&self) -> Result<ValidatedMedication, ValidationError> {
        let name = sanitize_input(&self.name);
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let dosage = sanitize_input(&self.dosage);
        if dosage.is_empty() {
            return Err(ValidationError::EmptyDosage);
        }
        let time = self.time.trim().parse::<TimeOfDay>()?;
        let frequency = match sanitize_input(&self.frequency) {
            f if f.is_empty() => DEFAULT_FREQUENCY.to_string(),
            f => f,
        };

        Ok(ValidatedMedication {
            name,
            dosage,
            time,
            frequency,
            stock: self.stock.filter(|s| *s > 0),
            refill_alert: self.refill_alert.filter(|r| *r > 0),
        })
    }
}

/// Strip markup characters and surrounding whitespace.
pub fn sanitize_input(input: &str) -> String {
    UNSAFE_CHARS.replace_all(input, "").trim().to_string()
}

/// True when `time` is a strict 24-hour `HH:MM`.
pub fn is_valid_time(time: &str) -> bool {
    TIME_PATTERN.is_match(time)
}
