//! Notification output: alerts, speech and tones.
//!
//! All three are fire-and-forget: the scheduler never observes a result,
//! and a sink that fails to deliver must not disturb scheduling.

use std::io::Write;
use std::sync::Mutex;

use crate::models::AlertSeverity;

pub trait NotificationSink: Send + Sync {
    fn emit_alert(&self, message: &str, severity: AlertSeverity);
    fn speak(&self, text: &str);
    fn play_tone(&self);
}

// ═══════════════════════════════════════════
// Terminal
// ═══════════════════════════════════════════

/// Writes notifications to the terminal. Speech is rendered as text and the
/// tone as the terminal bell.
#[derive(Debug, Default)]
pub struct TerminalSink {
    /// Suppress the bell (e.g. when stdout is piped).
    pub quiet: bool,
    /// Write to stderr, keeping stdout for command output.
    pub stderr: bool,
}

impl TerminalSink {
    fn line(&self, text: &str) {
        if self.stderr {
            eprintln!("{text}");
        } else {
            println!("{text}");
        }
    }
}

impl NotificationSink for TerminalSink {
    fn emit_alert(&self, message: &str, severity: AlertSeverity) {
        tracing::debug!(severity = %severity, "alert: {message}");
        self.line(&format!("[{}] {message}", severity.as_str().to_uppercase()));
    }

    fn speak(&self, text: &str) {
        self.line(&format!("» {text}"));
    }

    fn play_tone(&self) {
        if self.quiet {
            return;
        }
        let delivered = if self.stderr {
            let mut out = std::io::stderr();
            out.write_all(b"\x07").and_then(|_| out.flush())
        } else {
            let mut out = std::io::stdout();
            out.write_all(b"\x07").and_then(|_| out.flush())
        };
        if delivered.is_err() {
            tracing::debug!("Terminal bell not delivered");
        }
    }
}

// ═══════════════════════════════════════════
// Recording (tests, simulations)
// ═══════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Alert {
        message: String,
        severity: AlertSeverity,
    },
    Speech(String),
    Tone,
}

/// Captures every notification in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Alerts whose message contains `needle`.
    pub fn alerts_containing(&self, needle: &str) -> Vec<(String, AlertSeverity)> {
        self.events()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Alert { message, severity } if message.contains(needle) => {
                    Some((message, severity))
                }
                _ => None,
            })
            .collect()
    }

    pub fn speech(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Speech(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn tone_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|n| matches!(n, Notification::Tone))
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn push(&self, notification: Notification) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification);
    }
}

impl NotificationSink for RecordingSink {
    fn emit_alert(&self, message: &str, severity: AlertSeverity) {
        self.push(Notification::Alert {
            message: message.to_string(),
            severity,
        });
    }

    fn speak(&self, text: &str) {
        self.push(Notification::Speech(text.to_string()));
    }

    fn play_tone(&self) {
        self.push(Notification::Tone);
    }
}
