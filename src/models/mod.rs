pub mod adherence;
pub mod enums;
pub mod medication;

pub use adherence::*;
pub use enums::{AlertSeverity, ReminderKind};
pub use medication::*;
