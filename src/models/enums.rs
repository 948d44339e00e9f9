use serde::{Deserialize, Serialize};

/// Macro to generate a snake_case enum with as_str + Display
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(AlertSeverity {
    Info => "info",
    Success => "success",
    Warning => "warning",
    Error => "error",
});

str_enum!(ReminderKind {
    PreNotice => "pre_notice",
    Due => "due",
    Escalation => "escalation",
});
