use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "MediCare";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable that relocates the data directory.
pub const DATA_DIR_ENV: &str = "MEDICARE_DATA_DIR";

/// Database file name inside the data directory.
pub const DATABASE_FILE: &str = "medicare.db";

/// Get the application data directory.
/// `$MEDICARE_DATA_DIR` when set, otherwise ~/MediCare/.
pub fn app_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the SQLite database path for a data directory.
pub fn database_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join(DATABASE_FILE)
}

/// Default `EnvFilter` directive when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "medicare_lib=info,medicare=info"
}
