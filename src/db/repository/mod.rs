//! Repository layer: key-scoped database operations.
//!
//! Application state is stored as JSON documents under fixed keys;
//! the repository only moves strings in and out of `kv_store`.

mod kv;

pub use kv::*;

/// Key holding the ordered medication list.
pub const MEDICATIONS_KEY: &str = "medications";

/// Key holding the adherence counters.
pub const ADHERENCE_KEY: &str = "adherenceData";
