//! Logging setup shared by the leadlamp binary and its tests.
//!
//! Output is either human-readable or JSON lines, filtered by `RUST_LOG`
//! with a configurable fallback level.

pub mod logging;
