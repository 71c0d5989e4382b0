//! Stable exit codes for booktest CLI commands.

/// Command succeeded: the chapter replayed cleanly (or parsing succeeded).
pub const OK: i32 = 0;
/// Command failed before replay could be judged: bad config, unparseable
/// book text, missing chapter checkpoint, or other setup errors.
pub const INVALID: i32 = 1;
/// The book and reality disagree: output reconciliation, coverage, or
/// final-diff failure at a specific listing position.
pub const MISMATCH: i32 = 2;
