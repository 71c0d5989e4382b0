//! Replay runner for tutorial-book listings.
//!
//! This crate parses a book chapter's source into an ordered sequence of
//! typed listings (code changes, shell commands, expected output), then
//! replays them against a real git working tree and a locally running
//! application server, checking that actual behavior matches what the book
//! claims. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (listing model, parser,
//!   output reconciliation). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (git working tree, subprocess
//!   execution, dev-server control, chapter configuration).
//!
//! The [`engine`] module coordinates core logic with I/O to replay a whole
//! chapter, walking a position cursor over the listing sequence and
//! reconciling each step before advancing.

pub mod core;
pub mod engine;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
