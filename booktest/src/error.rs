//! Error taxonomy for chapter replays.
//!
//! Every error here is fatal to the current chapter test; nothing is
//! retried. Orchestration code wraps these in `anyhow` context chains and
//! recovers the typed value with `downcast_ref` where it needs to branch
//! (e.g. to pick a CLI exit code).

use std::fmt;

use thiserror::Error;

/// A book block that could not be classified as any listing kind.
///
/// Carries the block's starting line and leading text so the author can
/// find it in the chapter source. Unclassifiable blocks are never dropped:
/// dropping one would silently break the coverage invariant downstream.
#[derive(Debug, Error)]
#[error("cannot classify block at line {line}: {reason}\n{snippet}")]
pub struct ParseError {
    /// 1-based line number of the block's opening fence.
    pub line: usize,
    pub reason: String,
    /// Leading text of the offending block.
    pub snippet: String,
}

/// Missing or invalid chapter checkpoint, unknown commit spec, or other
/// precondition failure before replay can start.
#[derive(Debug, Error)]
#[error("chapter {chapter_no}: {reason}")]
pub struct SetupError {
    pub chapter_no: u32,
    pub reason: String,
}

/// A shell command failed (non-zero exit, spawn failure, or timeout) in a
/// context where the book did not expect failure.
#[derive(Debug, Error)]
#[error(
    "command `{command}` failed (exit code {code:?}, timed out: {timed_out})\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}"
)]
pub struct CommandError {
    pub command: String,
    pub code: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

/// The dev server did not start accepting connections within the timeout.
#[derive(Debug, Error)]
#[error("dev server did not accept connections on port {port} within {timeout_secs}s")]
pub struct ServerStartError {
    pub port: u16,
    pub timeout_secs: u64,
}

/// An operation that requires a running dev server was attempted while it
/// was down.
#[derive(Debug, Error)]
#[error("{operation} requires a running dev server")]
pub struct StateError {
    pub operation: String,
}

/// Expected and actual content disagree at a specific listing.
///
/// Also raised when a skip directive's required substring is absent from
/// the listing it covers (the skip table has drifted out of sync with the
/// book text).
#[derive(Debug)]
pub struct ReconciliationError {
    pub chapter_no: u32,
    /// Listing position, or `None` for the terminal whole-tree diff.
    pub pos: Option<usize>,
    /// Turn index for interactive listings, `None` otherwise.
    pub turn: Option<usize>,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for ReconciliationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pos {
            Some(pos) => write!(f, "chapter {}, listing {}", self.chapter_no, pos)?,
            None => write!(f, "chapter {}, final working tree", self.chapter_no)?,
        }
        if let Some(turn) = self.turn {
            write!(f, ", turn {turn}")?;
        }
        write!(
            f,
            ": expected and actual content differ\n--- expected ---\n{}\n--- actual ---\n{}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for ReconciliationError {}

/// One or more listing positions were never visited (executed or skipped)
/// by the end of the run.
#[derive(Debug, Error)]
#[error("chapter {chapter_no}: listings never checked: {unvisited:?}")]
pub struct CoverageError {
    pub chapter_no: u32,
    pub unvisited: Vec<usize>,
}
