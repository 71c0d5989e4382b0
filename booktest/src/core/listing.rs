//! Typed listing model for parsed book content.
//!
//! A chapter parses into an ordered sequence of [`Listing`]s. Positions
//! are assigned in document order starting at 0 and never change after
//! parsing; the replay engine's cursor is the only mutable state that
//! walks them.

use serde::Serialize;

/// Auxiliary `type_tag` values. Tags qualify behavior downstream without
/// adding a second axis of dispatch: the engine matches on [`ListingKind`]
/// and consults the tag for refinements.
pub mod tags {
    pub const CODE: &str = "code listing";
    pub const CODE_WITH_GIT_REF: &str = "code listing with git ref";
    pub const COMMAND: &str = "command";
    pub const OUTPUT: &str = "output";
    pub const INTERACTIVE: &str = "interactive manage.py";
    pub const HTTP: &str = "http request";
}

/// Structural classification of one listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListingKind {
    /// A source-code change to apply to the working tree.
    Code {
        /// Path of the file the listing edits, relative to the tree root.
        path: String,
        /// Symbolic commit ref naming the reference version of this edit.
        git_ref: Option<String>,
    },
    /// A shell invocation to run in the working tree.
    Command,
    /// Expected text for the immediately preceding command.
    Output,
}

/// One parsed unit of book content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    /// Position in the chapter's listing sequence, stable across a run.
    pub pos: usize,
    #[serde(flatten)]
    pub kind: ListingKind,
    /// Qualifier string, one of the [`tags`] constants.
    pub type_tag: String,
    /// Raw text of the listing as it appears in the book.
    pub contents: String,
}

impl Listing {
    pub fn is_command(&self) -> bool {
        matches!(self.kind, ListingKind::Command)
    }

    pub fn is_output(&self) -> bool {
        matches!(self.kind, ListingKind::Output)
    }

    /// First line of the listing, for log/error excerpts.
    pub fn first_line(&self) -> &str {
        self.contents.lines().next().unwrap_or("")
    }
}
