//! Per-chapter replay specification (TOML).
//!
//! One `ChapterSpec` bundles everything a chapter replay needs: the
//! checkpoint commits bounding the chapter, the skip table, the
//! commit-alias map, and dev-server settings. It is constructed once and
//! passed into the replay engine explicitly; there is no ambient global
//! state.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Chapter replay specification.
///
/// This file is intended to be edited by the book's author and must remain
/// stable and automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChapterSpec {
    /// Chapter number; identifies the checkpoint pair and appears in
    /// every failure report.
    pub chapter_no: u32,

    /// Path to the chapter's book source, relative to this spec file.
    pub book: PathBuf,

    pub checkpoint: Checkpoint,

    /// Listings intentionally not replayed, each guarded by a substring
    /// that must appear in the listing's contents.
    #[serde(rename = "skip")]
    pub skips: Vec<SkipDirective>,

    /// Symbolic listing refs (e.g. `ch07l018`) that do not exist as git
    /// tags in the project repository, mapped to revision expressions.
    pub aliases: BTreeMap<String, String>,

    pub server: ServerConfig,

    /// Wall-clock budget for each replayed shell command.
    pub command_timeout_secs: u64,

    /// Truncate captured command output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Start/end commit pair bounding one chapter's replay.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Checkpoint {
    /// Revision the working tree is checked out to before replay.
    pub start: String,
    /// Known-good end state the final working tree is diffed against.
    pub end: String,
    /// Treat pure file renames as no-ops in the final diff.
    pub ignore_moves: bool,
}

/// A listing position that must be skipped, with the substring proving the
/// skip table still matches the book text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkipDirective {
    pub pos: usize,
    pub required: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Command that starts the application under test (empty: this
    /// chapter runs no dev server).
    pub command: Vec<String>,
    /// Local port the server binds; chapters replayed in parallel must
    /// use non-conflicting ports.
    pub port: u16,
    pub startup_timeout_secs: u64,
    /// Listing positions after which the server must be restarted
    /// (changes the application cannot hot-reload, e.g. migrations).
    pub restart_after: Vec<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            port: 8081,
            startup_timeout_secs: 15,
            restart_after: Vec::new(),
        }
    }
}

impl Default for ChapterSpec {
    fn default() -> Self {
        Self {
            chapter_no: 0,
            book: PathBuf::new(),
            checkpoint: Checkpoint::default(),
            skips: Vec::new(),
            aliases: BTreeMap::new(),
            server: ServerConfig::default(),
            command_timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl ChapterSpec {
    pub fn validate(&self) -> Result<()> {
        if self.chapter_no == 0 {
            return Err(anyhow!("chapter_no must be >= 1"));
        }
        if self.checkpoint.start.trim().is_empty() {
            return Err(anyhow!("checkpoint.start must name a revision"));
        }
        if self.checkpoint.end.trim().is_empty() {
            return Err(anyhow!("checkpoint.end must name a revision"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.server.startup_timeout_secs == 0 {
            return Err(anyhow!("server.startup_timeout_secs must be > 0"));
        }
        let mut seen = std::collections::BTreeSet::new();
        for skip in &self.skips {
            if !seen.insert(skip.pos) {
                return Err(anyhow!("duplicate skip for listing {}", skip.pos));
            }
            if skip.required.trim().is_empty() {
                return Err(anyhow!("skip for listing {} has no required substring", skip.pos));
            }
        }
        Ok(())
    }
}

/// Load and validate a chapter spec from a TOML file.
///
/// Unlike runtime config, a chapter spec has no useful default: a missing
/// file is an error.
pub fn load_spec(path: &Path) -> Result<ChapterSpec> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let spec: ChapterSpec =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    spec.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(spec)
}
