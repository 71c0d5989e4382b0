//! Git working-tree controller for chapter replays.
//!
//! The replay mutates a real checkout of the project under test, so we
//! keep a small, explicit wrapper around `git` subprocess calls. One
//! `SourceTree` owns one working directory; concurrent chapter tests must
//! use isolated checkouts.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::reconcile::ELLIPSIS;
use crate::error::{CommandError, ReconciliationError, SetupError};
use crate::io::config::{ChapterSpec, Checkpoint};
use crate::io::process::{CapturedOutput, run_with_timeout};

/// Wrapper for a chapter's git working tree.
#[derive(Debug, Clone)]
pub struct SourceTree {
    workdir: PathBuf,
    chapter_no: u32,
    checkpoint: Checkpoint,
    aliases: BTreeMap<String, String>,
    command_timeout: Duration,
    output_limit_bytes: usize,
}

impl SourceTree {
    pub fn new(workdir: impl Into<PathBuf>, spec: &ChapterSpec) -> Self {
        Self {
            workdir: workdir.into(),
            chapter_no: spec.chapter_no,
            checkpoint: spec.checkpoint.clone(),
            aliases: spec.aliases.clone(),
            command_timeout: Duration::from_secs(spec.command_timeout_secs),
            output_limit_bytes: spec.output_limit_bytes,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Run a git command in the working tree, returning stdout.
    fn git(&self, args: &[&str]) -> Result<String> {
        let out = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !out.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&out.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    fn setup_error(&self, reason: impl Into<String>) -> anyhow::Error {
        SetupError {
            chapter_no: self.chapter_no,
            reason: reason.into(),
        }
        .into()
    }

    /// Reset the working tree to the chapter's starting commit.
    #[instrument(skip_all, fields(chapter_no))]
    pub fn start_with_checkout(&self, chapter_no: u32) -> Result<()> {
        if chapter_no != self.chapter_no {
            return Err(self.setup_error(format!(
                "no known starting commit for chapter {chapter_no} (spec covers chapter {})",
                self.chapter_no
            )));
        }
        let rev = self.resolve(&self.checkpoint.start).map_err(|e| {
            self.setup_error(format!(
                "starting commit `{}` not found: {e:#}",
                self.checkpoint.start
            ))
        })?;
        debug!(rev = %rev, "checking out chapter start");
        self.checkout(&rev)
    }

    /// Force-checkout a resolved revision and drop untracked files.
    pub fn checkout(&self, rev: &str) -> Result<()> {
        self.git(&["checkout", "-f", rev])?;
        self.git(&["clean", "-fdq"])?;
        Ok(())
    }

    /// Execute a shell command with the working tree as current directory,
    /// capturing stdout/stderr/exit status.
    ///
    /// A non-zero exit is returned in the capture, not raised here: the
    /// book frequently shows intentionally failing commands (that is the
    /// point of a testing tutorial) and the caller reconciles their output.
    /// A timeout or spawn failure is always a [`CommandError`].
    #[instrument(skip_all, fields(cmd))]
    pub fn run_command(&self, cmd: &str) -> Result<CapturedOutput> {
        let mut shell = Command::new("sh");
        shell.arg("-c").arg(cmd).current_dir(&self.workdir);
        let out = run_with_timeout(shell, self.command_timeout, self.output_limit_bytes)
            .with_context(|| format!("run `{cmd}`"))?;
        if out.timed_out {
            return Err(self.command_error(cmd, &out).into());
        }
        Ok(out)
    }

    /// Like [`run_command`](Self::run_command), but a non-zero exit is a
    /// [`CommandError`]. Used when the book shows no expected output.
    pub fn run_command_checked(&self, cmd: &str) -> Result<CapturedOutput> {
        let out = self.run_command(cmd)?;
        if !out.status.success() {
            return Err(self.command_error(cmd, &out).into());
        }
        Ok(out)
    }

    fn command_error(&self, cmd: &str, out: &CapturedOutput) -> CommandError {
        CommandError {
            command: cmd.to_string(),
            code: out.status.code(),
            timed_out: out.timed_out,
            stdout: out.stdout_utf8(),
            stderr: out.stderr_utf8(),
        }
    }

    /// Resolve a symbolic listing ref (e.g. `ch07l018`) to a commit id.
    ///
    /// The spec's alias map takes precedence; otherwise the ref must exist
    /// in the repository (usually as a tag).
    pub fn get_commit_spec(&self, tag: &str) -> Result<String> {
        let rev = self.aliases.get(tag).map_or(tag, String::as_str);
        self.resolve(rev)
            .map_err(|e| self.setup_error(format!("unknown commit spec `{tag}`: {e:#}")))
    }

    fn resolve(&self, rev: &str) -> Result<String> {
        let spec = format!("{rev}^{{commit}}");
        Ok(self.git(&["rev-parse", "--verify", "--quiet", &spec])?.trim().to_string())
    }

    /// Apply a code listing to the working tree.
    ///
    /// Without a git ref the listing is the full file and is written as
    /// is. With a git ref the referenced commit is ground truth: the file
    /// is materialized from it, then the listing's non-elided lines are
    /// checked against it so drift between book text and reference
    /// history fails loudly at the listing that drifted.
    #[instrument(skip_all, fields(pos, path))]
    pub fn apply_listing(
        &self,
        pos: usize,
        path: &str,
        git_ref: Option<&str>,
        contents: &str,
    ) -> Result<()> {
        let file_text = match git_ref {
            Some(tag) => {
                let commit = self.get_commit_spec(tag)?;
                let text = self
                    .git(&["show", &format!("{commit}:{path}")])
                    .map_err(|e| {
                        self.setup_error(format!("listing ref `{tag}` has no file {path}: {e:#}"))
                    })?;
                self.check_listing_drift(pos, contents, &text)?;
                text
            }
            None => {
                let mut text = contents.to_string();
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text
            }
        };
        let target = self.workdir.join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&target, file_text).with_context(|| format!("write {}", target.display()))?;
        Ok(())
    }

    /// Every non-elided listing line must appear in the reference text.
    fn check_listing_drift(&self, pos: usize, listing: &str, reference: &str) -> Result<()> {
        for line in listing.lines() {
            let line = line.trim();
            if line.is_empty() || line == ELLIPSIS {
                continue;
            }
            if !reference.lines().any(|r| r.trim() == line) {
                return Err(ReconciliationError {
                    chapter_no: self.chapter_no,
                    pos: Some(pos),
                    turn: None,
                    expected: line.to_string(),
                    actual: reference.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Diff the working tree against the chapter's known-good end commit.
    ///
    /// Stages everything first so untracked files take part in the
    /// comparison; the index is replay-scratch state at this point. With
    /// `ignore_moves`, pure renames (`R100`) are treated as no-ops.
    #[instrument(skip_all, fields(chapter_no, ignore_moves))]
    pub fn check_final_diff(&self, chapter_no: u32, ignore_moves: bool) -> Result<()> {
        if chapter_no != self.chapter_no {
            return Err(self.setup_error(format!(
                "no known ending commit for chapter {chapter_no} (spec covers chapter {})",
                self.chapter_no
            )));
        }
        let end = self.resolve(&self.checkpoint.end).map_err(|e| {
            self.setup_error(format!(
                "ending commit `{}` not found: {e:#}",
                self.checkpoint.end
            ))
        })?;

        self.git(&["add", "-A"])?;
        let name_status = self.git(&[
            "diff",
            "--cached",
            "--find-renames",
            "--name-status",
            &end,
        ])?;

        let residual: Vec<&str> = name_status
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter(|line| !(ignore_moves && line.starts_with("R100")))
            .collect();
        if residual.is_empty() {
            return Ok(());
        }

        warn!(entries = residual.len(), "final diff has residual entries");
        let diff_text = self.git(&["diff", "--cached", "--find-renames", &end])?;
        Err(ReconciliationError {
            chapter_no: self.chapter_no,
            pos: None,
            turn: None,
            expected: "no diff against the chapter's end commit".to_string(),
            actual: format!("{}\n{diff_text}", residual.join("\n")),
        }
        .into())
    }
}
