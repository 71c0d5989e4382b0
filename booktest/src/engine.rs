//! Replay engine: walks a chapter's listing sequence against the real
//! working tree and dev server.
//!
//! The engine owns the only mutable replay state, a position cursor over
//! the parsed listings. It advances monotonically, never revisits a
//! position, and only moves past a listing once that listing has been
//! reconciled or explicitly skipped. At the end of a run every position
//! must have been visited and the working tree must match the chapter's
//! known-good end commit.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};

use crate::core::listing::{Listing, ListingKind, tags};
use crate::core::reconcile::{outputs_match, split_turns, turn_matches};
use crate::error::{CoverageError, ReconciliationError};
use crate::io::config::ChapterSpec;
use crate::io::server::AppServer;
use crate::io::session::{InteractiveSession, SETTLE};
use crate::io::sourcetree::SourceTree;

/// Summary of a completed chapter replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterOutcome {
    pub chapter_no: u32,
    pub listings_total: usize,
    pub executed: usize,
    pub skipped: usize,
}

/// Stateful replay of one chapter.
#[derive(Debug)]
pub struct ChapterTest<S: AppServer> {
    spec: ChapterSpec,
    listings: Vec<Listing>,
    pos: usize,
    visited: Vec<bool>,
    skips: BTreeMap<usize, String>,
    /// Positions visited without being executed or reconciled.
    skipped: usize,
    sourcetree: SourceTree,
    server: S,
}

impl<S: AppServer> ChapterTest<S> {
    /// Build a chapter test from its spec and parsed listings.
    ///
    /// The spec's skip table is registered here, so a skip whose required
    /// substring has drifted away from the book text fails before any
    /// listing is executed.
    pub fn new(
        spec: ChapterSpec,
        listings: Vec<Listing>,
        sourcetree: SourceTree,
        server: S,
    ) -> Result<Self> {
        let visited = vec![false; listings.len()];
        let mut test = Self {
            spec,
            listings,
            pos: 0,
            visited,
            skips: BTreeMap::new(),
            skipped: 0,
            sourcetree,
            server,
        };
        for skip in test.spec.skips.clone() {
            test.skip_with_check(skip.pos, &skip.required)?;
        }
        Ok(test)
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn listings(&self) -> &[Listing] {
        &self.listings
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    /// Register that `pos` must be skipped during replay, after verifying
    /// `required` appears in that listing's contents.
    ///
    /// The substring check runs immediately, independent of whether replay
    /// ever reaches `pos`: it both guards against the book drifting out of
    /// sync with the skip table and documents why the listing is
    /// intentionally not replayed.
    pub fn skip_with_check(&mut self, pos: usize, required: &str) -> Result<()> {
        let Some(listing) = self.listings.get(pos) else {
            return Err(self.mismatch(pos, required, "<no listing at this position>"));
        };
        if !listing.contents.contains(required) {
            return Err(self.mismatch(pos, required, &listing.contents));
        }
        self.skips.insert(pos, required.to_string());
        Ok(())
    }

    /// Explicit fast-forward: check out `commit` and resume replay at
    /// `pos`, treating everything before it as visited.
    #[instrument(skip_all, fields(pos, commit))]
    pub fn resume_from(&mut self, pos: usize, commit: &str) -> Result<()> {
        if pos > self.listings.len() {
            return Err(anyhow!(
                "cannot resume at listing {pos}: chapter {} has {} listings",
                self.spec.chapter_no,
                self.listings.len()
            ));
        }
        let rev = self.sourcetree.get_commit_spec(commit)?;
        self.sourcetree.checkout(&rev)?;
        for visited in &mut self.visited[..pos] {
            *visited = true;
        }
        self.pos = pos;
        info!(pos, "resumed replay from checkpoint commit");
        Ok(())
    }

    /// Recognise the listing under the cursor and process it, advancing
    /// the cursor past everything it consumed.
    #[instrument(skip_all, fields(pos = self.pos))]
    pub fn process_next(&mut self) -> Result<()> {
        let pos = self.pos;
        let listing = self
            .listings
            .get(pos)
            .ok_or_else(|| {
                anyhow!(
                    "cursor {pos} is past the end of chapter {}'s {} listings",
                    self.spec.chapter_no,
                    self.listings.len()
                )
            })?
            .clone();

        if self.skips.contains_key(&pos) {
            debug!(tag = %listing.type_tag, "skipping listing");
            self.mark(pos);
            self.skipped += 1;
            self.pos = pos + 1;
            // A skipped command takes its expected output with it: there
            // is no actual output to reconcile that listing against.
            if listing.is_command()
                && let Some(next) = self.listings.get(self.pos)
                && next.is_output()
            {
                self.mark(self.pos);
                self.skipped += 1;
                self.pos += 1;
            }
            return Ok(());
        }

        match &listing.kind {
            ListingKind::Code { path, git_ref } => {
                debug!(path = %path, "applying code listing");
                self.sourcetree
                    .apply_listing(pos, path, git_ref.as_deref(), &listing.contents)?;
                self.mark(pos);
                self.pos = pos + 1;
                Ok(())
            }
            ListingKind::Command => self.process_command(&listing),
            ListingKind::Output => Err(anyhow!(
                "chapter {}, listing {pos}: orphaned output listing (no command precedes it)",
                self.spec.chapter_no
            )),
        }
    }

    fn process_command(&mut self, listing: &Listing) -> Result<()> {
        let expected = self.paired_output(listing.pos);
        if let Some(output) = &expected
            && self.skips.contains_key(&output.pos)
        {
            let output = output.clone();
            return self.process_unreconciled(listing, &output);
        }
        match listing.type_tag.as_str() {
            tags::INTERACTIVE => self.process_interactive(listing, expected.as_ref()),
            tags::HTTP => self.process_http(listing, expected.as_ref()),
            _ => self.process_shell(listing, expected.as_ref()),
        }
    }

    /// The Output listing paired with the command at `pos`.
    fn paired_output(&self, pos: usize) -> Option<Listing> {
        let next = self.listings.get(pos + 1)?;
        if next.is_output() {
            Some(next.clone())
        } else {
            None
        }
    }

    /// Run a command whose expected output is covered by a skip
    /// (illustrative output the book shows but does not promise). The
    /// command itself still executes; whatever it prints goes unchecked.
    fn process_unreconciled(&mut self, listing: &Listing, output: &Listing) -> Result<()> {
        debug!(cmd = %listing.contents, "running command, output check skipped");
        match listing.type_tag.as_str() {
            tags::HTTP => {
                let (method, path) = listing
                    .contents
                    .split_once(' ')
                    .ok_or_else(|| anyhow!("malformed http listing `{}`", listing.contents))?;
                self.server.request(method, path).with_context(|| {
                    format!("chapter {}, listing {}", self.spec.chapter_no, listing.pos)
                })?;
            }
            tags::INTERACTIVE => {
                let timeout = Duration::from_secs(self.spec.command_timeout_secs);
                let session =
                    InteractiveSession::spawn(&listing.contents, self.sourcetree.workdir())?;
                // Closing stdin ends the session: the program sees EOF
                // instead of the transcript's responses.
                session.finish(timeout)?;
            }
            _ => {
                self.sourcetree.run_command(&listing.contents)?;
            }
        }
        self.mark(listing.pos);
        self.mark(output.pos);
        self.skipped += 1;
        self.pos = output.pos + 1;
        Ok(())
    }

    fn process_shell(&mut self, listing: &Listing, expected: Option<&Listing>) -> Result<()> {
        debug!(cmd = %listing.contents, "running command");
        match expected {
            Some(output) => {
                let out = self.sourcetree.run_command(&listing.contents)?;
                let actual = out.combined_utf8();
                if !outputs_match(&output.contents, &actual) {
                    return Err(self.mismatch(output.pos, &output.contents, &actual));
                }
                self.mark(listing.pos);
                self.mark(output.pos);
                self.pos = output.pos + 1;
            }
            None => {
                // No expected output in the book: the command must both
                // succeed and stay quiet.
                let out = self.sourcetree.run_command_checked(&listing.contents)?;
                let actual = out.combined_utf8();
                if !outputs_match("", &actual) {
                    return Err(self.mismatch(listing.pos, "", &actual));
                }
                self.mark(listing.pos);
                self.pos = listing.pos + 1;
            }
        }
        Ok(())
    }

    fn process_interactive(&mut self, listing: &Listing, expected: Option<&Listing>) -> Result<()> {
        let transcript = expected.map(|l| l.contents.as_str()).unwrap_or_default();
        let turns = split_turns(transcript);
        debug!(cmd = %listing.contents, turns = turns.len(), "running interactive session");

        let timeout = Duration::from_secs(self.spec.command_timeout_secs);
        let mut session =
            InteractiveSession::spawn(&listing.contents, self.sourcetree.workdir())?;
        for (index, turn) in turns.iter().enumerate() {
            // An empty expected prompt means the program reads before it
            // prints anything; waiting the full command timeout for a
            // first byte that never comes would stall the replay.
            let wait = if turn.prompt.trim().is_empty() { SETTLE } else { timeout };
            let actual = session.read_prompt(wait)?;
            if !turn_matches(turn, &actual) {
                return Err(ReconciliationError {
                    chapter_no: self.spec.chapter_no,
                    pos: Some(listing.pos),
                    turn: Some(index),
                    expected: turn.prompt.clone(),
                    actual,
                }
                .into());
            }
            session.send_line(&turn.response)?;
        }
        session.finish(timeout)?;

        self.mark(listing.pos);
        self.pos = listing.pos + 1;
        if let Some(output) = expected {
            self.mark(output.pos);
            self.pos = output.pos + 1;
        }
        Ok(())
    }

    fn process_http(&mut self, listing: &Listing, expected: Option<&Listing>) -> Result<()> {
        let (method, path) = listing
            .contents
            .split_once(' ')
            .ok_or_else(|| anyhow!("malformed http listing `{}`", listing.contents))?;
        debug!(method, path, "issuing http request");
        let response = self
            .server
            .request(method, path)
            .with_context(|| format!("chapter {}, listing {}", self.spec.chapter_no, listing.pos))?;

        let expected_body = expected.map(|l| l.contents.as_str()).unwrap_or_default();
        if !outputs_match(expected_body, &response.body) {
            let actual = format!("HTTP {}\n{}", response.status, response.body);
            return Err(self.mismatch(listing.pos, expected_body, &actual));
        }
        self.mark(listing.pos);
        self.pos = listing.pos + 1;
        if let Some(output) = expected {
            self.mark(output.pos);
            self.pos = output.pos + 1;
        }
        Ok(())
    }

    fn mark(&mut self, pos: usize) {
        self.visited[pos] = true;
    }

    fn mismatch(&self, pos: usize, expected: &str, actual: &str) -> anyhow::Error {
        ReconciliationError {
            chapter_no: self.spec.chapter_no,
            pos: Some(pos),
            turn: None,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
        .into()
    }

    /// Closing half of the coverage invariant: every listing position was
    /// visited, by normal processing or by an explicit skip.
    pub fn assert_all_listings_checked(&self) -> Result<()> {
        let unvisited: Vec<usize> = (0..self.listings.len())
            .filter(|&pos| !self.visited[pos])
            .collect();
        if unvisited.is_empty() {
            Ok(())
        } else {
            Err(CoverageError {
                chapter_no: self.spec.chapter_no,
                unvisited,
            }
            .into())
        }
    }

    /// Terminal assertion: the working tree matches the chapter's end
    /// commit (modulo moves, when the spec says to ignore them).
    pub fn check_final_diff(&self) -> Result<()> {
        self.sourcetree
            .check_final_diff(self.spec.chapter_no, self.spec.checkpoint.ignore_moves)
    }

    /// Replay the whole chapter: checkout, optional dev server, every
    /// listing in order, then the coverage and final-diff assertions.
    #[instrument(skip_all, fields(chapter_no = self.spec.chapter_no))]
    pub fn run(&mut self) -> Result<ChapterOutcome> {
        self.sourcetree.start_with_checkout(self.spec.chapter_no)?;

        let server_enabled = !self.spec.server.command.is_empty();
        if server_enabled {
            self.server.start()?;
        }

        let restart_after = self.spec.server.restart_after.clone();
        let mut restarted: BTreeSet<usize> = BTreeSet::new();
        while self.pos < self.listings.len() {
            if server_enabled {
                for &after in &restart_after {
                    if self.pos > after && restarted.insert(after) {
                        info!(after, "restarting dev server");
                        self.server.restart()?;
                    }
                }
            }
            self.process_next()?;
        }

        self.assert_all_listings_checked()?;
        if server_enabled {
            self.server.stop()?;
        }
        self.check_final_diff()?;

        let skipped = self.skipped;
        Ok(ChapterOutcome {
            chapter_no: self.spec.chapter_no,
            listings_total: self.listings.len(),
            executed: self.listings.len() - skipped,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_book_text;
    use crate::error::CommandError;
    use crate::io::config::{Checkpoint, SkipDirective};
    use crate::io::server::HttpResponse;
    use crate::test_support::{ScriptedServer, TestRepo};

    /// Start tag holds only a README; end tag adds `notes.txt`.
    fn chapter_repo() -> TestRepo {
        let repo = TestRepo::new().expect("repo");
        repo.write_file("README.md", "a project\n").expect("write");
        repo.commit_all("chapter 2 start").expect("commit");
        repo.tag("ch02_start").expect("tag");
        repo.write_file("notes.txt", "remember the milk\n").expect("write");
        repo.commit_all("chapter 2 end").expect("commit");
        repo.tag("ch02_end").expect("tag");
        repo
    }

    fn chapter_spec() -> ChapterSpec {
        ChapterSpec {
            chapter_no: 2,
            checkpoint: Checkpoint {
                start: "ch02_start".to_string(),
                end: "ch02_end".to_string(),
                ignore_moves: false,
            },
            ..ChapterSpec::default()
        }
    }

    fn engine_for(
        repo: &TestRepo,
        spec: ChapterSpec,
        book: &str,
    ) -> Result<ChapterTest<ScriptedServer>> {
        let listings = parse_book_text(book).expect("parse book");
        let sourcetree = SourceTree::new(repo.root(), &spec);
        ChapterTest::new(spec, listings, sourcetree, ScriptedServer::default())
    }

    const BOOK: &str = concat!(
        ".notes.txt\n",
        "----\n",
        "remember the milk\n",
        "----\n",
        "\n",
        "Check it landed:\n",
        "\n",
        "----\n",
        "$ cat notes.txt\n",
        "remember the milk\n",
        "----\n",
        "\n",
        "This one is illustrative only, do not run it:\n",
        "\n",
        "----\n",
        "$ rm /definitely/not/here\n",
        "----\n",
    );

    #[test]
    fn full_replay_visits_every_listing_and_passes_the_final_diff() {
        let repo = chapter_repo();
        let mut spec = chapter_spec();
        spec.skips = vec![SkipDirective {
            pos: 3,
            required: "definitely".to_string(),
        }];
        let mut test = engine_for(&repo, spec, BOOK).expect("engine");

        let outcome = test.run().expect("replay");
        assert_eq!(
            outcome,
            ChapterOutcome {
                chapter_no: 2,
                listings_total: 4,
                executed: 3,
                skipped: 1,
            }
        );
        assert_eq!(test.pos(), 4);
        test.assert_all_listings_checked().expect("coverage");
    }

    #[test]
    fn skipped_listing_is_never_executed() {
        // Without the skip, `rm /definitely/not/here` has no expected
        // output and its non-zero exit would abort the replay.
        let repo = chapter_repo();
        let mut spec = chapter_spec();
        spec.skips = vec![SkipDirective {
            pos: 3,
            required: "definitely".to_string(),
        }];
        engine_for(&repo, spec, BOOK)
            .expect("engine")
            .run()
            .expect("skip prevents execution");
    }

    #[test]
    fn unskipped_failing_command_is_a_command_error() {
        let repo = chapter_repo();
        let err = engine_for(&repo, chapter_spec(), BOOK)
            .expect("engine")
            .run()
            .expect_err("rm must fail");
        assert!(err.downcast_ref::<CommandError>().is_some());
    }

    /// Single commit tagged as both ends: the book's commands must leave
    /// the tree untouched.
    fn steady_state_repo() -> (TestRepo, ChapterSpec) {
        let repo = TestRepo::new().expect("repo");
        repo.commit_all("chapter 4").expect("commit");
        repo.tag("ch04").expect("tag");
        let spec = ChapterSpec {
            chapter_no: 4,
            checkpoint: Checkpoint {
                start: "ch04".to_string(),
                end: "ch04".to_string(),
                ignore_moves: false,
            },
            ..ChapterSpec::default()
        };
        (repo, spec)
    }

    #[test]
    fn skipped_output_lets_its_command_run_unreconciled() {
        let (repo, mut spec) = steady_state_repo();
        // The skip waives the output check only; `echo` still runs and
        // may print whatever it likes.
        let book = "----\n$ echo hello\nthe tool prints a greeting here\n----\n";
        spec.skips = vec![SkipDirective {
            pos: 1,
            required: "greeting".to_string(),
        }];
        let mut test = engine_for(&repo, spec, book).expect("engine");
        let outcome = test.run().expect("output check waived");
        assert_eq!(outcome.executed, 1);
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn skipping_a_command_consumes_its_paired_output() {
        let (repo, mut spec) = steady_state_repo();
        // HEAD~1 does not exist in this repo; the command must never run.
        let book = "----\n$ git diff -b HEAD~1\nsome illustrative diff\n----\n";
        spec.skips = vec![SkipDirective {
            pos: 0,
            required: "-b".to_string(),
        }];
        let mut test = engine_for(&repo, spec, book).expect("engine");
        let outcome = test.run().expect("skip covers the pair");
        assert_eq!(outcome.executed, 0);
        assert_eq!(outcome.skipped, 2);
    }

    #[test]
    fn skip_with_check_fails_immediately_when_the_substring_is_absent() {
        let repo = chapter_repo();
        let mut spec = chapter_spec();
        spec.skips = vec![SkipDirective {
            pos: 3,
            required: "the -b means ignore whitespace".to_string(),
        }];
        let err = engine_for(&repo, spec, BOOK).expect_err("skip drift");
        let rec = err.downcast_ref::<ReconciliationError>().expect("typed");
        assert_eq!(rec.pos, Some(3));
    }

    #[test]
    fn output_mismatch_reports_the_output_position() {
        let repo = chapter_repo();
        let book = concat!(
            ".notes.txt\n----\nremember the milk\n----\n",
            "----\n$ cat notes.txt\nnothing to commit\n----\n",
        );
        let err = engine_for(&repo, chapter_spec(), book)
            .expect("engine")
            .run()
            .expect_err("wrong expected output");
        let rec = err.downcast_ref::<ReconciliationError>().expect("typed");
        assert_eq!(rec.pos, Some(2));
        assert!(rec.actual.contains("remember the milk"));
    }

    #[test]
    fn orphaned_output_listing_is_rejected() {
        let repo = chapter_repo();
        let listings = vec![Listing {
            pos: 0,
            kind: ListingKind::Output,
            type_tag: tags::OUTPUT.to_string(),
            contents: "stray".to_string(),
        }];
        let spec = chapter_spec();
        let sourcetree = SourceTree::new(repo.root(), &spec);
        let mut test =
            ChapterTest::new(spec, listings, sourcetree, ScriptedServer::default()).expect("engine");
        assert!(test.process_next().is_err());
    }

    #[test]
    fn unvisited_listings_are_a_coverage_error() {
        let repo = chapter_repo();
        let test = engine_for(&repo, chapter_spec(), BOOK).expect("engine");
        let err = test.assert_all_listings_checked().expect_err("nothing visited");
        let cov = err.downcast_ref::<CoverageError>().expect("typed");
        assert_eq!(cov.unvisited, vec![0, 1, 2, 3]);
    }

    #[test]
    fn http_listing_reconciles_the_response_body() {
        let repo = TestRepo::new().expect("repo");
        repo.commit_all("chapter 3").expect("commit");
        repo.tag("ch03").expect("tag");

        let book = "[role=\"http\"]\n----\nGET /lists/new\n<html>fresh list</html>\n----\n";
        let mut spec = ChapterSpec {
            chapter_no: 3,
            checkpoint: Checkpoint {
                start: "ch03".to_string(),
                end: "ch03".to_string(),
                ignore_moves: false,
            },
            ..ChapterSpec::default()
        };
        spec.server.command = vec!["scripted".to_string()];

        let listings = parse_book_text(book).expect("parse");
        let sourcetree = SourceTree::new(repo.root(), &spec);
        let server = ScriptedServer::with_responses(vec![HttpResponse {
            status: 200,
            body: "<html>fresh list</html>\n".to_string(),
        }]);
        let mut test = ChapterTest::new(spec, listings, sourcetree, server).expect("engine");
        test.run().expect("replay");
        assert_eq!(test.server().starts, 1);
    }

    #[test]
    fn server_restarts_after_the_configured_position() {
        let repo = TestRepo::new().expect("repo");
        repo.commit_all("chapter 3").expect("commit");
        repo.tag("ch03").expect("tag");

        let book = concat!(
            "[role=\"http\"]\n----\nGET /\nhome\n----\n",
            "[role=\"http\"]\n----\nGET /lists\nlists\n----\n",
        );
        let mut spec = ChapterSpec {
            chapter_no: 3,
            checkpoint: Checkpoint {
                start: "ch03".to_string(),
                end: "ch03".to_string(),
                ignore_moves: false,
            },
            ..ChapterSpec::default()
        };
        spec.server.command = vec!["scripted".to_string()];
        spec.server.restart_after = vec![0];

        let listings = parse_book_text(book).expect("parse");
        let sourcetree = SourceTree::new(repo.root(), &spec);
        let server = ScriptedServer::with_responses(vec![
            HttpResponse {
                status: 200,
                body: "home\n".to_string(),
            },
            HttpResponse {
                status: 200,
                body: "lists\n".to_string(),
            },
        ]);
        let mut test = ChapterTest::new(spec, listings, sourcetree, server).expect("engine");
        test.run().expect("replay");
        assert_eq!(test.server().restarts, 1);
    }

    const ASK_SCRIPT: &str =
        "printf \"Title: \"; read t; printf \"1: %s\\n> \" \"$t\"; read x\n";

    const INTERACTIVE_BOOK: &str = concat!(
        "[role=\"interactive\"]\n",
        "----\n",
        "$ sh ./ask.sh\n",
        "Title: *Buy peacock feathers*\n",
        "1: Buy peacock feathers\n",
        "> \n",
        "----\n",
    );

    #[test]
    fn interactive_listing_reconciles_turn_by_turn() {
        let repo = chapter_repo();
        repo.write_file("ask.sh", ASK_SCRIPT).expect("script");
        let mut test = engine_for(&repo, chapter_spec(), INTERACTIVE_BOOK).expect("engine");
        test.process_next().expect("session");
        assert_eq!(test.pos(), 2);
        test.assert_all_listings_checked().expect("both visited");
    }

    #[test]
    fn interactive_mismatch_reports_the_turn_index() {
        let repo = chapter_repo();
        // Echoes the title back without the "1: " numbering.
        repo.write_file(
            "ask.sh",
            "printf \"Title: \"; read t; printf \"%s\\n> \" \"$t\"; read x\n",
        )
        .expect("script");
        let mut test = engine_for(&repo, chapter_spec(), INTERACTIVE_BOOK).expect("engine");
        let err = test.process_next().expect_err("numbering missing");
        let rec = err.downcast_ref::<ReconciliationError>().expect("typed");
        assert_eq!(rec.turn, Some(1));
    }

    #[test]
    fn turn_with_no_expected_prompt_waits_only_the_settle_window() {
        let repo = chapter_repo();
        // Reads before printing anything, so the first turn's expected
        // prompt is empty.
        repo.write_file("ask.sh", "read t; printf \"ok: %s\\n> \" \"$t\"; read x\n")
            .expect("script");
        let book = concat!(
            "[role=\"interactive\"]\n",
            "----\n",
            "$ sh ./ask.sh\n",
            "*go*\n",
            "ok: go\n",
            "> \n",
            "----\n",
        );
        let started = std::time::Instant::now();
        let mut test = engine_for(&repo, chapter_spec(), book).expect("engine");
        test.process_next().expect("session");
        // Far below the 600s default command timeout an empty-prompt
        // turn used to wait out.
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(test.pos(), 2);
    }

    #[test]
    fn resume_from_marks_earlier_listings_as_visited() {
        let repo = chapter_repo();
        let mut spec = chapter_spec();
        spec.skips = vec![SkipDirective {
            pos: 3,
            required: "definitely".to_string(),
        }];
        let mut test = engine_for(&repo, spec, BOOK).expect("engine");
        test.resume_from(3, "ch02_end").expect("fast-forward");
        assert_eq!(test.pos(), 3);
        test.process_next().expect("skip the last listing");
        test.assert_all_listings_checked().expect("coverage");
    }
}
