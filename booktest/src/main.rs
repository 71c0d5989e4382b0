//! Book-test replay CLI.
//!
//! `booktest parse` classifies a chapter's listings without touching any
//! working tree; `booktest run` replays a whole chapter against a real
//! checkout per its TOML spec. Exit codes are stable: see [`exit_codes`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use booktest::core::parser::parse_book_text;
use booktest::engine::ChapterTest;
use booktest::error::{CommandError, CoverageError, ReconciliationError};
use booktest::exit_codes;
use booktest::io::config::load_spec;
use booktest::io::server::DevServer;
use booktest::io::sourcetree::SourceTree;

#[derive(Parser)]
#[command(
    name = "booktest",
    version,
    about = "Replay a tutorial book's listings against the real project"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a chapter's book text and print its listing sequence.
    Parse {
        /// Chapter source file.
        book: PathBuf,
        /// Print the listings as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Replay a chapter: checkout, every listing in order, final diff.
    Run {
        /// Chapter spec (TOML).
        #[arg(long)]
        spec: PathBuf,
        /// Working tree of the project under test.
        #[arg(long)]
        repo: PathBuf,
    },
}

fn main() {
    booktest::logging::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("{err:#}");
        std::process::exit(classify(&err));
    }
}

/// Failures that blame the book or the project are mismatches; everything
/// else is a setup problem.
fn classify(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ReconciliationError>().is_some()
        || err.downcast_ref::<CoverageError>().is_some()
        || err.downcast_ref::<CommandError>().is_some()
    {
        exit_codes::MISMATCH
    } else {
        exit_codes::INVALID
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Parse { book, json } => cmd_parse(&book, json),
        Command::Run { spec, repo } => cmd_run(&spec, &repo),
    }
}

fn cmd_parse(book: &Path, json: bool) -> Result<()> {
    let text = fs::read_to_string(book).with_context(|| format!("read {}", book.display()))?;
    let listings = parse_book_text(&text)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&listings)?);
    } else {
        for listing in &listings {
            println!("{:>4}  {:<28} {}", listing.pos, listing.type_tag, listing.first_line());
        }
    }
    Ok(())
}

fn cmd_run(spec_path: &Path, repo: &Path) -> Result<()> {
    let spec = load_spec(spec_path)?;

    // The book path in the spec is relative to the spec file.
    let book = spec_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&spec.book);
    let text = fs::read_to_string(&book).with_context(|| format!("read {}", book.display()))?;
    let listings = parse_book_text(&text)?;

    let sourcetree = SourceTree::new(repo, &spec);
    let server = DevServer::new(repo, &spec.server);
    let mut test = ChapterTest::new(spec, listings, sourcetree, server)?;
    let outcome = test.run()?;

    println!(
        "chapter {}: {} listings replayed ({} executed, {} skipped)",
        outcome.chapter_no, outcome.listings_total, outcome.executed, outcome.skipped
    );
    Ok(())
}
