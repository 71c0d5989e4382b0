//! Book-text parser: chapter source to ordered listing sequence.
//!
//! The book is asciidoc-flavoured: listing blocks are fenced by `----`
//! lines, optionally preceded by an attribute line (`[role="sourcecode"]`)
//! and a dot-caption naming the file the listing edits, with an optional
//! parenthesized commit ref (`.lists/views.py (ch07l018)`).
//!
//! Classification is emitted once per top-level block, never per line, so
//! a sourcecode block that happens to contain `$`-prompt lines (a nested
//! shell example) stays one code listing. A block that cannot be
//! classified is a [`ParseError`] naming its position; it is never
//! silently dropped, which would break the coverage invariant downstream.

use std::sync::OnceLock;

use regex::Regex;

use crate::core::listing::{Listing, ListingKind, tags};
use crate::error::ParseError;

const FENCE: &str = "----";
const PROMPT: &str = "$ ";

fn role_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\[role="([a-z-]+)"\]$"#).unwrap())
}

fn caption_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\.(\S+)(?:\s+\((\S+)\))?$").unwrap())
}

fn http_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(GET|POST|PUT|PATCH|DELETE|HEAD) \S+$").unwrap())
}

/// Filename caption above a fenced block.
#[derive(Debug, Clone)]
struct Caption {
    path: String,
    git_ref: Option<String>,
}

/// One fenced block plus the attribute/caption lines directly above it.
#[derive(Debug)]
struct RawBlock<'a> {
    /// 1-based line number of the opening fence.
    start_line: usize,
    role: Option<String>,
    caption: Option<Caption>,
    lines: Vec<&'a str>,
}

impl RawBlock<'_> {
    fn snippet(&self) -> String {
        self.lines
            .iter()
            .take(3)
            .copied()
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn error(&self, reason: impl Into<String>) -> ParseError {
        ParseError {
            line: self.start_line,
            reason: reason.into(),
            snippet: self.snippet(),
        }
    }
}

/// Parse a chapter's raw book text into its ordered listing sequence.
///
/// Parsing is deterministic: identical text yields an identical sequence
/// (same count, kinds, positions, contents).
pub fn parse_book_text(text: &str) -> Result<Vec<Listing>, ParseError> {
    let blocks = split_blocks(text)?;
    let mut listings = Vec::new();
    for block in &blocks {
        classify_block(block, &mut listings)?;
    }
    Ok(listings)
}

/// Split the chapter source into fenced blocks, tracking the attribute and
/// caption lines that sit directly above each fence. Any other narrative
/// line resets the pending attribute/caption.
fn split_blocks(text: &str) -> Result<Vec<RawBlock<'_>>, ParseError> {
    let mut blocks = Vec::new();
    let mut pending_role: Option<String> = None;
    let mut pending_caption: Option<Caption> = None;

    let mut lines = text.lines().enumerate();
    while let Some((idx, line)) = lines.next() {
        if line == FENCE {
            let start_line = idx + 1;
            let mut body = Vec::new();
            let mut closed = false;
            for (_, inner) in lines.by_ref() {
                if inner == FENCE {
                    closed = true;
                    break;
                }
                body.push(inner);
            }
            if !closed {
                return Err(ParseError {
                    line: start_line,
                    reason: "unterminated listing block".to_string(),
                    snippet: body.iter().take(3).copied().collect::<Vec<_>>().join("\n"),
                });
            }
            blocks.push(RawBlock {
                start_line,
                role: pending_role.take(),
                caption: pending_caption.take(),
                lines: body,
            });
        } else if let Some(caps) = role_re().captures(line) {
            pending_role = Some(caps[1].to_string());
        } else if let Some(caps) = caption_re().captures(line) {
            pending_caption = Some(Caption {
                path: caps[1].to_string(),
                git_ref: caps.get(2).map(|m| m.as_str().to_string()),
            });
        } else {
            pending_role = None;
            pending_caption = None;
        }
    }
    Ok(blocks)
}

fn classify_block(block: &RawBlock<'_>, listings: &mut Vec<Listing>) -> Result<(), ParseError> {
    match block.role.as_deref() {
        Some("sourcecode") | None if block.caption.is_some() => push_code(block, listings),
        Some("sourcecode") => {
            Err(block.error("sourcecode block without a filename caption"))
        }
        Some("interactive") => push_interactive(block, listings),
        Some("http") => push_http(block, listings),
        None => push_console(block, listings),
        Some(other) => Err(block.error(format!("unknown block role \"{other}\""))),
    }
}

fn push_code(block: &RawBlock<'_>, listings: &mut Vec<Listing>) -> Result<(), ParseError> {
    let caption = block.caption.clone().expect("caption checked by caller");
    let type_tag = if caption.git_ref.is_some() {
        tags::CODE_WITH_GIT_REF
    } else {
        tags::CODE
    };
    listings.push(Listing {
        pos: listings.len(),
        kind: ListingKind::Code {
            path: caption.path,
            git_ref: caption.git_ref,
        },
        type_tag: type_tag.to_string(),
        contents: block.lines.join("\n"),
    });
    Ok(())
}

fn push_interactive(block: &RawBlock<'_>, listings: &mut Vec<Listing>) -> Result<(), ParseError> {
    let Some(first) = block.lines.first() else {
        return Err(block.error("empty interactive block"));
    };
    let Some(cmd) = first.strip_prefix(PROMPT) else {
        return Err(block.error("interactive block must begin with a shell prompt"));
    };
    listings.push(Listing {
        pos: listings.len(),
        kind: ListingKind::Command,
        type_tag: tags::INTERACTIVE.to_string(),
        contents: cmd.to_string(),
    });
    push_output_if_any(&block.lines[1..], listings);
    Ok(())
}

fn push_http(block: &RawBlock<'_>, listings: &mut Vec<Listing>) -> Result<(), ParseError> {
    let Some(first) = block.lines.first() else {
        return Err(block.error("empty http block"));
    };
    if !http_line_re().is_match(first) {
        return Err(block.error("http block must begin with `METHOD /path`"));
    }
    listings.push(Listing {
        pos: listings.len(),
        kind: ListingKind::Command,
        type_tag: tags::HTTP.to_string(),
        contents: (*first).to_string(),
    });
    push_output_if_any(&block.lines[1..], listings);
    Ok(())
}

/// Console block: each `$ `-prefixed line is a command; the run of
/// unprefixed lines after it (up to the next prompt or block end) is that
/// command's expected output. A trailing command with no output still
/// parses; the engine reconciles it against empty expected output.
fn push_console(block: &RawBlock<'_>, listings: &mut Vec<Listing>) -> Result<(), ParseError> {
    if !block.lines.first().is_some_and(|l| l.starts_with(PROMPT)) {
        return Err(block.error("block has no role, filename caption, or shell prompt"));
    }
    let mut i = 0;
    while i < block.lines.len() {
        let line = block.lines[i];
        let cmd = line
            .strip_prefix(PROMPT)
            .expect("console runs start at prompt lines");
        listings.push(Listing {
            pos: listings.len(),
            kind: ListingKind::Command,
            type_tag: tags::COMMAND.to_string(),
            contents: cmd.to_string(),
        });
        i += 1;
        let run_start = i;
        while i < block.lines.len() && !block.lines[i].starts_with(PROMPT) {
            i += 1;
        }
        push_output_if_any(&block.lines[run_start..i], listings);
    }
    Ok(())
}

/// Emit an Output listing for `lines` unless the run is entirely blank.
fn push_output_if_any(lines: &[&str], listings: &mut Vec<Listing>) {
    if lines.iter().all(|l| l.trim().is_empty()) {
        return;
    }
    listings.push(Listing {
        pos: listings.len(),
        kind: ListingKind::Output,
        type_tag: tags::OUTPUT.to_string(),
        contents: lines.join("\n"),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_and_plain_text_parse_as_command_then_output() {
        let text = "----\n$ git status\nnothing to commit\n----\n";
        let listings = parse_book_text(text).expect("parse");
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].kind, ListingKind::Command);
        assert_eq!(listings[0].contents, "git status");
        assert_eq!(listings[0].pos, 0);
        assert_eq!(listings[1].kind, ListingKind::Output);
        assert_eq!(listings[1].contents, "nothing to commit");
        assert_eq!(listings[1].pos, 1);
    }

    #[test]
    fn command_output_pair_gets_adjacent_positions_after_code_listing() {
        let text = concat!(
            ".notes.txt\n",
            "----\n",
            "remember the milk\n",
            "----\n",
            "\n",
            "Some narrative.\n",
            "\n",
            "----\n",
            "$ cat notes.txt\n",
            "remember the milk\n",
            "----\n",
        );
        let listings = parse_book_text(text).expect("parse");
        assert_eq!(listings.len(), 3);
        assert!(matches!(listings[0].kind, ListingKind::Code { .. }));
        assert!(listings[1].is_command());
        assert!(listings[2].is_output());
        assert_eq!(listings[1].pos, 1);
        assert_eq!(listings[2].pos, 2);
    }

    #[test]
    fn sourcecode_block_with_embedded_prompts_is_not_split() {
        let text = concat!(
            "[role=\"sourcecode\"]\n",
            ".deploy/notes.sh\n",
            "----\n",
            "# run these by hand:\n",
            "$ ./manage.py migrate\n",
            "$ ./manage.py collectstatic\n",
            "----\n",
        );
        let listings = parse_book_text(text).expect("parse");
        assert_eq!(listings.len(), 1);
        assert!(matches!(listings[0].kind, ListingKind::Code { .. }));
        assert!(listings[0].contents.contains("$ ./manage.py migrate"));
    }

    #[test]
    fn caption_git_ref_qualifies_the_type_tag() {
        let text = ".lists/views.py (ch07l018)\n----\nfrom django.shortcuts import render\n----\n";
        let listings = parse_book_text(text).expect("parse");
        assert_eq!(listings[0].type_tag, tags::CODE_WITH_GIT_REF);
        assert_eq!(
            listings[0].kind,
            ListingKind::Code {
                path: "lists/views.py".to_string(),
                git_ref: Some("ch07l018".to_string()),
            }
        );
    }

    #[test]
    fn command_with_no_output_still_parses() {
        let text = "----\n$ git add lists/\n----\n";
        let listings = parse_book_text(text).expect("parse");
        assert_eq!(listings.len(), 1);
        assert!(listings[0].is_command());
    }

    #[test]
    fn multiple_commands_in_one_console_block() {
        let text = "----\n$ git add .\n$ git status\nChanges to be committed\n----\n";
        let listings = parse_book_text(text).expect("parse");
        assert_eq!(listings.len(), 3);
        assert!(listings[0].is_command());
        assert!(listings[1].is_command());
        assert!(listings[2].is_output());
    }

    #[test]
    fn interactive_block_tags_the_command() {
        let text = concat!(
            "[role=\"interactive\"]\n",
            "----\n",
            "$ python3 manage.py shell\n",
            "Title: *Buy peacock feathers*\n",
            "1: Buy peacock feathers\n",
            "> \n",
            "----\n",
        );
        let listings = parse_book_text(text).expect("parse");
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].type_tag, tags::INTERACTIVE);
        assert_eq!(listings[0].contents, "python3 manage.py shell");
        assert!(listings[1].is_output());
    }

    #[test]
    fn http_block_tags_the_command() {
        let text = "[role=\"http\"]\n----\nGET /lists/new\n<html>fresh list</html>\n----\n";
        let listings = parse_book_text(text).expect("parse");
        assert_eq!(listings[0].type_tag, tags::HTTP);
        assert_eq!(listings[0].contents, "GET /lists/new");
        assert_eq!(listings[1].contents, "<html>fresh list</html>");
    }

    #[test]
    fn unknown_role_is_a_parse_error_with_position() {
        let text = "narrative\n\n[role=\"screenshot\"]\n----\npixels\n----\n";
        let err = parse_book_text(text).expect_err("must not classify");
        assert_eq!(err.line, 4);
        assert!(err.reason.contains("screenshot"));
    }

    #[test]
    fn console_block_without_prompt_is_a_parse_error() {
        let text = "----\njust some text\n----\n";
        assert!(parse_book_text(text).is_err());
    }

    #[test]
    fn unterminated_block_is_a_parse_error() {
        let text = "----\n$ git status\n";
        assert!(parse_book_text(text).is_err());
    }

    #[test]
    fn parsing_is_deterministic() {
        let text = concat!(
            ".notes.txt\n----\na\n----\n",
            "----\n$ cat notes.txt\na\n----\n",
        );
        let first = parse_book_text(text).expect("parse");
        let second = parse_book_text(text).expect("parse");
        assert_eq!(first, second);
    }

    #[test]
    fn narrative_between_caption_and_fence_resets_the_caption() {
        let text = ".notes.txt\nnot a fence after all\n----\n$ ls\n----\n";
        let listings = parse_book_text(text).expect("parse");
        assert_eq!(listings.len(), 1);
        assert!(listings[0].is_command());
    }
}
