//! Output reconciliation: comparing what the book claims against what
//! actually happened.
//!
//! Normalization policy: trailing whitespace on each line is ignored,
//! trailing blank lines are ignored, and an expected line consisting of
//! the elision marker `[...]` matches any run of actual lines (including
//! none). Everything else must match exactly.

use std::sync::OnceLock;

use regex::Regex;

/// Elision marker: one expected line of `[...]` stands for any run of
/// actual lines.
pub const ELLIPSIS: &str = "[...]";

/// One prompt/response pair of an interactive session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// Text the program is expected to print before reading input.
    pub prompt: String,
    /// Line the user types in response (may be empty: just Enter).
    pub response: String,
}

fn input_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*([^*\n]*)\*").unwrap())
}

/// Does `actual` match the book's `expected` text under the
/// normalization policy?
pub fn outputs_match(expected: &str, actual: &str) -> bool {
    let expected = normalized_lines(expected);
    let actual = normalized_lines(actual);
    match_lines(&expected, &actual)
}

fn normalized_lines(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

fn match_lines(expected: &[&str], actual: &[&str]) -> bool {
    let Some((first, rest)) = expected.split_first() else {
        return actual.is_empty();
    };
    if *first == ELLIPSIS {
        // The marker may swallow any number of actual lines.
        (0..=actual.len()).any(|n| match_lines(rest, &actual[n..]))
    } else {
        actual
            .split_first()
            .is_some_and(|(head, tail)| head == first && match_lines(rest, tail))
    }
}

/// Split an interactive transcript into prompt/response turns.
///
/// User input is marked with asciidoc bold (`*Buy peacock feathers*`);
/// the text between one input and the next is the prompt the program must
/// print before that input. Trailing transcript text after the last input
/// becomes a final turn whose response is empty (the user just presses
/// Enter). The newline that ends an input's echo line belongs to the
/// input, not to the next prompt.
pub fn split_turns(transcript: &str) -> Vec<Turn> {
    let mut turns = Vec::new();
    let mut rest = transcript;
    while let Some(caps) = input_re().captures(rest) {
        let whole = caps.get(0).expect("match");
        turns.push(Turn {
            prompt: rest[..whole.start()].to_string(),
            response: caps[1].to_string(),
        });
        let mut after = whole.end();
        if rest[after..].starts_with('\n') {
            after += 1;
        }
        rest = &rest[after..];
    }
    if !rest.trim().is_empty() {
        turns.push(Turn {
            prompt: rest.to_string(),
            response: String::new(),
        });
    }
    turns
}

/// Does the text a program printed before reading input match a turn's
/// expected prompt? Same normalization as [`outputs_match`].
pub fn turn_matches(turn: &Turn, actual_prompt: &str) -> bool {
    outputs_match(&turn.prompt, actual_prompt)
}
