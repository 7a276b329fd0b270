//! Deterministic cleanup of stored page text before it is assembled.
//!
//! Page files written by older runs (or edited by hand) can still carry model
//! artefacts: code fences around the whole answer, a stray `<output>` tag, an
//! unterminated `<thinking>` block, Windows line endings, zero-width
//! characters. Whitespace inside the text is meaningful (transcriptions keep
//! the page layout), so only trailing whitespace and runs of blank lines are
//! touched.
//!
//! Rules (applied in order):
//! 1. Normalise line endings (CRLF → LF)
//! 2. Strip outer code fences
//! 3. Remove `<thinking>` blocks and leftover `<output>` markers
//! 4. Remove invisible Unicode
//! 5. Trim trailing whitespace per line
//! 6. Collapse 3+ consecutive blank lines down to 2
//! 7. Trim leading and trailing blank lines

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to stored page text.
pub fn clean_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_code_fences(&s);
    let s = strip_markers(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    trim_blank_lines(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\n(.*?)\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 3: Remove reasoning blocks and payload markers ──────────────────────

static RE_THINKING_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<thinking>.*?</thinking>").unwrap());

static RE_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?(?:output|thinking)>").unwrap());

fn strip_markers(input: &str) -> String {
    let s = RE_THINKING_BLOCK.replace_all(input, "");
    RE_MARKERS.replace_all(&s, "").to_string()
}

// ── Rule 4: Remove invisible Unicode characters ──────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 5: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 6: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 7: Trim surrounding blank lines ─────────────────────────────────────

/// Leading spaces on the first text line are layout and are kept.
fn trim_blank_lines(input: &str) -> String {
    input.trim_start_matches('\n').trim_end().to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────
