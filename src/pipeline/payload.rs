//! Payload extraction: pull the answer out of a model completion.
//!
//! The prompts ask models to reason first and then answer inside a delimited
//! payload. Claude-class models answer in `<output>…</output>` tags after a
//! `<thinking>` block; GPT-class models are asked for a `{"output": "…"}`
//! JSON envelope. Models regularly drop a closing tag or wrap JSON in code
//! fences, so extraction distinguishes three outcomes instead of two:
//!
//! | Outcome                 | Meaning                                   |
//! |-------------------------|-------------------------------------------|
//! | [`Payload::Found`]      | a non-empty payload                       |
//! | [`Payload::Empty`]      | the model deliberately returned nothing   |
//! | [`Payload::Unparseable`]| the completion did not follow the format  |

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

const OPEN_TAG: &str = "<output>";
const CLOSE_TAG: &str = "</output>";
const THINKING_CLOSE: &str = "</thinking>";

/// How a backend delimits its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadFormat {
    /// `<output>…</output>` tags.
    Tagged,
    /// A JSON object with a string field `output`.
    Json,
}

/// How forgiving tag extraction is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PayloadStrictness {
    /// A missing opening tag keeps text from the start, a missing closing tag
    /// keeps text to the end.
    #[default]
    Lenient,
    /// Both tags are required.
    Strict,
}

/// Result of [`extract_payload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Found(String),
    Empty,
    Unparseable,
}

impl Payload {
    fn from_trimmed(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            Payload::Empty
        } else {
            Payload::Found(text.to_string())
        }
    }

    /// The payload text, with both non-found outcomes collapsed to `""`.
    pub fn into_text(self) -> String {
        match self {
            Payload::Found(text) => text,
            Payload::Empty | Payload::Unparseable => String::new(),
        }
    }
}

/// Extract the payload from a completion.
pub fn extract_payload(
    completion: &str,
    format: PayloadFormat,
    strictness: PayloadStrictness,
) -> Payload {
    match format {
        PayloadFormat::Tagged => extract_tagged(completion, strictness),
        PayloadFormat::Json => extract_json(completion),
    }
}

fn extract_tagged(completion: &str, strictness: PayloadStrictness) -> Payload {
    let start = completion.find(OPEN_TAG);
    if strictness == PayloadStrictness::Strict && start.is_none() {
        return Payload::Unparseable;
    }

    let body = match start {
        Some(idx) => &completion[idx + OPEN_TAG.len()..],
        None => after_thinking(completion),
    };

    match body.find(CLOSE_TAG) {
        Some(end) => Payload::from_trimmed(&body[..end]),
        None if strictness == PayloadStrictness::Strict => Payload::Unparseable,
        None => Payload::from_trimmed(body),
    }
}

/// Drop a reasoning block that precedes an untagged answer.
///
/// With an assistant prefill of `<thinking>` the completion starts inside the
/// block, so only the closing tag is looked for.
fn after_thinking(completion: &str) -> &str {
    match completion.find(THINKING_CLOSE) {
        Some(idx) => &completion[idx + THINKING_CLOSE.len()..],
        None => completion,
    }
}

static RE_CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n?(.*?)\n?```\s*$").unwrap());

#[derive(Deserialize)]
struct Envelope {
    output: String,
}

fn extract_json(completion: &str) -> Payload {
    let trimmed = completion.trim();
    let body = match RE_CODE_FENCE.captures(trimmed) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => trimmed,
    };
    match serde_json::from_str::<Envelope>(body.trim()) {
        Ok(envelope) => Payload::from_trimmed(&envelope.output),
        Err(_) => Payload::Unparseable,
    }
}
