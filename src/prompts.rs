//! Prompts for transcription, translation, LaTeX formatting and journal analysis.
//!
//! Every prompt lives here so wording can change without touching the retry
//! and fallback logic in [`crate::pipeline::llm`]. The prompts ask the model to
//! reason inside `<thinking>` tags before answering; the answer envelope is
//! appended per backend by [`envelope_instruction`].

use crate::error::Operation;
use crate::pipeline::payload::PayloadFormat;

/// System prompt for page transcription.
pub const TRANSCRIBE_SYSTEM: &str = "You are an advanced AI system specialized in transcribing \
18th-century French handwriting from scanned images.";

/// System prompt for translation and LaTeX formatting.
pub const TRANSLATE_SYSTEM: &str =
    "You are an expert academic translator and historian specializing in 18th Century French.";

/// System prompt for journal analysis.
pub const ANALYSE_SYSTEM: &str =
    "You are an academic historian of 18th-century France writing for expert colleagues.";

/// Instructions sent alongside a page image.
pub const TRANSCRIBE_PROMPT: &str = r#"Your task is to accurately extract French text from this page of an 18th-century French journal.

The image is a greyscale scan of a journal page. It may contain handwritten or printed text, along with pixellated noise.

1. Analyze the image carefully, looking for any visible text.
2. Think through the problem step-by-step, enclosing your thinking in <thinking> </thinking> tags.
3. Always attempt to extract text, even if the image appears noisy. Do not mistake noise for captchas or other challenges.
4. Retain the layout of words on the page, especially whitespace, paragraph breaks, and tables.
5. Transcribe all visible text, including common 18th-century abbreviations and ligatures.
6. Keep the original spelling, even where it differs from modern French orthography.

If no readable text is present, or the image holds only noise or illegible marks, return an empty answer.
Never return errors or exceptions, and never deviate from the answer format."#;

/// Instructions preceding French text to translate.
pub const TRANSLATE_PROMPT: &str = r#"Your task is to translate a sample of 18th Century French text into English as accurately as possible for an academic research effort.

First, think through the problem step-by-step. Enclose your thinking in <thinking> tags.

- Translate the text into English if it is 18th century French. If it is not in French, transcribe it as is.
- For ambiguous or unknown words, keep the original French in square brackets within the English translation.
- Keep the same whitespace, including paragraph breaks and tables.
- Do not add explanations, notes, or comments.

If the input is empty, return an empty answer."#;

/// Instructions preceding plain text to convert into LaTeX markup.
pub const FORMAT_PROMPT: &str = r#"Your task is to convert a plain text extract with meaningful whitespace into a LaTeX-formatted extract. The text may be in French or English and contains meaningful whitespace, tables, and paragraph breaks.

First, think through the problem step-by-step. Enclose your thinking in <thinking> tags.

1. Escape special characters: & % $ # _ { } as \& \% \$ \# \_ \{ \}, ~ as \textasciitilde and ^ as \textasciicircum.
2. Replace single line breaks with \\ and paragraph breaks with \\[0.5em].
3. Preserve leading spaces with \hspace{} (1em is about the width of the letter 'M') and vertical gaps with \vspace{}.
4. Render tables with the tabular environment, keeping column alignment.

Do not include package imports, document tags, or other frontmatter. Do not provide explanations or error messages.
If there is no text to format, return an empty answer."#;

/// Instructions wrapped around a whole journal's English text.
pub const ANALYSE_PROMPT: &str = r#"Create a structured summary of the journal above for an expert academic historian audience. It must contain these sections:

1. Summary: about 500 words covering the main themes, events and topics, the cultural context, and the author's perspective.
2. People: every notable individual, with full name and title where available and a one-sentence description of their role.
3. Places: every significant location, with a one-sentence description of its importance in the journal and in the 18th century.
4. Chronology: the major events in chronological order, with exact or approximate dates and who was involved.

Write the answer as LaTeX markup suitable for inclusion in a larger document. Use \section for headings and the description environment for lists. Do not include document tags, package imports or other frontmatter.
Every statement must be derived from the journal text."#;

const TAGGED_ENVELOPE: &str =
    "After you have finished thinking, provide your final answer in <output> tags, for example:\n<output>your answer</output>\nAn empty answer is <output></output>.";

const JSON_ENVELOPE: &str = "Reply with a single JSON object and nothing else: {\"output\": \"your answer\"}. \
An empty answer is {\"output\": \"\"}. Do not include your reasoning in the JSON.";

/// The answer-format instruction appended to every prompt for `format`.
pub fn envelope_instruction(format: PayloadFormat) -> &'static str {
    match format {
        PayloadFormat::Tagged => TAGGED_ENVELOPE,
        PayloadFormat::Json => JSON_ENVELOPE,
    }
}

/// System prompt for `op`.
pub fn system_prompt(op: Operation) -> &'static str {
    match op {
        Operation::Transcribe => TRANSCRIBE_SYSTEM,
        Operation::Translate | Operation::Format => TRANSLATE_SYSTEM,
        Operation::Analyse => ANALYSE_SYSTEM,
    }
}

/// Build the user turn for `op` applied to `input` (empty for transcription).
pub fn user_prompt(op: Operation, format: PayloadFormat, input: &str) -> String {
    let envelope = envelope_instruction(format);
    match op {
        Operation::Transcribe => format!("{TRANSCRIBE_PROMPT}\n\n{envelope}"),
        Operation::Translate => {
            format!("{TRANSLATE_PROMPT}\n\n{envelope}\n\nHere is the text to translate:\n\n{input}")
        }
        Operation::Format => {
            format!("{FORMAT_PROMPT}\n\n{envelope}\n\nHere is the plain text to convert:\n\n{input}")
        }
        Operation::Analyse => {
            format!("<journal>\n{input}\n</journal>\n\n{ANALYSE_PROMPT}\n\n{envelope}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_follows_instructions() {
        let p = user_prompt(Operation::Translate, PayloadFormat::Tagged, "Monsieur");
        assert!(p.starts_with(TRANSLATE_PROMPT));
        assert!(p.ends_with("Monsieur"));
        assert!(p.contains("<output>"));
    }

    #[test]
    fn json_backends_get_json_envelope() {
        let p = user_prompt(Operation::Transcribe, PayloadFormat::Json, "");
        assert!(p.contains("{\"output\""));
        assert!(!p.contains("<output>your answer"));
    }

    #[test]
    fn journal_is_wrapped_before_instructions() {
        let p = user_prompt(Operation::Analyse, PayloadFormat::Tagged, "Day one.");
        assert!(p.starts_with("<journal>\nDay one.\n</journal>"));
        assert!(p.contains("\\section"));
    }

    #[test]
    fn system_prompts_per_operation() {
        assert_eq!(system_prompt(Operation::Format), TRANSLATE_SYSTEM);
        assert!(system_prompt(Operation::Transcribe).contains("handwriting"));
    }
}
