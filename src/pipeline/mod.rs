//! Pipeline stages for turning scanned journals into bilingual page text.
//!
//! Each submodule implements one step, so each can be tested on its own and
//! swapped (a different PDF library, a different model provider) without
//! touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! collect ──▶ extract ──▶ encode ──▶ llm ──▶ payload
//! (folders)   (pages)     (JPEG)     (VLM)   (answer)
//! ```
//!
//! 1. [`collect`] — list notebook folders and their PDFs or scans in natural order
//! 2. [`extract`] — pull page images out of PDFs (pdfium) or read loose JPEGs
//! 3. [`encode`]  — resize, greyscale and JPEG-encode each page; base64-wrap
//!    it for the multimodal request body
//! 4. [`llm`]     — the retrying text service; the only stage with network I/O
//! 5. [`payload`] — find the answer inside the model's completion
//!
//! The orchestration that ties these to the cache and the output tree lives
//! in [`crate::run`].

pub mod collect;
pub mod encode;
pub mod extract;
pub mod llm;
pub mod payload;
