//! Assemblers: build reading editions from a finished output tree.
//!
//! - [`import`] — discover `(image, French, English)` page triples on disk
//! - [`vault`]  — linked Markdown notes for note-taking tools
//! - [`latex`]  — a three-column print edition compiled with `lualatex`
//! - [`clean`]  — text cleanup shared by both editions

pub mod clean;
pub mod import;
pub mod latex;
pub mod vault;
