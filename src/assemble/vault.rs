//! Markdown vault for note-taking tools (Obsidian and similar).
//!
//! ```text
//! vault/
//!   Journal 1/
//!     Journal 1.md              index linking every page note
//!     Journal 1 page 001.md     image, French, English, navigation
//!     images/page_001.jpg
//! ```
//!
//! Notes are regenerated on every call; the output tree stays the source of truth.

use crate::assemble::clean::clean_text;
use crate::assemble::import::{ImportedFolder, PageTriple};
use crate::error::DigitiseError;
use crate::tree::{write_atomic, IMAGES_DIR};
use std::path::Path;
use tracing::info;

/// What [`write_vault`] produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VaultStats {
    pub folders: usize,
    pub pages: usize,
}

/// Note name of a page, without the `.md` extension.
pub fn page_note_name(folder: &str, number: &str) -> String {
    format!("{folder} page {number}")
}

/// Escape Markdown-significant characters in transcribed text.
///
/// Leading spaces become no-break spaces so indented lines keep their
/// indentation instead of turning into code blocks.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let body = line.trim_start_matches(' ');
        let indent = line.len() - body.len();
        out.extend(std::iter::repeat_n('\u{00A0}', indent));

        for (j, ch) in body.chars().enumerate() {
            match ch {
                '\\' | '`' | '*' | '_' | '[' | ']' | '<' | '>' | '|' | '$' | '=' => {
                    out.push('\\');
                    out.push(ch);
                }
                '#' | '-' | '+' if j == 0 => {
                    out.push('\\');
                    out.push(ch);
                }
                _ => out.push(ch),
            }
        }
    }
    out
}

/// Clean and escape stored page text for a note.
pub fn sanitise(text: &str) -> String {
    escape_markdown(&clean_text(text))
}

async fn read_text(path: &Path) -> Result<String, DigitiseError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DigitiseError::io(path, e))
}

fn page_note(
    folder: &str,
    page: &PageTriple,
    french: &str,
    english: &str,
    prev: Option<&PageTriple>,
    next: Option<&PageTriple>,
) -> String {
    let mut nav = vec![format!("[[{folder}|index]]")];
    if let Some(p) = prev {
        nav.insert(0, format!("[[{}|previous]]", page_note_name(folder, &p.number)));
    }
    if let Some(n) = next {
        nav.push(format!("[[{}|next]]", page_note_name(folder, &n.number)));
    }

    format!(
        "# {title}\n\n![page {number}]({images}/page_{number}.jpg)\n\n## French\n\n{french}\n\n## English\n\n{english}\n\n---\n{nav}\n",
        title = page_note_name(folder, &page.number),
        number = page.number,
        images = IMAGES_DIR,
        french = sanitise(french),
        english = sanitise(english),
        nav = nav.join(" · "),
    )
}

fn index_note(folder: &ImportedFolder) -> String {
    let mut out = format!("# {}\n\n", folder.name);
    for page in &folder.pages {
        out.push_str(&format!("- [[{}]]\n", page_note_name(&folder.name, &page.number)));
    }
    out
}

/// Write the notes and images of one folder under `vault_root`.
pub async fn write_folder(folder: &ImportedFolder, vault_root: &Path) -> Result<usize, DigitiseError> {
    let dir = vault_root.join(&folder.name);

    for (i, page) in folder.pages.iter().enumerate() {
        let french = read_text(&page.french).await?;
        let english = read_text(&page.english).await?;
        let prev = i.checked_sub(1).and_then(|p| folder.pages.get(p));
        let next = folder.pages.get(i + 1);

        let note = page_note(&folder.name, page, &french, &english, prev, next);
        let note_path = dir.join(format!("{}.md", page_note_name(&folder.name, &page.number)));
        write_atomic(&note_path, note.as_bytes()).await?;

        let image = tokio::fs::read(&page.image)
            .await
            .map_err(|e| DigitiseError::io(&page.image, e))?;
        let image_path = dir.join(IMAGES_DIR).join(format!("page_{}.jpg", page.number));
        write_atomic(&image_path, &image).await?;
    }

    let index_path = dir.join(format!("{}.md", folder.name));
    write_atomic(&index_path, index_note(folder).as_bytes()).await?;
    Ok(folder.pages.len())
}

/// Write a vault for every imported folder.
pub async fn write_vault(
    folders: &[ImportedFolder],
    vault_root: &Path,
) -> Result<VaultStats, DigitiseError> {
    let mut stats = VaultStats::default();
    for folder in folders {
        stats.pages += write_folder(folder, vault_root).await?;
        stats.folders += 1;
        info!("Vault: wrote '{}' ({} pages)", folder.name, folder.pages.len());
    }
    Ok(stats)
}
