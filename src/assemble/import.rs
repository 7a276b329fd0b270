//! Discover finished pages in an output tree.
//!
//! Assemblers work from the files on disk, not from the cache, so pages the
//! user corrected by hand are picked up. The English files drive discovery;
//! French, image and markup paths are derived from each English file name.

use crate::error::DigitiseError;
use crate::pipeline::collect::{list_files_natural, list_folders_natural};
use crate::tree::IMAGES_DIR;
use std::path::{Path, PathBuf};
use tracing::debug;

const ENGLISH_PREFIX: &str = "english_page_";
const TEXT_EXT: &str = "txt";

/// One finished page: image plus both texts, with optional markup siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTriple {
    /// Page number as written in the file names (`"007"`).
    pub number: String,
    pub image: PathBuf,
    pub french: PathBuf,
    pub english: PathBuf,
    /// `french_page_NNN.tex`, when present.
    pub french_markup: Option<PathBuf>,
    pub english_markup: Option<PathBuf>,
}

/// The finished pages of one folder, in natural page order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedFolder {
    pub name: String,
    pub path: PathBuf,
    pub pages: Vec<PageTriple>,
}

fn is_english_page(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.starts_with(ENGLISH_PREFIX)
        && path.extension().and_then(|e| e.to_str()) == Some(TEXT_EXT)
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    path.is_file().then_some(path)
}

/// Derive the sibling paths of an `english_page_NNN.txt` file.
fn triple_for(folder: &Path, english: PathBuf) -> Option<PageTriple> {
    let stem = english.file_stem()?.to_str()?;
    let number = stem.strip_prefix(ENGLISH_PREFIX)?.to_string();
    Some(PageTriple {
        image: folder.join(IMAGES_DIR).join(format!("page_{number}.jpg")),
        french: folder.join(format!("french_page_{number}.{TEXT_EXT}")),
        french_markup: existing(folder.join(format!("french_page_{number}.tex"))),
        english_markup: existing(folder.join(format!("english_page_{number}.tex"))),
        english,
        number,
    })
}

/// List every folder under `root` with its finished pages.
///
/// Siblings are derived, not checked: a missing French file or image surfaces
/// as an I/O error in the assembler that reads it.
pub fn import_output_tree(root: &Path) -> Result<Vec<ImportedFolder>, DigitiseError> {
    let mut folders = Vec::new();
    for folder in list_folders_natural(root)? {
        let imported = import_folder(&folder)?;
        debug!("Imported '{}': {} page(s)", imported.name, imported.pages.len());
        folders.push(imported);
    }
    Ok(folders)
}

/// Import a single folder of the output tree.
pub fn import_folder(folder: &Path) -> Result<ImportedFolder, DigitiseError> {
    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let pages = list_files_natural(folder, is_english_page)?
        .into_iter()
        .filter_map(|english| triple_for(folder, english))
        .collect();
    Ok(ImportedFolder {
        name,
        path: folder.to_path_buf(),
        pages,
    })
}
