//! Collection discovery: list notebook folders and their sources in natural order.
//!
//! Scanned journals arrive as `Journal 2/part 10.pdf` or `IMG_0009.jpg`; a
//! plain lexical sort would put "part 10" before "part 2". Every listing here
//! goes through [`natural_cmp`], which compares embedded digit runs by value.

use crate::error::DigitiseError;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One run of a name: text (compared case-insensitively) or digits.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    Text(String),
    /// Leading zeros stripped; compared by length first, then lexically,
    /// so arbitrarily long digit runs never overflow.
    Number(String),
}

/// Split a name into alternating text/digit runs, always starting with text.
///
/// `"part 10b"` → `[Text("part "), Number("10"), Text("b")]`. A name that
/// starts with a digit gets an empty leading text run so that runs at the same
/// position always have the same kind.
fn natural_key(name: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut digits = String::new();

    for ch in name.chars() {
        if ch.is_ascii_digit() {
            if digits.is_empty() {
                segments.push(Segment::Text(std::mem::take(&mut text).to_lowercase()));
            }
            digits.push(ch);
        } else {
            if !digits.is_empty() {
                segments.push(number(std::mem::take(&mut digits)));
            }
            text.push(ch);
        }
    }
    if !digits.is_empty() {
        segments.push(number(digits));
    } else {
        segments.push(Segment::Text(text.to_lowercase()));
    }
    segments
}

fn number(digits: String) -> Segment {
    let trimmed = digits.trim_start_matches('0');
    Segment::Number(trimmed.to_string())
}

fn cmp_segment(a: &Segment, b: &Segment) -> Ordering {
    match (a, b) {
        (Segment::Number(x), Segment::Number(y)) => x.len().cmp(&y.len()).then_with(|| x.cmp(y)),
        _ => a.cmp(b),
    }
}

/// Compare two names in natural order: `"page 2" < "page 10"`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let ka = natural_key(a);
    let kb = natural_key(b);
    for (x, y) in ka.iter().zip(kb.iter()) {
        let ord = cmp_segment(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ka.len().cmp(&kb.len())
}

/// Stable natural sort by a string key; equal keys keep their input order.
pub fn sort_natural<T>(items: &mut [T], key: impl Fn(&T) -> &str) {
    items.sort_by(|a, b| natural_cmp(key(a), key(b)));
}

/// The sources found in one notebook folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderSources {
    /// Folder name, used as the first component of every page key.
    pub name: String,
    pub path: PathBuf,
    /// PDFs in natural order of their stems.
    pub pdfs: Vec<PathBuf>,
    /// Standalone JPEG scans in natural order of their stems.
    pub images: Vec<PathBuf>,
}

/// Which kind of source a folder holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    Pdf,
    Images,
    Empty,
}

impl FolderSources {
    /// Resolve the folder's source mode, rejecting folders that mix both kinds.
    pub fn mode(&self) -> Result<SourceMode, DigitiseError> {
        match (self.pdfs.is_empty(), self.images.is_empty()) {
            (false, false) => Err(DigitiseError::MixedSources {
                folder: self.name.clone(),
                pdfs: self.pdfs.len(),
                images: self.images.len(),
            }),
            (false, true) => Ok(SourceMode::Pdf),
            (true, false) => Ok(SourceMode::Images),
            (true, true) => Ok(SourceMode::Empty),
        }
    }
}

fn has_extension(path: &Path, wanted: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| wanted.iter().any(|w| e.eq_ignore_ascii_case(w)))
        .unwrap_or(false)
}

pub(crate) fn is_pdf(path: &Path) -> bool {
    has_extension(path, &["pdf"])
}

pub(crate) fn is_jpeg(path: &Path) -> bool {
    has_extension(path, &["jpg", "jpeg"])
}

fn file_stem(path: &Path) -> &str {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("")
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|s| s.to_str()).unwrap_or("")
}

/// List the non-hidden entries of `dir`.
fn read_entries(dir: &Path) -> Result<Vec<PathBuf>, DigitiseError> {
    let entries = std::fs::read_dir(dir).map_err(|e| DigitiseError::io(dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DigitiseError::io(dir, e))?;
        let path = entry.path();
        if file_name(&path).starts_with('.') {
            continue;
        }
        paths.push(path);
    }
    Ok(paths)
}

/// List the naturally sorted files of `dir` that satisfy `keep`, ordered by stem.
pub fn list_files_natural(
    dir: &Path,
    keep: impl Fn(&Path) -> bool,
) -> Result<Vec<PathBuf>, DigitiseError> {
    let mut files: Vec<PathBuf> = read_entries(dir)?
        .into_iter()
        .filter(|p| p.is_file() && keep(p))
        .collect();
    // Sort by name first so stems that tie ("a.jpg" / "a.JPG") land deterministically.
    files.sort();
    sort_natural(&mut files, |p| file_stem(p));
    Ok(files)
}

/// List the notebook folders under `root` in natural order.
pub fn list_folders_natural(root: &Path) -> Result<Vec<PathBuf>, DigitiseError> {
    if !root.is_dir() {
        return Err(DigitiseError::RootNotFound {
            path: root.to_path_buf(),
        });
    }
    let mut folders: Vec<PathBuf> = read_entries(root)?
        .into_iter()
        .filter(|p| p.is_dir())
        .collect();
    folders.sort();
    sort_natural(&mut folders, |p| file_name(p));
    Ok(folders)
}

/// Walk `root` and list every notebook folder with its PDF and image sources.
///
/// Only directory listings are performed; file contents are not read.
pub fn collect_sources(root: &Path) -> Result<Vec<FolderSources>, DigitiseError> {
    let mut out = Vec::new();
    for folder in list_folders_natural(root)? {
        let pdfs = list_files_natural(&folder, is_pdf)?;
        let images = list_files_natural(&folder, is_jpeg)?;
        let name = file_name(&folder).to_string();
        debug!(
            "Folder '{}': {} PDF(s), {} image(s)",
            name,
            pdfs.len(),
            images.len()
        );
        out.push(FolderSources {
            name,
            path: folder,
            pdfs,
            images,
        });
    }
    Ok(out)
}
