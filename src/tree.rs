//! The per-folder output tree.
//!
//! ```text
//! raw-output/
//!   Journal 1/
//!     french_page_001.txt
//!     english_page_001.txt
//!     french_page_001.tex      (only when markup was produced)
//!     english_page_001.tex
//!     images/page_001.jpg
//! ```
//!
//! The three core files of a page are an independent completion signal: a
//! page whose cache entry is missing but whose three files exist is not
//! recomputed.

use crate::error::DigitiseError;
use crate::page::{PageKey, PageResult};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory holding the processed page images of a folder.
pub const IMAGES_DIR: &str = "images";

/// Zero-padded page number used in file names (width 3, wider when needed).
pub fn page_number(sequence: u32) -> String {
    format!("{:03}", sequence)
}

/// Locations of one page's files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePaths {
    pub french: PathBuf,
    pub english: PathBuf,
    pub image: PathBuf,
    pub french_markup: PathBuf,
    pub english_markup: PathBuf,
}

impl PagePaths {
    fn core(&self) -> [&Path; 3] {
        [&self.french, &self.english, &self.image]
    }
}

/// Handle on an output root.
#[derive(Debug, Clone)]
pub struct OutputTree {
    root: PathBuf,
}

impl OutputTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn folder_dir(&self, folder: &str) -> PathBuf {
        self.root.join(folder)
    }

    pub fn page_paths(&self, key: &PageKey) -> PagePaths {
        let dir = self.folder_dir(&key.folder);
        let n = page_number(key.sequence);
        PagePaths {
            french: dir.join(format!("french_page_{n}.txt")),
            english: dir.join(format!("english_page_{n}.txt")),
            image: dir.join(IMAGES_DIR).join(format!("page_{n}.jpg")),
            french_markup: dir.join(format!("french_page_{n}.tex")),
            english_markup: dir.join(format!("english_page_{n}.tex")),
        }
    }

    /// Whether the page's French, English and image files all exist.
    pub fn is_complete(&self, key: &PageKey) -> bool {
        self.page_paths(key).core().iter().all(|p| p.is_file())
    }

    /// Write every file of `result`, replacing existing ones.
    ///
    /// Markup files left by an earlier run are removed when `result` has no
    /// markup, since assemblers prefer markup over plain text.
    pub async fn write_page(&self, result: &PageResult) -> Result<(), DigitiseError> {
        let paths = self.page_paths(&result.key());
        for (path, bytes) in page_files(&paths, result) {
            write_atomic(&path, bytes).await?;
        }
        if result.french_markup.is_none() {
            remove_stale(&paths.french_markup).await?;
        }
        if result.english_markup.is_none() {
            remove_stale(&paths.english_markup).await?;
        }
        Ok(())
    }

    /// Write only the files of `result` that are missing. Returns how many were written.
    pub async fn restore_missing(&self, result: &PageResult) -> Result<usize, DigitiseError> {
        let mut written = 0;
        for (path, bytes) in page_files(&self.page_paths(&result.key()), result) {
            if !path.exists() {
                write_atomic(&path, bytes).await?;
                written += 1;
            }
        }
        if written > 0 {
            debug!("{}: restored {} file(s) from cache", result.key(), written);
        }
        Ok(written)
    }
}

fn page_files<'a>(paths: &PagePaths, result: &'a PageResult) -> Vec<(PathBuf, &'a [u8])> {
    let mut files = vec![
        (paths.image.clone(), result.source.image()),
        (paths.french.clone(), result.french_text.as_bytes()),
        (paths.english.clone(), result.english_text.as_bytes()),
    ];
    if let Some(ref markup) = result.french_markup {
        files.push((paths.french_markup.clone(), markup.as_bytes()));
    }
    if let Some(ref markup) = result.english_markup {
        files.push((paths.english_markup.clone(), markup.as_bytes()));
    }
    files
}

async fn remove_stale(path: &Path) -> Result<(), DigitiseError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed stale {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(DigitiseError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Write `bytes` to `path` via a sibling temp file and a rename, creating parents.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DigitiseError> {
    let write_err = |source| DigitiseError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}
