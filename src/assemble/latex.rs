//! Print edition: one LaTeX document per folder, compiled with `lualatex`.
//!
//! Each page of the document is a landscape A4 sheet in three columns: the
//! scan, the French transcription, the English translation. Text comes from
//! the `.tex` markup sibling when the format step produced one, otherwise from
//! the plain text file, escaped. A `summary.tex` in the folder is placed
//! before the pages.
//!
//! Compilation is best effort: the `.tex` file is always left on disk and a
//! failing compiler is only logged.

use crate::assemble::clean::clean_text;
use crate::assemble::import::{ImportedFolder, PageTriple};
use crate::error::DigitiseError;
use crate::tree::write_atomic;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// File name of a folder's journal summary.
pub const SUMMARY_FILE: &str = "summary.tex";

const PREAMBLE: &str = r"\documentclass{article}
\usepackage{fontspec}
\usepackage{graphicx}
\usepackage{multicol}
\usepackage{geometry}
\usepackage[french,english]{babel}
\usepackage{microtype}
\usepackage{xcolor}
\usepackage{hyperref}
\usepackage{adjustbox}
\usepackage{parskip}

\geometry{a4paper, landscape, margin=1cm}
\setmainfont{Baskervald ADF Std}

\setlength{\columnseprule}{0.4pt}
\setlength{\columnsep}{2em}
\setlength{\parskip}{0.8em}
\setlength{\parindent}{0pt}

\begin{document}
";

const POSTAMBLE: &str = "\\end{document}\n";

/// Something that turns a `.tex` file into a PDF.
#[async_trait]
pub trait DocumentCompiler: Send + Sync {
    async fn compile(&self, tex: &Path) -> Result<(), String>;
}

/// Runs `lualatex -interaction=nonstopmode` twice in the document's directory
/// so cross-references settle.
#[derive(Debug, Clone)]
pub struct LuaLatex {
    program: String,
}

impl Default for LuaLatex {
    fn default() -> Self {
        Self {
            program: "lualatex".to_string(),
        }
    }
}

impl LuaLatex {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl DocumentCompiler for LuaLatex {
    async fn compile(&self, tex: &Path) -> Result<(), String> {
        let dir = tex
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file = tex
            .file_name()
            .ok_or_else(|| format!("not a file: {}", tex.display()))?;

        for pass in 1..=2 {
            debug!("{} pass {} on {}", self.program, pass, tex.display());
            let status = Command::new(&self.program)
                .arg("-interaction=nonstopmode")
                .arg(file)
                .current_dir(dir)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map_err(|e| format!("could not start {}: {e}", self.program))?;
            if !status.success() {
                return Err(format!("{} pass {} exited with {}", self.program, pass, status));
            }
        }
        Ok(())
    }
}

/// Escape plain text for LaTeX, keeping line breaks and leading indentation.
pub fn escape_latex(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut out = String::with_capacity(text.len() + text.len() / 4);

    for (i, line) in lines.iter().enumerate() {
        let body = line.trim_start_matches(' ');
        let indent = line.len() - body.len();
        if indent > 0 && !body.is_empty() {
            out.push_str(&format!("\\hspace*{{{}em}}", indent as f32 * 0.5));
        }
        for ch in body.chars() {
            match ch {
                '\\' => out.push_str("\\textbackslash{}"),
                '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                    out.push('\\');
                    out.push(ch);
                }
                '~' => out.push_str("\\textasciitilde{}"),
                '^' => out.push_str("\\textasciicircum{}"),
                _ => out.push(ch),
            }
        }
        let next_has_text = lines.get(i + 1).is_some_and(|n| !n.trim().is_empty());
        if !body.is_empty() && next_has_text {
            out.push_str("\\\\");
        }
        if i + 1 < lines.len() {
            out.push('\n');
        }
    }
    out
}

async fn column_text(plain: &Path, markup: Option<&PathBuf>) -> Result<String, DigitiseError> {
    let path = markup.map(PathBuf::as_path).unwrap_or(plain);
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DigitiseError::io(path, e))?;
    Ok(match markup {
        Some(_) => clean_text(&raw),
        None => escape_latex(&clean_text(&raw)),
    })
}

fn relative_to(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn page_block(image: &str, french: &str, english: &str) -> String {
    format!(
        r"
\begin{{multicols}}{{3}}
\begin{{adjustbox}}{{max width=\columnwidth, max height=\textheight, keepaspectratio, center}}
\includegraphics{{{image}}}
\end{{adjustbox}}

\columnbreak

\selectlanguage{{french}}
\raggedright
\small
{french}

\columnbreak

\selectlanguage{{english}}
\raggedright
\small
{english}
\end{{multicols}}
\newpage
"
    )
}

async fn page_tex(page: &PageTriple, tex_dir: &Path) -> Result<String, DigitiseError> {
    let french = column_text(&page.french, page.french_markup.as_ref()).await?;
    let english = column_text(&page.english, page.english_markup.as_ref()).await?;
    Ok(page_block(&relative_to(&page.image, tex_dir), &french, &english))
}

/// Build the complete document for `folder`, with image paths relative to `tex_dir`.
pub async fn build_document(folder: &ImportedFolder, tex_dir: &Path) -> Result<String, DigitiseError> {
    let mut doc = String::from(PREAMBLE);

    let summary = folder.path.join(SUMMARY_FILE);
    if summary.is_file() {
        let text = tokio::fs::read_to_string(&summary)
            .await
            .map_err(|e| DigitiseError::io(&summary, e))?;
        doc.push_str("\\selectlanguage{english}\n");
        doc.push_str(&clean_text(&text));
        doc.push_str("\n\\newpage\n");
    }

    for page in &folder.pages {
        doc.push_str(&page_tex(page, tex_dir).await?);
    }
    doc.push_str(POSTAMBLE);
    Ok(doc)
}

/// Write `<folder>/<folder name>.tex` and compile it. Returns the `.tex` path.
///
/// Compiler failures are logged and swallowed; only reading pages or writing
/// the `.tex` file can fail.
pub async fn write_and_compile(
    folder: &ImportedFolder,
    compiler: &dyn DocumentCompiler,
) -> Result<PathBuf, DigitiseError> {
    let tex_path = folder.path.join(format!("{}.tex", folder.name));
    let doc = build_document(folder, &folder.path).await?;
    write_atomic(&tex_path, doc.as_bytes()).await?;
    info!(
        "Print: wrote {} ({} pages)",
        tex_path.display(),
        folder.pages.len()
    );

    if let Err(e) = compiler.compile(&tex_path).await {
        warn!("Compiling {} failed: {}", tex_path.display(), e);
    }
    Ok(tex_path)
}
