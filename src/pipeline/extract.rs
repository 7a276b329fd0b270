//! Page extraction: turn a notebook folder into a lazy sequence of [`SourcePage`]s.
//!
//! A folder is either a set of PDFs (each page carrying one or more embedded
//! scans) or a flat set of JPEG scans. In PDF mode the sequence number runs
//! across every PDF of the folder, so `part 2.pdf` continues where
//! `part 1.pdf` stopped; that number is part of the page key, so it must be
//! stable across runs.
//!
//! The iterator reads one PDF (or one image) at a time and encodes each
//! embedded image as soon as pdfium hands it over, so only JPEG bytes are
//! queued. Re-running it re-reads from disk; nothing is written.

use crate::error::{DigitiseError, PageError};
use crate::page::{PageKey, SourcePage};
use crate::pipeline::collect::{FolderSources, SourceMode};
use crate::pipeline::encode::prepare_page;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One decoded embedded image; the error affects only that image, which
/// keeps its slot in the sequence.
pub type EmbeddedImage = Result<DynamicImage, String>;

/// Access to the images embedded in a PDF.
pub trait PdfImages: Send + Sync {
    /// Hand each embedded image to `visit`, in page order then drawing order.
    ///
    /// Images are passed one at a time and not retained. An `Err` means the
    /// PDF could not be opened at all.
    fn for_each_image(
        &self,
        pdf: &Path,
        visit: &mut dyn FnMut(EmbeddedImage),
    ) -> Result<(), DigitiseError>;
}

/// A node of a page's object tree: an image, a container, or neither.
pub trait EmbeddedObject {
    fn decode_image(&self) -> Option<EmbeddedImage>;
    fn for_each_child(&self, f: &mut dyn FnMut(&dyn EmbeddedObject));
}

/// Depth-first walk emitting every image, including those nested in forms.
pub fn walk_images(object: &dyn EmbeddedObject, visit: &mut dyn FnMut(EmbeddedImage)) {
    if let Some(image) = object.decode_image() {
        visit(image);
    }
    object.for_each_child(&mut |child| walk_images(child, visit));
}

impl EmbeddedObject for PdfPageObject<'_> {
    fn decode_image(&self) -> Option<EmbeddedImage> {
        self.as_image_object()
            .map(|image| image.get_raw_image().map_err(|e| format!("{:?}", e)))
    }

    fn for_each_child(&self, f: &mut dyn FnMut(&dyn EmbeddedObject)) {
        if let Some(form) = self.as_x_object_form_object() {
            for child in form.iter() {
                f(&child);
            }
        }
    }
}

/// [`PdfImages`] backed by pdfium.
///
/// The library is bound per document from `PDFIUM_LIB_PATH` when set,
/// otherwise from the system library search path.
#[derive(Debug, Clone, Default)]
pub struct PdfiumImages {
    library_path: Option<PathBuf>,
}

impl PdfiumImages {
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    /// Read the library location from `PDFIUM_LIB_PATH`.
    pub fn from_env() -> Self {
        Self::new(std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from))
    }

    fn bind(&self) -> Result<Pdfium, DigitiseError> {
        let bindings = match &self.library_path {
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| DigitiseError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PdfImages for PdfiumImages {
    fn for_each_image(
        &self,
        pdf: &Path,
        visit: &mut dyn FnMut(EmbeddedImage),
    ) -> Result<(), DigitiseError> {
        let pdfium = self.bind()?;
        let document =
            pdfium
                .load_pdf_from_file(pdf, None)
                .map_err(|e| DigitiseError::CorruptPdf {
                    path: pdf.to_path_buf(),
                    detail: format!("{:?}", e),
                })?;

        let mut count = 0usize;
        for (page_index, page) in document.pages().iter().enumerate() {
            let mut on_image = |image: EmbeddedImage| {
                count += 1;
                visit(image.map_err(|e| {
                    format!("page {} embedded image: {}", page_index + 1, e)
                }));
            };
            for object in page.objects().iter() {
                walk_images(&object, &mut on_image);
            }
        }
        debug!("{}: {} embedded image(s)", pdf.display(), count);
        Ok(())
    }
}

/// One item from [`FolderPages`].
#[derive(Debug)]
pub enum Extracted {
    Page(SourcePage),
    /// This slot's image could not be decoded; later pages keep their numbers.
    Failed { key: PageKey, error: PageError },
}

/// Builds [`FolderPages`] iterators for notebook folders.
pub struct PageExtractor {
    max_long_side: u32,
    pdf_images: Box<dyn PdfImages>,
}

impl PageExtractor {
    pub fn new(max_long_side: u32, pdf_images: Box<dyn PdfImages>) -> Self {
        Self {
            max_long_side,
            pdf_images,
        }
    }

    /// Extractor using pdfium located via `PDFIUM_LIB_PATH`.
    pub fn with_pdfium(max_long_side: u32) -> Self {
        Self::new(max_long_side, Box::new(PdfiumImages::from_env()))
    }

    /// Start extracting `sources`.
    ///
    /// # Errors
    /// [`DigitiseError::MixedSources`] when the folder holds both PDFs and
    /// images; no page is produced in that case.
    pub fn pages<'a>(&'a self, sources: &FolderSources) -> Result<FolderPages<'a>, DigitiseError> {
        let mode = sources.mode()?;
        let pending: VecDeque<PathBuf> = match mode {
            SourceMode::Pdf => sources.pdfs.iter().cloned().collect(),
            SourceMode::Images => sources.images.iter().cloned().collect(),
            SourceMode::Empty => VecDeque::new(),
        };
        info!(
            "Extracting '{}' ({:?} mode, {} source file(s))",
            sources.name,
            mode,
            pending.len()
        );
        Ok(FolderPages {
            extractor: self,
            folder: sources.name.clone(),
            mode,
            pending,
            buffered: VecDeque::new(),
            next_sequence: 1,
            done: false,
        })
    }
}

/// Lazy, finite sequence of pages for one folder.
///
/// Yields `Err` only for errors that make the rest of the folder's numbering
/// unreliable (an unreadable PDF); iteration stops after such an error.
/// Pages of the PDF being read are held as encoded JPEGs, never as decoded
/// images.
pub struct FolderPages<'a> {
    extractor: &'a PageExtractor,
    folder: String,
    mode: SourceMode,
    pending: VecDeque<PathBuf>,
    buffered: VecDeque<Extracted>,
    next_sequence: u32,
    done: bool,
}

impl FolderPages<'_> {
    fn take_sequence(&mut self) -> u32 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    fn build(&mut self, file_name: String, decoded: Result<DynamicImage, String>) -> Extracted {
        let sequence = self.take_sequence();
        let key = PageKey::new(&self.folder, &file_name, sequence);

        let raw = match decoded {
            Ok(raw) => raw,
            Err(detail) => {
                warn!("{}: could not decode image: {}", key, detail);
                return Extracted::Failed {
                    key,
                    error: PageError::ImageFailed { detail },
                };
            }
        };

        let page = prepare_page(&raw, self.extractor.max_long_side)
            .map_err(|e| e.to_string())
            .and_then(|(bytes, dims)| {
                SourcePage::new(sequence, &file_name, &self.folder, bytes, dims)
                    .map_err(|e| e.to_string())
            });

        match page {
            Ok(page) => Extracted::Page(page),
            Err(detail) => Extracted::Failed {
                key,
                error: PageError::ImageFailed { detail },
            },
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl Iterator for FolderPages<'_> {
    type Item = Result<Extracted, DigitiseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if let Some(page) = self.buffered.pop_front() {
                return Some(Ok(page));
            }

            let Some(path) = self.pending.pop_front() else {
                self.done = true;
                return None;
            };
            let file = display_name(&path);

            match self.mode {
                SourceMode::Pdf => {
                    let extractor = self.extractor;
                    let mut queued = VecDeque::new();
                    let read = extractor.pdf_images.for_each_image(&path, &mut |decoded| {
                        queued.push_back(self.build(file.clone(), decoded));
                    });
                    match read {
                        Ok(()) => {
                            debug!("{}: queued {} page(s)", file, queued.len());
                            self.buffered = queued;
                        }
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    }
                }
                SourceMode::Images => {
                    let decoded = image::open(&path).map_err(|e| e.to_string());
                    return Some(Ok(self.build(file, decoded)));
                }
                SourceMode::Empty => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Serves canned images per PDF file name.
    struct FakePdfs(HashMap<String, Vec<(u32, u32)>>);

    impl PdfImages for FakePdfs {
        fn for_each_image(
            &self,
            pdf: &Path,
            visit: &mut dyn FnMut(EmbeddedImage),
        ) -> Result<(), DigitiseError> {
            let name = display_name(pdf);
            let sizes = self.0.get(&name).ok_or_else(|| DigitiseError::CorruptPdf {
                path: pdf.to_path_buf(),
                detail: "unknown".into(),
            })?;
            for &(w, h) in sizes {
                if w == 0 {
                    visit(Err("broken stream".to_string()));
                } else {
                    visit(Ok(DynamicImage::ImageRgb8(RgbImage::new(w, h))));
                }
            }
            Ok(())
        }
    }

    /// Object tree node: an optional image of the given width plus children.
    struct Node(Option<u32>, Vec<Node>);

    impl EmbeddedObject for Node {
        fn decode_image(&self) -> Option<EmbeddedImage> {
            self.0.map(|w| Ok(DynamicImage::ImageRgb8(RgbImage::new(w, 1))))
        }

        fn for_each_child(&self, f: &mut dyn FnMut(&dyn EmbeddedObject)) {
            for child in &self.1 {
                f(child);
            }
        }
    }

    fn pdf_folder(files: &[&str]) -> FolderSources {
        FolderSources {
            name: "Journal 1".into(),
            path: PathBuf::from("Journal 1"),
            pdfs: files.iter().map(|f| PathBuf::from("Journal 1").join(f)).collect(),
            images: vec![],
        }
    }

    fn pages_of(it: FolderPages<'_>) -> Vec<Extracted> {
        it.map(|r| r.expect("no fatal error")).collect()
    }

    #[test]
    fn pdf_sequence_runs_across_files() {
        let fake = FakePdfs(HashMap::from([
            ("part 1.pdf".to_string(), vec![(100, 200), (100, 200)]),
            ("part 2.pdf".to_string(), vec![(1600, 800)]),
        ]));
        let extractor = PageExtractor::new(800, Box::new(fake));
        let pages = pages_of(extractor.pages(&pdf_folder(&["part 1.pdf", "part 2.pdf"])).unwrap());

        let keys: Vec<String> = pages
            .iter()
            .map(|p| match p {
                Extracted::Page(p) => p.key().cache_key(),
                Extracted::Failed { key, .. } => key.cache_key(),
            })
            .collect();
        assert_eq!(
            keys,
            [
                "Journal 1|part 1.pdf|1",
                "Journal 1|part 1.pdf|2",
                "Journal 1|part 2.pdf|3"
            ]
        );

        let Extracted::Page(last) = &pages[2] else {
            panic!("expected a page");
        };
        let dims = last.dimensions();
        assert_eq!((dims.width, dims.height), (800, 400));
        assert_eq!((dims.original_width, dims.original_height), (1600, 800));
    }

    #[test]
    fn broken_embedded_image_keeps_numbering() {
        let fake = FakePdfs(HashMap::from([(
            "a.pdf".to_string(),
            vec![(10, 10), (0, 0), (10, 10)],
        )]));
        let extractor = PageExtractor::new(800, Box::new(fake));
        let pages = pages_of(extractor.pages(&pdf_folder(&["a.pdf"])).unwrap());
        assert!(matches!(&pages[1], Extracted::Failed { key, .. } if key.sequence == 2));
        assert!(matches!(&pages[2], Extracted::Page(p) if p.sequence() == 3));
    }

    #[test]
    fn unreadable_pdf_stops_the_folder() {
        let fake = FakePdfs(HashMap::from([("a.pdf".to_string(), vec![(10, 10)])]));
        let extractor = PageExtractor::new(800, Box::new(fake));
        let mut it = extractor.pages(&pdf_folder(&["a.pdf", "missing.pdf", "a.pdf"])).unwrap();
        assert!(matches!(it.next(), Some(Ok(Extracted::Page(_)))));
        assert!(matches!(it.next(), Some(Err(DigitiseError::CorruptPdf { .. }))));
        assert!(it.next().is_none());
    }

    #[test]
    fn image_mode_numbers_by_position() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        let names = ["IMG_2.jpg", "IMG_10.jpg"];
        for (i, name) in names.iter().enumerate() {
            let img = RgbImage::from_pixel(40 + i as u32, 30, Rgb([i as u8 * 100, 0, 0]));
            img.save(dir.join(name)).unwrap();
        }
        std::fs::write(dir.join("IMG_5.jpg"), b"not a jpeg").unwrap();

        let sources = FolderSources {
            name: "Loose".into(),
            path: dir.to_path_buf(),
            images: ["IMG_2.jpg", "IMG_5.jpg", "IMG_10.jpg"]
                .iter()
                .map(|n| dir.join(n))
                .collect(),
            pdfs: vec![],
        };
        let extractor = PageExtractor::new(800, Box::new(PdfiumImages::default()));
        let pages = pages_of(extractor.pages(&sources).unwrap());

        assert_eq!(pages.len(), 3);
        assert!(matches!(&pages[0], Extracted::Page(p) if p.sequence() == 1 && p.file_name() == "IMG_2.jpg"));
        assert!(matches!(&pages[1], Extracted::Failed { key, .. } if key.sequence == 2));
        let Extracted::Page(third) = &pages[2] else {
            panic!("expected a page");
        };
        assert_eq!(third.sequence(), 3);
        assert_eq!(third.folder(), "Loose");
        assert_eq!(third.dimensions().width, 41);
    }

    #[test]
    fn mixed_folder_fails_before_any_page() {
        let sources = FolderSources {
            name: "Mixed".into(),
            path: PathBuf::from("Mixed"),
            pdfs: vec![PathBuf::from("Mixed/a.pdf")],
            images: vec![PathBuf::from("Mixed/b.jpg")],
        };
        let extractor = PageExtractor::new(800, Box::new(PdfiumImages::default()));
        assert!(matches!(
            extractor.pages(&sources),
            Err(DigitiseError::MixedSources { .. })
        ));
    }

    #[test]
    fn reextracting_yields_same_pages() {
        let fake = FakePdfs(HashMap::from([("a.pdf".to_string(), vec![(900, 300)])]));
        let extractor = PageExtractor::new(800, Box::new(fake));
        let folder = pdf_folder(&["a.pdf"]);
        let first = pages_of(extractor.pages(&folder).unwrap());
        let second = pages_of(extractor.pages(&folder).unwrap());
        match (&first[0], &second[0]) {
            (Extracted::Page(a), Extracted::Page(b)) => assert_eq!(a, b),
            _ => panic!("expected pages"),
        }
    }

    #[test]
    fn images_inside_forms_are_found_in_drawing_order() {
        let page = Node(
            None,
            vec![
                Node(Some(1), vec![]),
                Node(
                    None,
                    vec![Node(Some(2), vec![]), Node(None, vec![Node(Some(3), vec![])])],
                ),
                Node(Some(4), vec![]),
            ],
        );
        let mut widths = Vec::new();
        walk_images(&page, &mut |image| widths.push(image.unwrap().width()));
        assert_eq!(widths, [1, 2, 3, 4]);
    }

    #[test]
    fn queued_pages_are_already_encoded() {
        let fake = FakePdfs(HashMap::from([(
            "a.pdf".to_string(),
            vec![(1600, 1200), (0, 0), (400, 300)],
        )]));
        let extractor = PageExtractor::new(800, Box::new(fake));
        let mut it = extractor.pages(&pdf_folder(&["a.pdf"])).unwrap();

        assert!(matches!(it.next(), Some(Ok(Extracted::Page(p))) if p.sequence() == 1));
        assert_eq!(it.buffered.len(), 2);
        assert!(matches!(&it.buffered[0], Extracted::Failed { key, .. } if key.sequence == 2));
        let Extracted::Page(queued) = &it.buffered[1] else {
            panic!("expected an encoded page");
        };
        assert_eq!(&queued.image()[..2], &[0xFF, 0xD8]);
        assert_eq!(queued.dimensions().width, 400);
    }
}
