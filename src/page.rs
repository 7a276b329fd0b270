//! Page value types: what the extractor produces and what the pipeline stores.
//!
//! [`SourcePage`] is immutable once built; [`SourcePage::new`] validates it so
//! a record with a zero sequence number or zero-sized image never reaches the
//! cache. [`PageResult`] pairs a source page with the text derived from it and
//! is the unit persisted under a [`PageKey`].

use crate::error::DigitiseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite identity of a page: `(folder, file name, sequence number)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageKey {
    pub folder: String,
    pub file_name: String,
    pub sequence: u32,
}

impl PageKey {
    pub fn new(folder: impl Into<String>, file_name: impl Into<String>, sequence: u32) -> Self {
        Self {
            folder: folder.into(),
            file_name: file_name.into(),
            sequence,
        }
    }

    /// The string stored in the cache: `"<folder>|<filename>|<page>"`.
    pub fn cache_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.folder, self.file_name, self.sequence)
    }
}

/// One logical page pulled out of a notebook folder.
///
/// `image` holds the processed JPEG (greyscale, capped long side); the
/// original dimensions are kept to document the resize that was applied.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SourcePageRecord")]
pub struct SourcePage {
    sequence: u32,
    file_name: String,
    folder: String,
    #[serde(with = "base64_bytes")]
    image: Vec<u8>,
    width: u32,
    height: u32,
    original_width: u32,
    original_height: u32,
}

/// Dimensions of a page image before and after processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
}

impl SourcePage {
    pub fn new(
        sequence: u32,
        file_name: impl Into<String>,
        folder: impl Into<String>,
        image: Vec<u8>,
        dims: Dimensions,
    ) -> Result<Self, DigitiseError> {
        let file_name = file_name.into();
        let folder = folder.into();

        if sequence == 0 {
            return Err(DigitiseError::InvalidPage(
                "sequence numbers are 1-based".into(),
            ));
        }
        if folder.is_empty() || file_name.is_empty() {
            return Err(DigitiseError::InvalidPage(format!(
                "page {sequence} has an empty folder or file name"
            )));
        }
        if dims.width == 0 || dims.height == 0 || dims.original_width == 0 || dims.original_height == 0
        {
            return Err(DigitiseError::InvalidPage(format!(
                "page {sequence} of '{file_name}' has a zero dimension ({}x{} from {}x{})",
                dims.width, dims.height, dims.original_width, dims.original_height
            )));
        }
        if dims.width > dims.original_width || dims.height > dims.original_height {
            return Err(DigitiseError::InvalidPage(format!(
                "page {sequence} of '{file_name}' was upscaled ({}x{} from {}x{})",
                dims.width, dims.height, dims.original_width, dims.original_height
            )));
        }

        Ok(Self {
            sequence,
            file_name,
            folder,
            image,
            width: dims.width,
            height: dims.height,
            original_width: dims.original_width,
            original_height: dims.original_height,
        })
    }

    pub fn key(&self) -> PageKey {
        PageKey::new(&self.folder, &self.file_name, self.sequence)
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Processed JPEG bytes.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
            original_width: self.original_width,
            original_height: self.original_height,
        }
    }
}

impl fmt::Debug for SourcePage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourcePage")
            .field("sequence", &self.sequence)
            .field("file_name", &self.file_name)
            .field("folder", &self.folder)
            .field("image", &format_args!("<{} bytes>", self.image.len()))
            .field("width", &self.width)
            .field("height", &self.height)
            .field("original_width", &self.original_width)
            .field("original_height", &self.original_height)
            .finish()
    }
}

/// Unvalidated wire form; deserialisation goes through [`SourcePage::new`].
#[derive(Deserialize)]
struct SourcePageRecord {
    sequence: u32,
    file_name: String,
    folder: String,
    #[serde(with = "base64_bytes")]
    image: Vec<u8>,
    width: u32,
    height: u32,
    original_width: u32,
    original_height: u32,
}

impl TryFrom<SourcePageRecord> for SourcePage {
    type Error = DigitiseError;

    fn try_from(r: SourcePageRecord) -> Result<Self, Self::Error> {
        SourcePage::new(
            r.sequence,
            r.file_name,
            r.folder,
            r.image,
            Dimensions {
                width: r.width,
                height: r.height,
                original_width: r.original_width,
                original_height: r.original_height,
            },
        )
    }
}

/// A source page together with everything derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    pub source: SourcePage,
    /// French transcription. Empty means no legible text.
    pub french_text: String,
    /// English translation. Empty when `french_text` is empty.
    pub english_text: String,
    /// LaTeX rendering of `french_text`; `None` when formatting was skipped.
    #[serde(default)]
    pub french_markup: Option<String>,
    #[serde(default)]
    pub english_markup: Option<String>,
}

impl PageResult {
    pub fn key(&self) -> PageKey {
        self.source.key()
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(w: u32, h: u32) -> Dimensions {
        Dimensions {
            width: w,
            height: h,
            original_width: w * 2,
            original_height: h * 2,
        }
    }

    #[test]
    fn cache_key_format() {
        let key = PageKey::new("Journal 2", "part 10.pdf", 42);
        assert_eq!(key.cache_key(), "Journal 2|part 10.pdf|42");
    }

    #[test]
    fn rejects_zero_sequence() {
        let err = SourcePage::new(0, "a.jpg", "J", vec![1], dims(10, 10)).unwrap_err();
        assert!(err.to_string().contains("1-based"));
    }

    #[test]
    fn rejects_zero_dimension() {
        let d = Dimensions {
            width: 0,
            height: 10,
            original_width: 10,
            original_height: 10,
        };
        assert!(SourcePage::new(1, "a.jpg", "J", vec![1], d).is_err());
    }

    #[test]
    fn rejects_upscaled_page() {
        let d = Dimensions {
            width: 20,
            height: 10,
            original_width: 10,
            original_height: 10,
        };
        assert!(SourcePage::new(1, "a.jpg", "J", vec![1], d).is_err());
    }

    #[test]
    fn deserialising_revalidates() {
        let page = SourcePage::new(3, "a.jpg", "J", vec![0xFF, 0xD8], dims(8, 6)).unwrap();
        let json = serde_json::to_string(&page).unwrap();
        let back: SourcePage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, page);

        let tampered = json.replace("\"sequence\":3", "\"sequence\":0");
        assert!(serde_json::from_str::<SourcePage>(&tampered).is_err());
    }

    #[test]
    fn debug_hides_image_bytes() {
        let page = SourcePage::new(1, "a.jpg", "J", vec![0; 4096], dims(8, 6)).unwrap();
        let dbg = format!("{page:?}");
        assert!(dbg.contains("<4096 bytes>"));
    }
}
