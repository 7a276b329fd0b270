//! Image processing: normalise a decoded page and wrap it for the VLM API.
//!
//! Every page, whatever its source, goes through the same steps: cap the long
//! side at the configured resolution (never upscaling), convert to 8-bit
//! greyscale, and store as a quality-95 JPEG. The stored JPEG is the exact
//! byte stream sent to the model and written to `images/page_NNN.jpg`.

use crate::page::Dimensions;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

/// JPEG quality used for stored and transmitted pages.
pub const JPEG_QUALITY: u8 = 95;

/// Smallest edge a resize may produce; below this the resize is skipped.
const MIN_SCALED_EDGE: u32 = 2;

/// Scale `img` so its long side is at most `max_long_side`, then convert to greyscale.
///
/// Images already within the bound are only converted. A resize that would
/// collapse either edge below 2 px is skipped (extreme aspect ratios).
pub fn process_image(img: &DynamicImage, max_long_side: u32) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    let long_side = w.max(h);
    let scale = if long_side == 0 {
        1.0
    } else {
        max_long_side as f64 / long_side as f64
    };

    let scaled = if scale < 1.0 {
        let target_w = (w as f64 * scale).round() as u32;
        let target_h = (h as f64 * scale).round() as u32;
        if target_w < MIN_SCALED_EDGE || target_h < MIN_SCALED_EDGE {
            debug!(
                "Skipping resize of {}x{}: target {}x{} too small",
                w, h, target_w, target_h
            );
            None
        } else {
            Some(img.resize_exact(target_w, target_h, FilterType::Lanczos3))
        }
    } else {
        None
    };

    let source = scaled.as_ref().unwrap_or(img);
    DynamicImage::ImageLuma8(source.to_luma8())
}

/// Encode a processed page as JPEG at [`JPEG_QUALITY`].
pub fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    img.write_with_encoder(encoder)?;
    debug!(
        "Encoded {}x{} page → {} bytes JPEG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Process and encode `raw`, returning the JPEG bytes and the size change applied.
pub fn prepare_page(
    raw: &DynamicImage,
    max_long_side: u32,
) -> Result<(Vec<u8>, Dimensions), image::ImageError> {
    let processed = process_image(raw, max_long_side);
    let bytes = encode_jpeg(&processed)?;
    Ok((
        bytes,
        Dimensions {
            width: processed.width(),
            height: processed.height(),
            original_width: raw.width(),
            original_height: raw.height(),
        },
    ))
}

/// Wrap stored JPEG bytes as a base64 attachment for a vision request.
///
/// `detail: "high"` keeps GPT-class models from downsampling to a single
/// 512 px tile, which loses faded handwriting.
pub fn image_attachment(jpeg: &[u8]) -> ImageData {
    ImageData::new(STANDARD.encode(jpeg), "image/jpeg").with_detail("high")
}
