// crates/navslam-core/src/database/depth.rs
// ============================================================================
// Module: Depth Image Preparation
// Description: Load, validate, and nearest-neighbor resample depth frames.
// Purpose: Store raw 16-bit depth at the calibration resolution.
// Dependencies: image
// ============================================================================

//! ## Overview
//! Depth frames are 16-bit single-channel PNGs. A frame with no depth
//! evidence (missing, empty, undecodable or all zero) yields `None` so the
//! builder can skip it. Resampling picks source pixels without blending so
//! raw depth values survive unchanged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Cursor;
use std::path::Path;

use image::DynamicImage;
use image::ImageBuffer;
use image::ImageFormat;
use image::ImageReader;
use image::Luma;

use crate::database::DatabaseError;

/// 16-bit single-channel depth image.
pub type DepthImage = ImageBuffer<Luma<u16>, Vec<u16>>;

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads a depth frame and re-encodes it as a 16-bit PNG at `width`x`height`.
///
/// Returns `Ok(None)` when the file is missing, empty, undecodable or all
/// zero.
///
/// # Errors
///
/// Returns [`DatabaseError::Image`] when re-encoding fails.
pub fn load_depth_png(path: &Path, width: u32, height: u32) -> Result<Option<Vec<u8>>, DatabaseError> {
    let Some(depth) = load_depth(path) else {
        return Ok(None);
    };
    let resized = resize_nearest(&depth, width, height);
    encode_depth_png(&resized).map(Some)
}

/// Decodes a depth image; `None` when it carries no usable depth.
#[must_use]
pub fn load_depth(path: &Path) -> Option<DepthImage> {
    let reader = ImageReader::open(path).ok()?.with_guessed_format().ok()?;
    let depth = match reader.decode().ok()? {
        DynamicImage::ImageLuma16(buf) => buf,
        DynamicImage::ImageLuma8(buf) => {
            let (w, h) = buf.dimensions();
            ImageBuffer::from_fn(w, h, |x, y| Luma([u16::from(buf.get_pixel(x, y)[0])]))
        }
        other => other.into_luma16(),
    };
    let has_depth = depth.width() > 0 && depth.height() > 0 && depth.pixels().any(|p| p[0] != 0);
    has_depth.then_some(depth)
}

/// Nearest-neighbor resample; source index is `floor(dst * src / dst_len)`.
#[must_use]
pub fn resize_nearest(src: &DepthImage, width: u32, height: u32) -> DepthImage {
    if src.dimensions() == (width, height) {
        return src.clone();
    }
    let (src_w, src_h) = src.dimensions();
    let pick = |dst: u32, src_len: u32, dst_len: u32| -> u32 {
        let index = u64::from(dst) * u64::from(src_len) / u64::from(dst_len);
        u32::try_from(index).unwrap_or(src_len - 1).min(src_len - 1)
    };
    ImageBuffer::from_fn(width, height, |x, y| *src.get_pixel(pick(x, src_w, width), pick(y, src_h, height)))
}

/// Encodes a depth image as a 16-bit grayscale PNG.
///
/// # Errors
///
/// Returns [`DatabaseError::Image`] when encoding fails.
pub fn encode_depth_png(depth: &DepthImage) -> Result<Vec<u8>, DatabaseError> {
    let mut out = Cursor::new(Vec::new());
    depth.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}
