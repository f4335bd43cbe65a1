// crates/navslam-core/src/core/calibration.rs
// ============================================================================
// Module: Calibration Record Codec
// Description: Pinhole intrinsics and the 164-byte camera-model record.
// Purpose: Produce and validate calibration blobs for the map database.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The calibration record layout is `<3i i 2i 4i i 9d 12f>`: a version triple,
//! a model type, the image size, four matrix sizes, the local-transform size,
//! the row-major intrinsic matrix `K` and a fixed optical-frame transform.
//!
//! Security posture: calibration blobs are read from database files produced
//! by an external engine; every decoded value is validated before use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::errors::CodecError;
use crate::core::errors::RecordKind;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Encoded calibration record length in bytes.
pub const CALIBRATION_RECORD_LEN: usize = 164;
/// Schema version written into new records.
pub const CALIBRATION_VERSION: [i32; 3] = [0, 22, 0];
/// Matrix sizes `(K, D, R, P)` for a distortion-free pinhole model.
const MATRIX_SIZES: [i32; 4] = [9, 0, 0, 0];
/// Number of floats in the local transform.
const LOCAL_TRANSFORM_SIZE: i32 = 12;
/// Optical-frame transform: X to Z, Y to -X, Z to -Y.
pub const OPTICAL_LOCAL_TRANSFORM: [f32; 12] = [
    0.0, 0.0, 1.0, 0.0, //
    -1.0, 0.0, 0.0, 0.0, //
    0.0, -1.0, 0.0, 0.0,
];
/// Upper bound accepted by [`scale_intrinsics`].
const MAX_SCALE: f64 = 5.0;
/// Lower bound accepted by [`scale_intrinsics`].
const MIN_SCALE: f64 = 0.2;
/// Width assumed when intrinsics metadata omits it.
const DEFAULT_WIDTH: u32 = 1920;
/// Height assumed when intrinsics metadata omits it.
const DEFAULT_HEIGHT: u32 = 1080;

// ============================================================================
// SECTION: Intrinsics
// ============================================================================

/// Pinhole camera intrinsics.
///
/// # Invariants
/// - A valid value has strictly positive `fx`, `fy`, `cx`, `cy`, `width` and
///   `height`; see [`Intrinsics::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    /// Horizontal focal length in pixels.
    pub fx: f64,
    /// Vertical focal length in pixels.
    pub fy: f64,
    /// Principal point x.
    pub cx: f64,
    /// Principal point y.
    pub cy: f64,
    /// Image width in pixels.
    #[serde(default = "default_width")]
    pub width: u32,
    /// Image height in pixels.
    #[serde(default = "default_height")]
    pub height: u32,
}

/// Serde default for [`Intrinsics::width`].
const fn default_width() -> u32 {
    DEFAULT_WIDTH
}

/// Serde default for [`Intrinsics::height`].
const fn default_height() -> u32 {
    DEFAULT_HEIGHT
}

impl Intrinsics {
    /// Checks that every component is strictly positive.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidIntrinsics`] naming the offending values.
    pub fn validate(&self) -> Result<(), CodecError> {
        let focal_ok = [self.fx, self.fy, self.cx, self.cy].iter().all(|v| *v > 0.0);
        if focal_ok && self.width > 0 && self.height > 0 {
            return Ok(());
        }
        Err(CodecError::InvalidIntrinsics(format!(
            "fx={}, fy={}, cx={}, cy={}, width={}, height={}",
            self.fx, self.fy, self.cx, self.cy, self.width, self.height
        )))
    }
}

// ============================================================================
// SECTION: Calibration Record
// ============================================================================

/// Fully decoded calibration record.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationRecord {
    /// Version triple (`major, minor, patch`).
    pub version: [i32; 3],
    /// Camera model type tag.
    pub model_type: i32,
    /// Image width as stored.
    pub width: i32,
    /// Image height as stored.
    pub height: i32,
    /// Sizes of the K, D, R and P matrices.
    pub matrix_sizes: [i32; 4],
    /// Number of local-transform floats.
    pub local_transform_size: i32,
    /// Row-major intrinsic matrix.
    pub k: [f64; 9],
    /// Row-major 3x4 local transform.
    pub local_transform: [f32; 12],
}

impl CalibrationRecord {
    /// Builds the record written for `intrinsics`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidIntrinsics`] when the intrinsics are
    /// non-positive or the image size exceeds `i32::MAX`.
    pub fn from_intrinsics(intrinsics: &Intrinsics) -> Result<Self, CodecError> {
        intrinsics.validate()?;
        let width = i32::try_from(intrinsics.width)
            .map_err(|_| CodecError::InvalidIntrinsics(format!("width {} out of range", intrinsics.width)))?;
        let height = i32::try_from(intrinsics.height).map_err(|_| {
            CodecError::InvalidIntrinsics(format!("height {} out of range", intrinsics.height))
        })?;
        let Intrinsics {
            fx,
            fy,
            cx,
            cy,
            ..
        } = *intrinsics;
        Ok(Self {
            version: CALIBRATION_VERSION,
            model_type: 0,
            width,
            height,
            matrix_sizes: MATRIX_SIZES,
            local_transform_size: LOCAL_TRANSFORM_SIZE,
            k: [fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0],
            local_transform: OPTICAL_LOCAL_TRANSFORM,
        })
    }

    /// Extracts validated intrinsics from the record.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidIntrinsics`] when any component is
    /// non-positive.
    pub fn intrinsics(&self) -> Result<Intrinsics, CodecError> {
        let invalid = || {
            CodecError::InvalidIntrinsics(format!(
                "image size {}x{} is not positive",
                self.width, self.height
            ))
        };
        let width = u32::try_from(self.width).map_err(|_| invalid())?;
        let height = u32::try_from(self.height).map_err(|_| invalid())?;
        let intrinsics = Intrinsics {
            fx: self.k[0],
            fy: self.k[4],
            cx: self.k[2],
            cy: self.k[5],
            width,
            height,
        };
        intrinsics.validate()?;
        Ok(intrinsics)
    }

    /// Serializes the record to its little-endian layout.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; CALIBRATION_RECORD_LEN] {
        let mut writer = RecordWriter::default();
        for value in self.version {
            writer.put(&value.to_le_bytes());
        }
        writer.put(&self.model_type.to_le_bytes());
        writer.put(&self.width.to_le_bytes());
        writer.put(&self.height.to_le_bytes());
        for value in self.matrix_sizes {
            writer.put(&value.to_le_bytes());
        }
        writer.put(&self.local_transform_size.to_le_bytes());
        for value in self.k {
            writer.put(&value.to_le_bytes());
        }
        for value in self.local_transform {
            writer.put(&value.to_le_bytes());
        }
        writer.buf
    }

    /// Parses a record without validating the intrinsics.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MalformedRecord`] when `bytes` is not exactly
    /// [`CALIBRATION_RECORD_LEN`] bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != CALIBRATION_RECORD_LEN {
            return Err(CodecError::MalformedRecord {
                record: RecordKind::Calibration,
                expected: CALIBRATION_RECORD_LEN,
                actual: bytes.len(),
            });
        }
        let mut reader = RecordReader {
            bytes,
            offset: 0,
        };
        let version = [reader.i32(), reader.i32(), reader.i32()];
        let model_type = reader.i32();
        let width = reader.i32();
        let height = reader.i32();
        let matrix_sizes = [reader.i32(), reader.i32(), reader.i32(), reader.i32()];
        let local_transform_size = reader.i32();
        let mut k = [0.0_f64; 9];
        for value in &mut k {
            *value = reader.f64();
        }
        let mut local_transform = [0.0_f32; 12];
        for value in &mut local_transform {
            *value = reader.f32();
        }
        Ok(Self {
            version,
            model_type,
            width,
            height,
            matrix_sizes,
            local_transform_size,
            k,
            local_transform,
        })
    }
}

/// Fixed-size little-endian writer for the calibration layout.
#[derive(Debug)]
struct RecordWriter {
    /// Output buffer.
    buf: [u8; CALIBRATION_RECORD_LEN],
    /// Next write offset.
    offset: usize,
}

impl Default for RecordWriter {
    fn default() -> Self {
        Self {
            buf: [0; CALIBRATION_RECORD_LEN],
            offset: 0,
        }
    }
}

impl RecordWriter {
    /// Appends raw bytes.
    fn put(&mut self, bytes: &[u8]) {
        let end = self.offset + bytes.len();
        self.buf[self.offset..end].copy_from_slice(bytes);
        self.offset = end;
    }
}

/// Cursor over a length-checked calibration record.
#[derive(Debug)]
struct RecordReader<'a> {
    /// Record bytes; length already verified.
    bytes: &'a [u8],
    /// Next read offset.
    offset: usize,
}

impl RecordReader<'_> {
    /// Reads the next `N` bytes.
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut raw = [0_u8; N];
        raw.copy_from_slice(&self.bytes[self.offset..self.offset + N]);
        self.offset += N;
        raw
    }

    /// Reads a little-endian `i32`.
    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    /// Reads a little-endian `f64`.
    fn f64(&mut self) -> f64 {
        f64::from_le_bytes(self.take())
    }

    /// Reads a little-endian `f32`.
    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }
}

// ============================================================================
// SECTION: Codec Functions
// ============================================================================

/// Encodes intrinsics into a 164-byte calibration record.
///
/// # Errors
///
/// Returns [`CodecError::InvalidIntrinsics`] when any component is
/// non-positive.
pub fn encode_calibration(intrinsics: &Intrinsics) -> Result<[u8; CALIBRATION_RECORD_LEN], CodecError> {
    Ok(CalibrationRecord::from_intrinsics(intrinsics)?.to_bytes())
}

/// Decodes and validates a calibration record.
///
/// # Errors
///
/// Returns [`CodecError::MalformedRecord`] on a length mismatch and
/// [`CodecError::InvalidIntrinsics`] when any component is non-positive.
pub fn decode_calibration(bytes: &[u8]) -> Result<Intrinsics, CodecError> {
    CalibrationRecord::from_bytes(bytes)?.intrinsics()
}

/// Rescales intrinsics to a new image resolution.
///
/// Returns `original` unchanged when the resolution already matches.
///
/// # Errors
///
/// Returns [`CodecError::InvalidIntrinsics`] when either resolution is zero and
/// [`CodecError::ExtremeScaling`] when a scale factor falls outside
/// `[0.2, 5.0]`.
pub fn scale_intrinsics(original: &Intrinsics, width: u32, height: u32) -> Result<Intrinsics, CodecError> {
    if original.width == width && original.height == height {
        return Ok(*original);
    }
    if original.width == 0 || original.height == 0 || width == 0 || height == 0 {
        return Err(CodecError::InvalidIntrinsics(format!(
            "cannot scale {}x{} to {width}x{height}",
            original.width, original.height
        )));
    }
    let scale_x = f64::from(width) / f64::from(original.width);
    let scale_y = f64::from(height) / f64::from(original.height);
    let in_range = |s: f64| (MIN_SCALE..=MAX_SCALE).contains(&s);
    if !in_range(scale_x) || !in_range(scale_y) {
        return Err(CodecError::ExtremeScaling {
            scale_x,
            scale_y,
        });
    }
    Ok(Intrinsics {
        fx: original.fx * scale_x,
        fy: original.fy * scale_y,
        cx: original.cx * scale_x,
        cy: original.cy * scale_y,
        width,
        height,
    })
}
