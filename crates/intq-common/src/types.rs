//! Data types and propagation kinds.
//!
//! The saturating conversions here are the single source of truth for the
//! clamp behavior of every store into a narrow destination: values beyond
//! the representable range clamp to the boundary, never wrap.

use half::bf16;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element data type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Signed 8-bit integer.
    S8,
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 32-bit integer.
    S32,
    /// IEEE single precision.
    F32,
    /// Brain float 16.
    Bf16,
}

impl DataType {
    /// Element size in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            DataType::S8 | DataType::U8 => 1,
            DataType::Bf16 => 2,
            DataType::S32 | DataType::F32 => 4,
        }
    }

    /// Integer types (quantized or accumulator).
    pub fn is_int(self) -> bool {
        matches!(self, DataType::S8 | DataType::U8 | DataType::S32)
    }

    /// 32-bit-wide types that can hold a raw accumulation in place.
    pub fn is_wide(self) -> bool {
        matches!(self, DataType::S32 | DataType::F32)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::S8 => write!(f, "s8"),
            DataType::U8 => write!(f, "u8"),
            DataType::S32 => write!(f, "s32"),
            DataType::F32 => write!(f, "f32"),
            DataType::Bf16 => write!(f, "bf16"),
        }
    }
}

// ---------------------------------------------------------------------------
// Saturating conversions
// ---------------------------------------------------------------------------

/// Round to nearest and clamp into `i8` range.
#[inline]
pub fn saturate_s8(v: f32) -> i8 {
    // `as` on float-to-int is a saturating cast; rounding first matches
    // the round-to-nearest store semantics of the reference kernels.
    v.round() as i8
}

/// Round to nearest and clamp into `u8` range.
#[inline]
pub fn saturate_u8(v: f32) -> u8 {
    v.round() as u8
}

/// Round to nearest and clamp into `i32` range.
#[inline]
pub fn saturate_s32(v: f32) -> i32 {
    v.round() as i32
}

/// Convert to `bf16` (round-to-nearest-even, as implemented by `half`).
#[inline]
pub fn to_bf16(v: f32) -> bf16 {
    bf16::from_f32(v)
}

// ---------------------------------------------------------------------------
// Propagation kind
// ---------------------------------------------------------------------------

/// Propagation direction of an operation.
///
/// Only forward inference is executable by this pipeline; the backward
/// kinds exist so descriptors for them can be rejected explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropKind {
    Forward,
    BackwardData,
    BackwardWeights,
}

impl PropKind {
    pub fn is_forward(self) -> bool {
        matches!(self, PropKind::Forward)
    }
}
