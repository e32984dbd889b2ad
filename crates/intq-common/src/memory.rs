//! Memory descriptors.
//!
//! A [`MemoryDesc`] describes a logical tensor: ordered dimension sizes, a
//! layout tag, and an element type. Descriptors are cheap to clone and are
//! never mutated after a primitive has been validated against them.

use crate::types::DataType;
use serde::{Deserialize, Serialize};

/// Physical layout of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatTag {
    /// Dense row-major layout with no padding between elements.
    RowMajor,
    /// Layout left to the implementation. Not executable; descriptors
    /// carrying `Any` must be resolved to a concrete tag before
    /// validation.
    Any,
}

/// Description of one tensor argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryDesc {
    dims: Vec<usize>,
    dtype: DataType,
    format: FormatTag,
}

impl MemoryDesc {
    /// A dense row-major descriptor.
    pub fn new(dims: impl Into<Vec<usize>>, dtype: DataType) -> Self {
        MemoryDesc { dims: dims.into(), dtype, format: FormatTag::RowMajor }
    }

    /// Same dims/dtype with an explicit format tag.
    pub fn with_format(mut self, format: FormatTag) -> Self {
        self.format = format;
        self
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn ndims(&self) -> usize {
        self.dims.len()
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn format(&self) -> FormatTag {
        self.format
    }

    /// Total number of elements.
    pub fn nelems(&self) -> usize {
        self.dims.iter().product()
    }

    /// Total size in bytes assuming a dense layout.
    pub fn size_bytes(&self) -> usize {
        self.nelems() * self.dtype.size_bytes()
    }

    /// True when any dimension is zero.
    pub fn has_zero_dim(&self) -> bool {
        self.dims.iter().any(|&d| d == 0)
    }

    /// True when the layout is concrete and dense.
    pub fn is_dense(&self) -> bool {
        self.format == FormatTag::RowMajor
    }

    /// Collapse to a 2-D view `(dims[0], product of the rest)`.
    ///
    /// Returns `None` for rank < 2; used for the dense matrix-multiply
    /// consistency check, where source and weights must reduce to a 2-D
    /// contraction.
    pub fn flatten_to_2d(&self) -> Option<(usize, usize)> {
        if self.dims.len() < 2 {
            return None;
        }
        Some((self.dims[0], self.dims[1..].iter().product()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nelems_and_bytes() {
        let md = MemoryDesc::new([2, 3, 4], DataType::S8);
        assert_eq!(md.nelems(), 24);
        assert_eq!(md.size_bytes(), 24);
        let md = MemoryDesc::new([2, 3], DataType::F32);
        assert_eq!(md.size_bytes(), 24);
    }

    #[test]
    fn zero_dim_detection() {
        assert!(MemoryDesc::new([2, 0, 4], DataType::S8).has_zero_dim());
        assert!(!MemoryDesc::new([2, 1, 4], DataType::S8).has_zero_dim());
    }

    #[test]
    fn flatten_collapses_trailing_dims() {
        let md = MemoryDesc::new([8, 3, 5, 5], DataType::U8);
        assert_eq!(md.flatten_to_2d(), Some((8, 75)));
        assert_eq!(MemoryDesc::new([8], DataType::U8).flatten_to_2d(), None);
    }

    #[test]
    fn any_format_is_not_dense() {
        let md = MemoryDesc::new([2, 2], DataType::F32).with_format(FormatTag::Any);
        assert!(!md.is_dense());
    }

    #[test]
    fn serde_round_trip() {
        let md = MemoryDesc::new([4, 16], DataType::S32);
        let json = serde_json::to_string(&md).unwrap();
        let back: MemoryDesc = serde_json::from_str(&json).unwrap();
        assert_eq!(md, back);
    }
}
