//! Primitive attributes: post-ops and quantization scale specs.
//!
//! Attributes travel with an operation descriptor and are validated as a
//! unit. The wire model is an ordered list of typed post-op records plus a
//! per-argument scale spec for source, weights, and destination.

use crate::memory::MemoryDesc;
use crate::types::DataType;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Quantization scales
// ---------------------------------------------------------------------------

/// Granularity of a quantization scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScaleMask {
    /// One scalar for the whole tensor.
    Common,
    /// One value per output channel. Permitted for weights only.
    PerOutputChannel,
}

/// Scale spec for one argument.
///
/// `runtime = true` means the values are supplied with each execution
/// call; scales are never baked into the primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScaleSpec {
    pub mask: ScaleMask,
    pub runtime: bool,
}

impl Default for ScaleSpec {
    fn default() -> Self {
        ScaleSpec { mask: ScaleMask::Common, runtime: false }
    }
}

impl ScaleSpec {
    /// Runtime-supplied whole-tensor scalar scale.
    pub fn runtime_common() -> Self {
        ScaleSpec { mask: ScaleMask::Common, runtime: true }
    }

    /// Runtime-supplied per-output-channel scales.
    pub fn runtime_per_oc() -> Self {
        ScaleSpec { mask: ScaleMask::PerOutputChannel, runtime: true }
    }

    /// True when no scale is attached to this argument.
    pub fn is_default(&self) -> bool {
        !self.runtime
    }

    /// Number of scale values expected at execution time for `oc`
    /// output channels.
    pub fn count(&self, oc: usize) -> usize {
        match self.mask {
            ScaleMask::Common => 1,
            ScaleMask::PerOutputChannel => oc,
        }
    }
}

/// Scale specs for the three quantizable arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArgScales {
    pub src: ScaleSpec,
    pub weights: ScaleSpec,
    pub dst: ScaleSpec,
}

// ---------------------------------------------------------------------------
// Post-ops
// ---------------------------------------------------------------------------

/// Elementwise transform applied after accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EltwiseAlg {
    /// `max(x, 0)`, with `alpha` as the negative-side slope.
    Relu,
    /// `alpha * x + beta`.
    Linear,
    /// `clamp(x, alpha, beta)`.
    Clip,
    Tanh,
    /// Sigmoid `1 / (1 + e^-x)`.
    Logistic,
}

/// Binary transform against a second operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryAlg {
    Add,
    Mul,
    Min,
    Max,
}

/// One fused post-operation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PostOp {
    /// Fused add of the pre-existing destination contents:
    /// `x + scale * (dst_old - zero_point)`.
    Sum { scale: f32, zero_point: i32, dtype: Option<DataType> },
    /// Elementwise transform.
    Eltwise { alg: EltwiseAlg, alpha: f32, beta: f32 },
    /// Binary op against a runtime-supplied operand tensor.
    Binary { alg: BinaryAlg, operand: MemoryDesc },
}

/// Ordered post-op list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PostOps {
    ops: Vec<PostOp>,
}

impl PostOps {
    pub fn new() -> Self {
        PostOps::default()
    }

    pub fn append_sum(&mut self, scale: f32, zero_point: i32, dtype: Option<DataType>) {
        self.ops.push(PostOp::Sum { scale, zero_point, dtype });
    }

    pub fn append_eltwise(&mut self, alg: EltwiseAlg, alpha: f32, beta: f32) {
        self.ops.push(PostOp::Eltwise { alg, alpha, beta });
    }

    pub fn append_binary(&mut self, alg: BinaryAlg, operand: MemoryDesc) {
        self.ops.push(PostOp::Binary { alg, operand });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PostOp> {
        self.ops.iter()
    }

    pub fn as_slice(&self) -> &[PostOp] {
        &self.ops
    }

    /// Index of the sum post-op, if present.
    pub fn sum_index(&self) -> Option<usize> {
        self.ops.iter().position(|op| matches!(op, PostOp::Sum { .. }))
    }

    pub fn has_sum(&self) -> bool {
        self.sum_index().is_some()
    }

    /// A sum post-op with an explicit dtype must agree in width with the
    /// destination; an unspecified dtype inherits the destination's.
    pub fn sum_dtype_consistent(&self, dst: DataType) -> bool {
        for op in &self.ops {
            if let PostOp::Sum { dtype: Some(dt), .. } = op {
                if dt.size_bytes() != dst.size_bytes() {
                    return false;
                }
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// The full attribute set of an operation descriptor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Attributes {
    pub scales: ArgScales,
    pub post_ops: PostOps,
}

impl Attributes {
    pub fn new() -> Self {
        Attributes::default()
    }

    /// True when no scales and no post-ops are attached.
    pub fn has_default_values(&self) -> bool {
        self.scales.src.is_default()
            && self.scales.weights.is_default()
            && self.scales.dst.is_default()
            && self.post_ops.is_empty()
    }
}
