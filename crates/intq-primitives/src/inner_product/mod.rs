//! Integer-quantized inner product (fully-connected transform).
//!
//! The operation computes `dst[mb, oc] = src[mb, ic...] · weights[oc, ic...]`
//! over 8-bit operands with 32-bit accumulation, then requantizes through
//! the post-processing pipeline.

mod config;
mod primitive;

pub use config::ValidatedConfig;
pub use primitive::{InnerProductContext, QuantizedInnerProduct};

use intq_common::{MemoryDesc, PropKind};

/// Immutable description of a requested inner-product operation.
///
/// Created once at primitive-creation time; validation consumes it by
/// reference and never mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct InnerProductDesc {
    prop_kind: PropKind,
    src: MemoryDesc,
    weights: MemoryDesc,
    bias: Option<MemoryDesc>,
    dst: MemoryDesc,
}

impl InnerProductDesc {
    pub fn new(prop_kind: PropKind, src: MemoryDesc, weights: MemoryDesc, dst: MemoryDesc) -> Self {
        InnerProductDesc { prop_kind, src, weights, bias: None, dst }
    }

    /// Attach a bias vector descriptor.
    pub fn with_bias(mut self, bias: MemoryDesc) -> Self {
        self.bias = Some(bias);
        self
    }

    pub fn prop_kind(&self) -> PropKind {
        self.prop_kind
    }

    pub fn src(&self) -> &MemoryDesc {
        &self.src
    }

    pub fn weights(&self) -> &MemoryDesc {
        &self.weights
    }

    pub fn bias(&self) -> Option<&MemoryDesc> {
        self.bias.as_ref()
    }

    pub fn dst(&self) -> &MemoryDesc {
        &self.dst
    }
}
