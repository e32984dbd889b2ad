//! Closed tagged dispatch over primitive kinds.
//!
//! Every primitive variant carries its own validator, planner, and
//! pipeline behind the same surface: construct (validate + plan + build),
//! expose the scratchpad plan, execute against a matching context.
//! Dispatch matches the tag; there is no inheritance and no registry.

use crate::inner_product::{InnerProductContext, InnerProductDesc, QuantizedInnerProduct};
use crate::pooling::{GlobalPooling, GlobalPoolingDesc, PoolingContext};
use crate::scratchpad::ScratchpadPlan;
use intq_common::{Attributes, IntqError, Result};
use std::fmt;

/// Operation kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    InnerProduct,
    GlobalPooling,
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveKind::InnerProduct => write!(f, "inner_product"),
            PrimitiveKind::GlobalPooling => write!(f, "global_pooling"),
        }
    }
}

/// A constructed primitive of any supported kind.
pub enum Primitive {
    InnerProduct(QuantizedInnerProduct),
    GlobalPooling(GlobalPooling),
}

/// Per-call context of any supported kind.
pub enum ExecutionContext<'a> {
    InnerProduct(InnerProductContext<'a>),
    GlobalPooling(PoolingContext<'a>),
}

impl Primitive {
    pub fn quantized_inner_product(desc: &InnerProductDesc, attr: &Attributes) -> Result<Self> {
        Ok(Primitive::InnerProduct(QuantizedInnerProduct::new(desc, attr)?))
    }

    pub fn global_pooling(desc: &GlobalPoolingDesc, attr: &Attributes) -> Result<Self> {
        Ok(Primitive::GlobalPooling(GlobalPooling::new(desc, attr)?))
    }

    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Primitive::InnerProduct(_) => PrimitiveKind::InnerProduct,
            Primitive::GlobalPooling(_) => PrimitiveKind::GlobalPooling,
        }
    }

    /// The plan a call's scratchpad must satisfy.
    pub fn scratchpad_plan(&self) -> &ScratchpadPlan {
        match self {
            Primitive::InnerProduct(p) => p.scratchpad_plan(),
            Primitive::GlobalPooling(p) => p.scratchpad_plan(),
        }
    }

    /// Execute one call. The context variant must match the primitive's
    /// kind.
    pub fn execute(&self, ctx: ExecutionContext<'_>) -> Result<()> {
        match (self, ctx) {
            (Primitive::InnerProduct(p), ExecutionContext::InnerProduct(c)) => p.execute(c),
            (Primitive::GlobalPooling(p), ExecutionContext::GlobalPooling(c)) => p.execute(c),
            (p, _) => Err(IntqError::invalid_args(format!(
                "execution context kind does not match {} primitive",
                p.kind()
            ))),
        }
    }
}
