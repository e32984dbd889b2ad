//! Quantized execution pipeline and resource-planning framework
//!
//! The lifecycle every primitive follows:
//!
//! 1. **Validate** — a descriptor/attribute pair either becomes an
//!    immutable validated configuration or creation fails with
//!    `unimplemented`; nothing partial survives.
//! 2. **Plan** — the configuration deterministically books named
//!    scratchpad buffers, so callers can allocate before the first call.
//! 3. **Build** — the post-processing pipeline (and the gemm strategy)
//!    is constructed once; unsupported post-op combinations fail here,
//!    never at execution time.
//! 4. **Execute** — any number of concurrent calls run against the
//!    immutable primitive, each with its own context and scratchpad.

pub mod buffers;
pub mod inner_product;
pub mod pooling;
pub mod postops;
pub mod primitive;
pub mod scales;
pub mod scratchpad;

pub use buffers::{BiasView, DstView};
pub use inner_product::{
    InnerProductContext, InnerProductDesc, QuantizedInnerProduct, ValidatedConfig,
};
pub use pooling::{
    GlobalPooling, GlobalPoolingDesc, PoolAlg, PoolDstView, PoolSrcView, PoolingConfig,
    PoolingContext,
};
pub use postops::PostProcessingPipeline;
pub use primitive::{ExecutionContext, Primitive, PrimitiveKind};
pub use scales::{precompute_scales, ScaleView, SCALES_SIMD_W};
pub use scratchpad::{BufferKey, BufferRequest, Registrar, Scratchpad, ScratchpadPlan};

// The gemm provider surface is part of this crate's public contract.
pub use intq_gemm::{GemmProvider, SrcView};
