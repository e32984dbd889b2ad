//! Execution orchestration for the quantized inner product.
//!
//! A [`QuantizedInnerProduct`] is created once — validation, scratchpad
//! planning, pipeline build, and gemm-provider selection all happen here
//! — and then executed any number of times concurrently. The only
//! instance state is immutable; every mutable buffer arrives fresh with
//! each call's [`InnerProductContext`].

use super::{InnerProductDesc, ValidatedConfig};
use crate::buffers::{BiasView, DstView};
use crate::postops::{AccRoute, PostProcessingPipeline};
use crate::scales::precompute_scales;
use crate::scratchpad::{Scratchpad, ScratchpadPlan};
use intq_common::{Attributes, DataType, IntqError, Result};
use intq_gemm::{GemmProvider, SrcView};
use std::sync::Arc;

/// Per-call execution arguments.
///
/// Owns nothing: all buffers are caller-owned borrows that end with the
/// call. The scratchpad must have been allocated from this primitive's
/// plan and must not be shared with a concurrent call.
pub struct InnerProductContext<'a> {
    pub src: SrcView<'a>,
    pub weights: &'a [i8],
    pub bias: Option<BiasView<'a>>,
    pub dst: DstView<'a>,
    pub src_scales: Option<&'a [f32]>,
    pub weight_scales: Option<&'a [f32]>,
    /// One slice per binary post-op, in post-op order.
    pub binary_operands: Vec<&'a [f32]>,
    pub scratchpad: &'a mut Scratchpad,
}

/// Quantized inner-product primitive.
pub struct QuantizedInnerProduct {
    config: ValidatedConfig,
    plan: ScratchpadPlan,
    pipeline: PostProcessingPipeline,
    gemm: Arc<dyn GemmProvider>,
}

impl QuantizedInnerProduct {
    /// Validate, plan, and build. Fails with `unimplemented` when the
    /// descriptor is outside the supported envelope and `runtime_error`
    /// when the pipeline cannot be built.
    pub fn new(desc: &InnerProductDesc, attr: &Attributes) -> Result<Self> {
        let config = ValidatedConfig::new(desc, attr)?;
        let plan = config.plan_scratchpad();
        let pipeline = PostProcessingPipeline::build(
            &config.attr().post_ops,
            config.bias_dtype(),
            config.dst_dtype(),
            config.oc(),
        )?;
        let gemm = intq_gemm::select_provider();
        log::debug!(
            "quantized inner product created: mb={} oc={} ic={} dst={} dst_is_accumulator={} gemm={}",
            config.mb(),
            config.oc(),
            config.ic(),
            config.dst_dtype(),
            config.dst_is_accumulator(),
            gemm.name(),
        );
        Ok(QuantizedInnerProduct { config, plan, pipeline, gemm })
    }

    pub fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    /// The plan a call's scratchpad must satisfy.
    pub fn scratchpad_plan(&self) -> &ScratchpadPlan {
        &self.plan
    }

    /// Run one inner-product call.
    ///
    /// Sequencing: resolve scales against the call scratchpad, produce
    /// the raw accumulation through the gemm provider (directly into the
    /// destination when it is the accumulator), then post-process.
    /// Provider failures propagate unchanged.
    pub fn execute(&self, ctx: InnerProductContext<'_>) -> Result<()> {
        let (mb, oc, ic) = (self.config.mb(), self.config.oc(), self.config.ic());
        self.check_operands(&ctx)?;

        let InnerProductContext {
            src,
            weights,
            bias,
            dst,
            src_scales,
            weight_scales,
            binary_operands,
            scratchpad,
        } = ctx;

        let mut grantor = scratchpad.grantor();
        let scales_buf = grantor.take_precomputed_scales();
        let acc_buf = grantor.take_int_accumulator();

        let scales = precompute_scales(
            scales_buf,
            src_scales,
            weight_scales,
            oc,
            &self.config.attr().scales,
        )?;

        if self.config.dst_is_accumulator() {
            match dst {
                DstView::S32(dst) => {
                    self.gemm.gemm_x8s8s32(src, weights, dst, mb, oc, ic)?;
                    self.pipeline.run(
                        AccRoute::InPlaceS32 { dst },
                        bias,
                        scales,
                        &binary_operands,
                    )
                }
                DstView::F32(dst) => {
                    {
                        let acc_bits: &mut [i32] = bytemuck::cast_slice_mut(&mut *dst);
                        self.gemm.gemm_x8s8s32(src, weights, acc_bits, mb, oc, ic)?;
                    }
                    self.pipeline.run(
                        AccRoute::InPlaceF32 { dst },
                        bias,
                        scales,
                        &binary_operands,
                    )
                }
                other => Err(IntqError::invalid_args(format!(
                    "destination dtype {} cannot hold the raw accumulation",
                    other.dtype()
                ))),
            }
        } else {
            let acc = acc_buf.ok_or_else(|| {
                IntqError::invalid_args("scratchpad does not provide the int_accumulator buffer")
            })?;
            if acc.len() != mb * oc {
                return Err(IntqError::invalid_args(format!(
                    "int_accumulator holds {} elements, plan requires {}",
                    acc.len(),
                    mb * oc
                )));
            }
            self.gemm.gemm_x8s8s32(src, weights, acc, mb, oc, ic)?;
            self.pipeline.run(AccRoute::Separate { acc, dst }, bias, scales, &binary_operands)
        }
    }

    fn check_operands(&self, ctx: &InnerProductContext<'_>) -> Result<()> {
        let (mb, oc, ic) = (self.config.mb(), self.config.oc(), self.config.ic());

        let src_dtype = match ctx.src {
            SrcView::S8(_) => DataType::S8,
            SrcView::U8(_) => DataType::U8,
        };
        if src_dtype != self.config.src_dtype() {
            return Err(IntqError::invalid_args(format!(
                "source dtype {src_dtype} does not match configured {}",
                self.config.src_dtype()
            )));
        }
        if ctx.src.len() != mb * ic {
            return Err(IntqError::invalid_args(format!(
                "source holds {} elements, descriptor requires {}",
                ctx.src.len(),
                mb * ic
            )));
        }
        if ctx.weights.len() != oc * ic {
            return Err(IntqError::invalid_args(format!(
                "weights hold {} elements, descriptor requires {}",
                ctx.weights.len(),
                oc * ic
            )));
        }
        if ctx.dst.dtype() != self.config.dst_dtype() {
            return Err(IntqError::invalid_args(format!(
                "destination dtype {} does not match configured {}",
                ctx.dst.dtype(),
                self.config.dst_dtype()
            )));
        }
        if ctx.dst.len() != mb * oc {
            return Err(IntqError::invalid_args(format!(
                "destination holds {} elements, descriptor requires {}",
                ctx.dst.len(),
                mb * oc
            )));
        }
        Ok(())
    }
}
