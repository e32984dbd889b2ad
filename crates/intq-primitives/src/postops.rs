//! Post-processing pipeline.
//!
//! Converts raw wide-integer accumulation into final destination values.
//! The pipeline is built once at primitive creation — an unrealizable
//! post-op list fails creation, never an execution call — and applies,
//! strictly in order: bias addition in the accumulation domain,
//! requantization by the combined scale, the fused post-op list, and a
//! saturating store into the destination type.
//!
//! Execution partitions rows across worker threads; every partition is
//! exact and non-overlapping, so no synchronization is needed beyond the
//! splits themselves.

use crate::buffers::{BiasView, DstView};
use crate::scales::ScaleView;
use intq_common::{
    BinaryAlg, DataType, EltwiseAlg, IntqError, MemoryDesc, PostOp, PostOps, Result,
};

/// Rows below this bound are processed on the calling thread.
const MIN_ROWS_PER_TASK: usize = 32;

// ── Compiled steps ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Step {
    Eltwise { alg: EltwiseAlg, alpha: f32, beta: f32 },
    Binary { alg: BinaryAlg, per_channel: bool },
    Sum { scale: f32, zero_point: i32 },
}

/// Immutable per-primitive post-processing program.
#[derive(Debug)]
pub struct PostProcessingPipeline {
    steps: Vec<Step>,
    binary_count: usize,
    has_sum: bool,
    bias_dtype: Option<DataType>,
    dst_dtype: DataType,
    oc: usize,
}

// ── Routing ──────────────────────────────────────────────────────────

/// Where the raw accumulation lives relative to the destination.
#[derive(Debug)]
pub enum AccRoute<'a> {
    /// Accumulation in a scratchpad buffer; destination written
    /// separately. The only route on which a sum post-op can appear.
    Separate { acc: &'a [i32], dst: DstView<'a> },
    /// Accumulation produced directly in a 32-bit integer destination.
    InPlaceS32 { dst: &'a mut [i32] },
    /// f32 destination whose storage currently holds raw `i32` bits;
    /// converted in place.
    InPlaceF32 { dst: &'a mut [f32] },
}

impl<'a> AccRoute<'a> {
    fn len(&self) -> usize {
        match self {
            AccRoute::Separate { acc, .. } => acc.len(),
            AccRoute::InPlaceS32 { dst } => dst.len(),
            AccRoute::InPlaceF32 { dst } => dst.len(),
        }
    }

    fn split_at(self, mid: usize) -> (AccRoute<'a>, AccRoute<'a>) {
        match self {
            AccRoute::Separate { acc, dst } => {
                let (acc_lo, acc_hi) = acc.split_at(mid);
                let (dst_lo, dst_hi) = dst.split_at(mid);
                (
                    AccRoute::Separate { acc: acc_lo, dst: dst_lo },
                    AccRoute::Separate { acc: acc_hi, dst: dst_hi },
                )
            }
            AccRoute::InPlaceS32 { dst } => {
                let (lo, hi) = dst.split_at_mut(mid);
                (AccRoute::InPlaceS32 { dst: lo }, AccRoute::InPlaceS32 { dst: hi })
            }
            AccRoute::InPlaceF32 { dst } => {
                let (lo, hi) = dst.split_at_mut(mid);
                (AccRoute::InPlaceF32 { dst: lo }, AccRoute::InPlaceF32 { dst: hi })
            }
        }
    }
}

// ── Build ────────────────────────────────────────────────────────────

/// Check that a post-op list has a realizable pipeline.
///
/// Shared by descriptor validation (which maps a failure to
/// `unimplemented`) and [`PostProcessingPipeline::build`] (which reports
/// it as a creation-time runtime error).
pub fn post_ops_realizable(post_ops: &PostOps, oc: usize) -> Result<()> {
    let mut sum_seen = false;
    for (idx, op) in post_ops.iter().enumerate() {
        match op {
            PostOp::Eltwise { alg, alpha, beta } => {
                if let EltwiseAlg::Clip = alg {
                    if alpha > beta {
                        return Err(IntqError::runtime(format!(
                            "clip post-op bounds are inverted ({alpha} > {beta})"
                        )));
                    }
                }
            }
            PostOp::Binary { operand, .. } => {
                binary_operand_arity(operand, oc).ok_or_else(|| {
                    IntqError::runtime(format!(
                        "binary post-op operand {:?} must be dense f32 with 1 or {oc} elements",
                        operand.dims()
                    ))
                })?;
            }
            PostOp::Sum { .. } => {
                if sum_seen {
                    return Err(IntqError::runtime("more than one sum post-op"));
                }
                if idx != post_ops.len() - 1 {
                    return Err(IntqError::runtime("sum post-op must be the final post-op"));
                }
                sum_seen = true;
            }
        }
    }
    Ok(())
}

/// `Some(per_channel)` when the operand is usable, `None` otherwise.
fn binary_operand_arity(operand: &MemoryDesc, oc: usize) -> Option<bool> {
    if operand.dtype() != DataType::F32 || !operand.is_dense() || operand.has_zero_dim() {
        return None;
    }
    match operand.nelems() {
        1 => Some(false),
        n if n == oc => Some(true),
        _ => None,
    }
}

impl PostProcessingPipeline {
    /// Compile the post-op list for `oc` output channels.
    pub fn build(
        post_ops: &PostOps,
        bias_dtype: Option<DataType>,
        dst_dtype: DataType,
        oc: usize,
    ) -> Result<Self> {
        post_ops_realizable(post_ops, oc)?;

        let mut steps = Vec::with_capacity(post_ops.len());
        let mut binary_count = 0;
        for op in post_ops.iter() {
            match op {
                PostOp::Eltwise { alg, alpha, beta } => {
                    steps.push(Step::Eltwise { alg: *alg, alpha: *alpha, beta: *beta });
                }
                PostOp::Binary { alg, operand } => {
                    // Arity was proven above.
                    let per_channel = binary_operand_arity(operand, oc)
                        .ok_or_else(|| IntqError::runtime("binary operand rejected post-check"))?;
                    steps.push(Step::Binary { alg: *alg, per_channel });
                    binary_count += 1;
                }
                PostOp::Sum { scale, zero_point, .. } => {
                    steps.push(Step::Sum { scale: *scale, zero_point: *zero_point });
                }
            }
        }

        Ok(PostProcessingPipeline {
            has_sum: post_ops.has_sum(),
            steps,
            binary_count,
            bias_dtype,
            dst_dtype,
            oc,
        })
    }

    pub fn output_channels(&self) -> usize {
        self.oc
    }

    /// Number of runtime binary operands the caller must supply.
    pub fn binary_operand_count(&self) -> usize {
        self.binary_count
    }

    // ── Execution ────────────────────────────────────────────────────

    /// Post-process `rows × oc` accumulated values.
    ///
    /// `scales = None` means the accumulation is already correctly
    /// scaled and the requantization step is skipped.
    pub fn run(
        &self,
        route: AccRoute<'_>,
        bias: Option<BiasView<'_>>,
        scales: Option<ScaleView<'_>>,
        binary_operands: &[&[f32]],
    ) -> Result<()> {
        self.check_route(&route)?;
        self.check_bias(bias.as_ref())?;
        self.check_binaries(binary_operands)?;

        let rows = route.len() / self.oc;
        self.run_rows(route, bias, scales, binary_operands, rows);
        Ok(())
    }

    fn check_route(&self, route: &AccRoute<'_>) -> Result<()> {
        if self.oc == 0 || route.len() % self.oc != 0 {
            return Err(IntqError::invalid_args(format!(
                "accumulation length {} is not a whole number of {}-channel rows",
                route.len(),
                self.oc
            )));
        }
        let (route_dtype, in_place) = match route {
            AccRoute::Separate { acc, dst } => {
                if acc.len() != dst.len() {
                    return Err(IntqError::invalid_args(format!(
                        "accumulator length {} does not match destination length {}",
                        acc.len(),
                        dst.len()
                    )));
                }
                (dst.dtype(), false)
            }
            AccRoute::InPlaceS32 { .. } => (DataType::S32, true),
            AccRoute::InPlaceF32 { .. } => (DataType::F32, true),
        };
        if route_dtype != self.dst_dtype {
            return Err(IntqError::invalid_args(format!(
                "destination dtype {route_dtype} does not match configured {}",
                self.dst_dtype
            )));
        }
        if in_place && self.has_sum {
            // Sum must read pre-existing destination contents, which the
            // in-place routes have already overwritten.
            return Err(IntqError::invalid_args(
                "sum post-op cannot run on an in-place accumulation route",
            ));
        }
        Ok(())
    }

    fn check_bias(&self, bias: Option<&BiasView<'_>>) -> Result<()> {
        match (self.bias_dtype, bias) {
            (None, None) => Ok(()),
            (None, Some(_)) => {
                Err(IntqError::invalid_args("bias supplied but the descriptor declares none"))
            }
            (Some(_), None) => {
                Err(IntqError::invalid_args("bias declared at creation but missing from the call"))
            }
            (Some(expected), Some(view)) => {
                if view.dtype() != expected {
                    return Err(IntqError::invalid_args(format!(
                        "bias dtype {} does not match configured {expected}",
                        view.dtype()
                    )));
                }
                if view.len() != self.oc {
                    return Err(IntqError::invalid_args(format!(
                        "bias length {} does not match {} output channels",
                        view.len(),
                        self.oc
                    )));
                }
                Ok(())
            }
        }
    }

    fn check_binaries(&self, operands: &[&[f32]]) -> Result<()> {
        if operands.len() != self.binary_count {
            return Err(IntqError::invalid_args(format!(
                "{} binary operands supplied, pipeline needs {}",
                operands.len(),
                self.binary_count
            )));
        }
        let mut idx = 0;
        for step in &self.steps {
            if let Step::Binary { per_channel, .. } = step {
                let expected = if *per_channel { self.oc } else { 1 };
                if operands[idx].len() != expected {
                    return Err(IntqError::invalid_args(format!(
                        "binary operand {idx} has {} elements, expected {expected}",
                        operands[idx].len()
                    )));
                }
                idx += 1;
            }
        }
        Ok(())
    }

    fn run_rows(
        &self,
        route: AccRoute<'_>,
        bias: Option<BiasView<'_>>,
        scales: Option<ScaleView<'_>>,
        binary_operands: &[&[f32]],
        rows: usize,
    ) {
        if rows > MIN_ROWS_PER_TASK {
            let mid = rows / 2;
            let (lo, hi) = route.split_at(mid * self.oc);
            rayon::join(
                || self.run_rows(lo, bias, scales, binary_operands, mid),
                || self.run_rows(hi, bias, scales, binary_operands, rows - mid),
            );
            return;
        }
        self.run_sequential(route, bias, scales, binary_operands);
    }

    fn run_sequential(
        &self,
        route: AccRoute<'_>,
        bias: Option<BiasView<'_>>,
        scales: Option<ScaleView<'_>>,
        binary_operands: &[&[f32]],
    ) {
        match route {
            AccRoute::Separate { acc, mut dst } => {
                for (idx, &raw) in acc.iter().enumerate() {
                    let c = idx % self.oc;
                    let dst_old =
                        if self.has_sum { Some(dst.load(idx)) } else { None };
                    let v = self.apply(raw as f32, c, dst_old, bias, scales, binary_operands);
                    dst.store(idx, v);
                }
            }
            AccRoute::InPlaceS32 { dst } => {
                for idx in 0..dst.len() {
                    let raw = dst[idx];
                    let v =
                        self.apply(raw as f32, idx % self.oc, None, bias, scales, binary_operands);
                    dst[idx] = intq_common::saturate_s32(v);
                }
            }
            AccRoute::InPlaceF32 { dst } => {
                for idx in 0..dst.len() {
                    let raw = dst[idx].to_bits() as i32;
                    let v =
                        self.apply(raw as f32, idx % self.oc, None, bias, scales, binary_operands);
                    dst[idx] = v;
                }
            }
        }
    }

    /// The full per-element chain short of the final store.
    #[inline]
    fn apply(
        &self,
        raw: f32,
        c: usize,
        dst_old: Option<f32>,
        bias: Option<BiasView<'_>>,
        scales: Option<ScaleView<'_>>,
        binary_operands: &[&[f32]],
    ) -> f32 {
        let mut d = raw;
        if let Some(b) = bias {
            d += b.at(c);
        }
        if let Some(s) = scales {
            d *= s.at(c);
        }
        let mut bin_idx = 0;
        for step in &self.steps {
            match step {
                Step::Eltwise { alg, alpha, beta } => d = eval_eltwise(*alg, d, *alpha, *beta),
                Step::Binary { alg, per_channel } => {
                    let operand = binary_operands[bin_idx];
                    bin_idx += 1;
                    let o = operand[if *per_channel { c } else { 0 }];
                    d = eval_binary(*alg, d, o);
                }
                Step::Sum { scale, zero_point } => {
                    d += scale * (dst_old.unwrap_or_default() - *zero_point as f32);
                }
            }
        }
        d
    }
}

#[inline]
fn eval_eltwise(alg: EltwiseAlg, x: f32, alpha: f32, beta: f32) -> f32 {
    match alg {
        EltwiseAlg::Relu => {
            if x >= 0.0 {
                x
            } else {
                alpha * x
            }
        }
        EltwiseAlg::Linear => alpha * x + beta,
        EltwiseAlg::Clip => x.clamp(alpha, beta),
        EltwiseAlg::Tanh => x.tanh(),
        EltwiseAlg::Logistic => 1.0 / (1.0 + (-x).exp()),
    }
}

#[inline]
fn eval_binary(alg: BinaryAlg, x: f32, o: f32) -> f32 {
    match alg {
        BinaryAlg::Add => x + o,
        BinaryAlg::Mul => x * o,
        BinaryAlg::Min => x.min(o),
        BinaryAlg::Max => x.max(o),
    }
}
