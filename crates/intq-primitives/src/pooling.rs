//! Global pooling primitive.
//!
//! Reduces the full spatial extent of each `[mb, c]` plane to a single
//! value (maximum or mean) over `f32` or `bf16` tensors. Follows the
//! same lifecycle as the inner product: validate and build once, execute
//! many times against immutable state.

use crate::scratchpad::ScratchpadPlan;
use half::bf16;
use intq_common::{Attributes, DataType, IntqError, MemoryDesc, PropKind, Result};
use rayon::prelude::*;

/// Pooling reduction algorithm.
///
/// A global window has no padding, so both averaging variants divide by
/// the same element count; they are kept distinct so descriptors carry
/// the caller's intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolAlg {
    Max,
    AvgIncludePadding,
    AvgExcludePadding,
}

/// Immutable description of a requested global-pooling operation.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalPoolingDesc {
    prop_kind: PropKind,
    alg: PoolAlg,
    src: MemoryDesc,
    dst: MemoryDesc,
}

impl GlobalPoolingDesc {
    pub fn new(prop_kind: PropKind, alg: PoolAlg, src: MemoryDesc, dst: MemoryDesc) -> Self {
        GlobalPoolingDesc { prop_kind, alg, src, dst }
    }

    pub fn prop_kind(&self) -> PropKind {
        self.prop_kind
    }

    pub fn alg(&self) -> PoolAlg {
        self.alg
    }

    pub fn src(&self) -> &MemoryDesc {
        &self.src
    }

    pub fn dst(&self) -> &MemoryDesc {
        &self.dst
    }
}

// ── Buffers ──────────────────────────────────────────────────────────

/// Borrowed pooling input.
#[derive(Debug, Clone, Copy)]
pub enum PoolSrcView<'a> {
    F32(&'a [f32]),
    Bf16(&'a [bf16]),
}

impl PoolSrcView<'_> {
    pub fn len(&self) -> usize {
        match self {
            PoolSrcView::F32(s) => s.len(),
            PoolSrcView::Bf16(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DataType {
        match self {
            PoolSrcView::F32(_) => DataType::F32,
            PoolSrcView::Bf16(_) => DataType::Bf16,
        }
    }
}

/// Mutable pooling output.
#[derive(Debug)]
pub enum PoolDstView<'a> {
    F32(&'a mut [f32]),
    Bf16(&'a mut [bf16]),
}

impl PoolDstView<'_> {
    pub fn len(&self) -> usize {
        match self {
            PoolDstView::F32(s) => s.len(),
            PoolDstView::Bf16(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DataType {
        match self {
            PoolDstView::F32(_) => DataType::F32,
            PoolDstView::Bf16(_) => DataType::Bf16,
        }
    }
}

/// Per-call execution arguments for global pooling.
pub struct PoolingContext<'a> {
    pub src: PoolSrcView<'a>,
    pub dst: PoolDstView<'a>,
}

// ── Validation ───────────────────────────────────────────────────────

/// Accepted, immutable global-pooling configuration.
#[derive(Debug, Clone)]
pub struct PoolingConfig {
    mb: usize,
    channels: usize,
    spatial: usize,
    dtype: DataType,
    alg: PoolAlg,
}

impl PoolingConfig {
    pub fn new(desc: &GlobalPoolingDesc, attr: &Attributes) -> Result<Self> {
        if !desc.prop_kind().is_forward() {
            return Err(IntqError::unimplemented("backward propagation"));
        }
        if !attr.has_default_values() {
            return Err(IntqError::unimplemented("pooling with non-default attributes"));
        }
        if desc.src().has_zero_dim() || desc.dst().has_zero_dim() {
            return Err(IntqError::unimplemented("zero-dimension memory"));
        }
        if !desc.src().is_dense() || !desc.dst().is_dense() {
            return Err(IntqError::unimplemented("non-dense pooling layout"));
        }

        let dtype = desc.src().dtype();
        if !matches!(dtype, DataType::F32 | DataType::Bf16) {
            return Err(IntqError::unimplemented(format!("pooling data type {dtype}")));
        }
        if desc.dst().dtype() != dtype {
            return Err(IntqError::unimplemented("mixed pooling source/destination data types"));
        }

        let src_dims = desc.src().dims();
        if src_dims.len() < 3 {
            return Err(IntqError::unimplemented("pooling source rank below 3"));
        }
        let (mb, channels) = (src_dims[0], src_dims[1]);
        let spatial: usize = src_dims[2..].iter().product();

        // Destination must be the same [mb, c] plane with every spatial
        // dimension collapsed to one.
        let dst_dims = desc.dst().dims();
        let dst_ok = dst_dims.len() >= 2
            && dst_dims[0] == mb
            && dst_dims[1] == channels
            && dst_dims[2..].iter().all(|&d| d == 1);
        if !dst_ok {
            return Err(IntqError::unimplemented(
                "pooling destination shape does not collapse the spatial extent",
            ));
        }

        Ok(PoolingConfig { mb, channels, spatial, dtype, alg: desc.alg() })
    }

    pub fn mb(&self) -> usize {
        self.mb
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn spatial(&self) -> usize {
        self.spatial
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn alg(&self) -> PoolAlg {
        self.alg
    }

    /// Global pooling needs no temporaries; the plan is empty.
    pub fn plan_scratchpad(&self) -> ScratchpadPlan {
        ScratchpadPlan::new()
    }
}

// ── Primitive ────────────────────────────────────────────────────────

/// Global pooling primitive.
pub struct GlobalPooling {
    config: PoolingConfig,
    plan: ScratchpadPlan,
}

impl GlobalPooling {
    pub fn new(desc: &GlobalPoolingDesc, attr: &Attributes) -> Result<Self> {
        let config = PoolingConfig::new(desc, attr)?;
        let plan = config.plan_scratchpad();
        log::debug!(
            "global pooling created: mb={} c={} spatial={} alg={:?} dtype={}",
            config.mb(),
            config.channels(),
            config.spatial(),
            config.alg(),
            config.dtype(),
        );
        Ok(GlobalPooling { config, plan })
    }

    pub fn config(&self) -> &PoolingConfig {
        &self.config
    }

    pub fn scratchpad_plan(&self) -> &ScratchpadPlan {
        &self.plan
    }

    /// Reduce each `[mb, c]` plane over its full spatial extent.
    pub fn execute(&self, ctx: PoolingContext<'_>) -> Result<()> {
        let planes = self.config.mb() * self.config.channels();
        let spatial = self.config.spatial();

        if ctx.src.dtype() != self.config.dtype() || ctx.dst.dtype() != self.config.dtype() {
            return Err(IntqError::invalid_args("pooling buffer dtype mismatch"));
        }
        if ctx.src.len() != planes * spatial {
            return Err(IntqError::invalid_args(format!(
                "pooling source holds {} elements, descriptor requires {}",
                ctx.src.len(),
                planes * spatial
            )));
        }
        if ctx.dst.len() != planes {
            return Err(IntqError::invalid_args(format!(
                "pooling destination holds {} elements, descriptor requires {planes}",
                ctx.dst.len()
            )));
        }

        let alg = self.config.alg();
        match (ctx.src, ctx.dst) {
            (PoolSrcView::F32(src), PoolDstView::F32(dst)) => {
                dst.par_iter_mut().enumerate().for_each(|(p, out)| {
                    let window = &src[p * spatial..(p + 1) * spatial];
                    *out = reduce_f32(window.iter().copied(), spatial, alg);
                });
            }
            (PoolSrcView::Bf16(src), PoolDstView::Bf16(dst)) => {
                dst.par_iter_mut().enumerate().for_each(|(p, out)| {
                    let window = &src[p * spatial..(p + 1) * spatial];
                    let reduced = reduce_f32(window.iter().map(|v| v.to_f32()), spatial, alg);
                    *out = bf16::from_f32(reduced);
                });
            }
            _ => return Err(IntqError::invalid_args("pooling buffer dtype mismatch")),
        }
        Ok(())
    }
}

fn reduce_f32(values: impl Iterator<Item = f32>, spatial: usize, alg: PoolAlg) -> f32 {
    match alg {
        PoolAlg::Max => values.fold(f32::NEG_INFINITY, f32::max),
        PoolAlg::AvgIncludePadding | PoolAlg::AvgExcludePadding => {
            values.sum::<f32>() / spatial as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(alg: PoolAlg, dtype: DataType) -> GlobalPoolingDesc {
        GlobalPoolingDesc::new(
            PropKind::Forward,
            alg,
            MemoryDesc::new([2, 3, 4], dtype),
            MemoryDesc::new([2, 3, 1], dtype),
        )
    }

    #[test]
    fn validates_and_plans_empty() {
        let p = GlobalPooling::new(&desc(PoolAlg::Max, DataType::F32), &Attributes::new()).unwrap();
        assert!(p.scratchpad_plan().is_empty());
        assert_eq!(p.config().spatial(), 4);
    }

    #[test]
    fn rejects_integer_dtypes() {
        let d = GlobalPoolingDesc::new(
            PropKind::Forward,
            PoolAlg::Max,
            MemoryDesc::new([2, 3, 4], DataType::S8),
            MemoryDesc::new([2, 3, 1], DataType::S8),
        );
        assert!(GlobalPooling::new(&d, &Attributes::new()).is_err());
    }

    #[test]
    fn rejects_attributes() {
        let mut attr = Attributes::new();
        attr.post_ops.append_eltwise(intq_common::EltwiseAlg::Relu, 0.0, 0.0);
        assert!(GlobalPooling::new(&desc(PoolAlg::Max, DataType::F32), &attr).is_err());
    }

    #[test]
    fn rejects_non_collapsed_destination() {
        let d = GlobalPoolingDesc::new(
            PropKind::Forward,
            PoolAlg::Max,
            MemoryDesc::new([2, 3, 4], DataType::F32),
            MemoryDesc::new([2, 3, 2], DataType::F32),
        );
        assert!(GlobalPooling::new(&d, &Attributes::new()).is_err());
    }

    #[test]
    fn max_reduces_each_plane() {
        let p = GlobalPooling::new(&desc(PoolAlg::Max, DataType::F32), &Attributes::new()).unwrap();
        #[rustfmt::skip]
        let src = [
            1.0, 5.0, 3.0, 2.0,   -1.0, -5.0, -3.0, -2.0,   0.0, 0.0, 7.0, 0.0,
            9.0, 1.0, 1.0, 1.0,    4.0, 4.0, 4.0, 4.5,     -9.0, -8.0, -7.0, -6.0,
        ];
        let mut dst = [0f32; 6];
        p.execute(PoolingContext {
            src: PoolSrcView::F32(&src),
            dst: PoolDstView::F32(&mut dst),
        })
        .unwrap();
        assert_eq!(dst, [5.0, -1.0, 7.0, 9.0, 4.5, -6.0]);
    }

    #[test]
    fn average_divides_by_window() {
        let p = GlobalPooling::new(&desc(PoolAlg::AvgExcludePadding, DataType::F32), &Attributes::new())
            .unwrap();
        let src: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let mut dst = [0f32; 6];
        p.execute(PoolingContext {
            src: PoolSrcView::F32(&src),
            dst: PoolDstView::F32(&mut dst),
        })
        .unwrap();
        // Plane 0 covers 0..4 → mean 1.5; each next plane shifts by 4.
        assert_eq!(dst, [1.5, 5.5, 9.5, 13.5, 17.5, 21.5]);
    }

    #[test]
    fn bf16_round_trips_through_f32_reduction() {
        let p = GlobalPooling::new(&desc(PoolAlg::Max, DataType::Bf16), &Attributes::new()).unwrap();
        let src: Vec<bf16> = (0..24).map(|v| bf16::from_f32(v as f32)).collect();
        let mut dst = vec![bf16::from_f32(0.0); 6];
        p.execute(PoolingContext {
            src: PoolSrcView::Bf16(&src),
            dst: PoolDstView::Bf16(&mut dst),
        })
        .unwrap();
        assert_eq!(dst[0].to_f32(), 3.0);
        assert_eq!(dst[5].to_f32(), 23.0);
    }

    #[test]
    fn length_mismatch_is_invalid() {
        let p = GlobalPooling::new(&desc(PoolAlg::Max, DataType::F32), &Attributes::new()).unwrap();
        let src = [0f32; 10]; // needs 24
        let mut dst = [0f32; 6];
        let err = p
            .execute(PoolingContext {
                src: PoolSrcView::F32(&src),
                dst: PoolDstView::F32(&mut dst),
            })
            .unwrap_err();
        assert!(matches!(err, IntqError::InvalidArguments { .. }));
    }
}
