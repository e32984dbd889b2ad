//! Descriptor validation for the quantized inner product.
//!
//! `ValidatedConfig::new` is the accept/reject gate: every check must
//! hold or creation aborts with `unimplemented` and no partial state.
//! The accepted configuration is immutable and carries everything the
//! planner, the pipeline builder, and the orchestrator need.

use super::InnerProductDesc;
use crate::postops::post_ops_realizable;
use crate::scales::book_precomputed_scales;
use crate::scratchpad::{BufferKey, ScratchpadPlan};
use intq_common::{Attributes, DataType, IntqError, MemoryDesc, Result, ScaleMask};

/// Accepted, immutable configuration of one inner-product primitive.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    mb: usize,
    oc: usize,
    ic: usize,
    src_dtype: DataType,
    bias_dtype: Option<DataType>,
    dst_dtype: DataType,
    attr: Attributes,
    dst_is_accumulator: bool,
}

impl ValidatedConfig {
    /// Validate a descriptor/attribute pair.
    pub fn new(desc: &InnerProductDesc, attr: &Attributes) -> Result<Self> {
        if !desc.prop_kind().is_forward() {
            return Err(IntqError::unimplemented("backward propagation"));
        }

        let zero_dim = desc.src().has_zero_dim()
            || desc.weights().has_zero_dim()
            || desc.dst().has_zero_dim()
            || desc.bias().is_some_and(MemoryDesc::has_zero_dim);
        if zero_dim {
            return Err(IntqError::unimplemented("zero-dimension memory"));
        }

        if !matches!(desc.src().dtype(), DataType::S8 | DataType::U8) {
            return Err(IntqError::unimplemented(format!(
                "source data type {}",
                desc.src().dtype()
            )));
        }
        if desc.weights().dtype() != DataType::S8 {
            return Err(IntqError::unimplemented(format!(
                "weights data type {}",
                desc.weights().dtype()
            )));
        }
        if !matches!(
            desc.dst().dtype(),
            DataType::F32 | DataType::S32 | DataType::S8 | DataType::U8
        ) {
            return Err(IntqError::unimplemented(format!(
                "destination data type {}",
                desc.dst().dtype()
            )));
        }
        if let Some(bias) = desc.bias() {
            if !matches!(
                bias.dtype(),
                DataType::F32 | DataType::S32 | DataType::S8 | DataType::U8
            ) {
                return Err(IntqError::unimplemented(format!("bias data type {}", bias.dtype())));
            }
        }

        if !attr.post_ops.sum_dtype_consistent(desc.dst().dtype()) {
            return Err(IntqError::unimplemented(
                "sum post-op data type inconsistent with destination",
            ));
        }
        scales_mask_ok(attr)?;

        let (mb, oc, ic) = dense_gemm_consistency(desc)?;

        if let Some(bias) = desc.bias() {
            if bias.nelems() != oc {
                return Err(IntqError::unimplemented("bias shape does not cover output channels"));
            }
        }

        // Probe pipeline realizability now; execution never discovers an
        // unsupported post-op list.
        post_ops_realizable(&attr.post_ops, oc)
            .map_err(|e| IntqError::unimplemented(e.to_string()))?;

        let do_sum = attr.post_ops.has_sum();
        let dst_is_accumulator = desc.dst().dtype().is_wide() && !do_sum;

        Ok(ValidatedConfig {
            mb,
            oc,
            ic,
            src_dtype: desc.src().dtype(),
            bias_dtype: desc.bias().map(MemoryDesc::dtype),
            dst_dtype: desc.dst().dtype(),
            attr: attr.clone(),
            dst_is_accumulator,
        })
    }

    /// Deterministic scratchpad plan for this configuration.
    pub fn plan_scratchpad(&self) -> ScratchpadPlan {
        let mut plan = ScratchpadPlan::new();
        let mut registrar = plan.registrar();
        if !self.dst_is_accumulator {
            registrar.book(BufferKey::IntAccumulator, DataType::S32, self.mb * self.oc);
        }
        book_precomputed_scales(&mut registrar, &self.attr.scales, self.oc);
        plan
    }

    pub fn mb(&self) -> usize {
        self.mb
    }

    pub fn oc(&self) -> usize {
        self.oc
    }

    pub fn ic(&self) -> usize {
        self.ic
    }

    pub fn src_dtype(&self) -> DataType {
        self.src_dtype
    }

    pub fn bias_dtype(&self) -> Option<DataType> {
        self.bias_dtype
    }

    pub fn dst_dtype(&self) -> DataType {
        self.dst_dtype
    }

    pub fn attr(&self) -> &Attributes {
        &self.attr
    }

    /// True iff the destination buffer doubles as the raw accumulation
    /// buffer: a 32-bit-wide destination with no sum post-op.
    pub fn dst_is_accumulator(&self) -> bool {
        self.dst_is_accumulator
    }
}

fn scales_mask_ok(attr: &Attributes) -> Result<()> {
    if attr.scales.src.mask != ScaleMask::Common {
        return Err(IntqError::unimplemented("per-channel source scales"));
    }
    if attr.scales.dst.mask != ScaleMask::Common {
        return Err(IntqError::unimplemented("per-channel destination scales"));
    }
    // Weight mask may be Common or PerOutputChannel; nothing to reject.
    let any_static = [attr.scales.src, attr.scales.weights, attr.scales.dst]
        .iter()
        .any(|s| !s.runtime && s.mask != ScaleMask::Common);
    if any_static {
        return Err(IntqError::unimplemented("non-runtime scales"));
    }
    Ok(())
}

/// Both operands must reduce to a dense 2-D contraction with a matching
/// reduction size, and the destination must be dense `mb × oc`.
fn dense_gemm_consistency(desc: &InnerProductDesc) -> Result<(usize, usize, usize)> {
    for (name, md) in [("source", desc.src()), ("weights", desc.weights()), ("dst", desc.dst())] {
        if !md.is_dense() {
            return Err(IntqError::unimplemented(format!("{name} memory format is not dense")));
        }
    }

    let (mb, ic) = desc
        .src()
        .flatten_to_2d()
        .ok_or_else(|| IntqError::unimplemented("source rank below 2"))?;
    let (oc, wic) = desc
        .weights()
        .flatten_to_2d()
        .ok_or_else(|| IntqError::unimplemented("weights rank below 2"))?;
    if ic != wic {
        return Err(IntqError::unimplemented(
            "source and weights do not reduce to a common contraction",
        ));
    }
    if desc.dst().dims() != [mb, oc] {
        return Err(IntqError::unimplemented("destination shape does not match mb x oc"));
    }
    Ok((mb, oc, ic))
}

#[cfg(test)]
mod tests {
    use super::*;
    use intq_common::{FormatTag, PropKind, ScaleSpec, Status};

    fn base_desc(dst_dtype: DataType) -> InnerProductDesc {
        InnerProductDesc::new(
            PropKind::Forward,
            MemoryDesc::new([2, 8], DataType::U8),
            MemoryDesc::new([3, 8], DataType::S8),
            MemoryDesc::new([2, 3], dst_dtype),
        )
    }

    #[test]
    fn accepts_the_supported_envelope() {
        let cfg = ValidatedConfig::new(&base_desc(DataType::S8), &Attributes::new()).unwrap();
        assert_eq!((cfg.mb(), cfg.oc(), cfg.ic()), (2, 3, 8));
    }

    #[test]
    fn rejects_backward() {
        let desc = InnerProductDesc::new(
            PropKind::BackwardData,
            MemoryDesc::new([2, 8], DataType::U8),
            MemoryDesc::new([3, 8], DataType::S8),
            MemoryDesc::new([2, 3], DataType::F32),
        );
        let err = ValidatedConfig::new(&desc, &Attributes::new()).unwrap_err();
        assert_eq!(err.status(), Status::Unimplemented);
    }

    #[test]
    fn rejects_f32_source() {
        let desc = InnerProductDesc::new(
            PropKind::Forward,
            MemoryDesc::new([2, 8], DataType::F32),
            MemoryDesc::new([3, 8], DataType::S8),
            MemoryDesc::new([2, 3], DataType::F32),
        );
        assert!(ValidatedConfig::new(&desc, &Attributes::new()).is_err());
    }

    #[test]
    fn rejects_u8_weights() {
        let desc = InnerProductDesc::new(
            PropKind::Forward,
            MemoryDesc::new([2, 8], DataType::U8),
            MemoryDesc::new([3, 8], DataType::U8),
            MemoryDesc::new([2, 3], DataType::F32),
        );
        assert!(ValidatedConfig::new(&desc, &Attributes::new()).is_err());
    }

    #[test]
    fn rejects_bf16_destination() {
        assert!(ValidatedConfig::new(&base_desc(DataType::Bf16), &Attributes::new()).is_err());
    }

    #[test]
    fn rejects_zero_dim_memory() {
        let desc = InnerProductDesc::new(
            PropKind::Forward,
            MemoryDesc::new([2, 0], DataType::U8),
            MemoryDesc::new([3, 0], DataType::S8),
            MemoryDesc::new([2, 3], DataType::F32),
        );
        assert!(ValidatedConfig::new(&desc, &Attributes::new()).is_err());
    }

    #[test]
    fn rejects_non_dense_layout() {
        let desc = InnerProductDesc::new(
            PropKind::Forward,
            MemoryDesc::new([2, 8], DataType::U8).with_format(FormatTag::Any),
            MemoryDesc::new([3, 8], DataType::S8),
            MemoryDesc::new([2, 3], DataType::F32),
        );
        assert!(ValidatedConfig::new(&desc, &Attributes::new()).is_err());
    }

    #[test]
    fn rejects_contraction_mismatch() {
        let desc = InnerProductDesc::new(
            PropKind::Forward,
            MemoryDesc::new([2, 8], DataType::U8),
            MemoryDesc::new([3, 9], DataType::S8),
            MemoryDesc::new([2, 3], DataType::F32),
        );
        assert!(ValidatedConfig::new(&desc, &Attributes::new()).is_err());
    }

    #[test]
    fn flattens_higher_rank_operands() {
        let desc = InnerProductDesc::new(
            PropKind::Forward,
            MemoryDesc::new([4, 2, 3, 3], DataType::S8),
            MemoryDesc::new([16, 2, 3, 3], DataType::S8),
            MemoryDesc::new([4, 16], DataType::S32),
        );
        let cfg = ValidatedConfig::new(&desc, &Attributes::new()).unwrap();
        assert_eq!((cfg.mb(), cfg.oc(), cfg.ic()), (4, 16, 18));
    }

    #[test]
    fn rejects_per_channel_source_scales() {
        let mut attr = Attributes::new();
        attr.scales.src = ScaleSpec::runtime_per_oc();
        assert!(ValidatedConfig::new(&base_desc(DataType::F32), &attr).is_err());
    }

    #[test]
    fn accepts_per_channel_weight_scales() {
        let mut attr = Attributes::new();
        attr.scales.src = ScaleSpec::runtime_common();
        attr.scales.weights = ScaleSpec::runtime_per_oc();
        assert!(ValidatedConfig::new(&base_desc(DataType::F32), &attr).is_ok());
    }

    #[test]
    fn rejects_inconsistent_sum_dtype() {
        let mut attr = Attributes::new();
        attr.post_ops.append_sum(1.0, 0, Some(DataType::F32));
        assert!(ValidatedConfig::new(&base_desc(DataType::S8), &attr).is_err());
    }

    #[test]
    fn dst_is_accumulator_iff_wide_and_no_sum() {
        let attr = Attributes::new();
        for (dt, expected) in [
            (DataType::F32, true),
            (DataType::S32, true),
            (DataType::S8, false),
            (DataType::U8, false),
        ] {
            let cfg = ValidatedConfig::new(&base_desc(dt), &attr).unwrap();
            assert_eq!(cfg.dst_is_accumulator(), expected, "dst={dt}");
        }

        let mut attr = Attributes::new();
        attr.post_ops.append_sum(1.0, 0, None);
        let cfg = ValidatedConfig::new(&base_desc(DataType::F32), &attr).unwrap();
        assert!(!cfg.dst_is_accumulator());
    }

    #[test]
    fn plan_books_accumulator_iff_needed() {
        let attr = Attributes::new();
        let wide = ValidatedConfig::new(&base_desc(DataType::F32), &attr).unwrap();
        assert!(wide.plan_scratchpad().get(BufferKey::IntAccumulator).is_none());

        let narrow = ValidatedConfig::new(&base_desc(DataType::S8), &attr).unwrap();
        let plan = narrow.plan_scratchpad();
        let req = plan.get(BufferKey::IntAccumulator).unwrap();
        assert_eq!(req.count, 2 * 3);
        assert_eq!(req.dtype, DataType::S32);
    }

    #[test]
    fn rejects_unrealizable_post_ops() {
        let mut attr = Attributes::new();
        attr.post_ops.append_sum(1.0, 0, None);
        attr.post_ops.append_sum(1.0, 0, None);
        let err = ValidatedConfig::new(&base_desc(DataType::S8), &attr).unwrap_err();
        assert_eq!(err.status(), Status::Unimplemented);
    }
}
