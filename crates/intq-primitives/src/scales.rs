//! Requantization scale precomputation.
//!
//! Source and weight quantization scales arrive independently with each
//! execution call; this engine folds them into one read-only view the
//! post-processing pipeline can index per output channel. The engine is
//! stateless — concurrent calls against one primitive are safe as long
//! as each call supplies its own scratchpad region.

use crate::scratchpad::{BufferKey, Registrar};
use intq_common::{ArgScales, DataType, IntqError, Result, ScaleMask, ScaleSpec};

/// Width of the broadcast scale buffer.
///
/// When the combined scale collapses to one scalar, the whole buffer is
/// filled with that value so a fixed-stride vectorized read of up to
/// this many lanes is always in bounds.
pub const SCALES_SIMD_W: usize = 16;

/// Read-only combined-scale view for one execution call.
#[derive(Debug, Clone, Copy)]
pub struct ScaleView<'a> {
    values: &'a [f32],
    idx_mult: usize,
}

impl<'a> ScaleView<'a> {
    /// One scalar applied to every channel.
    pub(crate) fn broadcast(values: &'a [f32]) -> Self {
        ScaleView { values, idx_mult: 0 }
    }

    /// One value per output channel.
    pub(crate) fn per_channel(values: &'a [f32]) -> Self {
        ScaleView { values, idx_mult: 1 }
    }

    /// Scale for output channel `c`.
    #[inline]
    pub fn at(&self, c: usize) -> f32 {
        self.values[c * self.idx_mult]
    }

    pub fn is_per_channel(&self) -> bool {
        self.idx_mult == 1
    }

    pub fn values(&self) -> &'a [f32] {
        self.values
    }
}

/// Book the combined-scale buffer when precomputation will need one.
///
/// Only the both-sides-scaled case writes into the scratchpad; single
/// sided scales pass through zero-copy.
pub fn book_precomputed_scales(registrar: &mut Registrar<'_>, scales: &ArgScales, oc: usize) {
    let with_src = !scales.src.is_default();
    let with_wei = !scales.weights.is_default();
    if with_src && with_wei {
        let count = match scales.weights.mask {
            ScaleMask::Common => SCALES_SIMD_W,
            ScaleMask::PerOutputChannel => oc,
        };
        registrar.book(BufferKey::PrecomputedScales, DataType::F32, count);
    }
}

/// Fold runtime scale vectors into one view.
///
/// Policy:
/// - neither side scaled → `None`; the accumulation is already final.
/// - one side scaled → that side's vector, unchanged (zero-copy).
/// - both sides scaled → elementwise product into `scratch`; a scalar
///   combined value fills the whole broadcast buffer.
pub fn precompute_scales<'a>(
    scratch: Option<&'a mut [f32]>,
    src_scales: Option<&'a [f32]>,
    wei_scales: Option<&'a [f32]>,
    oc: usize,
    scales: &ArgScales,
) -> Result<Option<ScaleView<'a>>> {
    let src = resolve_arg(src_scales, &scales.src, 1, "source")?;
    let wei = resolve_arg(wei_scales, &scales.weights, scales.weights.count(oc), "weight")?;

    match (src, wei) {
        (None, None) => Ok(None),
        (Some(s), None) => Ok(Some(ScaleView::broadcast(s))),
        (None, Some(w)) => Ok(Some(match scales.weights.mask {
            ScaleMask::Common => ScaleView::broadcast(w),
            ScaleMask::PerOutputChannel => ScaleView::per_channel(w),
        })),
        (Some(s), Some(w)) => {
            let buf = scratch.ok_or_else(|| {
                IntqError::invalid_args("precomputed_scales scratchpad buffer was not granted")
            })?;
            if w.len() == 1 {
                if buf.len() < SCALES_SIMD_W {
                    return Err(IntqError::invalid_args(format!(
                        "precomputed_scales buffer holds {} values, broadcast needs {}",
                        buf.len(),
                        SCALES_SIMD_W
                    )));
                }
                let combined = s[0] * w[0];
                let buf = &mut buf[..SCALES_SIMD_W];
                buf.fill(combined);
                Ok(Some(ScaleView::broadcast(buf)))
            } else {
                if buf.len() < oc {
                    return Err(IntqError::invalid_args(format!(
                        "precomputed_scales buffer holds {} values, per-channel needs {oc}",
                        buf.len()
                    )));
                }
                let buf = &mut buf[..oc];
                for (slot, &wc) in buf.iter_mut().zip(w.iter()) {
                    *slot = s[0] * wc;
                }
                Ok(Some(ScaleView::per_channel(buf)))
            }
        }
    }
}

fn resolve_arg<'a>(
    supplied: Option<&'a [f32]>,
    spec: &ScaleSpec,
    expected_len: usize,
    what: &str,
) -> Result<Option<&'a [f32]>> {
    match (spec.is_default(), supplied) {
        (true, None) => Ok(None),
        (true, Some(_)) => Err(IntqError::invalid_args(format!(
            "{what} scales supplied but the descriptor declares none"
        ))),
        (false, None) => Err(IntqError::invalid_args(format!(
            "{what} scales declared at creation but missing from the call"
        ))),
        (false, Some(values)) => {
            if values.len() != expected_len {
                return Err(IntqError::invalid_args(format!(
                    "{what} scales length {} does not match mask (expected {expected_len})",
                    values.len()
                )));
            }
            Ok(Some(values))
        }
    }
}
