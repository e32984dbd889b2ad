//! Scalar reference gemm provider.
//!
//! Naive but correct on any architecture; serves as the correctness
//! oracle for optimized providers and as the fallback when no SIMD
//! strategy is available. Rows are computed in parallel — each worker
//! owns a disjoint slice of output rows, so no locking is involved.

use crate::{validate_gemm_args, GemmProvider, SrcView};
use intq_common::Result;
use rayon::prelude::*;

/// Reference provider, always available.
pub struct ScalarGemm;

impl GemmProvider for ScalarGemm {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn gemm_x8s8s32(
        &self,
        src: SrcView<'_>,
        weights: &[i8],
        acc: &mut [i32],
        m: usize,
        n: usize,
        k: usize,
    ) -> Result<()> {
        validate_gemm_args(&src, weights, acc, m, n, k)?;
        match src {
            SrcView::S8(a) => gemm_rows(a, weights, acc, n, k),
            SrcView::U8(a) => gemm_rows(a, weights, acc, n, k),
        }
        Ok(())
    }
}

fn gemm_rows<T>(a: &[T], weights: &[i8], acc: &mut [i32], n: usize, k: usize)
where
    T: Copy + Into<i32> + Sync,
{
    acc.par_chunks_mut(n).enumerate().for_each(|(i, acc_row)| {
        let a_row = &a[i * k..(i + 1) * k];
        for (j, out) in acc_row.iter_mut().enumerate() {
            let w_row = &weights[j * k..(j + 1) * k];
            let mut sum = 0i32;
            for l in 0..k {
                let a_val: i32 = a_row[l].into();
                sum += a_val * w_row[l] as i32;
            }
            *out = sum;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_2x2_product() {
        // A = [[1, 2], [3, 4]], Wᵗ rows = [[5, 6], [7, 8]]
        // C[0][0] = 1*5 + 2*6 = 17, C[0][1] = 1*7 + 2*8 = 23
        // C[1][0] = 3*5 + 4*6 = 39, C[1][1] = 3*7 + 4*8 = 53
        let a: [i8; 4] = [1, 2, 3, 4];
        let w: [i8; 4] = [5, 6, 7, 8];
        let mut c = [0i32; 4];
        ScalarGemm.gemm_x8s8s32(SrcView::S8(&a), &w, &mut c, 2, 2, 2).unwrap();
        assert_eq!(c, [17, 23, 39, 53]);
    }

    #[test]
    fn unsigned_source() {
        let a: [u8; 3] = [200, 100, 50];
        let w: [i8; 3] = [-1, 2, -3];
        let mut c = [0i32; 1];
        ScalarGemm.gemm_x8s8s32(SrcView::U8(&a), &w, &mut c, 1, 1, 3).unwrap();
        assert_eq!(c, [-200 + 200 - 150]);
    }

    #[test]
    fn negative_weights_accumulate_exactly() {
        let a: [i8; 4] = [-128, 127, -1, 1];
        let w: [i8; 4] = [-128, -128, -128, -128];
        let mut c = [0i32; 1];
        ScalarGemm.gemm_x8s8s32(SrcView::S8(&a), &w, &mut c, 1, 1, 4).unwrap();
        assert_eq!(c, [(128 - 127 + 1 - 1) * 128]);
    }

    #[test]
    fn overwrites_stale_accumulator() {
        let a: [i8; 1] = [0];
        let w: [i8; 1] = [0];
        let mut c = [123i32];
        ScalarGemm.gemm_x8s8s32(SrcView::S8(&a), &w, &mut c, 1, 1, 1).unwrap();
        assert_eq!(c, [0]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_unit_weights_give_row_sums(
                vals in prop::collection::vec(-128i32..=127i32, 1..64)
            ) {
                let k = vals.len();
                let a: Vec<i8> = vals.iter().map(|&v| v as i8).collect();
                let w = vec![1i8; k];
                let mut c = [0i32; 1];
                ScalarGemm.gemm_x8s8s32(SrcView::S8(&a), &w, &mut c, 1, 1, k).unwrap();
                prop_assert_eq!(c[0], vals.iter().sum::<i32>());
            }

            #[test]
            fn prop_negating_weights_negates_output(
                vals in prop::collection::vec(0i32..=127i32, 1..32)
            ) {
                let k = vals.len();
                let a: Vec<u8> = vals.iter().map(|&v| v as u8).collect();
                let w: Vec<i8> = (0..k).map(|i| ((i % 5) as i8) - 2).collect();
                let w_neg: Vec<i8> = w.iter().map(|&v| -v).collect();
                let mut c = [0i32; 1];
                let mut c_neg = [0i32; 1];
                ScalarGemm.gemm_x8s8s32(SrcView::U8(&a), &w, &mut c, 1, 1, k).unwrap();
                ScalarGemm.gemm_x8s8s32(SrcView::U8(&a), &w_neg, &mut c_neg, 1, 1, k).unwrap();
                prop_assert_eq!(c[0], -c_neg[0]);
            }
        }
    }
}
