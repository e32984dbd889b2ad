//! x86_64 AVX2 gemm provider.
//!
//! Uses exact sign/zero extension to 16 bits followed by `madd` pair
//! accumulation — no saturating intermediate, so results match the
//! scalar reference bit-for-bit.
#![allow(unsafe_op_in_unsafe_fn)]

use crate::{validate_gemm_args, GemmProvider, SrcView};
use intq_common::{IntqError, Result};
use std::arch::x86_64::*;

/// AVX2 provider for x86_64.
pub struct Avx2Gemm;

impl GemmProvider for Avx2Gemm {
    fn name(&self) -> &'static str {
        "avx2"
    }

    fn is_available(&self) -> bool {
        is_x86_feature_detected!("avx2")
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
        if !self.is_available() {
            return Err(IntqError::runtime("AVX2 selected but not available on this CPU"));
        }
        validate_gemm_args(&src, weights, acc, m, n, k)?;

        // Safety: AVX2 availability checked above.
        unsafe {
            match src {
                SrcView::S8(a) => gemm_s8_avx2(a, weights, acc, m, n, k),
                SrcView::U8(a) => gemm_u8_avx2(a, weights, acc, m, n, k),
            }
        }
        Ok(())
    }
}

#[target_feature(enable = "avx2")]
unsafe fn gemm_s8_avx2(a: &[i8], weights: &[i8], acc: &mut [i32], m: usize, n: usize, k: usize) {
    for i in 0..m {
        let a_row = &a[i * k..(i + 1) * k];
        for j in 0..n {
            let w_row = &weights[j * k..(j + 1) * k];
            acc[i * n + j] = dot_s8_s8(a_row, w_row);
        }
    }
}

#[target_feature(enable = "avx2")]
unsafe fn gemm_u8_avx2(a: &[u8], weights: &[i8], acc: &mut [i32], m: usize, n: usize, k: usize) {
    for i in 0..m {
        let a_row = &a[i * k..(i + 1) * k];
        for j in 0..n {
            let w_row = &weights[j * k..(j + 1) * k];
            acc[i * n + j] = dot_u8_s8(a_row, w_row);
        }
    }
}

#[target_feature(enable = "avx2")]
unsafe fn dot_s8_s8(a: &[i8], b: &[i8]) -> i32 {
    let k = a.len();
    let mut vacc = _mm256_setzero_si256();
    let mut l = 0;
    while l + 16 <= k {
        let va = _mm_loadu_si128(a.as_ptr().add(l) as *const __m128i);
        let vb = _mm_loadu_si128(b.as_ptr().add(l) as *const __m128i);
        let wa = _mm256_cvtepi8_epi16(va);
        let wb = _mm256_cvtepi8_epi16(vb);
        vacc = _mm256_add_epi32(vacc, _mm256_madd_epi16(wa, wb));
        l += 16;
    }
    let mut sum = hsum_epi32(vacc);
    while l < k {
        sum += a[l] as i32 * b[l] as i32;
        l += 1;
    }
    sum
}

#[target_feature(enable = "avx2")]
unsafe fn dot_u8_s8(a: &[u8], b: &[i8]) -> i32 {
    let k = a.len();
    let mut vacc = _mm256_setzero_si256();
    let mut l = 0;
    while l + 16 <= k {
        let va = _mm_loadu_si128(a.as_ptr().add(l) as *const __m128i);
        let vb = _mm_loadu_si128(b.as_ptr().add(l) as *const __m128i);
        let wa = _mm256_cvtepu8_epi16(va);
        let wb = _mm256_cvtepi8_epi16(vb);
        vacc = _mm256_add_epi32(vacc, _mm256_madd_epi16(wa, wb));
        l += 16;
    }
    let mut sum = hsum_epi32(vacc);
    while l < k {
        sum += a[l] as i32 * b[l] as i32;
        l += 1;
    }
    sum
}

#[target_feature(enable = "avx2")]
unsafe fn hsum_epi32(v: __m256i) -> i32 {
    let lo = _mm256_castsi256_si128(v);
    let hi = _mm256_extracti128_si256::<1>(v);
    let s = _mm_add_epi32(lo, hi);
    let s = _mm_add_epi32(s, _mm_shuffle_epi32::<0x4E>(s));
    let s = _mm_add_epi32(s, _mm_shuffle_epi32::<0xB1>(s));
    _mm_cvtsi128_si32(s)
}
