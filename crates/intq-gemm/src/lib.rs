//! Integer gemm providers for intq primitives
//!
//! A [`GemmProvider`] is the external "compute raw accumulation" service:
//! given an 8-bit source (signed or unsigned), signed 8-bit weights, and a
//! 32-bit integer output buffer, it produces the raw matrix-multiply
//! accumulation. Everything downstream (requantization, bias, post-ops)
//! is out of its hands.
//!
//! Providers are selected once, at primitive creation, from detected CPU
//! capability; the chosen provider is held behind an `Arc` for the life
//! of the primitive and invoked concurrently without synchronization.

use intq_common::{IntqError, Result};
use std::sync::Arc;

pub mod capability;
pub mod scalar;

#[cfg(target_arch = "x86_64")]
pub mod x86;

pub use capability::{CpuCapabilities, SimdLevel};
pub use scalar::ScalarGemm;

#[cfg(target_arch = "x86_64")]
pub use x86::Avx2Gemm;

// ── Source view ──────────────────────────────────────────────────────

/// Borrowed view of the 8-bit source operand.
#[derive(Debug, Clone, Copy)]
pub enum SrcView<'a> {
    S8(&'a [i8]),
    U8(&'a [u8]),
}

impl SrcView<'_> {
    pub fn len(&self) -> usize {
        match self {
            SrcView::S8(s) => s.len(),
            SrcView::U8(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Provider trait ───────────────────────────────────────────────────

/// A raw-accumulation matrix-multiply strategy.
///
/// Layout contract: `src` is row-major `[m, k]`; `weights` is row-major
/// `[n, k]` (one row per output channel); `acc` is row-major `[m, n]`.
/// The provider overwrites `acc` completely; it never reads it.
pub trait GemmProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this provider can run on the current CPU.
    fn is_available(&self) -> bool;

    /// `acc[m×n] = src[m×k] · weightsᵗ[n×k]` in 32-bit integer.
    fn gemm_x8s8s32(
        &self,
        src: SrcView<'_>,
        weights: &[i8],
        acc: &mut [i32],
        m: usize,
        n: usize,
        k: usize,
    ) -> Result<()>;
}

/// Shared argument validation for all providers.
pub(crate) fn validate_gemm_args(
    src: &SrcView<'_>,
    weights: &[i8],
    acc: &[i32],
    m: usize,
    n: usize,
    k: usize,
) -> Result<()> {
    if src.len() != m * k {
        return Err(IntqError::invalid_args(format!(
            "source length {} does not match m*k = {}",
            src.len(),
            m * k
        )));
    }
    if weights.len() != n * k {
        return Err(IntqError::invalid_args(format!(
            "weights length {} does not match n*k = {}",
            weights.len(),
            n * k
        )));
    }
    if acc.len() != m * n {
        return Err(IntqError::invalid_args(format!(
            "accumulator length {} does not match m*n = {}",
            acc.len(),
            m * n
        )));
    }
    Ok(())
}

// ── Selection ────────────────────────────────────────────────────────

/// Select the best available gemm provider for the current CPU.
///
/// Providers are ordered best-first; the scalar reference provider is
/// always present so selection cannot fail on any architecture.
pub fn select_provider() -> Arc<dyn GemmProvider> {
    let caps = CpuCapabilities::detect();

    let mut providers: Vec<Arc<dyn GemmProvider>> = Vec::new();
    #[cfg(target_arch = "x86_64")]
    providers.push(Arc::new(Avx2Gemm));
    providers.push(Arc::new(ScalarGemm));

    for provider in providers {
        if provider.is_available() {
            log::debug!("gemm provider: {} selected={}", caps.summary(), provider.name());
            return provider;
        }
    }
    // The scalar provider reports available unconditionally.
    unreachable!("scalar gemm provider must always be available")
}
