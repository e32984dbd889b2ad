//! CPU capability detection for provider selection.
//!
//! A [`CpuCapabilities`] snapshot answers "what was detected" once, at
//! primitive creation; the selected provider is recorded alongside it in
//! the logs so a reader can reconstruct why a strategy was chosen.

use std::fmt;

/// SIMD instruction set level available at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum SimdLevel {
    /// No SIMD; scalar fallback only.
    Scalar,
    /// ARM NEON (128-bit).
    Neon,
    /// x86 AVX2 (256-bit).
    Avx2,
    /// x86 AVX-512 (512-bit).
    Avx512,
}

impl fmt::Display for SimdLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimdLevel::Scalar => write!(f, "scalar"),
            SimdLevel::Neon => write!(f, "neon"),
            SimdLevel::Avx2 => write!(f, "avx2"),
            SimdLevel::Avx512 => write!(f, "avx512"),
        }
    }
}

/// Snapshot of what the current CPU provides.
#[derive(Debug, Clone)]
pub struct CpuCapabilities {
    pub simd_level: SimdLevel,
}

impl CpuCapabilities {
    /// Probe the running CPU.
    pub fn detect() -> Self {
        CpuCapabilities { simd_level: runtime_simd_level() }
    }

    /// One-line summary for logs: `detected=avx2`.
    pub fn summary(&self) -> String {
        format!("detected={}", self.simd_level)
    }
}

/// Detect the best SIMD level available on the running CPU.
pub fn runtime_simd_level() -> SimdLevel {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx512f") {
            return SimdLevel::Avx512;
        }
        if is_x86_feature_detected!("avx2") {
            return SimdLevel::Avx2;
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        if std::arch::is_aarch64_feature_detected!("neon") {
            return SimdLevel::Neon;
        }
    }
    SimdLevel::Scalar
}
