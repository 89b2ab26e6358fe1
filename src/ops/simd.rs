//! Blocked AVX2+FMA matrix multiplication
//!
//! Three-level cache blocking (MC=64, NC=64, KC=256) with an 8-wide inner
//! loop: contiguous loads from A, a gathered column from B, fused
//! multiply-add into a vector accumulator, horizontal reduction, and a scalar
//! tail for K not divisible by 8. Output tiles accumulate into zeroed
//! storage, so the summation order differs from the scalar reference;
//! callers must compare with a tolerance, not bit-exactly.

use crate::error::Result;
use crate::tensor::Tensor;

use super::{ensure_shape, matmul, validate_matmul_shapes};

/// Row-block size (L1-resident tile height)
const MC: usize = 64;
/// Column-block size
const NC: usize = 64;
/// Depth-block size
const KC: usize = 256;

/// Check whether the running CPU supports the AVX2+FMA fast path
#[must_use]
pub fn cpu_supports_avx2_fma() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        std::arch::is_x86_feature_detected!("avx2") && std::arch::is_x86_feature_detected!("fma")
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        false
    }
}

/// Human-readable CPU feature report
#[must_use]
pub fn cpu_features() -> String {
    format!(
        "AVX2+FMA: {}",
        if cpu_supports_avx2_fma() { "YES" } else { "NO" }
    )
}

/// Dense matrix product with runtime dispatch
///
/// Uses the blocked SIMD kernel when AVX2+FMA is available, otherwise the
/// scalar reference.
///
/// # Errors
///
/// Returns `InvalidArgument` on shape mismatch.
pub fn matmul_auto(a: &Tensor, b: &Tensor, c: &mut Tensor) -> Result<()> {
    if cpu_supports_avx2_fma() {
        matmul_simd(a, b, c)
    } else {
        matmul(a, b, c)
    }
}

/// Blocked SIMD matrix product `C = A @ B`
///
/// Falls back to the scalar reference on CPUs without AVX2+FMA, so the call
/// is always safe.
///
/// # Errors
///
/// Returns `InvalidArgument` on shape mismatch.
pub fn matmul_simd(a: &Tensor, b: &Tensor, c: &mut Tensor) -> Result<()> {
    validate_matmul_shapes(a.shape(), b.shape())?;

    #[cfg(target_arch = "x86_64")]
    {
        if cpu_supports_avx2_fma() {
            let m = a.shape()[0];
            let k = a.shape()[1];
            let n = b.shape()[1];
            ensure_shape(c, &[m, n])?;
            c.zero();
            // SAFETY: AVX2 and FMA availability checked above; shapes
            // validated; buffers sized m*k, k*n, m*n.
            unsafe {
                matmul_avx2(a.data(), b.data(), c.data_mut(), m, k, n);
            }
            return Ok(());
        }
    }

    matmul(a, b, c)
}

/// AVX2 micro-kernel behind [`matmul_simd`]
///
/// # Safety
///
/// Caller must ensure AVX2 and FMA are available
/// (`is_x86_feature_detected!`) and that `a`, `b`, `c` hold at least
/// `m*k`, `k*n`, `m*n` elements respectively, with `c` zero-initialized.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
#[allow(unsafe_op_in_unsafe_fn)]
unsafe fn matmul_avx2(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    #[allow(clippy::wildcard_imports)]
    use std::arch::x86_64::*;

    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    // Blocked accumulation: C += A @ B over (MC, KC, NC) tiles.
    for i0 in (0..m).step_by(MC) {
        let ib = MC.min(m - i0);

        for k0 in (0..k).step_by(KC) {
            let kb = KC.min(k - k0);

            for j0 in (0..n).step_by(NC) {
                let jb = NC.min(n - j0);

                for i in i0..i0 + ib {
                    for j in j0..j0 + jb {
                        let mut sum_vec = _mm256_setzero_ps();

                        // 8-wide inner loop: contiguous A row, gathered B column
                        // (B is row-major, so its column stride is n).
                        let mut kk = k0;
                        while kk + 8 <= k0 + kb {
                            let a_vec = _mm256_loadu_ps(a_ptr.add(i * k + kk));
                            let b_vec = _mm256_set_ps(
                                *b_ptr.add((kk + 7) * n + j),
                                *b_ptr.add((kk + 6) * n + j),
                                *b_ptr.add((kk + 5) * n + j),
                                *b_ptr.add((kk + 4) * n + j),
                                *b_ptr.add((kk + 3) * n + j),
                                *b_ptr.add((kk + 2) * n + j),
                                *b_ptr.add((kk + 1) * n + j),
                                *b_ptr.add(kk * n + j),
                            );
                            sum_vec = _mm256_fmadd_ps(a_vec, b_vec, sum_vec);
                            kk += 8;
                        }

                        let mut sum = horizontal_sum_avx2(sum_vec);

                        // Scalar tail for K not divisible by 8
                        while kk < k0 + kb {
                            sum += a[i * k + kk] * b[kk * n + j];
                            kk += 1;
                        }

                        c[i * n + j] += sum;
                    }
                }
            }
        }
    }
}

/// Horizontal sum of the 8 lanes of an AVX2 register
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
#[allow(unsafe_op_in_unsafe_fn)]
unsafe fn horizontal_sum_avx2(v: std::arch::x86_64::__m256) -> f32 {
    #[allow(clippy::wildcard_imports)]
    use std::arch::x86_64::*;

    let hi = _mm256_extractf128_ps(v, 1);
    let lo = _mm256_castps256_ps128(v);
    let mut sum128 = _mm_add_ps(hi, lo);
    sum128 = _mm_hadd_ps(sum128, sum128);
    sum128 = _mm_hadd_ps(sum128, sum128);
    _mm_cvtss_f32(sum128)
}
