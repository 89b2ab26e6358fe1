//! Integer GEMM over quantized tensors
//!
//! Accumulates `(a - zp_a) * (b - zp_b)` in `i32` and scales the result by
//! `scale_a * scale_b` into a float output. The SIMD path widens `i8` to
//! `i16` before subtracting zero points so the subtraction cannot overflow,
//! then uses a pairwise 16-bit multiply-accumulate into `i32`.

use crate::error::{InferirError, Result};
use crate::ops::ensure_shape;
use crate::tensor::Tensor;

use super::QuantizedTensor;

/// Quantized matrix product `C = dequant(A) @ dequant(B)`
///
/// `A` is M×K, `B` is K×N; the float output is M×N.
///
/// # Errors
///
/// Returns `InvalidArgument` if either operand is not 2-D or the inner
/// dimensions disagree.
pub fn gemm_int8(a: &QuantizedTensor, b: &QuantizedTensor, c: &mut Tensor) -> Result<()> {
    if a.ndim() != 2 || b.ndim() != 2 {
        return Err(InferirError::invalid_argument(format!(
            "gemm_int8: A and B must be 2D, got {}D and {}D",
            a.ndim(),
            b.ndim()
        )));
    }
    if a.shape()[1] != b.shape()[0] {
        return Err(InferirError::invalid_argument(format!(
            "gemm_int8: inner dimensions must match: A({}, {}) @ B({}, {})",
            a.shape()[0],
            a.shape()[1],
            b.shape()[0],
            b.shape()[1]
        )));
    }

    let m = a.shape()[0];
    let k = a.shape()[1];
    let n = b.shape()[1];

    ensure_shape(c, &[m, n])?;

    gemm_int8_impl(
        a.data(),
        b.data(),
        c.data_mut(),
        m,
        k,
        n,
        a.scale(),
        a.zero_point(),
        b.scale(),
        b.zero_point(),
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn gemm_int8_impl(
    a: &[i8],
    b: &[i8],
    c: &mut [f32],
    m: usize,
    k: usize,
    n: usize,
    scale_a: f32,
    zp_a: i8,
    scale_b: f32,
    zp_b: i8,
) {
    let output_scale = scale_a * scale_b;

    #[cfg(target_arch = "x86_64")]
    let use_simd = std::arch::is_x86_feature_detected!("sse4.1");
    #[cfg(not(target_arch = "x86_64"))]
    let use_simd = false;

    for i in 0..m {
        let a_row = &a[i * k..(i + 1) * k];
        for j in 0..n {
            let mut acc: i32 = 0;
            let mut kk = 0;

            #[cfg(target_arch = "x86_64")]
            if use_simd {
                // SAFETY: sse4.1 verified above; a_row holds k elements and
                // b holds k*n, which bounds every 8-wide step.
                acc = unsafe { dot_widened_sse41(a_row, b, j, n, k, zp_a, zp_b) };
                kk = (k / 8) * 8;
            }

            // Scalar path, and the tail of the SIMD path.
            while kk < k {
                let a_val = i32::from(a_row[kk]) - i32::from(zp_a);
                let b_val = i32::from(b[kk * n + j]) - i32::from(zp_b);
                acc += a_val * b_val;
                kk += 1;
            }

            c[i * n + j] = acc as f32 * output_scale;
        }
    }

    let _ = use_simd;
}

/// Zero-point-corrected partial dot product over `floor(k / 8) * 8` elements
///
/// B's column stride is `n`, not unit, so the column is gathered through an
/// 8-element scratch copy before the vector load.
///
/// # Safety
///
/// Caller must ensure SSE4.1 is available, `a_row` holds `k` elements, and
/// `b` holds at least `k * n` elements.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse4.1")]
#[allow(unsafe_op_in_unsafe_fn)]
unsafe fn dot_widened_sse41(
    a_row: &[i8],
    b: &[i8],
    j: usize,
    n: usize,
    k: usize,
    zp_a: i8,
    zp_b: i8,
) -> i32 {
    #[allow(clippy::wildcard_imports)]
    use std::arch::x86_64::*;

    let zpa16 = _mm_set1_epi16(i16::from(zp_a));
    let zpb16 = _mm_set1_epi16(i16::from(zp_b));

    let mut acc: i32 = 0;
    let mut kk = 0;
    while kk + 8 <= k {
        // 8 contiguous codes from the A row.
        let a_raw = _mm_loadl_epi64(a_row.as_ptr().add(kk).cast::<__m128i>());

        // Gather 8 codes from B's column j through a scratch array.
        let mut b_vals = [0i8; 8];
        for (offset, slot) in b_vals.iter_mut().enumerate() {
            *slot = b[(kk + offset) * n + j];
        }
        let b_raw = _mm_loadl_epi64(b_vals.as_ptr().cast::<__m128i>());

        // Sign-extend i8 -> i16, subtract zero points (fits i16), multiply
        // pairs and horizontally add into four i32 lanes.
        let a16 = _mm_sub_epi16(_mm_cvtepi8_epi16(a_raw), zpa16);
        let b16 = _mm_sub_epi16(_mm_cvtepi8_epi16(b_raw), zpb16);
        let prod32 = _mm_madd_epi16(a16, b16);

        let mut lanes = [0i32; 4];
        _mm_storeu_si128(lanes.as_mut_ptr().cast::<__m128i>(), prod32);
        acc += lanes[0] + lanes[1] + lanes[2] + lanes[3];

        kk += 8;
    }
    acc
}
