//! Numeric kernels over [`Tensor`](crate::Tensor)
//!
//! All kernels follow a uniform contract: `op(inputs…, output: &mut Tensor)`.
//! The output tensor is reallocated when its shape does not match the
//! computed output shape and reused otherwise, so steady-state inference
//! performs no heap allocation. Shape problems surface as
//! [`InvalidArgument`](crate::error::InferirError::InvalidArgument) with a
//! description of the mismatch.
//!
//! Kernels assume input and output do not alias; the engine's per-layer
//! buffer chain guarantees this by construction.

mod activations;
mod conv;
mod matmul;
mod simd;

pub use activations::{
    relu, relu_inplace, sigmoid, sigmoid_inplace, softmax, tanh, tanh_inplace,
};
pub use conv::{col2im, compute_same_padding, conv_output_size, im2col};
pub use matmul::{add, add_scalar, matmul, matvec, multiply, multiply_scalar, transpose};
pub use simd::{cpu_features, cpu_supports_avx2_fma, matmul_auto, matmul_simd};

use crate::error::{InferirError, Result};
use crate::tensor::Tensor;

/// Reallocate `output` to `shape` unless it already matches.
pub(crate) fn ensure_shape(output: &mut Tensor, shape: &[usize]) -> Result<()> {
    if output.shape() != shape {
        *output = Tensor::new(shape)?;
    }
    Ok(())
}

/// Validate that `a_shape` and `b_shape` describe a legal matrix product.
pub(crate) fn validate_matmul_shapes(a_shape: &[usize], b_shape: &[usize]) -> Result<()> {
    if a_shape.len() != 2 || b_shape.len() != 2 {
        return Err(InferirError::invalid_argument(format!(
            "matmul requires 2D matrices, got {}D and {}D",
            a_shape.len(),
            b_shape.len()
        )));
    }
    if a_shape[1] != b_shape[0] {
        return Err(InferirError::invalid_argument(format!(
            "matmul shape mismatch: A({}, {}) @ B({}, {}) - inner dimensions must match",
            a_shape[0], a_shape[1], b_shape[0], b_shape[1]
        )));
    }
    Ok(())
}
