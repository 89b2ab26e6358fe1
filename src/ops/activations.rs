//! Activation kernels
//!
//! Element-wise activations plus numerically stabilized softmax. In-place
//! variants are used by the fused layers to avoid a second pass over the
//! output buffer.

use crate::error::{InferirError, Result};
use crate::tensor::Tensor;

use super::ensure_shape;

/// Rectified linear unit: `max(0, x)` element-wise
///
/// # Errors
///
/// Returns `InvalidArgument` if the output cannot be allocated.
pub fn relu(input: &Tensor, output: &mut Tensor) -> Result<()> {
    ensure_shape(output, input.shape())?;
    for (out, &x) in output.data_mut().iter_mut().zip(input.data()) {
        *out = x.max(0.0);
    }
    Ok(())
}

/// In-place ReLU
pub fn relu_inplace(tensor: &mut Tensor) {
    for x in tensor.data_mut() {
        *x = x.max(0.0);
    }
}

/// Logistic sigmoid: `1 / (1 + exp(-x))` element-wise
///
/// # Errors
///
/// Returns `InvalidArgument` if the output cannot be allocated.
pub fn sigmoid(input: &Tensor, output: &mut Tensor) -> Result<()> {
    ensure_shape(output, input.shape())?;
    for (out, &x) in output.data_mut().iter_mut().zip(input.data()) {
        *out = 1.0 / (1.0 + (-x).exp());
    }
    Ok(())
}

/// In-place sigmoid
pub fn sigmoid_inplace(tensor: &mut Tensor) {
    for x in tensor.data_mut() {
        *x = 1.0 / (1.0 + (-*x).exp());
    }
}

/// Hyperbolic tangent element-wise
///
/// # Errors
///
/// Returns `InvalidArgument` if the output cannot be allocated.
pub fn tanh(input: &Tensor, output: &mut Tensor) -> Result<()> {
    ensure_shape(output, input.shape())?;
    for (out, &x) in output.data_mut().iter_mut().zip(input.data()) {
        *out = x.tanh();
    }
    Ok(())
}

/// In-place tanh
pub fn tanh_inplace(tensor: &mut Tensor) {
    for x in tensor.data_mut() {
        *x = x.tanh();
    }
}

fn softmax_row(input: &[f32], output: &mut [f32]) {
    // Subtract the row max before exponentiating so large logits cannot
    // overflow to infinity.
    let mut max_val = f32::NEG_INFINITY;
    for &x in input {
        max_val = max_val.max(x);
    }

    let mut sum = 0.0f32;
    for (out, &x) in output.iter_mut().zip(input) {
        *out = (x - max_val).exp();
        sum += *out;
    }

    for out in output.iter_mut() {
        *out /= sum;
    }
}

/// Numerically stable softmax
///
/// For 1-D input the distribution spans the whole tensor; for 2-D input it
/// is computed row-wise.
///
/// # Errors
///
/// Returns `InvalidArgument` for rank 3 or higher.
///
/// # Examples
///
/// ```
/// use inferir::{ops, Tensor};
///
/// let x = Tensor::from_vec(vec![3], vec![1.0, 2.0, 3.0]).unwrap();
/// let mut y = Tensor::default();
/// ops::softmax(&x, &mut y).unwrap();
/// let sum: f32 = y.data().iter().sum();
/// assert!((sum - 1.0).abs() < 1e-6);
/// ```
pub fn softmax(input: &Tensor, output: &mut Tensor) -> Result<()> {
    if input.ndim() > 2 {
        return Err(InferirError::invalid_argument(format!(
            "softmax supports 1D and 2D tensors only, got {}D",
            input.ndim()
        )));
    }

    ensure_shape(output, input.shape())?;

    if input.ndim() == 1 {
        softmax_row(input.data(), output.data_mut());
    } else {
        let rows = input.shape()[0];
        let cols = input.shape()[1];
        for r in 0..rows {
            softmax_row(
                &input.data()[r * cols..(r + 1) * cols],
                &mut output.data_mut()[r * cols..(r + 1) * cols],
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu() {
        let x = Tensor::from_vec(vec![4], vec![-1.0, 0.0, 2.5, -0.5]).unwrap();
        let mut y = Tensor::default();
        relu(&x, &mut y).unwrap();
        assert_eq!(y.data(), &[0.0, 0.0, 2.5, 0.0]);
    }

    #[test]
    fn test_relu_inplace_matches() {
        let mut x = Tensor::from_vec(vec![3], vec![-2.0, 1.0, -0.1]).unwrap();
        relu_inplace(&mut x);
        assert_eq!(x.data(), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_sigmoid_known_values() {
        let x = Tensor::from_vec(vec![3], vec![0.0, 2.0, -2.0]).unwrap();
        let mut y = Tensor::default();
        sigmoid(&x, &mut y).unwrap();
        assert!((y.data()[0] - 0.5).abs() < 1e-6);
        assert!((y.data()[1] - 0.880_797).abs() < 1e-5);
        assert!((y.data()[2] - 0.119_203).abs() < 1e-5);
    }

    #[test]
    fn test_tanh_wraps_std() {
        let x = Tensor::from_vec(vec![2], vec![0.5, -1.0]).unwrap();
        let mut y = Tensor::default();
        tanh(&x, &mut y).unwrap();
        assert!((y.data()[0] - 0.5f32.tanh()).abs() < 1e-7);
        assert!((y.data()[1] - (-1.0f32).tanh()).abs() < 1e-7);
    }

    #[test]
    fn test_softmax_1d_sums_to_one() {
        let x = Tensor::from_vec(vec![4], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut y = Tensor::default();
        softmax(&x, &mut y).unwrap();
        let sum: f32 = y.data().iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        // Monotone in the input
        assert!(y.data()[3] > y.data()[0]);
    }

    #[test]
    fn test_softmax_2d_row_wise() {
        let x = Tensor::from_vec(vec![2, 3], vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0]).unwrap();
        let mut y = Tensor::default();
        softmax(&x, &mut y).unwrap();
        let row0: f32 = y.data()[..3].iter().sum();
        let row1: f32 = y.data()[3..].iter().sum();
        assert!((row0 - 1.0).abs() < 1e-6);
        assert!((row1 - 1.0).abs() < 1e-6);
        // Uniform logits give a uniform row
        for &v in &y.data()[3..] {
            assert!((v - 1.0 / 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_softmax_large_logits_stable() {
        // Would overflow exp() without the max subtraction.
        let x = Tensor::from_vec(vec![3], vec![1000.0, 999.0, 998.0]).unwrap();
        let mut y = Tensor::default();
        softmax(&x, &mut y).unwrap();
        let sum: f32 = y.data().iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(y.data().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_softmax_rank3_rejected() {
        let x = Tensor::new(&[2, 2, 2]).unwrap();
        let mut y = Tensor::default();
        assert!(softmax(&x, &mut y).is_err());
    }
}
