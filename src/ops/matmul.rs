//! Reference dense linear algebra
//!
//! Scalar implementations with deterministic left-to-right summation order.
//! The blocked SIMD variant in [`super::simd`] shares the same observable
//! behavior up to floating-point reassociation.

use crate::error::{InferirError, Result};
use crate::tensor::Tensor;

use super::{ensure_shape, validate_matmul_shapes};

/// Dense matrix product `C = A @ B` (naive reference)
///
/// `A` is M×K, `B` is K×N, `C` becomes M×N. Each output element is a single
/// scalar accumulation over K in left-to-right order.
///
/// # Errors
///
/// Returns `InvalidArgument` if either operand is not 2-D or the inner
/// dimensions disagree.
///
/// # Examples
///
/// ```
/// use inferir::{ops, Tensor};
///
/// let a = Tensor::from_vec(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
/// let b = Tensor::from_vec(vec![2, 2], vec![5.0, 6.0, 7.0, 8.0]).unwrap();
/// let mut c = Tensor::default();
/// ops::matmul(&a, &b, &mut c).unwrap();
/// assert_eq!(c.data(), &[19.0, 22.0, 43.0, 50.0]);
/// ```
pub fn matmul(a: &Tensor, b: &Tensor, c: &mut Tensor) -> Result<()> {
    validate_matmul_shapes(a.shape(), b.shape())?;

    let m = a.shape()[0];
    let k = a.shape()[1];
    let n = b.shape()[1];

    ensure_shape(c, &[m, n])?;

    let a_data = a.data();
    let b_data = b.data();
    let c_data = c.data_mut();

    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0f32;
            for l in 0..k {
                sum += a_data[i * k + l] * b_data[l * n + j];
            }
            c_data[i * n + j] = sum;
        }
    }
    Ok(())
}

/// Matrix-vector product `y = A @ x`
///
/// # Errors
///
/// Returns `InvalidArgument` if `A` is not 2-D, `x` is not 1-D, or the
/// dimensions disagree.
pub fn matvec(a: &Tensor, x: &Tensor, y: &mut Tensor) -> Result<()> {
    if a.ndim() != 2 {
        return Err(InferirError::invalid_argument(format!(
            "matvec requires a 2D matrix, got {}D",
            a.ndim()
        )));
    }
    if x.ndim() != 1 {
        return Err(InferirError::invalid_argument(format!(
            "matvec requires a 1D vector, got {}D",
            x.ndim()
        )));
    }
    if a.shape()[1] != x.shape()[0] {
        return Err(InferirError::invalid_argument(format!(
            "matvec shape mismatch: A has {} columns, x has {} elements",
            a.shape()[1],
            x.shape()[0]
        )));
    }

    let m = a.shape()[0];
    let n = a.shape()[1];

    ensure_shape(y, &[m])?;

    let a_data = a.data();
    let x_data = x.data();
    let y_data = y.data_mut();

    for i in 0..m {
        let mut sum = 0.0f32;
        for j in 0..n {
            sum += a_data[i * n + j] * x_data[j];
        }
        y_data[i] = sum;
    }
    Ok(())
}

/// Transpose a 2-D matrix: `B[j, i] = A[i, j]`
///
/// # Errors
///
/// Returns `InvalidArgument` if `A` is not 2-D.
pub fn transpose(a: &Tensor, b: &mut Tensor) -> Result<()> {
    if a.ndim() != 2 {
        return Err(InferirError::invalid_argument(format!(
            "transpose requires a 2D matrix, got {}D",
            a.ndim()
        )));
    }

    let m = a.shape()[0];
    let n = a.shape()[1];

    ensure_shape(b, &[n, m])?;

    let a_data = a.data();
    let b_data = b.data_mut();

    for i in 0..m {
        for j in 0..n {
            b_data[j * m + i] = a_data[i * n + j];
        }
    }
    Ok(())
}

/// Element-wise addition `C = A + B`
///
/// # Errors
///
/// Returns `InvalidArgument` if shapes differ.
pub fn add(a: &Tensor, b: &Tensor, c: &mut Tensor) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(InferirError::invalid_argument(format!(
            "add requires matching shapes, got {:?} and {:?}",
            a.shape(),
            b.shape()
        )));
    }
    ensure_shape(c, a.shape())?;
    for (out, (&x, &y)) in c.data_mut().iter_mut().zip(a.data().iter().zip(b.data())) {
        *out = x + y;
    }
    Ok(())
}

/// Element-wise scalar addition `C = A + b`
///
/// # Errors
///
/// Returns `InvalidArgument` if the output cannot be allocated.
pub fn add_scalar(a: &Tensor, b: f32, c: &mut Tensor) -> Result<()> {
    ensure_shape(c, a.shape())?;
    for (out, &x) in c.data_mut().iter_mut().zip(a.data()) {
        *out = x + b;
    }
    Ok(())
}

/// Element-wise multiplication `C = A * B`
///
/// # Errors
///
/// Returns `InvalidArgument` if shapes differ.
pub fn multiply(a: &Tensor, b: &Tensor, c: &mut Tensor) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(InferirError::invalid_argument(format!(
            "multiply requires matching shapes, got {:?} and {:?}",
            a.shape(),
            b.shape()
        )));
    }
    ensure_shape(c, a.shape())?;
    for (out, (&x, &y)) in c.data_mut().iter_mut().zip(a.data().iter().zip(b.data())) {
        *out = x * y;
    }
    Ok(())
}

/// Element-wise scalar multiplication `C = A * b`
///
/// # Errors
///
/// Returns `InvalidArgument` if the output cannot be allocated.
pub fn multiply_scalar(a: &Tensor, b: f32, c: &mut Tensor) -> Result<()> {
    ensure_shape(c, a.shape())?;
    for (out, &x) in c.data_mut().iter_mut().zip(a.data()) {
        *out = x * b;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matmul_2x2() {
        let a = Tensor::from_vec(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Tensor::from_vec(vec![2, 2], vec![5.0, 6.0, 7.0, 8.0]).unwrap();
        let mut c = Tensor::default();
        matmul(&a, &b, &mut c).unwrap();
        assert_eq!(c.shape(), &[2, 2]);
        assert_eq!(c.data(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_matmul_rectangular() {
        // (2x3) @ (3x2)
        let a = Tensor::from_vec(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = Tensor::from_vec(vec![3, 2], vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();
        let mut c = Tensor::default();
        matmul(&a, &b, &mut c).unwrap();
        assert_eq!(c.data(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_matmul_inner_mismatch() {
        let a = Tensor::new(&[2, 3]).unwrap();
        let b = Tensor::new(&[2, 2]).unwrap();
        let mut c = Tensor::default();
        assert!(matmul(&a, &b, &mut c).is_err());
    }

    #[test]
    fn test_matmul_reuses_output_storage() {
        let a = Tensor::new(&[2, 2]).unwrap();
        let b = Tensor::new(&[2, 2]).unwrap();
        let mut c = Tensor::new(&[2, 2]).unwrap();
        let ptr_before = c.as_ptr();
        matmul(&a, &b, &mut c).unwrap();
        assert_eq!(ptr_before, c.as_ptr());
    }

    #[test]
    fn test_matvec() {
        let a = Tensor::from_vec(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let x = Tensor::from_vec(vec![3], vec![1.0, 0.0, -1.0]).unwrap();
        let mut y = Tensor::default();
        matvec(&a, &x, &mut y).unwrap();
        assert_eq!(y.data(), &[-2.0, -2.0]);
    }

    #[test]
    fn test_matvec_shape_errors() {
        let a = Tensor::new(&[2, 3]).unwrap();
        let bad = Tensor::new(&[4]).unwrap();
        let mut y = Tensor::default();
        assert!(matvec(&a, &bad, &mut y).is_err());
        let not_vec = Tensor::new(&[2, 2]).unwrap();
        assert!(matvec(&a, &not_vec, &mut y).is_err());
    }

    #[test]
    fn test_transpose() {
        let a = Tensor::from_vec(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let mut b = Tensor::default();
        transpose(&a, &mut b).unwrap();
        assert_eq!(b.shape(), &[3, 2]);
        assert_eq!(b.data(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_transpose_round_trip() {
        let a = Tensor::from_vec(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let mut t = Tensor::default();
        let mut back = Tensor::default();
        transpose(&a, &mut t).unwrap();
        transpose(&t, &mut back).unwrap();
        assert_eq!(a, back);
    }

    #[test]
    fn test_elementwise() {
        let a = Tensor::from_vec(vec![3], vec![1.0, 2.0, 3.0]).unwrap();
        let b = Tensor::from_vec(vec![3], vec![4.0, 5.0, 6.0]).unwrap();
        let mut c = Tensor::default();

        add(&a, &b, &mut c).unwrap();
        assert_eq!(c.data(), &[5.0, 7.0, 9.0]);

        multiply(&a, &b, &mut c).unwrap();
        assert_eq!(c.data(), &[4.0, 10.0, 18.0]);

        add_scalar(&a, 1.0, &mut c).unwrap();
        assert_eq!(c.data(), &[2.0, 3.0, 4.0]);

        multiply_scalar(&a, 2.0, &mut c).unwrap();
        assert_eq!(c.data(), &[2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_elementwise_shape_mismatch() {
        let a = Tensor::new(&[3]).unwrap();
        let b = Tensor::new(&[4]).unwrap();
        let mut c = Tensor::default();
        assert!(add(&a, &b, &mut c).is_err());
        assert!(multiply(&a, &b, &mut c).is_err());
    }
}
