//! 8-bit affine quantization
//!
//! [`QuantizedTensor`] is the `i8` sibling of [`Tensor`]: same 32-byte
//! aligned allocation and lifecycle, plus a per-tensor `scale`/`zero_point`
//! pair defining the affine mapping `real ≈ (q - zero_point) * scale`.
//!
//! Quantization is per-tensor and asymmetric: the value range always
//! includes zero so that the zero point stays representable in `i8`.

mod gemm;

pub use gemm::gemm_int8;

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fmt;
use std::ptr::NonNull;

use crate::error::Result;
use crate::tensor::{Tensor, ALIGNMENT};

/// N-dimensional row-major tensor of `i8` codes with affine parameters
pub struct QuantizedTensor {
    data: Option<NonNull<i8>>,
    shape: Vec<usize>,
    size: usize,
    scale: f32,
    zero_point: i8,
}

unsafe impl Send for QuantizedTensor {}
unsafe impl Sync for QuantizedTensor {}

impl QuantizedTensor {
    /// Create a zero-filled quantized tensor with scale 1 and zero point 0
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the shape is empty or contains zero.
    pub fn new(shape: &[usize]) -> Result<Self> {
        // Same shape rules as the float tensor.
        crate::tensor::validate_shape(shape)?;
        let size = shape.iter().product();
        Ok(Self {
            data: allocate_aligned(size),
            shape: shape.to_vec(),
            size,
            scale: 1.0,
            zero_point: 0,
        })
    }

    /// Quantize an `f32` tensor with the asymmetric min/max scheme
    ///
    /// The observed range is widened to include zero. When all elements are
    /// equal, the scale is 1 and every code equals the clamped rounded value.
    /// Otherwise `scale = (max - min) / 255` and the zero point maps `min`
    /// to -128.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the source shape is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// use inferir::{QuantizedTensor, Tensor};
    ///
    /// let t = Tensor::from_vec(vec![4], vec![-1.0, 0.0, 0.5, 1.0]).unwrap();
    /// let q = QuantizedTensor::quantize(&t).unwrap();
    /// let back = q.dequantize().unwrap();
    /// for (&orig, &rt) in t.data().iter().zip(back.data()) {
    ///     assert!((orig - rt).abs() <= q.scale());
    /// }
    /// ```
    pub fn quantize(fp32: &Tensor) -> Result<Self> {
        let mut qt = Self::new(fp32.shape())?;
        let src = fp32.data();

        let mut min_val = src[0];
        let mut max_val = src[0];
        for &x in &src[1..] {
            min_val = min_val.min(x);
            max_val = max_val.max(x);
        }
        min_val = min_val.min(0.0);
        max_val = max_val.max(0.0);

        if (max_val - min_val).abs() < f32::EPSILON {
            // Degenerate range: every element maps to the zero point.
            qt.scale = 1.0;
            qt.zero_point = min_val.round().clamp(-128.0, 127.0) as i8;
            let zero_point = qt.zero_point;
            qt.data_mut().fill(zero_point);
            return Ok(qt);
        }

        qt.scale = (max_val - min_val) / 255.0;
        let inv_scale = 1.0 / qt.scale;

        // Zero point chosen so that min_val maps to -128.
        let zp = (-128.0 - min_val * inv_scale).round().clamp(-128.0, 127.0);
        qt.zero_point = zp as i8;

        let zero_point = f32::from(qt.zero_point);
        for (code, &x) in qt.data_mut().iter_mut().zip(src) {
            *code = (x * inv_scale + zero_point).round().clamp(-128.0, 127.0) as i8;
        }
        Ok(qt)
    }

    /// Reconstruct an `f32` tensor from the codes
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the output tensor cannot be allocated.
    pub fn dequantize(&self) -> Result<Tensor> {
        let mut out = Tensor::new(&self.shape)?;
        let zero_point = f32::from(self.zero_point);
        for (dst, &code) in out.data_mut().iter_mut().zip(self.data()) {
            *dst = (f32::from(code) - zero_point) * self.scale;
        }
        Ok(out)
    }

    /// Get the tensor shape
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Total number of elements
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of dimensions
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Quantization scale (always positive)
    #[must_use]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Quantization zero point
    #[must_use]
    pub fn zero_point(&self) -> i8 {
        self.zero_point
    }

    /// Immutable view of the codes
    #[must_use]
    pub fn data(&self) -> &[i8] {
        match self.data {
            Some(ptr) => unsafe { std::slice::from_raw_parts(ptr.as_ptr(), self.size) },
            None => &[],
        }
    }

    /// Mutable view of the codes
    pub fn data_mut(&mut self) -> &mut [i8] {
        match self.data {
            Some(ptr) => unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), self.size) },
            None => &mut [],
        }
    }

    /// Raw aligned pointer (null when empty)
    #[must_use]
    pub fn as_ptr(&self) -> *const i8 {
        self.data.map_or(std::ptr::null(), |p| p.as_ptr() as *const i8)
    }
}

impl Clone for QuantizedTensor {
    fn clone(&self) -> Self {
        let mut copy = Self {
            data: allocate_aligned(self.size),
            shape: self.shape.clone(),
            size: self.size,
            scale: self.scale,
            zero_point: self.zero_point,
        };
        copy.data_mut().copy_from_slice(self.data());
        copy
    }
}

impl Drop for QuantizedTensor {
    fn drop(&mut self) {
        if let Some(ptr) = self.data {
            unsafe {
                dealloc(ptr.as_ptr().cast::<u8>(), layout_for(self.size));
            }
        }
    }
}

impl fmt::Debug for QuantizedTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuantizedTensor")
            .field("shape", &self.shape)
            .field("scale", &self.scale)
            .field("zero_point", &self.zero_point)
            .finish()
    }
}

fn layout_for(num_elements: usize) -> Layout {
    let bytes = (num_elements + ALIGNMENT - 1) & !(ALIGNMENT - 1);
    Layout::from_size_align(bytes, ALIGNMENT).expect("valid aligned layout")
}

fn allocate_aligned(num_elements: usize) -> Option<NonNull<i8>> {
    if num_elements == 0 {
        return None;
    }
    let layout = layout_for(num_elements);
    // SAFETY: layout has nonzero size.
    let raw = unsafe { alloc_zeroed(layout) };
    match NonNull::new(raw.cast::<i8>()) {
        Some(ptr) => Some(ptr),
        None => std::alloc::handle_alloc_error(layout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_alignment_invariant() {
        let q = QuantizedTensor::new(&[5, 3]).unwrap();
        assert_eq!(q.as_ptr() as usize % ALIGNMENT, 0);
        assert_eq!(q.size(), 15);
    }

    #[test]
    fn test_quantize_known_range() {
        // Range [-1, 1] widened over zero: scale = 2/255.
        let t = Tensor::from_vec(vec![3], vec![-1.0, 0.0, 1.0]).unwrap();
        let q = QuantizedTensor::quantize(&t).unwrap();
        assert!((q.scale() - 2.0 / 255.0).abs() < 1e-7);
        // min maps to -128
        assert_eq!(q.data()[0], -128);
    }

    #[test]
    fn test_quantize_degenerate_constant() {
        let t = Tensor::from_vec(vec![4], vec![0.0; 4]).unwrap();
        let q = QuantizedTensor::quantize(&t).unwrap();
        assert_eq!(q.scale(), 1.0);
        assert_eq!(q.zero_point(), 0);
        assert!(q.data().iter().all(|&c| c == 0));
    }

    #[test]
    fn test_quantize_degenerate_nonzero_constant() {
        // All-positive constant: range widens to [0, 3], not degenerate.
        let t = Tensor::from_vec(vec![2], vec![3.0, 3.0]).unwrap();
        let q = QuantizedTensor::quantize(&t).unwrap();
        let back = q.dequantize().unwrap();
        for &v in back.data() {
            assert!((v - 3.0).abs() <= q.scale());
        }
    }

    #[test]
    fn test_round_trip_error_bound() {
        let values: Vec<f32> = (0..64).map(|i| (i as f32) * 0.37 - 11.0).collect();
        let t = Tensor::from_vec(vec![64], values).unwrap();
        let q = QuantizedTensor::quantize(&t).unwrap();
        let back = q.dequantize().unwrap();
        for (&orig, &rt) in t.data().iter().zip(back.data()) {
            assert!(
                (orig - rt).abs() <= q.scale(),
                "{orig} -> {rt} exceeds one quantum {}",
                q.scale()
            );
        }
    }

    #[test]
    fn test_zero_point_in_range() {
        let t = Tensor::from_vec(vec![2], vec![100.0, 200.0]).unwrap();
        let q = QuantizedTensor::quantize(&t).unwrap();
        // i8 bounds hold by type; the interesting part is that zero encodes
        // exactly to the zero point.
        let zero_code = (0.0 / q.scale() + f32::from(q.zero_point())).round();
        assert!((-128.0..=127.0).contains(&zero_code));
    }

    #[test]
    fn test_clone_is_deep() {
        let t = Tensor::from_vec(vec![3], vec![1.0, -2.0, 0.5]).unwrap();
        let q = QuantizedTensor::quantize(&t).unwrap();
        let mut copy = q.clone();
        copy.data_mut()[0] = 7;
        assert_ne!(q.data()[0], copy.data()[0]);
    }

    proptest! {
        #[test]
        fn prop_round_trip_within_one_quantum(
            values in proptest::collection::vec(-50.0f32..50.0, 1..128)
        ) {
            let n = values.len();
            let t = Tensor::from_vec(vec![n], values).unwrap();
            let q = QuantizedTensor::quantize(&t).unwrap();
            let back = q.dequantize().unwrap();
            for (&orig, &rt) in t.data().iter().zip(back.data()) {
                // One quantum plus a little float slack.
                prop_assert!((orig - rt).abs() <= q.scale() * 1.001 + 1e-6);
            }
        }

        #[test]
        fn prop_scale_positive(
            values in proptest::collection::vec(-10.0f32..10.0, 1..64)
        ) {
            let n = values.len();
            let t = Tensor::from_vec(vec![n], values).unwrap();
            let q = QuantizedTensor::quantize(&t).unwrap();
            prop_assert!(q.scale() > 0.0);
        }
    }
}
