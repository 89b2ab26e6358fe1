//! Tensor implementation
//!
//! This module provides the core `Tensor` type: an exclusively owned,
//! 32-byte-aligned, contiguous buffer of `f32` elements with an N-dimensional
//! row-major shape. The alignment matches the AVX2 load/store width and the
//! tile boundaries of the blocked kernels in [`crate::ops`].

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fmt;
use std::ptr::NonNull;

use crate::error::{InferirError, Result};

/// Required allocation alignment in bytes (AVX2 register width)
pub const ALIGNMENT: usize = 32;

/// Round a byte count up to the next multiple of [`ALIGNMENT`].
#[inline]
fn padded_bytes(bytes: usize) -> usize {
    (bytes + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// N-dimensional row-major tensor over 32-byte-aligned storage
///
/// Invariants, checked on every construction:
/// - `size == shape.iter().product()`
/// - the data pointer is null if and only if `size == 0`, otherwise it is
///   32-byte aligned
///
/// Cloning is a deep copy. [`Tensor::take`] is the ownership-transferring
/// move: the source is reset to the empty tensor (null pointer, size 0,
/// empty shape) and remains safe to drop.
///
/// # Examples
///
/// ```
/// use inferir::Tensor;
///
/// let mut t = Tensor::new(&[2, 3]).unwrap();
/// t.fill(1.5);
/// assert_eq!(t.shape(), &[2, 3]);
/// assert_eq!(t.size(), 6);
/// assert_eq!(t.data()[4], 1.5);
/// ```
#[derive(Default)]
pub struct Tensor {
    data: Option<NonNull<f32>>,
    shape: Vec<usize>,
    size: usize,
}

// The buffer is exclusively owned; no interior aliasing.
unsafe impl Send for Tensor {}
unsafe impl Sync for Tensor {}

impl Tensor {
    /// Create a zero-initialized tensor with the given shape
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the shape is empty or any dimension is
    /// zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use inferir::Tensor;
    ///
    /// let t = Tensor::new(&[4, 8]).unwrap();
    /// assert_eq!(t.size(), 32);
    /// assert!(t.data().iter().all(|&x| x == 0.0));
    /// ```
    pub fn new(shape: &[usize]) -> Result<Self> {
        validate_shape(shape)?;
        let size = shape.iter().product();
        let data = allocate_aligned(size);
        Ok(Self {
            data,
            shape: shape.to_vec(),
            size,
        })
    }

    /// Create a tensor from a shape and flattened row-major data
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the shape is invalid or the data length
    /// does not match the shape's element count.
    ///
    /// # Examples
    ///
    /// ```
    /// use inferir::Tensor;
    ///
    /// let t = Tensor::from_vec(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    /// assert_eq!(t.at(&[1, 0]), 3.0);
    /// ```
    pub fn from_vec(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        validate_shape(&shape)?;
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(InferirError::invalid_argument(format!(
                "data length {} does not match shape {:?} (expected {})",
                data.len(),
                shape,
                expected
            )));
        }
        let mut tensor = Self::new(&shape)?;
        tensor.data_mut().copy_from_slice(&data);
        Ok(tensor)
    }

    /// Transfer ownership of the buffer out of `self`
    ///
    /// The source becomes the empty tensor (null pointer, size 0, empty
    /// shape) and remains safe to drop or reuse.
    ///
    /// # Examples
    ///
    /// ```
    /// use inferir::Tensor;
    ///
    /// let mut a = Tensor::new(&[3]).unwrap();
    /// let b = a.take();
    /// assert!(a.is_empty());
    /// assert_eq!(b.shape(), &[3]);
    /// ```
    #[must_use]
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
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

    /// Check whether the tensor holds no elements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Immutable view of the underlying storage
    #[must_use]
    pub fn data(&self) -> &[f32] {
        match self.data {
            Some(ptr) => unsafe { std::slice::from_raw_parts(ptr.as_ptr(), self.size) },
            None => &[],
        }
    }

    /// Mutable view of the underlying storage
    pub fn data_mut(&mut self) -> &mut [f32] {
        match self.data {
            Some(ptr) => unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), self.size) },
            None => &mut [],
        }
    }

    /// Raw aligned pointer for SIMD kernels (null when empty)
    #[must_use]
    pub fn as_ptr(&self) -> *const f32 {
        self.data.map_or(std::ptr::null(), |p| p.as_ptr() as *const f32)
    }

    /// Raw aligned mutable pointer for SIMD kernels (null when empty)
    pub fn as_mut_ptr(&mut self) -> *mut f32 {
        self.data.map_or(std::ptr::null_mut(), NonNull::as_ptr)
    }

    /// Fill every element with `value`
    pub fn fill(&mut self, value: f32) {
        for x in self.data_mut() {
            *x = value;
        }
    }

    /// Zero out all elements
    pub fn zero(&mut self) {
        self.fill(0.0);
    }

    /// Compute the flat row-major index of a multi-index
    ///
    /// Bounds and rank are checked with `debug_assert!` only; release builds
    /// omit the checks to keep inner loops tight.
    #[must_use]
    pub fn flat_index(&self, indices: &[usize]) -> usize {
        debug_assert_eq!(
            indices.len(),
            self.shape.len(),
            "index rank {} does not match tensor rank {}",
            indices.len(),
            self.shape.len()
        );
        let mut flat = 0;
        let mut stride = 1;
        for i in (0..self.shape.len()).rev() {
            debug_assert!(
                indices[i] < self.shape[i],
                "index {} out of range for dimension {} of size {}",
                indices[i],
                i,
                self.shape[i]
            );
            flat += indices[i] * stride;
            stride *= self.shape[i];
        }
        flat
    }

    /// Element access by multi-index (debug-checked)
    #[must_use]
    pub fn at(&self, indices: &[usize]) -> f32 {
        let idx = self.flat_index(indices);
        self.data()[idx]
    }

    /// Mutable element access by multi-index (debug-checked)
    pub fn at_mut(&mut self, indices: &[usize]) -> &mut f32 {
        let idx = self.flat_index(indices);
        &mut self.data_mut()[idx]
    }
}

impl Clone for Tensor {
    fn clone(&self) -> Self {
        let data = allocate_aligned(self.size);
        let mut copy = Self {
            data,
            shape: self.shape.clone(),
            size: self.size,
        };
        copy.data_mut().copy_from_slice(self.data());
        copy
    }
}

impl Drop for Tensor {
    fn drop(&mut self) {
        if let Some(ptr) = self.data {
            unsafe {
                dealloc(ptr.as_ptr().cast::<u8>(), layout_for(self.size));
            }
        }
    }
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.data() == other.data()
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("size", &self.size)
            .finish()
    }
}

pub(crate) fn validate_shape(shape: &[usize]) -> Result<()> {
    if shape.is_empty() {
        return Err(InferirError::invalid_argument("shape cannot be empty"));
    }
    if shape.contains(&0) {
        return Err(InferirError::invalid_argument(format!(
            "shape dimensions cannot be zero: {shape:?}"
        )));
    }
    Ok(())
}

fn layout_for(num_elements: usize) -> Layout {
    let bytes = padded_bytes(num_elements * std::mem::size_of::<f32>());
    // ALIGNMENT is a nonzero power of two and the padded size cannot overflow
    // isize for any shape this crate accepts.
    Layout::from_size_align(bytes, ALIGNMENT).expect("valid aligned layout")
}

fn allocate_aligned(num_elements: usize) -> Option<NonNull<f32>> {
    if num_elements == 0 {
        return None;
    }
    let layout = layout_for(num_elements);
    // SAFETY: layout has nonzero size.
    let raw = unsafe { alloc_zeroed(layout) };
    match NonNull::new(raw.cast::<f32>()) {
        Some(ptr) => Some(ptr),
        None => std::alloc::handle_alloc_error(layout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_zero_initialized() {
        let t = Tensor::new(&[2, 3, 4]).unwrap();
        assert_eq!(t.shape(), &[2, 3, 4]);
        assert_eq!(t.size(), 24);
        assert_eq!(t.ndim(), 3);
        assert!(t.data().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_alignment_invariant() {
        for shape in [&[1][..], &[7][..], &[3, 5][..], &[2, 3, 4, 5][..]] {
            let t = Tensor::new(shape).unwrap();
            assert_eq!(t.as_ptr() as usize % ALIGNMENT, 0, "shape {shape:?}");
        }
    }

    #[test]
    fn test_size_matches_shape_product() {
        let t = Tensor::new(&[3, 7, 2]).unwrap();
        assert_eq!(t.size(), t.shape().iter().product::<usize>());
    }

    #[test]
    fn test_empty_shape_rejected() {
        let result = Tensor::new(&[]);
        assert!(matches!(
            result.unwrap_err(),
            InferirError::InvalidArgument { .. }
        ));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(Tensor::new(&[2, 0, 3]).is_err());
    }

    #[test]
    fn test_from_vec_size_mismatch() {
        let result = Tensor::from_vec(vec![2, 3], vec![1.0, 2.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_row_major_indexing() {
        let t = Tensor::from_vec(vec![2, 3], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(t.at(&[0, 0]), 0.0);
        assert_eq!(t.at(&[0, 2]), 2.0);
        assert_eq!(t.at(&[1, 0]), 3.0);
        assert_eq!(t.at(&[1, 2]), 5.0);
        assert_eq!(t.flat_index(&[1, 2]), 5);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "out of range")]
    fn test_debug_bounds_check() {
        let t = Tensor::new(&[2, 2]).unwrap();
        let _ = t.at(&[2, 0]);
    }

    #[test]
    fn test_deep_clone() {
        let mut a = Tensor::from_vec(vec![3], vec![1.0, 2.0, 3.0]).unwrap();
        let b = a.clone();
        a.fill(9.0);
        assert_eq!(b.data(), &[1.0, 2.0, 3.0]);
        assert_eq!(b.as_ptr() as usize % ALIGNMENT, 0);
    }

    #[test]
    fn test_take_resets_source() {
        let mut a = Tensor::from_vec(vec![2], vec![1.0, 2.0]).unwrap();
        let b = a.take();
        assert!(a.is_empty());
        assert_eq!(a.ndim(), 0);
        assert!(a.as_ptr().is_null());
        assert_eq!(b.data(), &[1.0, 2.0]);
        // Dropping the emptied source must be safe.
        drop(a);
    }

    #[test]
    fn test_default_is_empty() {
        let t = Tensor::default();
        assert!(t.is_empty());
        assert!(t.as_ptr().is_null());
        assert_eq!(t.shape(), &[] as &[usize]);
    }

    #[test]
    fn test_fill_and_zero() {
        let mut t = Tensor::new(&[4]).unwrap();
        t.fill(2.5);
        assert_eq!(t.data(), &[2.5; 4]);
        t.zero();
        assert_eq!(t.data(), &[0.0; 4]);
    }

    #[test]
    fn test_equality_deep() {
        let a = Tensor::from_vec(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Tensor::from_vec(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let c = Tensor::from_vec(vec![4], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
