//! Neural network layers
//!
//! A closed set of inference-only layers behind the [`Layer`] trait:
//! Dense, the element-wise activations, Conv2D, pooling, Flatten, the
//! compiler-produced fused variants, and int8 `QuantizedDense`.
//!
//! Parameter tensors (weights, biases) are owned by the layer that uses
//! them; intermediate tensors are owned by the engine. `forward` takes
//! `&mut self` because convolution layers reuse per-layer scratch buffers
//! across calls.

mod activation;
mod conv2d;
mod dense;
mod flatten;
mod fused;
mod pooling;
mod quantized_dense;
mod sequential;

pub use activation::{Relu, Sigmoid, Softmax, Tanh};
pub use conv2d::{Conv2D, PaddingMode};
pub use dense::Dense;
pub use flatten::Flatten;
pub use fused::{FusedDenseRelu, FusedDenseSigmoid};
pub use pooling::{AvgPool2D, MaxPool2D};
pub use quantized_dense::QuantizedDense;
pub use sequential::Sequential;

use std::any::Any;

use crate::error::Result;
use crate::tensor::Tensor;

/// Uniform polymorphic layer interface
///
/// Implementations form a closed set; `as_any` is the downcast seam used by
/// the fusion pass, the quantization pass, the serializer, and input-shape
/// inference.
pub trait Layer: Send {
    /// Run the layer over `input`, writing into `output`
    ///
    /// If `output`'s shape does not match the layer's output shape for this
    /// input, the layer reallocates it; otherwise existing storage is
    /// reused. `input` and `output` must not alias.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` on rank or dimension mismatch.
    fn forward(&mut self, input: &Tensor, output: &mut Tensor) -> Result<()>;

    /// Human-readable layer name, e.g. `Dense(4, 8)`
    fn name(&self) -> String;

    /// Number of trainable parameters held by the layer
    fn parameter_count(&self) -> usize;

    /// Pure shape inference: the output shape for a given input shape
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the input shape is unsupported.
    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>>;

    /// Deep copy including parameter tensors
    fn clone_layer(&self) -> Box<dyn Layer>;

    /// Downcast support for the compiler and serializer
    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_shape_agrees_with_output_shape() {
        // The invariant holds for every variant; spot-check a mixed stack.
        let mut layers: Vec<Box<dyn Layer>> = vec![
            Box::new(Dense::new(4, 8, true).unwrap()),
            Box::new(Relu),
            Box::new(Flatten),
            Box::new(Softmax),
        ];
        let mut input = Tensor::new(&[4]).unwrap();
        input.fill(0.5);

        for layer in &mut layers {
            let declared = layer.output_shape(input.shape()).unwrap();
            let mut output = Tensor::default();
            layer.forward(&input, &mut output).unwrap();
            assert_eq!(output.shape(), &declared[..], "layer {}", layer.name());
            input = output;
        }
    }

    #[test]
    fn test_clone_layer_is_independent() {
        let mut dense = Dense::new(2, 2, false).unwrap();
        dense.weights_mut().fill(1.0);
        let clone = dense.clone_layer();

        dense.weights_mut().fill(5.0);

        let cloned_dense = clone.as_any().downcast_ref::<Dense>().unwrap();
        assert!(cloned_dense.weights().data().iter().all(|&w| w == 1.0));
    }
}
