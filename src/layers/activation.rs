//! Activation layers
//!
//! Thin stateless wrappers delegating to the kernels in
//! [`crate::ops`]. All of them preserve the input shape; Softmax
//! additionally restricts rank per the kernel contract.

use std::any::Any;

use crate::error::Result;
use crate::ops;
use crate::tensor::Tensor;

use super::Layer;

/// ReLU activation layer
#[derive(Debug, Clone, Copy, Default)]
pub struct Relu;

/// Sigmoid activation layer
#[derive(Debug, Clone, Copy, Default)]
pub struct Sigmoid;

/// Tanh activation layer
#[derive(Debug, Clone, Copy, Default)]
pub struct Tanh;

/// Softmax activation layer (1-D whole-tensor, 2-D row-wise)
#[derive(Debug, Clone, Copy, Default)]
pub struct Softmax;

macro_rules! activation_layer {
    ($ty:ident, $name:literal, $kernel:path) => {
        impl Layer for $ty {
            fn forward(&mut self, input: &Tensor, output: &mut Tensor) -> Result<()> {
                $kernel(input, output)
            }

            fn name(&self) -> String {
                $name.to_string()
            }

            fn parameter_count(&self) -> usize {
                0
            }

            fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
                Ok(input_shape.to_vec())
            }

            fn clone_layer(&self) -> Box<dyn Layer> {
                Box::new(*self)
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

activation_layer!(Relu, "ReLU", ops::relu);
activation_layer!(Sigmoid, "Sigmoid", ops::sigmoid);
activation_layer!(Tanh, "Tanh", ops::tanh);
activation_layer!(Softmax, "Softmax", ops::softmax);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu_layer() {
        let mut layer = Relu;
        let input = Tensor::from_vec(vec![3], vec![-1.0, 0.0, 1.0]).unwrap();
        let mut output = Tensor::default();
        layer.forward(&input, &mut output).unwrap();
        assert_eq!(output.data(), &[0.0, 0.0, 1.0]);
        assert_eq!(layer.name(), "ReLU");
        assert_eq!(layer.parameter_count(), 0);
    }

    #[test]
    fn test_shape_preserved() {
        for mut layer in [
            Box::new(Relu) as Box<dyn Layer>,
            Box::new(Sigmoid),
            Box::new(Tanh),
        ] {
            let input = Tensor::new(&[2, 3, 4]).unwrap();
            let mut output = Tensor::default();
            layer.forward(&input, &mut output).unwrap();
            assert_eq!(output.shape(), input.shape());
            assert_eq!(
                layer.output_shape(&[2, 3, 4]).unwrap(),
                vec![2, 3, 4],
                "{}",
                layer.name()
            );
        }
    }

    #[test]
    fn test_softmax_layer_rank_limit() {
        let mut layer = Softmax;
        let input = Tensor::new(&[2, 2, 2]).unwrap();
        let mut output = Tensor::default();
        assert!(layer.forward(&input, &mut output).is_err());
    }

    #[test]
    fn test_softmax_layer_normalizes() {
        let mut layer = Softmax;
        let input = Tensor::from_vec(vec![2], vec![0.0, 0.0]).unwrap();
        let mut output = Tensor::default();
        layer.forward(&input, &mut output).unwrap();
        assert!((output.data()[0] - 0.5).abs() < 1e-6);
    }
}
