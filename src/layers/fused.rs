//! Compiler-produced fused layers
//!
//! A fused layer performs matmul, bias, and activation in a single pass
//! over the output buffer, halving the memory traffic of the two-layer
//! equivalent. Semantics are identical to Dense followed by the activation.
//! Instances are produced by the fusion pass in
//! [`crate::engine::compile`]; they are not serializable.

use std::any::Any;

use crate::error::{InferirError, Result};
use crate::ops;
use crate::tensor::Tensor;

use super::{Dense, Layer};

/// Dense + ReLU in one pass
#[derive(Debug, Clone)]
pub struct FusedDenseRelu {
    inner: FusedDense,
}

/// Dense + Sigmoid in one pass
#[derive(Debug, Clone)]
pub struct FusedDenseSigmoid {
    inner: FusedDense,
}

/// Shared matmul+bias plumbing for the fused variants
#[derive(Debug, Clone)]
struct FusedDense {
    in_features: usize,
    out_features: usize,
    use_bias: bool,
    weights: Tensor,
    bias: Tensor,
    weights_t: Tensor,
}

impl FusedDense {
    fn from_dense(dense: &Dense) -> Self {
        Self {
            in_features: dense.in_features(),
            out_features: dense.out_features(),
            use_bias: dense.has_bias(),
            weights: dense.weights().clone(),
            bias: dense.bias().clone(),
            weights_t: Tensor::default(),
        }
    }

    /// Matmul into `output`, then apply bias + activation in one sweep.
    fn forward_with<F>(&mut self, input: &Tensor, output: &mut Tensor, activate: F) -> Result<()>
    where
        F: Fn(f32) -> f32,
    {
        match input.ndim() {
            1 => {
                if input.shape()[0] != self.in_features {
                    return Err(InferirError::invalid_argument(format!(
                        "fused dense: expected input size {}, got {}",
                        self.in_features,
                        input.shape()[0]
                    )));
                }
                ops::matvec(&self.weights, input, output)?;
            }
            2 => {
                if input.shape()[1] != self.in_features {
                    return Err(InferirError::invalid_argument(format!(
                        "fused dense: expected input features {}, got {}",
                        self.in_features,
                        input.shape()[1]
                    )));
                }
                ops::transpose(&self.weights, &mut self.weights_t)?;
                ops::matmul_auto(input, &self.weights_t, output)?;
            }
            other => {
                return Err(InferirError::invalid_argument(format!(
                    "fused dense: expected 1D or 2D input, got {other}D"
                )));
            }
        }

        let out_features = self.out_features;
        let bias = self.bias.data();
        let use_bias = self.use_bias;
        for (i, value) in output.data_mut().iter_mut().enumerate() {
            let mut v = *value;
            if use_bias {
                v += bias[i % out_features];
            }
            *value = activate(v);
        }
        Ok(())
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        match input_shape.len() {
            1 => Ok(vec![self.out_features]),
            2 => Ok(vec![input_shape[0], self.out_features]),
            other => Err(InferirError::invalid_argument(format!(
                "fused dense output_shape: expected 1D or 2D, got {other}D"
            ))),
        }
    }

    fn parameter_count(&self) -> usize {
        let mut count = self.out_features * self.in_features;
        if self.use_bias {
            count += self.out_features;
        }
        count
    }
}

impl FusedDenseRelu {
    /// Build from a trained Dense layer, cloning its parameters
    #[must_use]
    pub fn from_dense(dense: &Dense) -> Self {
        Self {
            inner: FusedDense::from_dense(dense),
        }
    }
}

impl FusedDenseSigmoid {
    /// Build from a trained Dense layer, cloning its parameters
    #[must_use]
    pub fn from_dense(dense: &Dense) -> Self {
        Self {
            inner: FusedDense::from_dense(dense),
        }
    }
}

impl Layer for FusedDenseRelu {
    fn forward(&mut self, input: &Tensor, output: &mut Tensor) -> Result<()> {
        self.inner.forward_with(input, output, |v| v.max(0.0))
    }

    fn name(&self) -> String {
        format!(
            "FusedDenseReLU({}, {})",
            self.inner.in_features, self.inner.out_features
        )
    }

    fn parameter_count(&self) -> usize {
        self.inner.parameter_count()
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        self.inner.output_shape(input_shape)
    }

    fn clone_layer(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Layer for FusedDenseSigmoid {
    fn forward(&mut self, input: &Tensor, output: &mut Tensor) -> Result<()> {
        self.inner
            .forward_with(input, output, |v| 1.0 / (1.0 + (-v).exp()))
    }

    fn name(&self) -> String {
        format!(
            "FusedDenseSigmoid({}, {})",
            self.inner.in_features, self.inner.out_features
        )
    }

    fn parameter_count(&self) -> usize {
        self.inner.parameter_count()
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        self.inner.output_shape(input_shape)
    }

    fn clone_layer(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Relu, Sigmoid};

    fn sample_dense() -> Dense {
        let mut dense = Dense::new(3, 2, true).unwrap();
        dense
            .set_weights(
                Tensor::from_vec(vec![2, 3], vec![0.5, -1.0, 0.25, 1.0, 0.1, -0.2]).unwrap(),
            )
            .unwrap();
        dense
            .set_bias(Tensor::from_vec(vec![2], vec![0.1, -0.3]).unwrap())
            .unwrap();
        dense
    }

    fn assert_close(a: &Tensor, b: &Tensor) {
        assert_eq!(a.shape(), b.shape());
        for (&x, &y) in a.data().iter().zip(b.data()) {
            assert!((x - y).abs() < 1e-5, "{x} vs {y}");
        }
    }

    #[test]
    fn test_fused_relu_matches_two_layer() {
        let mut dense = sample_dense();
        let mut fused = FusedDenseRelu::from_dense(&dense);

        let input = Tensor::from_vec(vec![3], vec![1.0, -2.0, 0.5]).unwrap();

        let mut dense_out = Tensor::default();
        dense.forward(&input, &mut dense_out).unwrap();
        let mut relu_out = Tensor::default();
        Relu.forward(&dense_out, &mut relu_out).unwrap();

        let mut fused_out = Tensor::default();
        fused.forward(&input, &mut fused_out).unwrap();

        assert_close(&fused_out, &relu_out);
    }

    #[test]
    fn test_fused_sigmoid_matches_two_layer_batched() {
        let mut dense = sample_dense();
        let mut fused = FusedDenseSigmoid::from_dense(&dense);

        let input =
            Tensor::from_vec(vec![2, 3], vec![1.0, -2.0, 0.5, 0.0, 3.0, -1.0]).unwrap();

        let mut dense_out = Tensor::default();
        dense.forward(&input, &mut dense_out).unwrap();
        let mut sig_out = Tensor::default();
        Sigmoid.forward(&dense_out, &mut sig_out).unwrap();

        let mut fused_out = Tensor::default();
        fused.forward(&input, &mut fused_out).unwrap();

        assert_close(&fused_out, &sig_out);
    }

    #[test]
    fn test_fused_metadata() {
        let dense = sample_dense();
        let fused = FusedDenseRelu::from_dense(&dense);
        assert_eq!(fused.parameter_count(), dense.parameter_count());
        assert_eq!(fused.output_shape(&[3]).unwrap(), vec![2]);
        assert_eq!(fused.output_shape(&[4, 3]).unwrap(), vec![4, 2]);
        assert!(fused.name().starts_with("FusedDenseReLU"));
    }

    #[test]
    fn test_fused_shape_errors() {
        let dense = sample_dense();
        let mut fused = FusedDenseSigmoid::from_dense(&dense);
        let bad = Tensor::new(&[4]).unwrap();
        let mut out = Tensor::default();
        assert!(fused.forward(&bad, &mut out).is_err());
        assert!(fused.output_shape(&[1, 1, 3]).is_err());
    }

    #[test]
    fn test_fused_clone_independent() {
        let dense = sample_dense();
        let fused = FusedDenseRelu::from_dense(&dense);
        let clone = fused.clone_layer();
        assert_eq!(clone.parameter_count(), fused.parameter_count());
    }
}
