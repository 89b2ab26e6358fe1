//! Fully-connected layer

use std::any::Any;

use crate::error::{InferirError, Result};
use crate::ops;
use crate::tensor::Tensor;

use super::Layer;

/// Fully-connected layer: `y = W @ x + b`
///
/// Weights are stored as `(out_features, in_features)`. A 1-D input is
/// treated as a single sample; a 2-D `(batch, in_features)` input computes
/// `Y = X @ W^T + b` with the bias broadcast across the batch.
#[derive(Debug, Clone)]
pub struct Dense {
    in_features: usize,
    out_features: usize,
    use_bias: bool,
    weights: Tensor,
    bias: Tensor,
    // Scratch for the transposed weight view used in the batched path.
    weights_t: Tensor,
}

impl Dense {
    /// Create a Dense layer with zero-initialized parameters
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if either dimension is zero.
    pub fn new(in_features: usize, out_features: usize, use_bias: bool) -> Result<Self> {
        if in_features == 0 || out_features == 0 {
            return Err(InferirError::invalid_argument(
                "Dense: in_features and out_features must be > 0",
            ));
        }
        Ok(Self {
            in_features,
            out_features,
            use_bias,
            weights: Tensor::new(&[out_features, in_features])?,
            bias: Tensor::new(&[out_features])?,
            weights_t: Tensor::default(),
        })
    }

    /// Input feature count
    #[must_use]
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Output feature count
    #[must_use]
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Whether the layer applies a bias
    #[must_use]
    pub fn has_bias(&self) -> bool {
        self.use_bias
    }

    /// Weight matrix `(out_features, in_features)`
    #[must_use]
    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    /// Mutable weight matrix (for loading)
    pub fn weights_mut(&mut self) -> &mut Tensor {
        &mut self.weights
    }

    /// Bias vector `(out_features,)`
    #[must_use]
    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    /// Replace the weight matrix
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the shape is not
    /// `(out_features, in_features)`.
    pub fn set_weights(&mut self, weights: Tensor) -> Result<()> {
        let expected = [self.out_features, self.in_features];
        if weights.shape() != expected {
            return Err(InferirError::invalid_argument(format!(
                "Dense::set_weights: expected shape ({}, {}), got {:?}",
                self.out_features,
                self.in_features,
                weights.shape()
            )));
        }
        self.weights = weights;
        Ok(())
    }

    /// Replace the bias vector
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if bias is disabled or the shape is wrong.
    pub fn set_bias(&mut self, bias: Tensor) -> Result<()> {
        if !self.use_bias {
            return Err(InferirError::invalid_argument(
                "Dense::set_bias: bias is disabled for this layer",
            ));
        }
        if bias.shape() != [self.out_features] {
            return Err(InferirError::invalid_argument(format!(
                "Dense::set_bias: expected shape ({},), got {:?}",
                self.out_features,
                bias.shape()
            )));
        }
        self.bias = bias;
        Ok(())
    }
}

impl Layer for Dense {
    fn forward(&mut self, input: &Tensor, output: &mut Tensor) -> Result<()> {
        match input.ndim() {
            1 => {
                if input.shape()[0] != self.in_features {
                    return Err(InferirError::invalid_argument(format!(
                        "Dense: expected input size {}, got {}",
                        self.in_features,
                        input.shape()[0]
                    )));
                }

                ops::matvec(&self.weights, input, output)?;

                if self.use_bias {
                    for (out, &b) in output.data_mut().iter_mut().zip(self.bias.data()) {
                        *out += b;
                    }
                }
                Ok(())
            }
            2 => {
                if input.shape()[1] != self.in_features {
                    return Err(InferirError::invalid_argument(format!(
                        "Dense: expected input features {}, got {}",
                        self.in_features,
                        input.shape()[1]
                    )));
                }

                ops::transpose(&self.weights, &mut self.weights_t)?;
                ops::matmul_auto(input, &self.weights_t, output)?;

                if self.use_bias {
                    let batch = input.shape()[0];
                    let out_data = output.data_mut();
                    let bias = self.bias.data();
                    for r in 0..batch {
                        for c in 0..self.out_features {
                            out_data[r * self.out_features + c] += bias[c];
                        }
                    }
                }
                Ok(())
            }
            other => Err(InferirError::invalid_argument(format!(
                "Dense: expected 1D or 2D input, got {other}D"
            ))),
        }
    }

    fn name(&self) -> String {
        format!("Dense({}, {})", self.in_features, self.out_features)
    }

    fn parameter_count(&self) -> usize {
        let mut count = self.out_features * self.in_features;
        if self.use_bias {
            count += self.out_features;
        }
        count
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        match input_shape.len() {
            1 => Ok(vec![self.out_features]),
            2 => Ok(vec![input_shape[0], self.out_features]),
            other => Err(InferirError::invalid_argument(format!(
                "Dense::output_shape: expected 1D or 2D, got {other}D"
            ))),
        }
    }

    fn clone_layer(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
