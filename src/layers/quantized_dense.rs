//! Int8 quantized dense layer

use std::any::Any;

use crate::error::{InferirError, Result};
use crate::ops;
use crate::quantize::{gemm_int8, QuantizedTensor};
use crate::tensor::Tensor;

use super::{Dense, Layer};

/// Dense layer with int8 weights, produced by the quantization pass
///
/// The source Dense's `(out, in)` weight matrix is transposed to
/// `(in, out)` and quantized once at construction; the bias stays in
/// floating point. Each forward quantizes the input, runs the integer GEMM
/// to a float result, and adds the bias. Accuracy is bounded by the
/// per-tensor quantization error of weights and activations.
#[derive(Debug, Clone)]
pub struct QuantizedDense {
    in_features: usize,
    out_features: usize,
    use_bias: bool,
    weights_q: QuantizedTensor,
    bias: Tensor,
}

impl QuantizedDense {
    /// Quantize a trained Dense layer
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the transpose or quantization fails.
    pub fn from_dense(dense: &Dense) -> Result<Self> {
        // Weights stored (out, in); the batched product wants (in, out).
        let mut transposed = Tensor::default();
        ops::transpose(dense.weights(), &mut transposed)?;
        Ok(Self {
            in_features: dense.in_features(),
            out_features: dense.out_features(),
            use_bias: dense.has_bias(),
            weights_q: QuantizedTensor::quantize(&transposed)?,
            bias: dense.bias().clone(),
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

    /// Quantized `(in, out)` weight matrix
    #[must_use]
    pub fn quantized_weights(&self) -> &QuantizedTensor {
        &self.weights_q
    }

    fn forward_2d(&self, input: &Tensor, output: &mut Tensor) -> Result<()> {
        let input_q = QuantizedTensor::quantize(input)?;
        gemm_int8(&input_q, &self.weights_q, output)?;

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
}

impl Layer for QuantizedDense {
    fn forward(&mut self, input: &Tensor, output: &mut Tensor) -> Result<()> {
        match input.ndim() {
            1 => {
                if input.shape()[0] != self.in_features {
                    return Err(InferirError::invalid_argument(format!(
                        "QuantizedDense: expected input size {}, got {}",
                        self.in_features,
                        input.shape()[0]
                    )));
                }
                // Run as a one-row batch, then reshape to 1-D.
                let row =
                    Tensor::from_vec(vec![1, self.in_features], input.data().to_vec())?;
                let mut result = Tensor::default();
                self.forward_2d(&row, &mut result)?;

                let out_shape = [self.out_features];
                if output.shape() != out_shape {
                    *output = Tensor::new(&out_shape)?;
                }
                output.data_mut().copy_from_slice(result.data());
                Ok(())
            }
            2 => {
                if input.shape()[1] != self.in_features {
                    return Err(InferirError::invalid_argument(format!(
                        "QuantizedDense: expected input features {}, got {}",
                        self.in_features,
                        input.shape()[1]
                    )));
                }
                self.forward_2d(input, output)
            }
            other => Err(InferirError::invalid_argument(format!(
                "QuantizedDense: expected 1D or 2D input, got {other}D"
            ))),
        }
    }

    fn name(&self) -> String {
        format!(
            "QuantizedDense({}, {})",
            self.in_features, self.out_features
        )
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
                "QuantizedDense::output_shape: expected 1D or 2D, got {other}D"
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
