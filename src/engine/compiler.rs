//! Model compilation: fusion, quantization, buffer pre-allocation

use serde::{Deserialize, Serialize};

use crate::error::{InferenceErrorKind, InferirError, Result, ValidationErrorKind};
use crate::layers::{
    Dense, FusedDenseRelu, FusedDenseSigmoid, QuantizedDense, Relu, Sequential, Sigmoid,
};
use crate::tensor::Tensor;

/// Compilation options
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Fuse Dense+ReLU and Dense+Sigmoid pairs into single-pass layers
    pub enable_fusion: bool,
    /// Replace remaining Dense layers with int8 [`QuantizedDense`]
    pub enable_quantization: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            enable_fusion: true,
            enable_quantization: false,
        }
    }
}

/// A compiled model: rewritten layer sequence plus per-layer buffers
///
/// Immutable in structure after construction; the buffers are mutable
/// scratch written during [`CompiledModel::predict`]. One buffer per layer
/// keeps every stage strictly non-aliasing.
pub struct CompiledModel {
    model: Sequential,
    input_shape: Vec<usize>,
    buffers: Vec<Tensor>,
}

impl CompiledModel {
    /// Run the compiled chain on a single input
    ///
    /// # Errors
    ///
    /// Returns `Validation(ShapeMismatch)` if the input shape does not
    /// match the declared shape, or any layer error.
    pub fn predict(&mut self, input: &Tensor) -> Result<Tensor> {
        if self.model.is_empty() {
            return Err(InferirError::inference(
                InferenceErrorKind::NoModelLoaded,
                "CompiledModel: no model loaded",
            ));
        }
        if input.shape() != self.input_shape {
            return Err(InferirError::validation(
                ValidationErrorKind::ShapeMismatch,
                format!(
                    "expected input shape {:?}, got {:?}",
                    self.input_shape,
                    input.shape()
                ),
            ));
        }

        let n_layers = self.model.len();
        self.model.layer_mut(0).forward(input, &mut self.buffers[0])?;
        for i in 1..n_layers {
            // Adjacent buffers never alias: each layer owns its own slot.
            let (prev, rest) = self.buffers.split_at_mut(i);
            self.model
                .layer_mut(i)
                .forward(&prev[i - 1], &mut rest[0])?;
        }

        Ok(self.buffers[n_layers - 1].clone())
    }

    /// Formatted layer table for the compiled sequence
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the shape chain breaks.
    pub fn summary(&self) -> Result<String> {
        self.model.summary(&self.input_shape)
    }

    /// Number of layers after compilation (fusion shrinks the count)
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.model.len()
    }

    /// The declared input shape
    #[must_use]
    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }
}

/// Compile a model: clone, fuse, quantize, pre-allocate
///
/// The source model is left untouched; every parameter tensor is deep
/// copied before rewriting.
///
/// # Errors
///
/// Returns `InvalidArgument` if the model is empty or the shape chain
/// cannot be computed from `input_shape`.
pub fn compile(
    model: &Sequential,
    input_shape: &[usize],
    options: &CompileOptions,
) -> Result<CompiledModel> {
    if model.is_empty() {
        return Err(InferirError::invalid_argument("compile: empty model"));
    }

    // Step 1: clone (per-layer deep copy).
    let mut compiled = model.clone();

    // Step 2: fusion.
    if options.enable_fusion {
        compiled = apply_fusion(&compiled);
    }

    // Step 3: quantization of remaining plain Dense layers.
    if options.enable_quantization {
        compiled = apply_quantization(&compiled)?;
    }

    // Step 4: shape-chain buffer pre-allocation.
    let mut buffers = Vec::with_capacity(compiled.len());
    let mut current_shape = input_shape.to_vec();
    for i in 0..compiled.len() {
        current_shape = compiled.layer(i).output_shape(&current_shape)?;
        buffers.push(Tensor::new(&current_shape)?);
    }

    Ok(CompiledModel {
        model: compiled,
        input_shape: input_shape.to_vec(),
        buffers,
    })
}

/// Left-to-right pairwise fusion of Dense+ReLU and Dense+Sigmoid
fn apply_fusion(model: &Sequential) -> Sequential {
    let mut result = Sequential::new();
    let n = model.len();

    let mut i = 0;
    while i < n {
        if i + 1 < n {
            if let Some(dense) = model.layer(i).as_any().downcast_ref::<Dense>() {
                let next = model.layer(i + 1).as_any();
                if next.is::<Relu>() {
                    result.add(Box::new(FusedDenseRelu::from_dense(dense)));
                    i += 2;
                    continue;
                }
                if next.is::<Sigmoid>() {
                    result.add(Box::new(FusedDenseSigmoid::from_dense(dense)));
                    i += 2;
                    continue;
                }
            }
        }
        result.add(model.layer(i).clone_layer());
        i += 1;
    }

    result
}

/// Replace plain Dense layers with [`QuantizedDense`]; fused layers pass
/// through untouched.
fn apply_quantization(model: &Sequential) -> Result<Sequential> {
    let mut result = Sequential::new();
    for i in 0..model.len() {
        let layer = model.layer(i);
        if let Some(dense) = layer.as_any().downcast_ref::<Dense>() {
            result.add(Box::new(QuantizedDense::from_dense(dense)?));
        } else {
            result.add(layer.clone_layer());
        }
    }
    Ok(result)
}
