//! Ordered layer container

use std::fmt::Write as _;

use crate::error::{InferenceErrorKind, InferirError, Result};
use crate::tensor::Tensor;

use super::Layer;

/// An ordered sequence of owned layers
///
/// `forward` runs the chain with two ping-pong buffers: layer 0 writes
/// buffer A, layer 1 reads A and writes B, layer 2 reads B and writes A,
/// and so on. Each layer auto-grows the receiving buffer on shape change,
/// so the pair stabilizes after the first call. The compiler replaces this
/// scheme with one pre-allocated buffer per layer for strictly non-aliasing
/// stages.
#[derive(Default)]
pub struct Sequential {
    layers: Vec<Box<dyn Layer>>,
}

impl Sequential {
    /// Create an empty model
    #[must_use]
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Append a layer to the end of the sequence
    pub fn add(&mut self, layer: Box<dyn Layer>) {
        self.layers.push(layer);
    }

    /// Number of layers
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether the model holds no layers
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Borrow a layer by index
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn layer(&self, index: usize) -> &dyn Layer {
        self.layers[index].as_ref()
    }

    /// Mutably borrow a layer by index
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn layer_mut(&mut self, index: usize) -> &mut dyn Layer {
        self.layers[index].as_mut()
    }

    /// Sum of all layers' parameter counts
    #[must_use]
    pub fn total_parameters(&self) -> usize {
        self.layers.iter().map(|l| l.parameter_count()).sum()
    }

    /// Run the full chain on `input` with ping-pong buffering
    ///
    /// # Errors
    ///
    /// Returns `Inference(NoModelLoaded)` if the model is empty, or any
    /// layer's forward error.
    pub fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        if self.layers.is_empty() {
            return Err(InferirError::inference(
                InferenceErrorKind::NoModelLoaded,
                "Sequential::forward: no layers added",
            ));
        }

        let mut buffer_a = Tensor::default();
        let mut buffer_b = Tensor::default();

        self.layers[0].forward(input, &mut buffer_a)?;

        for i in 1..self.layers.len() {
            if i % 2 == 1 {
                self.layers[i].forward(&buffer_a, &mut buffer_b)?;
            } else {
                self.layers[i].forward(&buffer_b, &mut buffer_a)?;
            }
        }

        // Odd layer count ends in A, even in B.
        if self.layers.len() % 2 == 1 {
            Ok(buffer_a)
        } else {
            Ok(buffer_b)
        }
    }

    /// Formatted per-layer table: name, inferred output shape, parameters
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the shape chain breaks for
    /// `input_shape`.
    pub fn summary(&self, input_shape: &[usize]) -> Result<String> {
        let mut out = String::new();
        let rule = "=".repeat(64);

        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "{:<25}{:<25}{:>12}", "Layer", "Output Shape", "Parameters");
        let _ = writeln!(out, "{rule}");

        let mut current_shape = input_shape.to_vec();
        let mut total_params = 0usize;

        for layer in &self.layers {
            current_shape = layer.output_shape(&current_shape)?;
            let params = layer.parameter_count();
            total_params += params;

            let shape_str = format!(
                "({})",
                current_shape
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            let _ = writeln!(out, "{:<25}{:<25}{:>12}", layer.name(), shape_str, params);
        }

        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Total parameters: {total_params}");
        let _ = writeln!(out, "{rule}");

        Ok(out)
    }
}

impl Clone for Sequential {
    fn clone(&self) -> Self {
        Self {
            layers: self.layers.iter().map(|l| l.clone_layer()).collect(),
        }
    }
}

impl std::fmt::Debug for Sequential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequential")
            .field("layers", &self.layers.iter().map(|l| l.name()).collect::<Vec<_>>())
            .finish()
    }
}
