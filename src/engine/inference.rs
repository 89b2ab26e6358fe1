//! Inference engine with pre-allocated buffers and profiling

use std::path::Path;
use std::time::Instant;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{
    InferenceErrorKind, InferirError, LoadErrorKind, Result, ValidationErrorKind,
};
use crate::format;
use crate::layers::{Dense, Sequential};
use crate::tensor::Tensor;

/// Profiling statistics for inference calls
///
/// `layer_times_ms` accumulates per-layer wall time across calls; the
/// latency fields describe whole predictions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InferenceStats {
    /// Number of profiled predictions
    pub inference_count: u64,
    /// Total prediction wall time in milliseconds
    pub total_time_ms: f64,
    /// Fastest prediction in milliseconds
    pub min_latency_ms: f64,
    /// Slowest prediction in milliseconds
    pub max_latency_ms: f64,
    /// Mean prediction latency in milliseconds
    pub mean_latency_ms: f64,
    /// Cumulative per-layer time in milliseconds
    pub layer_times_ms: Vec<f64>,
}

/// Executes a loaded model over a chain of pre-allocated buffers
///
/// All intermediate buffers are allocated once at load time by chaining
/// each layer's `output_shape` from the declared input shape, so the
/// steady-state predict path performs no heap allocation. Not thread-safe;
/// wrap in a [`ModelHandle`](crate::handle::ModelHandle) for shared use.
#[derive(Debug)]
pub struct InferenceEngine {
    model: Option<Sequential>,
    input_shape: Vec<usize>,
    buffers: Vec<Tensor>,
    profiling_enabled: bool,
    stats: InferenceStats,
}

impl InferenceEngine {
    /// Load a model file and pre-allocate the buffer chain
    ///
    /// If `input_shape` is empty, the shape is inferred from the first
    /// Dense layer's input size; loading fails if no Dense layer exists.
    ///
    /// # Errors
    ///
    /// Returns `ModelLoad` on file or format problems, `EmptyModel` for a
    /// zero-layer file or when the input shape cannot be inferred.
    pub fn load(
        path: impl AsRef<Path>,
        input_shape: &[usize],
        profiling_enabled: bool,
    ) -> Result<Self> {
        let model = format::load_model(&path)?;

        if model.is_empty() {
            return Err(InferirError::model_load(
                LoadErrorKind::EmptyModel,
                "loaded model has no layers",
            ));
        }

        let input_shape = if input_shape.is_empty() {
            infer_input_shape(&model)?
        } else {
            input_shape.to_vec()
        };

        let mut engine = Self {
            model: Some(model),
            input_shape,
            buffers: Vec::new(),
            profiling_enabled,
            stats: InferenceStats::default(),
        };
        engine.allocate_buffers()?;

        info!(
            "model loaded: {} layers, input shape {:?}",
            engine.layer_count(),
            engine.input_shape
        );
        Ok(engine)
    }

    fn allocate_buffers(&mut self) -> Result<()> {
        let model = self.model.as_ref().expect("allocate_buffers after load");

        self.buffers.clear();
        self.buffers.reserve(model.len());

        let mut current_shape = self.input_shape.clone();
        for i in 0..model.len() {
            current_shape = model.layer(i).output_shape(&current_shape)?;
            self.buffers.push(Tensor::new(&current_shape)?);
        }

        self.stats.layer_times_ms = vec![0.0; model.len()];
        Ok(())
    }

    /// Run inference on a single input
    ///
    /// Returns a deep copy of the output; the internal buffer is reused
    /// across calls. A failed predict leaves the engine in a clean state.
    ///
    /// # Errors
    ///
    /// Returns `Inference(NoModelLoaded)` without a model,
    /// `Validation` on shape mismatch or NaN input, and any layer error.
    pub fn predict(&mut self, input: &Tensor) -> Result<Tensor> {
        let Some(model) = self.model.as_mut() else {
            return Err(InferirError::inference(
                InferenceErrorKind::NoModelLoaded,
                "predict: no model loaded",
            ));
        };

        validate_against(input, &self.input_shape)?;

        let total_start = self.profiling_enabled.then(Instant::now);

        // Layer 0: input -> buffers[0]; layer i: buffers[i-1] -> buffers[i].
        run_layer(
            model,
            0,
            input,
            &mut self.buffers,
            self.profiling_enabled,
            &mut self.stats,
        )?;
        for i in 1..model.len() {
            let (prev, rest) = self.buffers.split_at_mut(i);
            let start = self.profiling_enabled.then(Instant::now);
            model.layer_mut(i).forward(&prev[i - 1], &mut rest[0])?;
            if let Some(start) = start {
                self.stats.layer_times_ms[i] += start.elapsed().as_secs_f64() * 1e3;
            }
        }

        if let Some(start) = total_start {
            let elapsed_ms = start.elapsed().as_secs_f64() * 1e3;
            self.stats.inference_count += 1;
            self.stats.total_time_ms += elapsed_ms;
            self.stats.mean_latency_ms =
                self.stats.total_time_ms / self.stats.inference_count as f64;
            if self.stats.inference_count == 1 {
                self.stats.min_latency_ms = elapsed_ms;
                self.stats.max_latency_ms = elapsed_ms;
            } else {
                self.stats.min_latency_ms = self.stats.min_latency_ms.min(elapsed_ms);
                self.stats.max_latency_ms = self.stats.max_latency_ms.max(elapsed_ms);
            }
        }

        Ok(self.buffers.last().expect("non-empty model").clone())
    }

    /// Run inference over each input in turn
    ///
    /// The engine does not batch across requests; use the
    /// [`DynamicBatcher`](crate::engine::DynamicBatcher) for coalescing.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid input.
    pub fn predict_batch(&mut self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            outputs.push(self.predict(input)?);
        }
        Ok(outputs)
    }

    /// Execute `num_runs` dummy predictions on a zero input, then reset
    /// the profiling counters
    ///
    /// # Errors
    ///
    /// Returns any layer error from the dummy runs.
    pub fn warmup(&mut self, num_runs: usize) -> Result<()> {
        debug!("warmup: {num_runs} runs");
        let dummy = Tensor::new(&self.input_shape)?;
        for _ in 0..num_runs {
            self.predict(&dummy)?;
        }
        self.reset_stats();
        Ok(())
    }

    /// Snapshot of the profiling accumulators
    #[must_use]
    pub fn stats(&self) -> InferenceStats {
        self.stats.clone()
    }

    /// Zero all profiling accumulators, including the per-layer vector
    pub fn reset_stats(&mut self) {
        let n_layers = self.stats.layer_times_ms.len();
        self.stats = InferenceStats {
            layer_times_ms: vec![0.0; n_layers],
            ..InferenceStats::default()
        };
    }

    /// Whether a model is loaded
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Number of layers in the loaded model
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.model.as_ref().map_or(0, Sequential::len)
    }

    /// The expected input shape
    ///
    /// # Errors
    ///
    /// Returns `Inference(NoModelLoaded)` without a model.
    pub fn expected_input_shape(&self) -> Result<&[usize]> {
        if self.model.is_none() {
            return Err(InferirError::inference(
                InferenceErrorKind::NoModelLoaded,
                "expected_input_shape: no model loaded",
            ));
        }
        Ok(&self.input_shape)
    }

    /// Formatted model summary
    ///
    /// # Errors
    ///
    /// Returns `Inference(NoModelLoaded)` without a model.
    pub fn summary(&self) -> Result<String> {
        match &self.model {
            Some(model) => model.summary(&self.input_shape),
            None => Err(InferirError::inference(
                InferenceErrorKind::NoModelLoaded,
                "summary: no model loaded",
            )),
        }
    }
}

fn validate_against(input: &Tensor, input_shape: &[usize]) -> Result<()> {
    if input.ndim() != input_shape.len() {
        return Err(InferirError::validation(
            ValidationErrorKind::ShapeMismatch,
            format!(
                "expected {}D input, got {}D",
                input_shape.len(),
                input.ndim()
            ),
        ));
    }
    if input.shape() != input_shape {
        return Err(InferirError::validation(
            ValidationErrorKind::ShapeMismatch,
            format!(
                "expected input shape {:?}, got {:?}",
                input_shape,
                input.shape()
            ),
        ));
    }
    if let Some(pos) = input.data().iter().position(|v| v.is_nan()) {
        return Err(InferirError::validation(
            ValidationErrorKind::NanInput,
            format!("input contains NaN at index {pos}"),
        ));
    }
    Ok(())
}

fn run_layer(
    model: &mut Sequential,
    index: usize,
    input: &Tensor,
    buffers: &mut [Tensor],
    profiling: bool,
    stats: &mut InferenceStats,
) -> Result<()> {
    let start = profiling.then(Instant::now);
    model.layer_mut(index).forward(input, &mut buffers[index])?;
    if let Some(start) = start {
        stats.layer_times_ms[index] += start.elapsed().as_secs_f64() * 1e3;
    }
    Ok(())
}

/// Infer the input shape from the first Dense layer's `in_features`
fn infer_input_shape(model: &Sequential) -> Result<Vec<usize>> {
    for i in 0..model.len() {
        if let Some(dense) = model.layer(i).as_any().downcast_ref::<Dense>() {
            return Ok(vec![dense.in_features()]);
        }
    }
    Err(InferirError::model_load(
        LoadErrorKind::EmptyModel,
        "cannot infer input shape: no Dense layer found and no input shape provided",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::save_model;
    use crate::layers::{Relu, Softmax};

    fn save_mlp(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let mut model = Sequential::new();
        let mut d1 = Dense::new(4, 8, true).unwrap();
        let w1: Vec<f32> = (0..32).map(|i| 0.1 * (((i % 5) + 1) as f32)).collect();
        d1.set_weights(Tensor::from_vec(vec![8, 4], w1).unwrap())
            .unwrap();
        d1.set_bias(
            Tensor::from_vec(vec![8], (0..8).map(|i| 0.01 * i as f32).collect()).unwrap(),
        )
        .unwrap();
        model.add(Box::new(d1));
        model.add(Box::new(Relu));
        let mut d2 = Dense::new(8, 3, true).unwrap();
        let w2: Vec<f32> = (0..24).map(|i| 0.1 * (((i % 5) + 1) as f32)).collect();
        d2.set_weights(Tensor::from_vec(vec![3, 8], w2).unwrap())
            .unwrap();
        model.add(Box::new(d2));
        model.add(Box::new(Softmax));

        let path = dir.path().join("mlp.titan");
        save_model(&model, &path).unwrap();
        path
    }

    #[test]
    fn test_load_infers_input_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_mlp(&dir);
        let engine = InferenceEngine::load(&path, &[], false).unwrap();
        assert_eq!(engine.expected_input_shape().unwrap(), &[4]);
        assert_eq!(engine.layer_count(), 4);
        assert!(engine.is_loaded());
    }

    #[test]
    fn test_predict_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_mlp(&dir);
        let mut engine = InferenceEngine::load(&path, &[], false).unwrap();
        let input = Tensor::from_vec(vec![4], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let output = engine.predict(&input).unwrap();
        assert_eq!(output.shape(), &[3]);
        let sum: f32 = output.data().iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_predict_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_mlp(&dir);
        let mut engine = InferenceEngine::load(&path, &[], false).unwrap();
        let bad = Tensor::new(&[5]).unwrap();
        let err = engine.predict(&bad).unwrap_err();
        assert!(matches!(
            err,
            InferirError::Validation {
                kind: ValidationErrorKind::ShapeMismatch,
                ..
            }
        ));
    }

    #[test]
    fn test_predict_nan_rejected_then_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_mlp(&dir);
        let mut engine = InferenceEngine::load(&path, &[], false).unwrap();

        let bad = Tensor::from_vec(vec![4], vec![1.0, f32::NAN, 3.0, 4.0]).unwrap();
        let err = engine.predict(&bad).unwrap_err();
        assert!(matches!(
            err,
            InferirError::Validation {
                kind: ValidationErrorKind::NanInput,
                ..
            }
        ));

        // Fail-fast: engine state stays usable.
        let good = Tensor::from_vec(vec![4], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!(engine.predict(&good).is_ok());
    }

    #[test]
    fn test_profiling_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_mlp(&dir);
        let mut engine = InferenceEngine::load(&path, &[], true).unwrap();
        let input = Tensor::from_vec(vec![4], vec![1.0, 2.0, 3.0, 4.0]).unwrap();

        engine.predict(&input).unwrap();
        engine.predict(&input).unwrap();

        let stats = engine.stats();
        assert_eq!(stats.inference_count, 2);
        assert!(stats.total_time_ms >= 0.0);
        assert!(stats.min_latency_ms <= stats.max_latency_ms);
        assert_eq!(stats.layer_times_ms.len(), 4);

        engine.reset_stats();
        let stats = engine.stats();
        assert_eq!(stats.inference_count, 0);
        assert_eq!(stats.layer_times_ms, vec![0.0; 4]);
    }

    #[test]
    fn test_warmup_clears_stats() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_mlp(&dir);
        let mut engine = InferenceEngine::load(&path, &[], true).unwrap();
        engine.warmup(3).unwrap();
        assert_eq!(engine.stats().inference_count, 0);
    }

    #[test]
    fn test_predict_batch_iterates() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_mlp(&dir);
        let mut engine = InferenceEngine::load(&path, &[], false).unwrap();
        let inputs: Vec<Tensor> = (0..3)
            .map(|i| {
                Tensor::from_vec(vec![4], vec![i as f32, 1.0, 2.0, 3.0]).unwrap()
            })
            .collect();
        let outputs = engine.predict_batch(&inputs).unwrap();
        assert_eq!(outputs.len(), 3);
        for out in outputs {
            assert_eq!(out.shape(), &[3]);
        }
    }

    #[test]
    fn test_input_shape_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_mlp(&dir);
        // Batched override: shape (2, 4) flows through the Dense 2-D path.
        let mut engine = InferenceEngine::load(&path, &[2, 4], false).unwrap();
        let input = Tensor::new(&[2, 4]).unwrap();
        let output = engine.predict(&input).unwrap();
        assert_eq!(output.shape(), &[2, 3]);
    }

    #[test]
    fn test_no_dense_no_shape_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = Sequential::new();
        model.add(Box::new(Relu));
        let path = dir.path().join("act_only.titan");
        save_model(&model, &path).unwrap();

        let err = InferenceEngine::load(&path, &[], false).unwrap_err();
        assert!(matches!(
            err,
            InferirError::ModelLoad {
                kind: LoadErrorKind::EmptyModel,
                ..
            }
        ));

        // With an explicit shape the same file loads fine.
        assert!(InferenceEngine::load(&path, &[4], false).is_ok());
    }

    #[test]
    fn test_empty_model_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let model = Sequential::new();
        let path = dir.path().join("empty.titan");
        save_model(&model, &path).unwrap();
        let err = InferenceEngine::load(&path, &[4], false).unwrap_err();
        assert!(matches!(
            err,
            InferirError::ModelLoad {
                kind: LoadErrorKind::EmptyModel,
                ..
            }
        ));
    }
}
