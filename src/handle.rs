//! Thread-safe public façade
//!
//! [`ModelHandle`] owns one [`InferenceEngine`] behind a mutex; every public
//! operation takes the lock, so a handle can be shared freely across
//! threads. The façade is also the error-translation boundary: validation
//! errors pass through untouched, while kernel-level `InvalidArgument`
//! failures escaping the engine are wrapped as internal inference errors.

use std::sync::Mutex;

use log::info;

use crate::engine::{InferenceEngine, InferenceStats};
use crate::error::{InferenceErrorKind, InferirError, LoadErrorKind, Result};
use crate::logger::{self, LogLevel};
use crate::tensor::Tensor;

/// Mutex-guarded owning wrapper around one inference engine
///
/// # Examples
///
/// ```no_run
/// use inferir::{ModelHandle, Tensor};
///
/// let handle = ModelHandle::builder()
///     .model_path("model.titan")
///     .profiling(true)
///     .warmup_runs(3)
///     .build()
///     .unwrap();
/// let input = Tensor::new(&[4]).unwrap();
/// let output = handle.predict(&input).unwrap();
/// ```
#[derive(Debug)]
pub struct ModelHandle {
    engine: Mutex<InferenceEngine>,
}

impl ModelHandle {
    /// Start configuring a handle
    #[must_use]
    pub fn builder() -> ModelHandleBuilder {
        ModelHandleBuilder::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InferenceEngine> {
        self.engine.lock().expect("model handle mutex poisoned")
    }

    /// Thread-safe single-input inference
    ///
    /// # Errors
    ///
    /// Returns `Validation` on shape mismatch or NaN input, `Inference`
    /// on engine failure.
    pub fn predict(&self, input: &Tensor) -> Result<Tensor> {
        self.lock().predict(input).map_err(translate)
    }

    /// Thread-safe batch inference (one engine pass per input)
    ///
    /// # Errors
    ///
    /// Fails on the first invalid input.
    pub fn predict_batch(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        self.lock().predict_batch(inputs).map_err(translate)
    }

    /// Snapshot of the profiling statistics
    #[must_use]
    pub fn stats(&self) -> InferenceStats {
        self.lock().stats()
    }

    /// Zero the profiling counters
    pub fn reset_stats(&self) {
        self.lock().reset_stats();
    }

    /// Whether a model is loaded
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.lock().is_loaded()
    }

    /// Number of layers in the loaded model
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.lock().layer_count()
    }

    /// Formatted model summary
    ///
    /// # Errors
    ///
    /// Returns `Inference(NoModelLoaded)` without a model.
    pub fn summary(&self) -> Result<String> {
        self.lock().summary().map_err(translate)
    }

    /// The expected input shape
    ///
    /// # Errors
    ///
    /// Returns `Inference(NoModelLoaded)` without a model.
    pub fn expected_input_shape(&self) -> Result<Vec<usize>> {
        self.lock()
            .expected_input_shape()
            .map(<[usize]>::to_vec)
            .map_err(translate)
    }
}

/// Map engine errors to the public taxonomy at the API boundary
fn translate(err: InferirError) -> InferirError {
    match err {
        // Validation and load errors are already structured.
        InferirError::Validation { .. }
        | InferirError::ModelLoad { .. }
        | InferirError::Inference { .. } => err,
        // Kernel-level shape problems escaping the engine indicate an
        // internal inconsistency, not caller misuse.
        InferirError::InvalidArgument { reason } => {
            InferirError::inference(InferenceErrorKind::InternalError, reason)
        }
    }
}

/// Fluent configuration for [`ModelHandle`]
#[derive(Debug, Clone, Default)]
pub struct ModelHandleBuilder {
    model_path: Option<String>,
    profiling_enabled: bool,
    warmup_runs: usize,
    input_shape: Vec<usize>,
    log_level: Option<LogLevel>,
}

impl ModelHandleBuilder {
    /// Path to the `.titan` model file (required)
    #[must_use]
    pub fn model_path(mut self, path: impl Into<String>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    /// Enable latency and per-layer profiling
    #[must_use]
    pub fn profiling(mut self, enable: bool) -> Self {
        self.profiling_enabled = enable;
        self
    }

    /// Number of warm-up runs executed after loading (default 0)
    #[must_use]
    pub fn warmup_runs(mut self, count: usize) -> Self {
        self.warmup_runs = count;
        self
    }

    /// Override the expected input shape (inferred from the first Dense
    /// layer when absent)
    #[must_use]
    pub fn input_shape(mut self, shape: Vec<usize>) -> Self {
        self.input_shape = shape;
        self
    }

    /// Set the global log level before loading
    #[must_use]
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Load the model and construct the handle
    ///
    /// # Errors
    ///
    /// Returns `ModelLoad` with kind `FileNotFound` when the path is
    /// missing or unset, `InvalidFormat` for malformed files, or
    /// `EmptyModel` for zero-layer files.
    pub fn build(self) -> Result<ModelHandle> {
        if let Some(level) = self.log_level {
            logger::set_level(level);
        }

        let Some(path) = self.model_path else {
            return Err(InferirError::model_load(
                LoadErrorKind::FileNotFound,
                "model path not set",
            ));
        };

        info!("loading model from: {path}");

        let mut engine =
            InferenceEngine::load(&path, &self.input_shape, self.profiling_enabled)?;
        if self.warmup_runs > 0 {
            engine.warmup(self.warmup_runs).map_err(translate)?;
        }

        info!("model loaded successfully ({} layers)", engine.layer_count());
        Ok(ModelHandle {
            engine: Mutex::new(engine),
        })
    }
}
