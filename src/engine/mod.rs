//! Inference engine: compilation, execution, and scheduling
//!
//! - [`compile`] rewrites a layer graph (fusion, optional int8 quantization)
//!   and pre-allocates one buffer per layer.
//! - [`InferenceEngine`] owns a loaded model and runs validated,
//!   optionally profiled predictions over pre-allocated buffers.
//! - [`ThreadPool`] executes caller-submitted tasks on worker threads.
//! - [`DynamicBatcher`] coalesces concurrent single-sample requests into
//!   stacked batches.

mod batcher;
mod compiler;
mod inference;
mod thread_pool;

pub use batcher::{BatcherConfig, DynamicBatcher, PredictionHandle};
pub use compiler::{compile, CompileOptions, CompiledModel};
pub use inference::{InferenceEngine, InferenceStats};
pub use thread_pool::{TaskHandle, ThreadPool};
