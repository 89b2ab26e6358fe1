//! # Inferir
//!
//! Pure Rust, CPU-only inference engine for pre-trained feed-forward models
//! (MLPs and small CNNs).
//!
//! Inferir (Spanish: "to infer") loads a self-describing `.titan` binary
//! model file, validates inputs, executes a fixed layer sequence over
//! pre-allocated aligned buffers, and returns outputs. It targets
//! low-latency single-request serving and modest-batch throughput on
//! commodity x86-64 hardware, with an AVX2+FMA fast path selected at
//! runtime.
//!
//! ## Features
//!
//! - **Aligned tensors**: 32-byte-aligned buffers sized for the SIMD kernels
//! - **Blocked kernels**: cache-tiled matmul, im2col convolution, int8 GEMM
//! - **Compilation**: Dense+activation fusion and optional int8 weight
//!   quantization
//! - **Serving**: thread-safe model handle, worker pool, and a dynamic
//!   request batcher
//! - **C ABI**: opaque-handle surface for foreign callers
//!
//! ## Example
//!
//! ```no_run
//! use inferir::{ModelHandle, Tensor};
//!
//! let model = ModelHandle::builder()
//!     .model_path("model.titan")
//!     .profiling(true)
//!     .warmup_runs(3)
//!     .build()
//!     .unwrap();
//!
//! let input = Tensor::from_vec(vec![4], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
//! let output = model.predict(&input).unwrap();
//! println!("output: {:?}", output.data());
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// Numeric kernels intentionally cast between index and float domains.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

pub mod engine;
pub mod error;
pub mod ffi;
pub mod format;
pub mod handle;
pub mod layers;
pub mod logger;
pub mod ops;
pub mod quantize;
pub mod tensor;

// Re-exports for convenience
pub use engine::{
    compile, BatcherConfig, CompileOptions, CompiledModel, DynamicBatcher, InferenceEngine,
    InferenceStats, ThreadPool,
};
pub use error::{InferirError, Result};
pub use handle::{ModelHandle, ModelHandleBuilder};
pub use logger::LogLevel;
pub use quantize::QuantizedTensor;
pub use tensor::Tensor;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.contains('.'));
        assert!(VERSION.len() >= 3);
    }
}
