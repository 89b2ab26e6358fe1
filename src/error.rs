//! Error types for Inferir
//!
//! This module defines the structured error taxonomy used throughout the
//! library. Low-level kernels report `InvalidArgument` with a descriptive
//! message; the engine reports `Validation` errors for rejected inputs; the
//! loader reports `ModelLoad` errors; the [`crate::handle::ModelHandle`]
//! façade translates anything else into `Inference` at the API boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Inferir operations
pub type Result<T> = std::result::Result<T, InferirError>;

/// Sub-kind for model loading failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadErrorKind {
    /// Model file path does not exist or cannot be opened
    FileNotFound,
    /// Bad magic, unsupported version, unknown layer tag, or truncation
    InvalidFormat,
    /// Model file contains zero layers
    EmptyModel,
}

/// Sub-kind for inference failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InferenceErrorKind {
    /// Operation requires a loaded model
    NoModelLoaded,
    /// Unexpected internal failure during the layer chain
    InternalError,
}

/// Sub-kind for input validation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationErrorKind {
    /// Input shape does not match the model's expected input shape
    ShapeMismatch,
    /// Input contains NaN values
    NanInput,
}

/// Error type for all Inferir operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferirError {
    /// Model file could not be loaded
    #[error("model load failed ({kind:?}): {reason}")]
    ModelLoad {
        /// Machine-readable failure kind
        kind: LoadErrorKind,
        /// Human-readable context
        reason: String,
    },

    /// Inference could not be performed
    #[error("inference failed ({kind:?}): {reason}")]
    Inference {
        /// Machine-readable failure kind
        kind: InferenceErrorKind,
        /// Human-readable context
        reason: String,
    },

    /// Input rejected before the layer chain ran
    #[error("input validation failed ({kind:?}): {reason}")]
    Validation {
        /// Machine-readable failure kind
        kind: ValidationErrorKind,
        /// Human-readable context
        reason: String,
    },

    /// Kernel-level shape or parameter problem
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Description of the mismatch
        reason: String,
    },
}

impl InferirError {
    /// Shorthand constructor for kernel-level argument errors
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Shorthand constructor for load errors
    pub fn model_load(kind: LoadErrorKind, reason: impl Into<String>) -> Self {
        Self::ModelLoad {
            kind,
            reason: reason.into(),
        }
    }

    /// Shorthand constructor for inference errors
    pub fn inference(kind: InferenceErrorKind, reason: impl Into<String>) -> Self {
        Self::Inference {
            kind,
            reason: reason.into(),
        }
    }

    /// Shorthand constructor for validation errors
    pub fn validation(kind: ValidationErrorKind, reason: impl Into<String>) -> Self {
        Self::Validation {
            kind,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InferirError::validation(
            ValidationErrorKind::ShapeMismatch,
            "expected (4), got (3)",
        );
        let msg = err.to_string();
        assert!(msg.contains("ShapeMismatch"));
        assert!(msg.contains("expected (4)"));
    }

    #[test]
    fn test_error_equality() {
        let a = InferirError::invalid_argument("bad shape");
        let b = InferirError::invalid_argument("bad shape");
        assert_eq!(a, b);
    }

    #[test]
    fn test_error_is_clone() {
        // The batcher broadcasts one error to every request in a failed batch.
        let err = InferirError::inference(InferenceErrorKind::InternalError, "boom");
        let copy = err.clone();
        assert_eq!(err, copy);
    }

    #[test]
    fn test_load_kind_roundtrip_serde() {
        let kind = LoadErrorKind::InvalidFormat;
        let json = serde_json::to_string(&kind).unwrap();
        let back: LoadErrorKind = serde_json::from_str(&json).unwrap();
        assert_eq!(kind, back);
    }
}
