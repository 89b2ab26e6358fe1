//! `.titan` binary model format
//!
//! Self-describing little-endian container:
//!
//! ```text
//! magic "TITN" (4 bytes)
//! version u32 (current: 2; loaders accept any version <= their own)
//! layer_count u32
//! per layer: type tag u32, then a type-specific record
//! ```
//!
//! Per-type records:
//!
//! | Layer | Record |
//! |---|---|
//! | Dense (1) | in u32, out u32, has_bias u8, `out*in` f32 weights, optional `out` f32 biases |
//! | ReLU/Sigmoid/Tanh/Softmax (2-5) | no body |
//! | Conv2D (6) | inC, outC, kH, kW, sH, sW (u32×6), padding_mode u8, has_bias u8, weights, optional biases |
//! | MaxPool2D/AvgPool2D (7-8) | kernel u32, stride u32, padding u32 |
//! | Flatten (9) | no body |
//!
//! Unknown future tags are rejected. Fused and quantized layers are compiler
//! artifacts and have no serialized form; compile after loading, not before
//! saving.

mod reader;
mod writer;

pub use reader::load_model;
pub use writer::save_model;

use crate::error::{InferirError, Result};

/// Magic bytes identifying a `.titan` file
pub const TITAN_MAGIC: [u8; 4] = *b"TITN";

/// Current format version
pub const TITAN_FORMAT_VERSION: u32 = 2;

/// Layer type tags in the binary format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum LayerType {
    /// Fully-connected layer
    Dense = 1,
    /// ReLU activation
    Relu = 2,
    /// Sigmoid activation
    Sigmoid = 3,
    /// Tanh activation
    Tanh = 4,
    /// Softmax activation
    Softmax = 5,
    /// 2-D convolution
    Conv2D = 6,
    /// Max pooling
    MaxPool2D = 7,
    /// Average pooling
    AvgPool2D = 8,
    /// Flatten
    Flatten = 9,
}

impl LayerType {
    /// Decode a tag value read from a model file
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for tags outside the known set.
    pub fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            1 => Ok(Self::Dense),
            2 => Ok(Self::Relu),
            3 => Ok(Self::Sigmoid),
            4 => Ok(Self::Tanh),
            5 => Ok(Self::Softmax),
            6 => Ok(Self::Conv2D),
            7 => Ok(Self::MaxPool2D),
            8 => Ok(Self::AvgPool2D),
            9 => Ok(Self::Flatten),
            other => Err(InferirError::invalid_argument(format!(
                "unknown layer type tag {other}"
            ))),
        }
    }
}
