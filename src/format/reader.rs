//! `.titan` model file parser
//!
//! Maps the file into memory and walks it with a cursor over primitive
//! little-endian readers. Every failure mode (missing file, bad magic,
//! unsupported version, unknown tag, truncation) surfaces as a structured
//! [`ModelLoad`](crate::error::InferirError::ModelLoad) error with context.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use memmap2::Mmap;

use crate::error::{InferirError, LoadErrorKind, Result};
use crate::layers::{
    AvgPool2D, Conv2D, Dense, Flatten, MaxPool2D, PaddingMode, Relu, Sequential, Sigmoid,
    Softmax, Tanh,
};
use crate::tensor::Tensor;

use super::{LayerType, TITAN_FORMAT_VERSION, TITAN_MAGIC};

fn truncated(context: &str) -> InferirError {
    InferirError::model_load(
        LoadErrorKind::InvalidFormat,
        format!("unexpected end of file while reading {context}"),
    )
}

fn read_u32(cursor: &mut Cursor<&[u8]>, context: &str) -> Result<u32> {
    let mut buf = [0u8; 4];
    cursor
        .read_exact(&mut buf)
        .map_err(|_| truncated(context))?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u8(cursor: &mut Cursor<&[u8]>, context: &str) -> Result<u8> {
    let mut buf = [0u8; 1];
    cursor
        .read_exact(&mut buf)
        .map_err(|_| truncated(context))?;
    Ok(buf[0])
}

fn read_floats(cursor: &mut Cursor<&[u8]>, count: usize, context: &str) -> Result<Vec<f32>> {
    let mut bytes = vec![0u8; count * 4];
    cursor
        .read_exact(&mut bytes)
        .map_err(|_| truncated(context))?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Load a [`Sequential`] model from a `.titan` file
///
/// # Errors
///
/// Returns `ModelLoad` with kind `FileNotFound` if the path cannot be
/// opened, or `InvalidFormat` on bad magic, a version newer than
/// [`TITAN_FORMAT_VERSION`], an unknown layer tag, or truncation.
pub fn load_model(path: impl AsRef<Path>) -> Result<Sequential> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        InferirError::model_load(
            LoadErrorKind::FileNotFound,
            format!("cannot open '{}': {e}", path.display()),
        )
    })?;

    // SAFETY: the mapping is read-only and dropped before this function
    // returns; concurrent truncation of the file is outside our contract.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
        InferirError::model_load(
            LoadErrorKind::FileNotFound,
            format!("cannot map '{}': {e}", path.display()),
        )
    })?;

    parse_model(&mmap)
}

/// Parse a model from an in-memory byte buffer
///
/// # Errors
///
/// Same `InvalidFormat` conditions as [`load_model`].
pub(crate) fn parse_model(bytes: &[u8]) -> Result<Sequential> {
    let mut cursor = Cursor::new(bytes);

    let mut magic = [0u8; 4];
    cursor
        .read_exact(&mut magic)
        .map_err(|_| truncated("header"))?;
    if magic != TITAN_MAGIC {
        return Err(InferirError::model_load(
            LoadErrorKind::InvalidFormat,
            "invalid magic number, not a .titan file",
        ));
    }

    let version = read_u32(&mut cursor, "version")?;
    if version > TITAN_FORMAT_VERSION {
        return Err(InferirError::model_load(
            LoadErrorKind::InvalidFormat,
            format!(
                "unsupported format version {version} (max supported: {TITAN_FORMAT_VERSION})"
            ),
        ));
    }

    let layer_count = read_u32(&mut cursor, "layer count")?;

    let mut model = Sequential::new();
    for i in 0..layer_count {
        let tag = read_u32(&mut cursor, "layer type tag")?;
        let layer_type = LayerType::from_tag(tag).map_err(|_| {
            InferirError::model_load(
                LoadErrorKind::InvalidFormat,
                format!("unknown layer type tag {tag} at layer index {i}"),
            )
        })?;

        match layer_type {
            LayerType::Dense => model.add(Box::new(read_dense(&mut cursor)?)),
            LayerType::Relu => model.add(Box::new(Relu)),
            LayerType::Sigmoid => model.add(Box::new(Sigmoid)),
            LayerType::Tanh => model.add(Box::new(Tanh)),
            LayerType::Softmax => model.add(Box::new(Softmax)),
            LayerType::Conv2D => model.add(Box::new(read_conv2d(&mut cursor)?)),
            LayerType::MaxPool2D => {
                let (kernel, stride, padding) = read_pool(&mut cursor)?;
                model.add(Box::new(MaxPool2D::new(kernel, stride, padding).map_err(
                    |e| InferirError::model_load(LoadErrorKind::InvalidFormat, e.to_string()),
                )?));
            }
            LayerType::AvgPool2D => {
                let (kernel, stride, padding) = read_pool(&mut cursor)?;
                model.add(Box::new(AvgPool2D::new(kernel, stride, padding).map_err(
                    |e| InferirError::model_load(LoadErrorKind::InvalidFormat, e.to_string()),
                )?));
            }
            LayerType::Flatten => model.add(Box::new(Flatten)),
        }
    }

    Ok(model)
}

fn read_dense(cursor: &mut Cursor<&[u8]>) -> Result<Dense> {
    let in_features = read_u32(cursor, "dense in_features")? as usize;
    let out_features = read_u32(cursor, "dense out_features")? as usize;
    let has_bias = read_u8(cursor, "dense has_bias")? != 0;

    let mut dense = Dense::new(in_features, out_features, has_bias)
        .map_err(|e| InferirError::model_load(LoadErrorKind::InvalidFormat, e.to_string()))?;

    let weights = read_floats(cursor, out_features * in_features, "dense weights")?;
    dense
        .set_weights(Tensor::from_vec(vec![out_features, in_features], weights)?)
        .map_err(|e| InferirError::model_load(LoadErrorKind::InvalidFormat, e.to_string()))?;

    if has_bias {
        let bias = read_floats(cursor, out_features, "dense bias")?;
        dense
            .set_bias(Tensor::from_vec(vec![out_features], bias)?)
            .map_err(|e| InferirError::model_load(LoadErrorKind::InvalidFormat, e.to_string()))?;
    }
    Ok(dense)
}

fn read_conv2d(cursor: &mut Cursor<&[u8]>) -> Result<Conv2D> {
    let in_channels = read_u32(cursor, "conv in_channels")? as usize;
    let out_channels = read_u32(cursor, "conv out_channels")? as usize;
    let kernel_h = read_u32(cursor, "conv kernel_h")? as usize;
    let kernel_w = read_u32(cursor, "conv kernel_w")? as usize;
    let stride_h = read_u32(cursor, "conv stride_h")? as usize;
    let stride_w = read_u32(cursor, "conv stride_w")? as usize;
    let padding = if read_u8(cursor, "conv padding_mode")? == 1 {
        PaddingMode::Same
    } else {
        PaddingMode::Valid
    };
    let has_bias = read_u8(cursor, "conv has_bias")? != 0;

    let mut conv = Conv2D::new(
        in_channels,
        out_channels,
        kernel_h,
        kernel_w,
        stride_h,
        stride_w,
        padding,
        has_bias,
    )
    .map_err(|e| InferirError::model_load(LoadErrorKind::InvalidFormat, e.to_string()))?;

    let weight_count = out_channels * in_channels * kernel_h * kernel_w;
    let weights = read_floats(cursor, weight_count, "conv weights")?;
    conv.set_weights(Tensor::from_vec(
        vec![out_channels, in_channels, kernel_h, kernel_w],
        weights,
    )?)
    .map_err(|e| InferirError::model_load(LoadErrorKind::InvalidFormat, e.to_string()))?;

    if has_bias {
        let bias = read_floats(cursor, out_channels, "conv bias")?;
        conv.set_bias(Tensor::from_vec(vec![out_channels], bias)?)
            .map_err(|e| InferirError::model_load(LoadErrorKind::InvalidFormat, e.to_string()))?;
    }
    Ok(conv)
}

fn read_pool(cursor: &mut Cursor<&[u8]>) -> Result<(usize, usize, usize)> {
    let kernel = read_u32(cursor, "pool kernel")? as usize;
    let stride = read_u32(cursor, "pool stride")? as usize;
    let padding = read_u32(cursor, "pool padding")? as usize;
    Ok((kernel, stride, padding))
}
