//! `.titan` model file serializer

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{InferirError, LoadErrorKind, Result};
use crate::layers::{
    AvgPool2D, Conv2D, Dense, Flatten, Layer, MaxPool2D, PaddingMode, Relu, Sequential,
    Sigmoid, Softmax, Tanh,
};

use super::{LayerType, TITAN_FORMAT_VERSION, TITAN_MAGIC};

fn io_err(e: std::io::Error) -> InferirError {
    InferirError::model_load(LoadErrorKind::FileNotFound, format!("write failed: {e}"))
}

fn write_u32(out: &mut impl Write, value: u32) -> Result<()> {
    out.write_all(&value.to_le_bytes()).map_err(io_err)
}

fn write_u8(out: &mut impl Write, value: u8) -> Result<()> {
    out.write_all(&[value]).map_err(io_err)
}

fn write_floats(out: &mut impl Write, data: &[f32]) -> Result<()> {
    for &v in data {
        out.write_all(&v.to_le_bytes()).map_err(io_err)?;
    }
    Ok(())
}

/// Identify the serialization tag for a layer
///
/// # Errors
///
/// Returns `InvalidArgument` for layers outside the serializable set
/// (fused and quantized layers are compiler artifacts).
fn identify_layer_type(layer: &dyn Layer) -> Result<LayerType> {
    let any = layer.as_any();
    if any.is::<Dense>() {
        Ok(LayerType::Dense)
    } else if any.is::<Relu>() {
        Ok(LayerType::Relu)
    } else if any.is::<Sigmoid>() {
        Ok(LayerType::Sigmoid)
    } else if any.is::<Tanh>() {
        Ok(LayerType::Tanh)
    } else if any.is::<Softmax>() {
        Ok(LayerType::Softmax)
    } else if any.is::<Conv2D>() {
        Ok(LayerType::Conv2D)
    } else if any.is::<MaxPool2D>() {
        Ok(LayerType::MaxPool2D)
    } else if any.is::<AvgPool2D>() {
        Ok(LayerType::AvgPool2D)
    } else if any.is::<Flatten>() {
        Ok(LayerType::Flatten)
    } else {
        Err(InferirError::invalid_argument(format!(
            "unsupported layer type '{}' for serialization",
            layer.name()
        )))
    }
}

/// Save a [`Sequential`] model to a `.titan` file
///
/// # Errors
///
/// Returns `ModelLoad` if the file cannot be written, or `InvalidArgument`
/// if the model contains a non-serializable layer.
pub fn save_model(model: &Sequential, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| {
        InferirError::model_load(
            LoadErrorKind::FileNotFound,
            format!("cannot open '{}' for writing: {e}", path.display()),
        )
    })?;
    let mut out = BufWriter::new(file);

    out.write_all(&TITAN_MAGIC).map_err(io_err)?;
    write_u32(&mut out, TITAN_FORMAT_VERSION)?;
    write_u32(&mut out, u32::try_from(model.len()).unwrap_or(u32::MAX))?;

    for i in 0..model.len() {
        let layer = model.layer(i);
        let layer_type = identify_layer_type(layer)?;
        write_u32(&mut out, layer_type as u32)?;

        match layer_type {
            LayerType::Dense => {
                let dense = layer.as_any().downcast_ref::<Dense>().expect("tag match");
                write_u32(&mut out, u32::try_from(dense.in_features()).unwrap_or(u32::MAX))?;
                write_u32(&mut out, u32::try_from(dense.out_features()).unwrap_or(u32::MAX))?;
                write_u8(&mut out, u8::from(dense.has_bias()))?;
                write_floats(&mut out, dense.weights().data())?;
                if dense.has_bias() {
                    write_floats(&mut out, dense.bias().data())?;
                }
            }
            LayerType::Conv2D => {
                let conv = layer.as_any().downcast_ref::<Conv2D>().expect("tag match");
                write_u32(&mut out, u32::try_from(conv.in_channels()).unwrap_or(u32::MAX))?;
                write_u32(&mut out, u32::try_from(conv.out_channels()).unwrap_or(u32::MAX))?;
                write_u32(&mut out, u32::try_from(conv.kernel_h()).unwrap_or(u32::MAX))?;
                write_u32(&mut out, u32::try_from(conv.kernel_w()).unwrap_or(u32::MAX))?;
                write_u32(&mut out, u32::try_from(conv.stride_h()).unwrap_or(u32::MAX))?;
                write_u32(&mut out, u32::try_from(conv.stride_w()).unwrap_or(u32::MAX))?;
                write_u8(&mut out, u8::from(conv.padding() == PaddingMode::Same))?;
                write_u8(&mut out, u8::from(conv.has_bias()))?;
                write_floats(&mut out, conv.weights().data())?;
                if conv.has_bias() {
                    write_floats(&mut out, conv.bias().data())?;
                }
            }
            LayerType::MaxPool2D => {
                let pool = layer.as_any().downcast_ref::<MaxPool2D>().expect("tag match");
                write_u32(&mut out, u32::try_from(pool.kernel_size()).unwrap_or(u32::MAX))?;
                write_u32(&mut out, u32::try_from(pool.stride()).unwrap_or(u32::MAX))?;
                write_u32(&mut out, u32::try_from(pool.padding()).unwrap_or(u32::MAX))?;
            }
            LayerType::AvgPool2D => {
                let pool = layer.as_any().downcast_ref::<AvgPool2D>().expect("tag match");
                write_u32(&mut out, u32::try_from(pool.kernel_size()).unwrap_or(u32::MAX))?;
                write_u32(&mut out, u32::try_from(pool.stride()).unwrap_or(u32::MAX))?;
                write_u32(&mut out, u32::try_from(pool.padding()).unwrap_or(u32::MAX))?;
            }
            // Activations and Flatten carry no record body.
            LayerType::Relu
            | LayerType::Sigmoid
            | LayerType::Tanh
            | LayerType::Softmax
            | LayerType::Flatten => {}
        }
    }

    out.flush().map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::FusedDenseRelu;

    #[test]
    fn test_fused_layer_not_serializable() {
        let dense = Dense::new(2, 2, false).unwrap();
        let mut model = Sequential::new();
        model.add(Box::new(FusedDenseRelu::from_dense(&dense)));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fused.titan");
        let err = save_model(&model, &path).unwrap_err();
        assert!(matches!(err, InferirError::InvalidArgument { .. }));
    }

    #[test]
    fn test_identify_all_serializable_layers() {
        let layers: Vec<(Box<dyn Layer>, LayerType)> = vec![
            (Box::new(Dense::new(1, 1, false).unwrap()), LayerType::Dense),
            (Box::new(Relu), LayerType::Relu),
            (Box::new(Sigmoid), LayerType::Sigmoid),
            (Box::new(Tanh), LayerType::Tanh),
            (Box::new(Softmax), LayerType::Softmax),
            (
                Box::new(Conv2D::square(1, 1, 1, 1, PaddingMode::Valid, false).unwrap()),
                LayerType::Conv2D,
            ),
            (Box::new(MaxPool2D::new(2, 2, 0).unwrap()), LayerType::MaxPool2D),
            (Box::new(AvgPool2D::new(2, 2, 0).unwrap()), LayerType::AvgPool2D),
            (Box::new(Flatten), LayerType::Flatten),
        ];
        for (layer, expected) in layers {
            assert_eq!(identify_layer_type(layer.as_ref()).unwrap(), expected);
        }
    }
}
