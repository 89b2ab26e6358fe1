//! 2-D pooling layers

use std::any::Any;

use rayon::prelude::*;

use crate::error::{InferirError, Result};
use crate::ops;
use crate::tensor::Tensor;

use super::Layer;

/// Max pooling over square windows
///
/// Padded positions are treated as negative infinity, so they never
/// dominate real pixels. A stride of zero defaults to the kernel size.
#[derive(Debug, Clone)]
pub struct MaxPool2D {
    kernel_size: usize,
    stride: usize,
    padding: usize,
}

/// Average pooling over square windows
///
/// The divisor is always the full kernel area, even when padded positions
/// (which contribute zero) fall inside the window. This matches the
/// serialized model format and is preserved deliberately.
#[derive(Debug, Clone)]
pub struct AvgPool2D {
    kernel_size: usize,
    stride: usize,
    padding: usize,
}

macro_rules! pool_common {
    ($ty:ident) => {
        impl $ty {
            /// Create a pooling layer; `stride == 0` defaults to `kernel_size`
            ///
            /// # Errors
            ///
            /// Returns `InvalidArgument` if `kernel_size` is zero.
            pub fn new(kernel_size: usize, stride: usize, padding: usize) -> Result<Self> {
                if kernel_size == 0 {
                    return Err(InferirError::invalid_argument(concat!(
                        stringify!($ty),
                        ": kernel_size must be > 0"
                    )));
                }
                Ok(Self {
                    kernel_size,
                    stride: if stride == 0 { kernel_size } else { stride },
                    padding,
                })
            }

            /// Window size
            #[must_use]
            pub fn kernel_size(&self) -> usize {
                self.kernel_size
            }

            /// Step between windows
            #[must_use]
            pub fn stride(&self) -> usize {
                self.stride
            }

            /// Zero padding applied on each side
            #[must_use]
            pub fn padding(&self) -> usize {
                self.padding
            }

            fn shape_3d(&self, shape: &[usize]) -> Result<Vec<usize>> {
                Ok(vec![
                    shape[0],
                    ops::conv_output_size(shape[1], self.kernel_size, self.stride, self.padding)?,
                    ops::conv_output_size(shape[2], self.kernel_size, self.stride, self.padding)?,
                ])
            }

            fn shape_4d(&self, shape: &[usize]) -> Result<Vec<usize>> {
                Ok(vec![
                    shape[0],
                    shape[1],
                    ops::conv_output_size(shape[2], self.kernel_size, self.stride, self.padding)?,
                    ops::conv_output_size(shape[3], self.kernel_size, self.stride, self.padding)?,
                ])
            }
        }
    };
}

pool_common!(MaxPool2D);
pool_common!(AvgPool2D);

/// Shared 3-D / 4-D dispatch for both pooling flavors.
///
/// `pool_one` maps one (C, H, W) sample slice to its pooled output slice.
fn pool_forward<F>(
    input: &Tensor,
    output: &mut Tensor,
    out_shape_3d: impl Fn(&[usize]) -> Result<Vec<usize>>,
    out_shape_4d: impl Fn(&[usize]) -> Result<Vec<usize>>,
    layer_name: &str,
    pool_one: F,
) -> Result<()>
where
    F: Fn(&[f32], &mut [f32], usize, usize, usize, usize, usize) + Sync,
{
    match input.ndim() {
        3 => {
            let (channels, height, width) =
                (input.shape()[0], input.shape()[1], input.shape()[2]);
            let out_shape = out_shape_3d(input.shape())?;
            if output.shape() != out_shape {
                *output = Tensor::new(&out_shape)?;
            }
            let (out_h, out_w) = (out_shape[1], out_shape[2]);
            pool_one(
                input.data(),
                output.data_mut(),
                channels,
                height,
                width,
                out_h,
                out_w,
            );
            Ok(())
        }
        4 => {
            let (channels, height, width) =
                (input.shape()[1], input.shape()[2], input.shape()[3]);
            let out_shape = out_shape_4d(input.shape())?;
            if output.shape() != out_shape {
                *output = Tensor::new(&out_shape)?;
            }
            let (out_h, out_w) = (out_shape[2], out_shape[3]);
            let in_sample = channels * height * width;
            let out_sample = channels * out_h * out_w;
            let in_data = input.data();

            output
                .data_mut()
                .par_chunks_mut(out_sample)
                .enumerate()
                .for_each(|(n, out_chunk)| {
                    pool_one(
                        &in_data[n * in_sample..(n + 1) * in_sample],
                        out_chunk,
                        channels,
                        height,
                        width,
                        out_h,
                        out_w,
                    );
                });
            Ok(())
        }
        other => Err(InferirError::invalid_argument(format!(
            "{layer_name}: expected 3D or 4D input, got {other}D"
        ))),
    }
}

impl Layer for MaxPool2D {
    fn forward(&mut self, input: &Tensor, output: &mut Tensor) -> Result<()> {
        let (kernel, stride, padding) = (self.kernel_size, self.stride, self.padding);
        pool_forward(
            input,
            output,
            |s| self.shape_3d(s),
            |s| self.shape_4d(s),
            "MaxPool2D",
            move |in_data, out_data, channels, height, width, out_h, out_w| {
                for c in 0..channels {
                    let ch_in = &in_data[c * height * width..(c + 1) * height * width];
                    let ch_out = &mut out_data[c * out_h * out_w..(c + 1) * out_h * out_w];
                    for oh in 0..out_h {
                        for ow in 0..out_w {
                            let mut max_val = f32::NEG_INFINITY;
                            for kh in 0..kernel {
                                for kw in 0..kernel {
                                    let ih = oh * stride + kh;
                                    let iw = ow * stride + kw;
                                    if ih >= padding
                                        && iw >= padding
                                        && ih - padding < height
                                        && iw - padding < width
                                    {
                                        let val = ch_in[(ih - padding) * width + (iw - padding)];
                                        max_val = max_val.max(val);
                                    }
                                }
                            }
                            ch_out[oh * out_w + ow] = max_val;
                        }
                    }
                }
            },
        )
    }

    fn name(&self) -> String {
        format!("MaxPool2D({})", self.kernel_size)
    }

    fn parameter_count(&self) -> usize {
        0
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        match input_shape.len() {
            3 => self.shape_3d(input_shape),
            4 => self.shape_4d(input_shape),
            other => Err(InferirError::invalid_argument(format!(
                "MaxPool2D::output_shape: expected 3D or 4D, got {other}D"
            ))),
        }
    }

    fn clone_layer(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Layer for AvgPool2D {
    fn forward(&mut self, input: &Tensor, output: &mut Tensor) -> Result<()> {
        let (kernel, stride, padding) = (self.kernel_size, self.stride, self.padding);
        // Full kernel area, including padded positions.
        let inv_area = 1.0 / (kernel * kernel) as f32;
        pool_forward(
            input,
            output,
            |s| self.shape_3d(s),
            |s| self.shape_4d(s),
            "AvgPool2D",
            move |in_data, out_data, channels, height, width, out_h, out_w| {
                for c in 0..channels {
                    let ch_in = &in_data[c * height * width..(c + 1) * height * width];
                    let ch_out = &mut out_data[c * out_h * out_w..(c + 1) * out_h * out_w];
                    for oh in 0..out_h {
                        for ow in 0..out_w {
                            let mut sum = 0.0f32;
                            for kh in 0..kernel {
                                for kw in 0..kernel {
                                    let ih = oh * stride + kh;
                                    let iw = ow * stride + kw;
                                    if ih >= padding
                                        && iw >= padding
                                        && ih - padding < height
                                        && iw - padding < width
                                    {
                                        sum += ch_in[(ih - padding) * width + (iw - padding)];
                                    }
                                }
                            }
                            ch_out[oh * out_w + ow] = sum * inv_area;
                        }
                    }
                }
            },
        )
    }

    fn name(&self) -> String {
        format!("AvgPool2D({})", self.kernel_size)
    }

    fn parameter_count(&self) -> usize {
        0
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        match input_shape.len() {
            3 => self.shape_3d(input_shape),
            4 => self.shape_4d(input_shape),
            other => Err(InferirError::invalid_argument(format!(
                "AvgPool2D::output_shape: expected 3D or 4D, got {other}D"
            ))),
        }
    }

    fn clone_layer(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
