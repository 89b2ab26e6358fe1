//! Convolution support kernels
//!
//! `im2col` rearranges convolutional patches into a matrix so that Conv2D
//! reduces to a dense matrix product; `col2im` is the scatter-add inverse.

use crate::error::{InferirError, Result};
use crate::tensor::Tensor;

use super::ensure_shape;

/// Spatial output size: `floor((input + 2*padding - kernel) / stride) + 1`
///
/// # Errors
///
/// Returns `InvalidArgument` if `stride` is zero or the padded input is
/// smaller than the kernel.
pub fn conv_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
) -> Result<usize> {
    if stride == 0 {
        return Err(InferirError::invalid_argument(
            "conv_output_size: stride must be > 0",
        ));
    }
    if input_size + 2 * padding < kernel_size {
        return Err(InferirError::invalid_argument(format!(
            "conv_output_size: input {input_size} + 2*padding {padding} too small for kernel {kernel_size}"
        )));
    }
    Ok((input_size + 2 * padding - kernel_size) / stride + 1)
}

/// Per-side SAME padding so that `out = ceil(input / stride)`
///
/// The total pad is halved with integer division, which biases an odd total
/// toward the trailing edge.
#[must_use]
pub fn compute_same_padding(input_size: usize, kernel_size: usize, stride: usize) -> usize {
    let out_size = input_size.div_ceil(stride);
    let needed = (out_size - 1) * stride + kernel_size;
    if needed > input_size {
        (needed - input_size) / 2
    } else {
        0
    }
}

/// Rearrange (C, H, W) patches into a (C*kH*kW, outH*outW) matrix
///
/// Row index encodes (channel, kernel-row, kernel-col) in that order; column
/// index encodes (output-row, output-col) row-major. Positions that fall in
/// the padded border yield 0.
///
/// # Errors
///
/// Returns `InvalidArgument` if the input is not 3-D or the geometry is
/// inconsistent.
#[allow(clippy::too_many_arguments)]
pub fn im2col(
    input: &Tensor,
    col: &mut Tensor,
    kernel_h: usize,
    kernel_w: usize,
    stride_h: usize,
    stride_w: usize,
    pad_h: usize,
    pad_w: usize,
) -> Result<()> {
    if input.ndim() != 3 {
        return Err(InferirError::invalid_argument(format!(
            "im2col: input must be 3D (C, H, W), got {}D",
            input.ndim()
        )));
    }

    let channels = input.shape()[0];
    let height = input.shape()[1];
    let width = input.shape()[2];

    let out_h = conv_output_size(height, kernel_h, stride_h, pad_h)?;
    let out_w = conv_output_size(width, kernel_w, stride_w, pad_w)?;
    let col_rows = channels * kernel_h * kernel_w;
    let col_cols = out_h * out_w;

    ensure_shape(col, &[col_rows, col_cols])?;

    let in_data = input.data();
    let col_data = col.data_mut();

    for c in 0..channels {
        for kh in 0..kernel_h {
            for kw in 0..kernel_w {
                let row = c * kernel_h * kernel_w + kh * kernel_w + kw;
                for oh in 0..out_h {
                    let ih = oh * stride_h + kh;
                    let h_in_range = ih >= pad_h && ih - pad_h < height;

                    for ow in 0..out_w {
                        let iw = ow * stride_w + kw;
                        let w_in_range = iw >= pad_w && iw - pad_w < width;

                        col_data[row * col_cols + oh * out_w + ow] = if h_in_range && w_in_range {
                            in_data[c * height * width + (ih - pad_h) * width + (iw - pad_w)]
                        } else {
                            0.0
                        };
                    }
                }
            }
        }
    }
    Ok(())
}

/// Scatter-add inverse of [`im2col`]: accumulate columns back into (C, H, W)
///
/// # Errors
///
/// Returns `InvalidArgument` if the geometry is inconsistent.
#[allow(clippy::too_many_arguments)]
pub fn col2im(
    col: &Tensor,
    output: &mut Tensor,
    channels: usize,
    height: usize,
    width: usize,
    kernel_h: usize,
    kernel_w: usize,
    stride_h: usize,
    stride_w: usize,
    pad_h: usize,
    pad_w: usize,
) -> Result<()> {
    let out_h = conv_output_size(height, kernel_h, stride_h, pad_h)?;
    let out_w = conv_output_size(width, kernel_w, stride_w, pad_w)?;
    let col_cols = out_h * out_w;

    ensure_shape(output, &[channels, height, width])?;
    output.zero();

    let col_data = col.data();
    let out_data = output.data_mut();

    for c in 0..channels {
        for kh in 0..kernel_h {
            for kw in 0..kernel_w {
                let row = c * kernel_h * kernel_w + kh * kernel_w + kw;
                for oh in 0..out_h {
                    let ih = oh * stride_h + kh;
                    let h_in_range = ih >= pad_h && ih - pad_h < height;

                    for ow in 0..out_w {
                        let iw = ow * stride_w + kw;
                        let w_in_range = iw >= pad_w && iw - pad_w < width;

                        if h_in_range && w_in_range {
                            out_data[c * height * width + (ih - pad_h) * width + (iw - pad_w)] +=
                                col_data[row * col_cols + oh * out_w + ow];
                        }
                    }
                }
            }
        }
    }
    Ok(())
}
