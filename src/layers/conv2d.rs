//! 2-D convolution layer (im2col + GEMM)

use std::any::Any;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{InferirError, Result};
use crate::ops;
use crate::tensor::Tensor;

use super::Layer;

/// Spatial padding mode for convolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaddingMode {
    /// No padding; output shrinks by the kernel extent
    Valid,
    /// Pad so that `out = ceil(input / stride)`
    Same,
}

/// 2-D convolution over (C, H, W) or (N, C, H, W) inputs
///
/// Each sample is lowered with [`ops::im2col`] and multiplied against the
/// weight tensor viewed as `(out_channels, in_channels * kH * kW)`. Batched
/// inputs are processed sample-parallel with rayon.
#[derive(Debug, Clone)]
pub struct Conv2D {
    in_channels: usize,
    out_channels: usize,
    kernel_h: usize,
    kernel_w: usize,
    stride_h: usize,
    stride_w: usize,
    padding: PaddingMode,
    use_bias: bool,
    weights: Tensor,
    bias: Tensor,
    // 2D view of weights, kept in sync by set_weights; same row-major data.
    weights_2d: Tensor,
    // Per-layer scratch reused by the single-sample path.
    col_buf: Tensor,
    gemm_buf: Tensor,
}

impl Conv2D {
    /// Create a Conv2D layer with zero-initialized parameters
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if any channel, kernel, or stride value is
    /// zero.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_h: usize,
        kernel_w: usize,
        stride_h: usize,
        stride_w: usize,
        padding: PaddingMode,
        use_bias: bool,
    ) -> Result<Self> {
        if in_channels == 0 || out_channels == 0 {
            return Err(InferirError::invalid_argument("Conv2D: channels must be > 0"));
        }
        if kernel_h == 0 || kernel_w == 0 {
            return Err(InferirError::invalid_argument(
                "Conv2D: kernel size must be > 0",
            ));
        }
        if stride_h == 0 || stride_w == 0 {
            return Err(InferirError::invalid_argument("Conv2D: stride must be > 0"));
        }

        let fan_in = in_channels * kernel_h * kernel_w;
        Ok(Self {
            in_channels,
            out_channels,
            kernel_h,
            kernel_w,
            stride_h,
            stride_w,
            padding,
            use_bias,
            weights: Tensor::new(&[out_channels, in_channels, kernel_h, kernel_w])?,
            bias: Tensor::new(&[out_channels])?,
            weights_2d: Tensor::new(&[out_channels, fan_in])?,
            col_buf: Tensor::default(),
            gemm_buf: Tensor::default(),
        })
    }

    /// Square-kernel convenience constructor
    ///
    /// # Errors
    ///
    /// Same conditions as [`Conv2D::new`].
    pub fn square(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: PaddingMode,
        use_bias: bool,
    ) -> Result<Self> {
        Self::new(
            in_channels,
            out_channels,
            kernel_size,
            kernel_size,
            stride,
            stride,
            padding,
            use_bias,
        )
    }

    /// Input channel count
    #[must_use]
    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    /// Output channel count
    #[must_use]
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Kernel height
    #[must_use]
    pub fn kernel_h(&self) -> usize {
        self.kernel_h
    }

    /// Kernel width
    #[must_use]
    pub fn kernel_w(&self) -> usize {
        self.kernel_w
    }

    /// Vertical stride
    #[must_use]
    pub fn stride_h(&self) -> usize {
        self.stride_h
    }

    /// Horizontal stride
    #[must_use]
    pub fn stride_w(&self) -> usize {
        self.stride_w
    }

    /// Padding mode
    #[must_use]
    pub fn padding(&self) -> PaddingMode {
        self.padding
    }

    /// Whether the layer applies a per-channel bias
    #[must_use]
    pub fn has_bias(&self) -> bool {
        self.use_bias
    }

    /// Weight tensor `(out_channels, in_channels, kH, kW)`
    #[must_use]
    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    /// Bias vector `(out_channels,)`
    #[must_use]
    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    /// Replace the weight tensor (also refreshes the cached 2-D view)
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` on shape mismatch.
    pub fn set_weights(&mut self, weights: Tensor) -> Result<()> {
        let expected = [
            self.out_channels,
            self.in_channels,
            self.kernel_h,
            self.kernel_w,
        ];
        if weights.shape() != expected {
            return Err(InferirError::invalid_argument(format!(
                "Conv2D::set_weights: expected shape {:?}, got {:?}",
                expected,
                weights.shape()
            )));
        }
        // The row-major layout of (outC, inC, kH, kW) and
        // (outC, inC*kH*kW) is identical.
        self.weights_2d.data_mut().copy_from_slice(weights.data());
        self.weights = weights;
        Ok(())
    }

    /// Replace the bias vector
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if bias is disabled or the shape is wrong.
    pub fn set_bias(&mut self, bias: Tensor) -> Result<()> {
        if !self.use_bias {
            return Err(InferirError::invalid_argument(
                "Conv2D::set_bias: bias is disabled for this layer",
            ));
        }
        if bias.shape() != [self.out_channels] {
            return Err(InferirError::invalid_argument(format!(
                "Conv2D::set_bias: expected shape ({},), got {:?}",
                self.out_channels,
                bias.shape()
            )));
        }
        self.bias = bias;
        Ok(())
    }

    fn pad_for(&self, height: usize, width: usize) -> (usize, usize) {
        match self.padding {
            PaddingMode::Valid => (0, 0),
            PaddingMode::Same => (
                ops::compute_same_padding(height, self.kernel_h, self.stride_h),
                ops::compute_same_padding(width, self.kernel_w, self.stride_w),
            ),
        }
    }

    fn spatial_output(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        let (pad_h, pad_w) = self.pad_for(height, width);
        Ok((
            ops::conv_output_size(height, self.kernel_h, self.stride_h, pad_h)?,
            ops::conv_output_size(width, self.kernel_w, self.stride_w, pad_w)?,
        ))
    }

    /// Convolve one (C, H, W) sample into `out` (length outC * outH * outW).
    #[allow(clippy::too_many_arguments)]
    fn forward_sample(
        weights_2d: &Tensor,
        bias: &Tensor,
        use_bias: bool,
        sample: &Tensor,
        col_buf: &mut Tensor,
        gemm_buf: &mut Tensor,
        kernel: (usize, usize),
        stride: (usize, usize),
        pad: (usize, usize),
        out: &mut [f32],
    ) -> Result<()> {
        ops::im2col(
            sample, col_buf, kernel.0, kernel.1, stride.0, stride.1, pad.0, pad.1,
        )?;
        ops::matmul_auto(weights_2d, col_buf, gemm_buf)?;

        out.copy_from_slice(gemm_buf.data());

        if use_bias {
            let out_channels = weights_2d.shape()[0];
            let plane = out.len() / out_channels;
            for (c, &b) in bias.data().iter().enumerate().take(out_channels) {
                for v in &mut out[c * plane..(c + 1) * plane] {
                    *v += b;
                }
            }
        }
        Ok(())
    }
}

impl Layer for Conv2D {
    fn forward(&mut self, input: &Tensor, output: &mut Tensor) -> Result<()> {
        match input.ndim() {
            3 => {
                if input.shape()[0] != self.in_channels {
                    return Err(InferirError::invalid_argument(format!(
                        "Conv2D: expected {} input channels, got {}",
                        self.in_channels,
                        input.shape()[0]
                    )));
                }
                let height = input.shape()[1];
                let width = input.shape()[2];
                let (pad_h, pad_w) = self.pad_for(height, width);
                let (out_h, out_w) = self.spatial_output(height, width)?;

                let out_shape = [self.out_channels, out_h, out_w];
                if output.shape() != out_shape {
                    *output = Tensor::new(&out_shape)?;
                }

                Self::forward_sample(
                    &self.weights_2d,
                    &self.bias,
                    self.use_bias,
                    input,
                    &mut self.col_buf,
                    &mut self.gemm_buf,
                    (self.kernel_h, self.kernel_w),
                    (self.stride_h, self.stride_w),
                    (pad_h, pad_w),
                    output.data_mut(),
                )
            }
            4 => {
                if input.shape()[1] != self.in_channels {
                    return Err(InferirError::invalid_argument(format!(
                        "Conv2D: expected {} input channels, got {}",
                        self.in_channels,
                        input.shape()[1]
                    )));
                }
                let batch = input.shape()[0];
                let height = input.shape()[2];
                let width = input.shape()[3];
                let (pad_h, pad_w) = self.pad_for(height, width);
                let (out_h, out_w) = self.spatial_output(height, width)?;

                let out_shape = [batch, self.out_channels, out_h, out_w];
                if output.shape() != out_shape {
                    *output = Tensor::new(&out_shape)?;
                }

                let in_sample = self.in_channels * height * width;
                let out_sample = self.out_channels * out_h * out_w;
                let in_data = input.data();
                let weights_2d = &self.weights_2d;
                let bias = &self.bias;
                let use_bias = self.use_bias;
                let kernel = (self.kernel_h, self.kernel_w);
                let stride = (self.stride_h, self.stride_w);
                let in_channels = self.in_channels;

                // Sample-parallel: each chunk gets its own scratch buffers.
                output
                    .data_mut()
                    .par_chunks_mut(out_sample)
                    .enumerate()
                    .try_for_each(|(n, out_chunk)| {
                        let sample = Tensor::from_vec(
                            vec![in_channels, height, width],
                            in_data[n * in_sample..(n + 1) * in_sample].to_vec(),
                        )?;
                        let mut col_buf = Tensor::default();
                        let mut gemm_buf = Tensor::default();
                        Self::forward_sample(
                            weights_2d,
                            bias,
                            use_bias,
                            &sample,
                            &mut col_buf,
                            &mut gemm_buf,
                            kernel,
                            stride,
                            (pad_h, pad_w),
                            out_chunk,
                        )
                    })
            }
            other => Err(InferirError::invalid_argument(format!(
                "Conv2D: expected 3D or 4D input, got {other}D"
            ))),
        }
    }

    fn name(&self) -> String {
        format!(
            "Conv2D({}, {}, {}x{})",
            self.in_channels, self.out_channels, self.kernel_h, self.kernel_w
        )
    }

    fn parameter_count(&self) -> usize {
        let mut count = self.out_channels * self.in_channels * self.kernel_h * self.kernel_w;
        if self.use_bias {
            count += self.out_channels;
        }
        count
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        match input_shape.len() {
            3 => {
                let (out_h, out_w) = self.spatial_output(input_shape[1], input_shape[2])?;
                Ok(vec![self.out_channels, out_h, out_w])
            }
            4 => {
                let (out_h, out_w) = self.spatial_output(input_shape[2], input_shape[3])?;
                Ok(vec![input_shape[0], self.out_channels, out_h, out_w])
            }
            other => Err(InferirError::invalid_argument(format!(
                "Conv2D::output_shape: expected 3D or 4D, got {other}D"
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
