//! Flatten layer (pure shape change)

use std::any::Any;

use crate::error::Result;
use crate::tensor::Tensor;

use super::Layer;

/// Collapse spatial dimensions, preserving the data layout
///
/// 1-D and 2-D inputs pass through unchanged; a 3-D `(C, H, W)` input
/// becomes `(C*H*W,)`; rank 4 and above collapse everything after the first
/// dimension into the second.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flatten;

impl Layer for Flatten {
    fn forward(&mut self, input: &Tensor, output: &mut Tensor) -> Result<()> {
        let out_shape = self.output_shape(input.shape())?;
        if output.shape() != out_shape {
            *output = Tensor::new(&out_shape)?;
        }
        output.data_mut().copy_from_slice(input.data());
        Ok(())
    }

    fn name(&self) -> String {
        "Flatten".to_string()
    }

    fn parameter_count(&self) -> usize {
        0
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        Ok(match input_shape.len() {
            0..=2 => input_shape.to_vec(),
            3 => vec![input_shape.iter().product()],
            _ => vec![input_shape[0], input_shape[1..].iter().product()],
        })
    }

    fn clone_layer(&self) -> Box<dyn Layer> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_1d_2d_pass_through() {
        let flatten = Flatten;
        assert_eq!(flatten.output_shape(&[5]).unwrap(), vec![5]);
        assert_eq!(flatten.output_shape(&[2, 5]).unwrap(), vec![2, 5]);
    }

    #[test]
    fn test_3d_collapses_fully() {
        let flatten = Flatten;
        assert_eq!(flatten.output_shape(&[2, 3, 4]).unwrap(), vec![24]);
    }

    #[test]
    fn test_4d_keeps_batch() {
        let flatten = Flatten;
        assert_eq!(flatten.output_shape(&[8, 2, 3, 4]).unwrap(), vec![8, 24]);
        assert_eq!(
            flatten.output_shape(&[8, 2, 3, 4, 5]).unwrap(),
            vec![8, 120]
        );
    }

    #[test]
    fn test_forward_preserves_data() {
        let mut flatten = Flatten;
        let input = Tensor::from_vec(vec![1, 2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut output = Tensor::default();
        flatten.forward(&input, &mut output).unwrap();
        assert_eq!(output.shape(), &[4]);
        assert_eq!(output.data(), input.data());
    }
}
