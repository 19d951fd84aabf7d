//! Linear regressor over flattened image pixels.

use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::Regressor;
use crate::dataset::Ic50Batch;

/// `Linear(3·size·size → 1)`.
#[derive(Module, Debug)]
pub struct ImageRegressor<B: Backend> {
    fc: Linear<B>,
}

impl<B: Backend> ImageRegressor<B> {
    /// Regressor for inputs of width `input_dim`.
    pub fn new(input_dim: usize, device: &B::Device) -> Self {
        Self { fc: LinearConfig::new(input_dim, 1).init(device) }
    }

    /// `[batch, input_dim]` → `[batch, 1]`.
    pub fn forward(&self, pixels: Tensor<B, 2>) -> Tensor<B, 2> {
        self.fc.forward(pixels)
    }
}

impl<B: Backend> Regressor<B> for ImageRegressor<B> {
    fn forward_batch(&self, batch: &Ic50Batch<B>) -> Tensor<B, 2> {
        self.forward(batch.features.clone())
    }
}
