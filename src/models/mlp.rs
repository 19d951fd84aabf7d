//! MLP over dense features and a learned substructure embedding.
//!
//! Shapes:
//! - dense input: `[B, dense_dim]`
//! - indices: `[B, L]` (`0` = padding, `1..=n_slots` = non-zero count cells)
//! - pooled embedding: `[B, embed_dim]`, masked mean over non-padding positions
//! - output: `[B, 1]`

use burn::module::Module;
use burn::nn::{self, Dropout, DropoutConfig, Initializer, LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use super::Regressor;
use crate::dataset::Ic50Batch;

/// Architecture of a [`MorganMlp`].
#[derive(Debug, Clone, PartialEq)]
pub struct MorganMlpConfig {
    /// Width of the dense input vector.
    pub dense_dim: usize,
    /// Number of addressable (non-padding) embedding slots.
    pub n_slots: usize,
    /// Width of the learned embedding.
    pub embed_dim: usize,
    /// Hidden widths.
    pub layer_dims: Vec<usize>,
    /// Dropout probability inside every block.
    pub dropout: f64,
}

impl MorganMlpConfig {
    /// Build the network on `device`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> MorganMlp<B> {
        let embedding = nn::EmbeddingConfig::new(self.n_slots + 1, self.embed_dim)
            .with_initializer(Initializer::Normal { mean: 0.0, std: 1.0 })
            .init(device);

        let mut dims = vec![self.dense_dim + self.embed_dim];
        dims.extend(&self.layer_dims);
        let blocks = dims
            .windows(2)
            .map(|w| MlpBlock::new(w[0], w[1], self.dropout, device))
            .collect();

        let head = LinearConfig::new(dims[dims.len() - 1], 1)
            .with_initializer(Initializer::XavierNormal { gain: 1.0 })
            .init(device);

        MorganMlp { embedding, blocks, head }
    }
}

/// `LayerNorm → Linear → ReLU → Dropout`.
#[derive(Module, Debug)]
pub struct MlpBlock<B: Backend> {
    norm: LayerNorm<B>,
    linear: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> MlpBlock<B> {
    fn new(d_in: usize, d_out: usize, dropout: f64, device: &B::Device) -> Self {
        Self {
            norm: LayerNormConfig::new(d_in).init(device),
            linear: LinearConfig::new(d_in, d_out)
                .with_initializer(Initializer::KaimingUniform { gain: 2f64.sqrt(), fan_out_only: false })
                .init(device),
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    /// `[B, d_in]` → `[B, d_out]`.
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        self.dropout.forward(relu(self.linear.forward(self.norm.forward(x))))
    }
}

/// Dense vector ⊕ pooled substructure embedding → block stack → scalar.
#[derive(Module, Debug)]
pub struct MorganMlp<B: Backend> {
    embedding: nn::Embedding<B>,
    blocks: Vec<MlpBlock<B>>,
    head: Linear<B>,
}

impl<B: Backend> MorganMlp<B> {
    /// Masked mean of the embeddings of the non-padding indices. Rows with
    /// no non-padding index pool to zero.
    pub fn pool(&self, indices: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let mask = indices.clone().greater_elem(0).float();
        let embedded = self.embedding.forward(indices);
        let summed = (embedded * mask.clone().unsqueeze_dim::<3>(2)).sum_dim(1);
        let count = mask.sum_dim(1).clamp_min(1.0);
        summed.squeeze::<2>(1) / count
    }

    /// Full forward pass.
    pub fn forward(&self, dense: Tensor<B, 2>, indices: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let pooled = self.pool(indices);
        let mut x = Tensor::cat(vec![dense, pooled], 1);
        for block in &self.blocks {
            x = block.forward(x);
        }
        self.head.forward(x)
    }
}

impl<B: Backend> Regressor<B> for MorganMlp<B> {
    fn forward_batch(&self, batch: &Ic50Batch<B>) -> Tensor<B, 2> {
        self.forward(batch.features.clone(), batch.indices.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type B = NdArray<f32>;

    fn config() -> MorganMlpConfig {
        MorganMlpConfig { dense_dim: 5, n_slots: 12, embed_dim: 4, layer_dims: vec![8, 6], dropout: 0.0 }
    }

    fn indices(rows: Vec<i64>, shape: [usize; 2]) -> Tensor<B, 2, Int> {
        Tensor::from_data(TensorData::new(rows, shape), &Default::default())
    }

    #[test]
    fn padding_pools_to_zero() {
        let model = config().init::<B>(&Default::default());
        // all-zero counts give an all-padding row; an empty list pads to one column
        let all_padding = model.pool(indices(vec![0, 0, 0], [1, 3]));
        let empty = model.pool(indices(vec![0], [1, 1]));
        let a = all_padding.into_data().to_vec::<f32>().unwrap();
        let b = empty.into_data().to_vec::<f32>().unwrap();
        assert_eq!(a, vec![0.0; 4]);
        assert_eq!(a, b);
    }

    #[test]
    fn padding_does_not_dilute_mean() {
        let model = config().init::<B>(&Default::default());
        let short = model.pool(indices(vec![3, 5], [1, 2])).into_data().to_vec::<f32>().unwrap();
        let padded = model.pool(indices(vec![3, 5, 0, 0], [1, 4])).into_data().to_vec::<f32>().unwrap();
        for (x, y) in short.iter().zip(&padded) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn forward_shape() {
        let device = Default::default();
        let model = config().init::<B>(&device);
        let dense = Tensor::<B, 2>::ones([2, 5], &device);
        let out = model.forward(dense, indices(vec![1, 12, 0, 0], [2, 2]));
        assert_eq!(out.dims(), [2, 1]);
    }
}
