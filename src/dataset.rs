//! Per-row items for the neural models.
//!
//! Morgan items are materialised once at construction; image items are
//! decoded on access. Both implement `burn`'s [`Dataset`] trait. [`BatchIter`] walks a dataset
//! in (optionally shuffled) chunks and [`collate`] turns a chunk into tensors.

use std::path::{Path, PathBuf};

use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use image::imageops::FilterType;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::error::{Ic50Error, Result};
use crate::features::FeatureSpace;
use crate::table::{Record, Table};

/// Whether items carry labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Every row must have a pIC50 label.
    Training,
    /// Labels are ignored.
    Inference,
}

/// One model input row.
#[derive(Debug, Clone, PartialEq)]
pub struct Ic50Item {
    /// Dense input vector.
    pub features: Vec<f32>,
    /// Sparse substructure indices (`0` never appears; it is padding).
    pub indices: Vec<i64>,
    /// pIC50 label in [`Mode::Training`].
    pub target: Option<f32>,
}

fn target_of(record: &Record, mode: Mode) -> Result<Option<f32>> {
    match mode {
        Mode::Inference => Ok(None),
        Mode::Training => record
            .pic50
            .map(|p| Some(p as f32))
            .ok_or_else(|| Ic50Error::Dataset(format!("row '{}' has no pIC50 label", record.id))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding variant
// ─────────────────────────────────────────────────────────────────────────────

/// Which fitted representation fills [`Ic50Item::features`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureView {
    /// Scaled descriptors followed by folded Morgan counts.
    Dense,
    /// Flattened standardised count embedding.
    Standardized,
}

/// Morgan-embedding rows of a table.
#[derive(Debug, Clone)]
pub struct MorganDataset {
    items: Vec<Ic50Item>,
    feature_dim: usize,
}

impl MorganDataset {
    /// Featurise every record of `table` through `space`.
    pub fn new(table: &Table, space: &FeatureSpace, view: FeatureView, mode: Mode) -> Result<Self> {
        let feature_dim = match view {
            FeatureView::Dense => space.dense_dim(),
            FeatureView::Standardized => space.flat_dim(),
        };
        let items = table
            .iter()
            .map(|record| {
                let f = space.featurize(record);
                let features = match view {
                    FeatureView::Dense => f.dense,
                    FeatureView::Standardized => f.standardized,
                };
                Ok(Ic50Item { features, indices: f.indices, target: target_of(record, mode)? })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("[Dataset] {} morgan items, feature width {feature_dim}", items.len());
        Ok(MorganDataset { items, feature_dim })
    }

    /// Width of every item's feature vector.
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// Items in table order.
    pub fn items(&self) -> &[Ic50Item] {
        &self.items
    }
}

impl Dataset<Ic50Item> for MorganDataset {
    fn get(&self, index: usize) -> Option<Ic50Item> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Image variant
// ─────────────────────────────────────────────────────────────────────────────

/// Resize and normalise a pre-rendered image into a flat CHW vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTransform {
    /// Output side length.
    pub size: u32,
    /// Per-channel mean subtracted after scaling to `[0, 1]`.
    pub mean: [f32; 3],
    /// Per-channel standard deviation.
    pub std: [f32; 3],
}

impl Default for ImageTransform {
    fn default() -> Self {
        Self::new(300)
    }
}

impl ImageTransform {
    /// ImageNet channel statistics at the given size.
    pub fn new(size: u32) -> Self {
        ImageTransform { size, mean: [0.485, 0.456, 0.406], std: [0.229, 0.224, 0.225] }
    }

    /// Length of [`ImageTransform::apply`]'s output.
    pub fn output_len(&self) -> usize {
        3 * self.size as usize * self.size as usize
    }

    /// Transform a decoded image.
    pub fn apply(&self, img: &image::DynamicImage) -> Vec<f32> {
        let rgb = img.resize_exact(self.size, self.size, FilterType::Triangle).to_rgb8();
        let mut out = Vec::with_capacity(self.output_len());
        for c in 0..3 {
            for p in rgb.pixels() {
                let v = f32::from(p[c]) / 255.0;
                out.push((v - self.mean[c]) / self.std[c]);
            }
        }
        out
    }

    /// Decode and transform the image at `path`.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Vec<f32>> {
        Ok(self.apply(&image::open(path)?))
    }
}

/// Image rows of a table.
///
/// Only paths and labels are held; each image is decoded and transformed
/// when its item is requested.
#[derive(Debug, Clone)]
pub struct ImageDataset {
    rows: Vec<(PathBuf, Option<f32>)>,
    transform: ImageTransform,
}

impl ImageDataset {
    /// Collect every record's image path. Records without an image path, or
    /// whose file does not exist, are an error.
    pub fn new(table: &Table, transform: ImageTransform, mode: Mode) -> Result<Self> {
        let rows = table
            .iter()
            .map(|record| {
                let path = record
                    .image
                    .as_ref()
                    .ok_or_else(|| Ic50Error::Dataset(format!("row '{}' has no image", record.id)))?;
                if !path.is_file() {
                    return Err(Ic50Error::Dataset(format!(
                        "image {} for row '{}' does not exist",
                        path.display(),
                        record.id
                    )));
                }
                Ok((path.clone(), target_of(record, mode)?))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("[Dataset] {} image items at {}px", rows.len(), transform.size);
        Ok(ImageDataset { rows, transform })
    }

    /// Width of every item's feature vector.
    pub fn feature_dim(&self) -> usize {
        self.transform.output_len()
    }

    /// Decode and transform the image of row `index`.
    pub fn load_item(&self, index: usize) -> Result<Ic50Item> {
        let (path, target) = self
            .rows
            .get(index)
            .ok_or_else(|| Ic50Error::Dataset(format!("image index {index} out of range")))?;
        Ok(Ic50Item { features: self.transform.load(path)?, indices: Vec::new(), target: *target })
    }
}

impl Dataset<Ic50Item> for ImageDataset {
    fn get(&self, index: usize) -> Option<Ic50Item> {
        match self.load_item(index) {
            Ok(item) => Some(item),
            Err(e) => {
                if index < self.rows.len() {
                    warn!("[Dataset] failed to load {}: {e}", self.rows[index].0.display());
                }
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Batching
// ─────────────────────────────────────────────────────────────────────────────

/// Walks a dataset in chunks of `batch_size` items.
pub struct BatchIter<'a, D> {
    dataset: &'a D,
    order: Vec<usize>,
    cursor: usize,
    batch_size: usize,
}

impl<'a, D: Dataset<Ic50Item>> BatchIter<'a, D> {
    /// Sequential order.
    pub fn new(dataset: &'a D, batch_size: usize) -> Self {
        BatchIter { dataset, order: (0..dataset.len()).collect(), cursor: 0, batch_size: batch_size.max(1) }
    }

    /// Seeded random order.
    pub fn shuffled(dataset: &'a D, batch_size: usize, seed: u64) -> Self {
        let mut iter = Self::new(dataset, batch_size);
        iter.order.shuffle(&mut StdRng::seed_from_u64(seed));
        iter
    }
}

impl<D: Dataset<Ic50Item>> Iterator for BatchIter<'_, D> {
    /// An index the dataset cannot produce fails the batch.
    type Item = Result<Vec<Ic50Item>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let batch = self.order[self.cursor..end]
            .iter()
            .map(|&i| {
                self.dataset
                    .get(i)
                    .ok_or_else(|| Ic50Error::Dataset(format!("item {i} could not be loaded")))
            })
            .collect();
        self.cursor = end;
        Some(batch)
    }
}

/// A collated batch.
#[derive(Debug, Clone)]
pub struct Ic50Batch<B: Backend> {
    /// `[batch, features]`.
    pub features: Tensor<B, 2>,
    /// `[batch, max_len]`, right-padded with 0 (at least one column).
    pub indices: Tensor<B, 2, Int>,
    /// `[batch, 1]` when every item is labelled.
    pub targets: Option<Tensor<B, 2>>,
}

/// Stack items into tensors on `device`.
pub fn collate<B: Backend>(items: &[Ic50Item], device: &B::Device) -> Result<Ic50Batch<B>> {
    let first = items.first().ok_or_else(|| Ic50Error::Dataset("cannot collate empty batch".into()))?;
    let batch = items.len();
    let width = first.features.len();
    let max_len = items.iter().map(|it| it.indices.len()).max().unwrap_or(0).max(1);

    let mut features = Vec::with_capacity(batch * width);
    let mut indices = vec![0i64; batch * max_len];
    for (b, item) in items.iter().enumerate() {
        if item.features.len() != width {
            return Err(Ic50Error::Dataset(format!(
                "feature width differs within batch: {} vs {width}",
                item.features.len()
            )));
        }
        features.extend_from_slice(&item.features);
        indices[b * max_len..b * max_len + item.indices.len()].copy_from_slice(&item.indices);
    }
    let targets: Option<Vec<f32>> = items.iter().map(|it| it.target).collect();

    Ok(Ic50Batch {
        features: Tensor::<B, 2>::from_data(TensorData::new(features, [batch, width]), device),
        indices: Tensor::<B, 2, Int>::from_data(TensorData::new(indices, [batch, max_len]), device),
        targets: targets.map(|t| Tensor::<B, 2>::from_data(TensorData::new(t, [batch, 1]), device)),
    })
}
