//! Epoch loop, checkpoint selection and inference for the neural models.
//!
//! Each epoch runs one pass of Adam updates over the training dataset and one
//! pass without updates over the validation dataset using the inference-mode
//! copy of the model (dropout off). Losses are RMSE, averaged over batches.
//! A checkpoint is written only when the selection loss is strictly lower than
//! every loss seen before it.

use std::fmt;
use std::path::{Path, PathBuf};

use burn::data::dataset::Dataset;
use burn::module::{AutodiffModule, Module};
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use tracing::{debug, info, warn};

use crate::dataset::{collate, BatchIter, Ic50Item};
use crate::error::{Ic50Error, Result};
use crate::models::Regressor;
use crate::tracking::{EpochMetrics, ExperimentTracker, NoopTracker};

// ─────────────────────────────────────────────────────────────────────────────
// Device
// ─────────────────────────────────────────────────────────────────────────────

/// Whether this build can train on an accelerator.
pub const ACCELERATOR_AVAILABLE: bool = cfg!(feature = "backend-wgpu");

/// Where training runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedDevice {
    /// `NdArray` backend.
    Cpu,
    /// `Wgpu` backend.
    Accelerator,
}

impl fmt::Display for ResolvedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResolvedDevice::Cpu => "cpu",
            ResolvedDevice::Accelerator => "accelerator",
        })
    }
}

/// Map a configured device string to a device, falling back to CPU with a
/// warning when the accelerator is not built in or the string is unknown.
pub fn resolve_device(requested: &str, accelerator_available: bool) -> ResolvedDevice {
    match requested.trim().to_ascii_lowercase().as_str() {
        "cpu" => ResolvedDevice::Cpu,
        "cuda" | "gpu" | "wgpu" if accelerator_available => ResolvedDevice::Accelerator,
        "cuda" | "gpu" | "wgpu" => {
            warn!("[Trainer] device '{requested}' requested but no accelerator backend is built in; using cpu");
            ResolvedDevice::Cpu
        }
        _ => {
            warn!("[Trainer] unrecognised device '{requested}'; using cpu");
            ResolvedDevice::Cpu
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Checkpoints
// ─────────────────────────────────────────────────────────────────────────────

/// Best loss seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BestLoss {
    best: Option<f64>,
}

impl BestLoss {
    /// Nothing seen yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Best loss, if any.
    pub fn best(&self) -> Option<f64> {
        self.best
    }

    /// Record `loss`; `true` when it is strictly lower than every earlier
    /// loss (the first finite loss always is). NaN never improves.
    pub fn observe(&mut self, loss: f64) -> bool {
        if loss.is_nan() {
            return false;
        }
        match self.best {
            Some(best) if loss >= best => false,
            _ => {
                self.best = Some(loss);
                true
            }
        }
    }
}

/// Parameter files under `<model_dir>/<run_name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointStore {
    base: PathBuf,
}

impl CheckpointStore {
    /// Store for one run.
    pub fn new(model_dir: impl AsRef<Path>, run_name: &str) -> Self {
        CheckpointStore { base: model_dir.as_ref().join(run_name) }
    }

    /// Path handed to the recorder (no extension).
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// File the recorder actually writes.
    pub fn file(&self) -> PathBuf {
        self.base.with_extension("bin")
    }

    /// Whether a checkpoint exists.
    pub fn exists(&self) -> bool {
        self.file().exists()
    }

    /// Save parameters, overwriting any earlier checkpoint.
    pub fn save<B: Backend, M: Module<B>>(&self, model: &M) -> Result<()> {
        if let Some(parent) = self.base.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model
            .clone()
            .save_file(self.base.clone(), &recorder)
            .map_err(|e| Ic50Error::Checkpoint(format!("failed to save {}: {e}", self.file().display())))
    }

    /// Load parameters into `model`. A missing file is logged and the load is
    /// still attempted, so the recorder's error is what the caller sees.
    pub fn load<B: Backend, M: Module<B>>(&self, model: M, device: &B::Device) -> Result<M> {
        if !self.exists() {
            warn!("[Trainer] checkpoint {} does not exist", self.file().display());
        }
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model
            .load_file(self.base.clone(), &recorder, device)
            .map_err(|e| Ic50Error::Checkpoint(format!("failed to load {}: {e}", self.file().display())))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Trainer
// ─────────────────────────────────────────────────────────────────────────────

/// RMSE between predictions and targets.
pub fn rmse_loss<B: Backend>(predictions: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    MseLoss::new().forward(predictions, targets, Reduction::Mean).sqrt()
}

fn scalar<B: Backend>(t: Tensor<B, 1>) -> f64 {
    t.into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .ok()
        .and_then(|v| v.first().copied())
        .map(f64::from)
        .unwrap_or(f64::NAN)
}

fn mean(losses: &[f64]) -> f64 {
    if losses.is_empty() {
        f64::NAN
    } else {
        losses.iter().sum::<f64>() / losses.len() as f64
    }
}

/// Loop parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainerSettings {
    /// Run name used in logs and metrics.
    pub run_name: String,
    /// Number of epochs.
    pub epochs: usize,
    /// Adam learning rate.
    pub lr: f64,
    /// Items per batch.
    pub batch_size: usize,
    /// Base seed for per-epoch shuffling.
    pub seed: u64,
}

/// Outcome of [`Trainer::fit`].
#[derive(Debug, Clone, PartialEq)]
pub struct FitSummary {
    /// Lowest selection loss.
    pub best_loss: Option<f64>,
    /// Epoch that produced it.
    pub best_epoch: Option<usize>,
    /// Number of checkpoint writes.
    pub checkpoints_written: usize,
    /// Per-epoch metrics.
    pub history: Vec<EpochMetrics>,
}

/// Drives training, checkpointing and inference of one model.
pub struct Trainer<B: AutodiffBackend> {
    settings: TrainerSettings,
    store: CheckpointStore,
    tracker: Box<dyn ExperimentTracker>,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Trainer without tracking.
    pub fn new(settings: TrainerSettings, store: CheckpointStore, device: B::Device) -> Self {
        Trainer { settings, store, tracker: Box::new(NoopTracker), device }
    }

    /// Replace the metrics sink.
    pub fn with_tracker(mut self, tracker: Box<dyn ExperimentTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Checkpoint location.
    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Train for the configured number of epochs.
    ///
    /// The selection loss is the validation loss, or the training loss when
    /// `valid` is `None` or empty.
    pub fn fit<M, D, V>(&mut self, mut model: M, train: &D, valid: Option<&V>) -> Result<FitSummary>
    where
        M: AutodiffModule<B> + Regressor<B>,
        M::InnerModule: Regressor<B::InnerBackend>,
        D: Dataset<Ic50Item>,
        V: Dataset<Ic50Item>,
    {
        if train.is_empty() {
            return Err(Ic50Error::Dataset("training partition is empty".into()));
        }
        let valid = valid.filter(|v| !v.is_empty());
        let mut optim = AdamConfig::new().init::<B, M>();
        let mut best = BestLoss::new();
        let mut summary = FitSummary { best_loss: None, best_epoch: None, checkpoints_written: 0, history: Vec::new() };

        info!(
            "[Trainer] {}: {} epochs, {} train / {} valid rows, lr {}",
            self.settings.run_name,
            self.settings.epochs,
            train.len(),
            valid.map_or(0, |v| v.len()),
            self.settings.lr
        );

        for epoch in 0..self.settings.epochs {
            let (next, train_loss) = self.train_epoch(model, &mut optim, train, epoch)?;
            model = next;
            let valid_loss = match valid {
                Some(v) => Some(self.validate_epoch(&model.valid(), v)?),
                None => None,
            };

            let checkpointed = best.observe(valid_loss.unwrap_or(train_loss));
            if checkpointed {
                self.store.save::<B, M>(&model)?;
                summary.checkpoints_written += 1;
                summary.best_epoch = Some(epoch);
            }

            info!(
                "[Trainer] epoch {epoch}: train {train_loss:.4}, valid {}{}",
                valid_loss.map_or_else(|| "-".to_string(), |l| format!("{l:.4}")),
                if checkpointed { " (saved)" } else { "" }
            );
            let metrics = EpochMetrics {
                run_name: self.settings.run_name.clone(),
                epoch,
                train_loss,
                valid_loss,
                checkpointed,
            };
            self.tracker.log_epoch(&metrics)?;
            summary.history.push(metrics);
        }
        self.tracker.finish()?;
        summary.best_loss = best.best();
        Ok(summary)
    }

    /// One pass of optimiser updates; returns the updated model and the mean
    /// batch loss.
    pub fn train_epoch<M, O, D>(&self, mut model: M, optim: &mut O, train: &D, epoch: usize) -> Result<(M, f64)>
    where
        M: AutodiffModule<B> + Regressor<B>,
        O: Optimizer<M, B>,
        D: Dataset<Ic50Item>,
    {
        let seed = self.settings.seed.wrapping_add(epoch as u64);
        let mut losses = Vec::new();
        for items in BatchIter::shuffled(train, self.settings.batch_size, seed) {
            let items = items?;
            let batch = collate::<B>(&items, &self.device)?;
            let targets = batch
                .targets
                .clone()
                .ok_or_else(|| Ic50Error::Dataset("training batch without labels".into()))?;
            let loss = rmse_loss(model.forward_batch(&batch), targets);
            losses.push(scalar(loss.clone().detach()));
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(self.settings.lr, model, grads);
        }
        debug!("[Trainer] epoch {epoch}: {} training batches", losses.len());
        Ok((model, mean(&losses)))
    }

    /// One pass without updates; returns the mean batch loss.
    pub fn validate_epoch<M, D>(&self, model: &M, valid: &D) -> Result<f64>
    where
        M: Regressor<B::InnerBackend>,
        D: Dataset<Ic50Item>,
    {
        let mut losses = Vec::new();
        for items in BatchIter::new(valid, self.settings.batch_size) {
            let items = items?;
            let batch = collate::<B::InnerBackend>(&items, &self.device)?;
            let targets = batch
                .targets
                .clone()
                .ok_or_else(|| Ic50Error::Dataset("validation batch without labels".into()))?;
            losses.push(scalar(rmse_loss(model.forward_batch(&batch), targets)));
        }
        Ok(mean(&losses))
    }

    /// Load the best checkpoint into `model`.
    pub fn load_best<M: AutodiffModule<B>>(&self, model: M) -> Result<M> {
        let model = self.store.load::<B, M>(model, &self.device)?;
        info!("[Trainer] loaded {}", self.store.file().display());
        Ok(model)
    }

    /// Predicted pIC50 for every item, in dataset order.
    pub fn predict<M, D>(&self, model: &M, dataset: &D) -> Result<Vec<f32>>
    where
        M: AutodiffModule<B>,
        M::InnerModule: Regressor<B::InnerBackend>,
        D: Dataset<Ic50Item>,
    {
        let model = model.valid();
        let mut out = Vec::with_capacity(dataset.len());
        for items in BatchIter::new(dataset, self.settings.batch_size) {
            let items = items?;
            let batch = collate::<B::InnerBackend>(&items, &self.device)?;
            let pred = model.forward_batch(&batch);
            let values = pred
                .into_data()
                .convert::<f32>()
                .to_vec::<f32>()
                .map_err(|e| Ic50Error::Model(format!("failed to read predictions: {e:?}")))?;
            out.extend(values);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Ic50Item;
    use crate::models::{ImageRegressor, MorganMlpConfig};
    use burn::backend::{Autodiff, NdArray};

    type B = Autodiff<NdArray<f32>>;

    #[derive(Clone)]
    struct Items(Vec<Ic50Item>);

    impl Dataset<Ic50Item> for Items {
        fn get(&self, index: usize) -> Option<Ic50Item> {
            self.0.get(index).cloned()
        }
        fn len(&self) -> usize {
            self.0.len()
        }
    }

    fn linear_items(n: usize) -> Items {
        Items(
            (0..n)
                .map(|i| {
                    let x = i as f32 / n as f32;
                    Ic50Item { features: vec![x, 1.0 - x], indices: vec![1 + (i % 3) as i64], target: Some(5.0 + 2.0 * x) }
                })
                .collect(),
        )
    }

    fn settings(epochs: usize, lr: f64) -> TrainerSettings {
        TrainerSettings { run_name: "test".into(), epochs, lr, batch_size: 4, seed: 1 }
    }

    #[test]
    fn best_loss_is_strict() {
        let mut best = BestLoss::new();
        assert!(best.observe(1.0));
        assert!(!best.observe(1.0));
        assert!(!best.observe(1.5));
        assert!(best.observe(0.5));
        assert!(!best.observe(f64::NAN));
        assert_eq!(best.best(), Some(0.5));

        // increasing losses after the first epoch save exactly once
        let mut best = BestLoss::new();
        let saves = [0.3, 0.4, 0.5, 0.6].iter().filter(|&&l| best.observe(l)).count();
        assert_eq!(saves, 1);

        // a zero loss is a real value, not "unset"
        let mut best = BestLoss::new();
        assert!(best.observe(0.0));
        assert!(!best.observe(0.1));
    }

    #[test]
    fn device_resolution_falls_back_to_cpu() {
        assert_eq!(resolve_device("cpu", true), ResolvedDevice::Cpu);
        assert_eq!(resolve_device("cuda", true), ResolvedDevice::Accelerator);
        assert_eq!(resolve_device("GPU", false), ResolvedDevice::Cpu);
        assert_eq!(resolve_device("tpu", true), ResolvedDevice::Cpu);
    }

    #[test]
    fn constant_validation_loss_saves_once() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let store = CheckpointStore::new(dir.path(), "run");
        let mut trainer = Trainer::<B>::new(settings(4, 0.0), store.clone(), device);

        let model = ImageRegressor::<B>::new(2, &Default::default());
        let data = linear_items(12);
        let summary = trainer.fit(model, &data, Some(&data)).unwrap();

        assert_eq!(summary.checkpoints_written, 1);
        assert_eq!(summary.best_epoch, Some(0));
        assert_eq!(summary.history.len(), 4);
        assert!(store.exists());
    }

    #[test]
    fn training_lowers_loss_and_reloads_best() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let store = CheckpointStore::new(dir.path(), "mlp");
        let mut trainer = Trainer::<B>::new(settings(30, 1e-2), store, device);

        let cfg = MorganMlpConfig { dense_dim: 2, n_slots: 3, embed_dim: 4, layer_dims: vec![8], dropout: 0.0 };
        let data = linear_items(16);
        let summary = trainer.fit(cfg.init::<B>(&Default::default()), &data, Some(&data)).unwrap();

        let first = summary.history[0].valid_loss.unwrap();
        let best = summary.best_loss.unwrap();
        assert!(best < first, "best {best} not below first {first}");
        assert!(summary.checkpoints_written >= 1);

        let reloaded = trainer.load_best(cfg.init::<B>(&Default::default())).unwrap();
        let pred = trainer.predict(&reloaded, &data).unwrap();
        assert_eq!(pred.len(), 16);
        let again = trainer.validate_epoch(&reloaded.valid(), &data).unwrap();
        assert!((again - best).abs() < 1e-4, "reloaded loss {again} vs best {best}");
    }

    #[test]
    fn missing_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = Trainer::<B>::new(settings(1, 0.0), CheckpointStore::new(dir.path(), "none"), Default::default());
        let err = trainer.load_best(ImageRegressor::<B>::new(2, &Default::default())).unwrap_err();
        assert!(matches!(err, Ic50Error::Checkpoint(_)));
    }

    #[test]
    fn empty_training_set_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = Trainer::<B>::new(settings(1, 0.0), CheckpointStore::new(dir.path(), "x"), Default::default());
        let err = trainer.fit(ImageRegressor::<B>::new(2, &Default::default()), &Items(vec![]), None::<&Items>);
        assert!(err.is_err());
    }
}
