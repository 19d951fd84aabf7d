//! End-to-end runs: load, partition, train, predict, export.
//!
//! A run trains one model per partition (a single holdout split or `k`
//! rotating folds), each with features fitted on its own training rows only.
//! Test predictions are averaged across partitions, converted from pIC50 to
//! IC50 and written into a copy of the sample submission.

use std::path::PathBuf;

use burn::data::dataset::Dataset;
use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::info;

use crate::activity::pic50_to_ic50_all;
use crate::config::{ModelKind, TrainConfig};
use crate::data_io::write_submission;
use crate::dataset::{FeatureView, ImageDataset, ImageTransform, Ic50Item, Mode, MorganDataset};
use crate::error::{Ic50Error, Result};
use crate::features::FeatureSpace;
use crate::models::{GbdtRegressor, ImageRegressor, MorganMlpConfig, RegressionReport, Regressor};
use crate::preprocess::Preprocessor;
use crate::table::{Split, Table};
use crate::tracking::{tracker_for, EpochMetrics};
use crate::train::{CheckpointStore, Trainer, TrainerSettings};

/// Result of one partition.
#[derive(Debug, Clone, Serialize)]
pub struct FoldReport {
    /// `<run_name>` or `<run_name>-fold<i>`.
    pub run_name: String,
    /// Saved model file.
    pub checkpoint: PathBuf,
    /// Best-model scores on the validation rows, when there were any.
    pub valid: Option<RegressionReport>,
    /// Checkpoint writes during training (1 for boosted trees).
    pub checkpoints_written: usize,
}

/// Result of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Configured run name.
    pub run_name: String,
    /// Trained model family.
    pub model: ModelKind,
    /// One entry per partition.
    pub folds: Vec<FoldReport>,
    /// Written submission file.
    pub submission: PathBuf,
    /// Number of predicted rows.
    pub n_predictions: usize,
}

/// Run the configured pipeline with neural models on backend `B`.
///
/// The backend is seeded with `cfg.seed` first, so parameter initialisation
/// and dropout repeat across runs with the same config.
pub fn run<B: AutodiffBackend>(cfg: &TrainConfig, device: B::Device) -> Result<PipelineReport> {
    B::seed(cfg.seed);
    let mut preprocessor = Preprocessor::new(cfg.embedding.radius);
    if cfg.model == ModelKind::ImageLinear {
        let dir = cfg.image_dir.clone().unwrap_or_else(|| cfg.data_dir.join("images"));
        preprocessor = preprocessor.with_image_dir(dir);
    }
    let train = preprocessor.load_train(&cfg.data_dir)?;
    let test = preprocessor.load_test(&cfg.data_dir)?;

    let partitions: Vec<(String, Split)> = match cfg.k_fold {
        Some(k) => {
            info!("[Pipeline] split info {k}-fold...");
            train
                .k_fold(k)?
                .into_iter()
                .enumerate()
                .map(|(i, split)| (format!("{}-fold{i}", cfg.run_name), split))
                .collect()
        }
        None => {
            info!("[Pipeline] split train into train and valid ({})...", cfg.valid_ratio);
            let mut rng = StdRng::seed_from_u64(cfg.seed);
            vec![(cfg.run_name.clone(), train.split(cfg.valid_ratio, &mut rng)?)]
        }
    };

    let mut folds = Vec::with_capacity(partitions.len());
    let mut summed: Vec<f64> = Vec::new();
    for (name, split) in &partitions {
        let (predictions, report) = match cfg.model {
            ModelKind::Mlp => run_mlp::<B>(cfg, name, split, &test, &device)?,
            ModelKind::ImageLinear => run_image::<B>(cfg, name, split, &test, &device)?,
            ModelKind::Gbdt => run_gbdt(cfg, name, split, &test)?,
        };
        if summed.is_empty() {
            summed = vec![0.0; predictions.len()];
        }
        if predictions.len() != summed.len() {
            return Err(Ic50Error::Model(format!(
                "{name} predicted {} rows, expected {}",
                predictions.len(),
                summed.len()
            )));
        }
        for (acc, p) in summed.iter_mut().zip(&predictions) {
            *acc += f64::from(*p);
        }
        if let Some(valid) = &report.valid {
            info!("[Pipeline] {name}: valid rmse {:.4}, r2 {:.4}", valid.rmse, valid.r2);
        }
        folds.push(report);
    }

    let n_folds = partitions.len() as f64;
    let averaged: Vec<f32> = summed.iter().map(|s| (s / n_folds) as f32).collect();
    let ic50 = pic50_to_ic50_all(&averaged);
    let submission = cfg.submission_path();
    write_submission(cfg.data_dir.join("sample_submission.csv"), &submission, &ic50)?;

    Ok(PipelineReport {
        run_name: cfg.run_name.clone(),
        model: cfg.model,
        folds,
        submission,
        n_predictions: ic50.len(),
    })
}

fn settings(cfg: &TrainConfig, run_name: &str) -> TrainerSettings {
    TrainerSettings {
        run_name: run_name.to_string(),
        epochs: cfg.epochs,
        lr: cfg.lr,
        batch_size: cfg.batch_size,
        seed: cfg.seed,
    }
}

fn targets_of<D: Dataset<Ic50Item>>(dataset: &D) -> Vec<f32> {
    dataset.iter().filter_map(|item| item.target).collect()
}

/// Train, reload the best checkpoint, score validation rows, predict test rows.
fn fit_neural<B, M, D, F>(
    cfg: &TrainConfig,
    run_name: &str,
    device: &B::Device,
    init: F,
    train: &D,
    valid: &D,
    test: &D,
) -> Result<(Vec<f32>, FoldReport)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Regressor<B>,
    M::InnerModule: Regressor<B::InnerBackend>,
    D: Dataset<Ic50Item>,
    F: Fn(&B::Device) -> M,
{
    let store = CheckpointStore::new(&cfg.model_dir, run_name);
    let mut trainer = Trainer::<B>::new(settings(cfg, run_name), store, device.clone())
        .with_tracker(tracker_for(cfg.tracking, &cfg.model_dir, run_name)?);

    let summary = trainer.fit(init(device), train, Some(valid))?;
    let best = trainer.load_best(init(device))?;

    let valid_report = if valid.is_empty() {
        None
    } else {
        Some(RegressionReport::compute(&trainer.predict(&best, valid)?, &targets_of(valid))?)
    };
    let predictions = trainer.predict(&best, test)?;
    Ok((
        predictions,
        FoldReport {
            run_name: run_name.to_string(),
            checkpoint: trainer.store().file(),
            valid: valid_report,
            checkpoints_written: summary.checkpoints_written,
        },
    ))
}

fn morgan_partitions(
    cfg: &TrainConfig,
    split: &Split,
    test: &Table,
    view: FeatureView,
) -> Result<(FeatureSpace, MorganDataset, MorganDataset, MorganDataset)> {
    let space = FeatureSpace::fit(&split.train, &cfg.embedding, cfg.on_parse_failure)?;
    let train = MorganDataset::new(&space.admit(&split.train, true)?, &space, view, Mode::Training)?;
    let valid = MorganDataset::new(&space.admit(&split.valid, true)?, &space, view, Mode::Training)?;
    let test = MorganDataset::new(&space.admit(test, false)?, &space, view, Mode::Inference)?;
    Ok((space, train, valid, test))
}

fn run_mlp<B: AutodiffBackend>(
    cfg: &TrainConfig,
    run_name: &str,
    split: &Split,
    test: &Table,
    device: &B::Device,
) -> Result<(Vec<f32>, FoldReport)> {
    let (space, train, valid, test) = morgan_partitions(cfg, split, test, FeatureView::Dense)?;
    let arch = MorganMlpConfig {
        dense_dim: space.dense_dim(),
        n_slots: space.flat_dim(),
        embed_dim: cfg.mlp.embed_dim,
        layer_dims: cfg.mlp.layer_dims.clone(),
        dropout: cfg.mlp.dropout,
    };
    fit_neural::<B, _, _, _>(cfg, run_name, device, |d| arch.init::<B>(d), &train, &valid, &test)
}

fn run_image<B: AutodiffBackend>(
    cfg: &TrainConfig,
    run_name: &str,
    split: &Split,
    test: &Table,
    device: &B::Device,
) -> Result<(Vec<f32>, FoldReport)> {
    let transform = ImageTransform::new(cfg.image.size);
    let input_dim = transform.output_len();
    info!("[Pipeline] image transform to {0}x{0}...", cfg.image.size);
    let train = ImageDataset::new(&split.train, transform.clone(), Mode::Training)?;
    let valid = ImageDataset::new(&split.valid, transform.clone(), Mode::Training)?;
    let test = ImageDataset::new(test, transform, Mode::Inference)?;
    fit_neural::<B, _, _, _>(cfg, run_name, device, |d| ImageRegressor::<B>::new(input_dim, d), &train, &valid, &test)
}

fn run_gbdt(cfg: &TrainConfig, run_name: &str, split: &Split, test: &Table) -> Result<(Vec<f32>, FoldReport)> {
    let (space, train, valid, test) = morgan_partitions(cfg, split, test, FeatureView::Standardized)?;
    let rows = |ds: &MorganDataset| ds.items().iter().map(|it| it.features.clone()).collect::<Vec<_>>();

    let mut model = GbdtRegressor::new(&cfg.gbdt, space.flat_dim());
    let train_targets = targets_of(&train);
    model.fit(&rows(&train), &train_targets)?;
    let checkpoint = cfg.model_dir.join(format!("{run_name}.gbdt"));
    model.save(&checkpoint)?;

    let train_report = RegressionReport::compute(&model.predict(&rows(&train))?, &train_targets)?;
    let valid_report = if valid.is_empty() {
        None
    } else {
        Some(RegressionReport::compute(&model.predict(&rows(&valid))?, &targets_of(&valid))?)
    };

    let mut tracker = tracker_for(cfg.tracking, &cfg.model_dir, run_name)?;
    tracker.log_epoch(&EpochMetrics {
        run_name: run_name.to_string(),
        epoch: 0,
        train_loss: train_report.rmse,
        valid_loss: valid_report.map(|r| r.rmse),
        checkpointed: true,
    })?;
    tracker.finish()?;

    let predictions = model.predict(&rows(&test))?;
    Ok((
        predictions,
        FoldReport { run_name: run_name.to_string(), checkpoint, valid: valid_report, checkpoints_written: 1 },
    ))
}
