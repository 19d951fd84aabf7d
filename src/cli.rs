//! Command-line front end for the `train` binary.
//!
//! Settings come from an optional TOML file; a handful of flags override it
//! for quick experiments:
//!
//! ```text
//! train --config configs/mlp.toml --run-name mlp-lr3 --lr 1e-3 --epochs 30
//! ```

use std::path::PathBuf;

use anyhow::Context;
use burn::backend::{Autodiff, NdArray};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{ModelKind, TrainConfig};
use crate::pipeline::{self, PipelineReport};
use crate::train::{resolve_device, ResolvedDevice, ACCELERATOR_AVAILABLE};

/// CPU training backend.
pub type CpuBackend = Autodiff<NdArray<f32>>;

/// Accelerator training backend.
#[cfg(feature = "backend-wgpu")]
pub type AcceleratorBackend = Autodiff<burn::backend::Wgpu>;

/// Train a pIC50 regressor and write a submission file.
#[derive(Parser, Debug, Clone)]
#[command(name = "train", about = "Train an IC50 regressor and export predictions")]
pub struct TrainArgs {
    /// TOML config; defaults apply when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Override `run_name`.
    #[arg(long)]
    pub run_name: Option<String>,
    /// Override `epochs`.
    #[arg(long)]
    pub epochs: Option<usize>,
    /// Override `lr`.
    #[arg(long)]
    pub lr: Option<f64>,
    /// Override `device` (cpu, cuda, gpu, wgpu).
    #[arg(long)]
    pub device: Option<String>,
    /// Override `model` (image_linear, mlp, gbdt and their aliases).
    #[arg(long)]
    pub model: Option<ModelKind>,
}

impl TrainArgs {
    /// Config file (or defaults) with flag overrides applied and validated.
    pub fn resolve_config(&self) -> anyhow::Result<TrainConfig> {
        let mut cfg = match &self.config {
            Some(path) => TrainConfig::from_path(path)?,
            None => TrainConfig::default(),
        };
        if let Some(run_name) = &self.run_name {
            cfg.run_name = run_name.clone();
        }
        if let Some(epochs) = self.epochs {
            cfg.epochs = epochs;
        }
        if let Some(lr) = self.lr {
            cfg.lr = lr;
        }
        if let Some(device) = &self.device {
            cfg.device = device.clone();
        }
        if let Some(model) = self.model {
            cfg.model = model;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Install the global `tracing` subscriber (`RUST_LOG`, default `info`).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Run the pipeline described by `args` on the resolved backend.
pub fn run_train(args: &TrainArgs) -> anyhow::Result<PipelineReport> {
    let cfg = args.resolve_config()?;
    let device = resolve_device(&cfg.device, ACCELERATOR_AVAILABLE);
    info!("[Train] run '{}' with {} on {device}", cfg.run_name, cfg.model);

    let report = match device {
        ResolvedDevice::Cpu => pipeline::run::<CpuBackend>(&cfg, Default::default()),
        #[cfg(feature = "backend-wgpu")]
        ResolvedDevice::Accelerator => pipeline::run::<AcceleratorBackend>(&cfg, Default::default()),
        #[cfg(not(feature = "backend-wgpu"))]
        ResolvedDevice::Accelerator => pipeline::run::<CpuBackend>(&cfg, Default::default()),
    }
    .with_context(|| format!("run '{}' failed", cfg.run_name))?;

    info!("[Train] submission written to {}", report.submission.display());
    Ok(report)
}
