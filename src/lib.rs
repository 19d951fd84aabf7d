#![warn(missing_docs)]
//! ic50: bioactivity regression from chemical structure.
//!
//! This crate turns SMILES strings into numeric features and trains regressors
//! that predict pIC50 (and from it IC50 in nanomolar):
//!
//! - **chem**: a compact SMILES graph reader, Morgan circular environments
//!   and graph descriptors (no RDKit/OpenBabel needed)
//! - **features**: training-only vocabulary with an out-of-vocabulary slot,
//!   fixed-shape count embeddings, standardisation and sparse indices
//! - **dataset** / **models** / **train**: `burn` datasets, a linear image
//!   regressor, a Morgan MLP, a boosted-tree wrapper and a checkpointing trainer
//! - **pipeline**: holdout or k-fold runs ending in a submission file
//!
//! # Quick examples
//!
//! ### Structure to embedding
//! ```
//! use ic50::chem::{morgan_environments, parse_smiles};
//! use ic50::features::{embed_smiles, standardize, Vocabulary};
//!
//! let aspirin = parse_smiles("CC(=O)Oc1ccccc1C(=O)O").unwrap();
//! let vocab = Vocabulary::fit([&morgan_environments(&aspirin, 3)]);
//!
//! let counts = embed_smiles("CC(=O)Oc1ccccc1C(=O)O", &vocab, 3).unwrap();
//! assert_eq!(counts.dim(), (vocab.len() + 1, 4));
//! let z = standardize(counts.view());
//! assert!(z.sum().abs() < 1e-3);
//! ```
//!
//! ### Potency units
//! ```
//! use ic50::activity::pic50_to_ic50;
//!
//! assert_eq!(pic50_to_ic50(6.0), 1000.0);
//! ```
//!
//! ### A full run
//! ```no_run
//! use ic50::config::TrainConfig;
//! use ic50::cli::CpuBackend;
//!
//! let cfg = TrainConfig::from_path("configs/example.toml")?;
//! let report = ic50::pipeline::run::<CpuBackend>(&cfg, Default::default())?;
//! println!("submission: {}", report.submission.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod activity;
pub mod chem;
pub mod cli;
pub mod config;
pub mod data_io;
pub mod dataset;
pub mod error;
pub mod features;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod table;
pub mod tracking;
pub mod train;

// ─────────────────────────────────────────────────────────────────────────────
// Convenience re-exports
// ─────────────────────────────────────────────────────────────────────────────
pub use activity::{pic50_to_ic50, pic50_to_ic50_array};
pub use config::{LossKind, ModelKind, ParseFailurePolicy, TrainConfig};
pub use error::{Ic50Error, Result};
pub use features::{embed_smiles, EmbedError, FeatureSpace, Vocabulary};
pub use table::{Record, Split, Structure, Table};
