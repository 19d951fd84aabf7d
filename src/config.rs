//! Run configuration.
//!
//! A [`TrainConfig`] is read from TOML. Every field has a default, so a file
//! only needs the values it changes:
//!
//! ```
//! use ic50::config::{ModelKind, TrainConfig};
//!
//! let cfg = TrainConfig::from_toml_str(r#"
//!     run_name = "mlp-r3"
//!     model = "dnn"
//!     epochs = 20
//!
//!     [mlp]
//!     layer_dims = [256, 64]
//! "#).unwrap();
//! assert_eq!(cfg.model, ModelKind::Mlp);
//! assert_eq!(cfg.mlp.layer_dims, vec![256, 64]);
//! ```
//!
//! Model kind and loss kind are closed sets; an unknown value fails while the
//! file is parsed, before any data is touched.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `loss` is not one of the supported losses.
    #[error("unsupported loss '{0}' (expected: mse)")]
    UnknownLoss(String),

    /// `model` is not one of the supported model kinds.
    #[error("unsupported model '{0}' (expected: image_linear, mlp, gbdt)")]
    UnknownModel(String),

    /// `on_parse_failure` is not one of the supported policies.
    #[error("unsupported parse-failure policy '{0}' (expected: zero_fill, skip, fail)")]
    UnknownPolicy(String),

    /// Numeric field out of range.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The TOML document did not parse.
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Closed sets
// ─────────────────────────────────────────────────────────────────────────────

/// Model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelKind {
    /// Linear regressor over flattened image pixels.
    ImageLinear,
    /// MLP over dense features and the learned Morgan embedding.
    Mlp,
    /// Gradient-boosted trees over the flattened count embedding.
    Gbdt,
}

impl FromStr for ModelKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image_linear" | "resnet" | "bert" => Ok(ModelKind::ImageLinear),
            "mlp" | "dnn" => Ok(ModelKind::Mlp),
            "gbdt" | "xgboost" => Ok(ModelKind::Gbdt),
            _ => Err(ConfigError::UnknownModel(s.to_string())),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelKind::ImageLinear => "image_linear",
            ModelKind::Mlp => "mlp",
            ModelKind::Gbdt => "gbdt",
        })
    }
}

impl TryFrom<String> for ModelKind {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModelKind> for String {
    fn from(value: ModelKind) -> Self {
        value.to_string()
    }
}

/// Training loss. The reported loss is always the square root (RMSE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LossKind {
    /// Mean squared error.
    Mse,
}

impl FromStr for LossKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mse" => Ok(LossKind::Mse),
            _ => Err(ConfigError::UnknownLoss(s.to_string())),
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("mse")
    }
}

impl TryFrom<String> for LossKind {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LossKind> for String {
    fn from(value: LossKind) -> Self {
        value.to_string()
    }
}

/// What to do with a record whose SMILES does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ParseFailurePolicy {
    /// Substitute an all-zero embedding of the declared shape.
    ZeroFill,
    /// Drop the record from labelled partitions (inference rows are zero-filled).
    Skip,
    /// Abort with an error.
    Fail,
}

impl FromStr for ParseFailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zero_fill" | "zero" => Ok(ParseFailurePolicy::ZeroFill),
            "skip" => Ok(ParseFailurePolicy::Skip),
            "fail" => Ok(ParseFailurePolicy::Fail),
            _ => Err(ConfigError::UnknownPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for ParseFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParseFailurePolicy::ZeroFill => "zero_fill",
            ParseFailurePolicy::Skip => "skip",
            ParseFailurePolicy::Fail => "fail",
        })
    }
}

impl TryFrom<String> for ParseFailurePolicy {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ParseFailurePolicy> for String {
    fn from(value: ParseFailurePolicy) -> Self {
        value.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// Morgan embedding settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Maximum environment radius; the embedding has `radius + 1` columns.
    pub radius: usize,
    /// Width of the folded count fingerprint in the MLP's dense vector.
    pub fold_bits: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { radius: crate::chem::DEFAULT_RADIUS, fold_bits: 2048 }
    }
}

/// MLP architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpSection {
    /// Hidden widths of the normalise→linear→activate→dropout stack.
    pub layer_dims: Vec<usize>,
    /// Width of the learned substructure embedding.
    pub embed_dim: usize,
    /// Dropout probability inside the stack.
    pub dropout: f64,
}

impl Default for MlpSection {
    fn default() -> Self {
        Self { layer_dims: vec![512, 128], embed_dim: 64, dropout: 0.5 }
    }
}

/// Gradient-boosting hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GbdtSection {
    /// Number of boosting rounds.
    pub n_estimators: usize,
    /// Shrinkage per round.
    pub learning_rate: f32,
    /// Maximum tree depth.
    pub max_depth: u32,
}

impl Default for GbdtSection {
    fn default() -> Self {
        Self { n_estimators: 200, learning_rate: 0.1, max_depth: 6 }
    }
}

/// Image preprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSection {
    /// Side length after resizing.
    pub size: u32,
}

impl Default for ImageSection {
    fn default() -> Self {
        Self { size: 300 }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Top level
// ─────────────────────────────────────────────────────────────────────────────

/// Full run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Names the checkpoint, metrics and submission files.
    pub run_name: String,
    /// Directory holding `train.csv`, `test.csv`, `sample_submission.csv`.
    pub data_dir: PathBuf,
    /// Checkpoint directory.
    pub model_dir: PathBuf,
    /// Submission directory.
    pub submission_dir: PathBuf,
    /// Directory of pre-rendered `<row id>.png` images (image model only).
    pub image_dir: Option<PathBuf>,
    /// Requested device: `cpu`, `cuda`/`gpu`/`wgpu`.
    pub device: String,
    /// Training loss.
    pub loss: LossKind,
    /// Model family.
    pub model: ModelKind,
    /// Learning rate.
    pub lr: f64,
    /// Epoch count.
    pub epochs: usize,
    /// Batch size.
    pub batch_size: usize,
    /// Seed for splitting, shuffling, parameter initialisation and dropout.
    pub seed: u64,
    /// Validation share for the holdout split.
    pub valid_ratio: f64,
    /// Use k-fold rotation instead of a holdout split.
    pub k_fold: Option<usize>,
    /// Write per-epoch metrics to `<model_dir>/<run_name>.metrics.jsonl`.
    pub tracking: bool,
    /// Handling of unparseable structures.
    pub on_parse_failure: ParseFailurePolicy,
    /// Morgan embedding settings.
    pub embedding: EmbeddingConfig,
    /// MLP architecture.
    pub mlp: MlpSection,
    /// GBDT hyperparameters.
    pub gbdt: GbdtSection,
    /// Image preprocessing.
    pub image: ImageSection,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            run_name: "baseline".to_string(),
            data_dir: PathBuf::from("data"),
            model_dir: PathBuf::from("models"),
            submission_dir: PathBuf::from("data/submissions"),
            image_dir: None,
            device: "cpu".to_string(),
            loss: LossKind::Mse,
            model: ModelKind::Mlp,
            lr: 1e-3,
            epochs: 10,
            batch_size: 64,
            seed: 42,
            valid_ratio: 0.2,
            k_fold: None,
            tracking: false,
            on_parse_failure: ParseFailurePolicy::ZeroFill,
            embedding: EmbeddingConfig::default(),
            mlp: MlpSection::default(),
            gbdt: GbdtSection::default(),
            image: ImageSection::default(),
        }
    }
}

impl TrainConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: TrainConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }

    /// Range checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| Err(ConfigError::Invalid { field, reason: reason.to_string() });
        if self.run_name.trim().is_empty() {
            return invalid("run_name", "must not be empty");
        }
        if !(0.0..1.0).contains(&self.valid_ratio) {
            return invalid("valid_ratio", "must be in [0, 1)");
        }
        if self.batch_size == 0 {
            return invalid("batch_size", "must be positive");
        }
        if !(self.lr.is_finite() && self.lr >= 0.0) {
            return invalid("lr", "must be a finite, non-negative number");
        }
        if matches!(self.k_fold, Some(k) if k < 2) {
            return invalid("k_fold", "needs at least 2 folds");
        }
        if !(0.0..1.0).contains(&self.mlp.dropout) {
            return invalid("mlp.dropout", "must be in [0, 1)");
        }
        if self.mlp.embed_dim == 0 {
            return invalid("mlp.embed_dim", "must be positive");
        }
        if self.embedding.radius > crate::chem::MAX_RADIUS {
            return invalid("embedding.radius", "must be at most 8");
        }
        if self.embedding.fold_bits == 0 {
            return invalid("embedding.fold_bits", "must be positive");
        }
        if self.image.size == 0 {
            return invalid("image.size", "must be positive");
        }
        Ok(())
    }

    /// `<submission_dir>/<run_name>.csv`.
    pub fn submission_path(&self) -> PathBuf {
        self.submission_dir.join(format!("{}.csv", self.run_name))
    }
}
