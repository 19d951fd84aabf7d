//! Crate-wide error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::features::EmbedError;

/// Errors surfaced by loading, preprocessing, training and export.
#[derive(Debug, Error)]
pub enum Ic50Error {
    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited-file read or write failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid configuration value.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A required column is absent from an input file.
    #[error("column '{0}' not found in CSV headers")]
    MissingColumn(String),

    /// Malformed identifiers or labels.
    #[error("preprocessing failed: {0}")]
    Preprocess(String),

    /// Impossible train/validation partition request.
    #[error("invalid partition: {0}")]
    Partition(String),

    /// Structure could not be embedded and the policy says to stop.
    #[error(transparent)]
    Embed(#[from] EmbedError),

    /// Dataset construction failure (missing labels, images, empty inputs).
    #[error("dataset error: {0}")]
    Dataset(String),

    /// Image decoding failure.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Saving or loading model parameters failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Model fitting or prediction failed.
    #[error("model error: {0}")]
    Model(String),

    /// Metric computation failed.
    #[error("metrics error: {0}")]
    Metrics(#[from] linfa::Error),

    /// Experiment-tracking serialisation failed.
    #[error("tracking error: {0}")]
    Tracking(#[from] serde_json::Error),
}

/// Shorthand used across the crate.
pub type Result<T> = std::result::Result<T, Ic50Error>;
