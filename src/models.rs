//! Regression models and their evaluation.
//!
//! - [`image_linear`]: one affine map over flattened pixels
//! - [`mlp`]: dense features plus a learned substructure embedding
//! - [`gbdt`]: boosted trees over the flattened count embedding
//!
//! The neural models share the [`Regressor`] trait so one trainer drives both.
//! Every model is scored with [`RegressionReport`].
//!
//! ```
//! use ic50::models::RegressionReport;
//!
//! let report = RegressionReport::compute(&[6.0, 7.0, 8.0], &[6.0, 7.0, 8.0])?;
//! assert_eq!(report.rmse, 0.0);
//! assert_eq!(report.r2, 1.0);
//! # Ok::<(), ic50::Ic50Error>(())
//! ```

pub mod gbdt;
pub mod image_linear;
pub mod mlp;

pub use self::gbdt::GbdtRegressor;
pub use image_linear::ImageRegressor;
pub use mlp::{MlpBlock, MorganMlp, MorganMlpConfig};

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use linfa::prelude::SingleTargetRegression;
use ndarray::Array1;
use serde::Serialize;

use crate::dataset::Ic50Batch;
use crate::error::{Ic50Error, Result};

/// A network mapping a collated batch to `[batch, 1]` pIC50 predictions.
pub trait Regressor<B: Backend> {
    /// Forward pass.
    fn forward_batch(&self, batch: &Ic50Batch<B>) -> Tensor<B, 2>;
}

/// Error metrics of a set of predictions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegressionReport {
    /// Root mean squared error.
    pub rmse: f64,
    /// Coefficient of determination.
    pub r2: f64,
    /// Number of scored rows.
    pub n: usize,
}

impl RegressionReport {
    /// Score `predictions` against `truth` (same length, non-empty).
    pub fn compute(predictions: &[f32], truth: &[f32]) -> Result<Self> {
        if predictions.len() != truth.len() || truth.is_empty() {
            return Err(Ic50Error::Model(format!(
                "cannot score {} predictions against {} labels",
                predictions.len(),
                truth.len()
            )));
        }
        let pred: Array1<f64> = predictions.iter().map(|&v| f64::from(v)).collect();
        let truth: Array1<f64> = truth.iter().map(|&v| f64::from(v)).collect();
        let mse = pred.mean_squared_error(&truth)?;
        let r2 = pred.r2(&truth)?;
        Ok(RegressionReport { rmse: mse.sqrt(), r2, n: truth.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn report_matches_hand_computation() {
        let pred = [5.0, 7.0, 9.0, 6.0];
        let truth = [6.0, 7.0, 8.0, 7.0];
        let r = RegressionReport::compute(&pred, &truth).unwrap();
        // squared errors 1, 0, 1, 1
        assert_relative_eq!(r.rmse, 0.75f64.sqrt(), epsilon = 1e-12);
        // truth mean 7, total sum of squares 2
        assert_relative_eq!(r.r2, 1.0 - 3.0 / 2.0, epsilon = 1e-6);
        assert_eq!(r.n, 4);
    }

    #[test]
    fn report_rejects_mismatched_inputs() {
        assert!(RegressionReport::compute(&[1.0], &[1.0, 2.0]).is_err());
        assert!(RegressionReport::compute(&[], &[]).is_err());
    }
}
