//! Gradient-boosted trees over flat feature vectors.
//!
//! Thin wrapper around [`::gbdt::gradient_boost::GBDT`] with a squared-error
//! objective. Rows go in as `&[Vec<f32>]`, predictions come out as `Vec<f32>`.

use std::path::Path;

use ::gbdt::config::Config;
use ::gbdt::decision_tree::{Data, DataVec};
use ::gbdt::gradient_boost::GBDT;
use tracing::info;

use crate::config::GbdtSection;
use crate::error::{Ic50Error, Result};

/// Boosted-tree regressor.
pub struct GbdtRegressor {
    model: GBDT,
    feature_size: usize,
}

impl std::fmt::Debug for GbdtRegressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GbdtRegressor").field("feature_size", &self.feature_size).finish_non_exhaustive()
    }
}

impl GbdtRegressor {
    /// Untrained ensemble for rows of width `feature_size`.
    pub fn new(params: &GbdtSection, feature_size: usize) -> Self {
        let mut cfg = Config::new();
        cfg.set_feature_size(feature_size);
        cfg.set_max_depth(params.max_depth);
        cfg.set_iterations(params.n_estimators);
        cfg.set_shrinkage(params.learning_rate);
        cfg.set_loss("SquaredError");
        cfg.set_debug(false);
        cfg.set_training_optimization_level(2);
        GbdtRegressor { model: GBDT::new(&cfg), feature_size }
    }

    /// Width of the rows this model expects.
    pub fn feature_size(&self) -> usize {
        self.feature_size
    }

    fn check_width(&self, rows: &[Vec<f32>]) -> Result<()> {
        match rows.iter().find(|r| r.len() != self.feature_size) {
            Some(r) => Err(Ic50Error::Model(format!(
                "row has {} features, model expects {}",
                r.len(),
                self.feature_size
            ))),
            None => Ok(()),
        }
    }

    /// Fit on rows and pIC50 targets.
    pub fn fit(&mut self, rows: &[Vec<f32>], targets: &[f32]) -> Result<()> {
        if rows.is_empty() || rows.len() != targets.len() {
            return Err(Ic50Error::Model(format!(
                "cannot fit on {} rows with {} targets",
                rows.len(),
                targets.len()
            )));
        }
        self.check_width(rows)?;
        let mut data: DataVec = rows
            .iter()
            .zip(targets)
            .map(|(row, &y)| Data::new_training_data(row.clone(), 1.0, y, None))
            .collect();
        info!("[GBDT] fitting on {} rows x {} features", rows.len(), self.feature_size);
        self.model.fit(&mut data);
        Ok(())
    }

    /// Predict one value per row.
    pub fn predict(&self, rows: &[Vec<f32>]) -> Result<Vec<f32>> {
        self.check_width(rows)?;
        let data: DataVec = rows.iter().map(|row| Data::new_test_data(row.clone(), None)).collect();
        Ok(self.model.predict(&data))
    }

    /// Write the ensemble to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.model
            .save_model(&path.to_string_lossy())
            .map_err(|e| Ic50Error::Checkpoint(format!("failed to save {}: {e}", path.display())))
    }

    /// Read an ensemble written by [`GbdtRegressor::save`].
    pub fn load<P: AsRef<Path>>(path: P, feature_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let model = GBDT::load_model(&path.to_string_lossy())
            .map_err(|e| Ic50Error::Checkpoint(format!("failed to load {}: {e}", path.display())))?;
        Ok(GbdtRegressor { model, feature_size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> GbdtSection {
        GbdtSection { n_estimators: 50, learning_rate: 0.3, max_depth: 3 }
    }

    fn toy() -> (Vec<Vec<f32>>, Vec<f32>) {
        let rows: Vec<Vec<f32>> = (0..40).map(|i| vec![i as f32 / 10.0, (i % 3) as f32]).collect();
        let targets = rows.iter().map(|r| if r[0] < 2.0 { 5.0 } else { 8.0 }).collect();
        (rows, targets)
    }

    #[test]
    fn learns_a_step_function() {
        let (rows, targets) = toy();
        let mut model = GbdtRegressor::new(&params(), 2);
        model.fit(&rows, &targets).unwrap();
        let pred = model.predict(&[vec![0.5, 0.0], vec![3.5, 1.0]]).unwrap();
        assert!((pred[0] - 5.0).abs() < 0.5, "{pred:?}");
        assert!((pred[1] - 8.0).abs() < 0.5, "{pred:?}");
    }

    #[test]
    fn save_and_load_keep_predictions() {
        let (rows, targets) = toy();
        let mut model = GbdtRegressor::new(&params(), 2);
        model.fit(&rows, &targets).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.gbdt");
        model.save(&path).unwrap();
        let loaded = GbdtRegressor::load(&path, 2).unwrap();
        assert_eq!(model.predict(&rows).unwrap(), loaded.predict(&rows).unwrap());
    }

    #[test]
    fn width_and_length_are_checked() {
        let mut model = GbdtRegressor::new(&params(), 2);
        assert!(model.fit(&[vec![1.0]], &[1.0]).is_err());
        assert!(model.fit(&[vec![1.0, 2.0]], &[]).is_err());
        assert!(GbdtRegressor::load("/nonexistent/run.gbdt", 2).is_err());
    }
}
