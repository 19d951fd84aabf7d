//! Feature construction from parsed structures.
//!
//! The count embedding of a molecule is a `(vocab.len() + 1, radius + 1)`
//! array: row `p` holds the occurrence counts of the key at vocabulary
//! position `p` split by radius, and the last row collects every key the
//! vocabulary has never seen. The vocabulary is fitted on a training
//! partition only, so validation and test rows cannot shape it.
//!
//! ```
//! use ic50::chem::{morgan_environments, parse_smiles};
//! use ic50::features::{embed_smiles, Vocabulary};
//!
//! let train = morgan_environments(&parse_smiles("CCO").unwrap(), 2);
//! let vocab = Vocabulary::fit([&train]);
//!
//! let emb = embed_smiles("CCN", &vocab, 2).unwrap();
//! assert_eq!(emb.dim(), (vocab.len() + 1, 3));
//! // the nitrogen environments land in the out-of-vocabulary row
//! assert!(emb.row(vocab.oov_slot()).sum() > 0.0);
//!
//! assert!(embed_smiles("C1CC", &vocab, 2).is_err());
//! ```

use ndarray::{Array2, ArrayView2};
use thiserror::Error;
use tracing::{info, warn};

use crate::chem::{morgan_environments, parse_smiles, ChemError, MorganEnvironments, N_DESCRIPTORS};
use crate::config::{EmbeddingConfig, ParseFailurePolicy};
use crate::error::{Ic50Error, Result};
use crate::table::{Record, Structure, Table};

/// A structure that could not be embedded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot embed '{smiles}': {source}")]
pub struct EmbedError {
    /// The offending structure string (or row id when the string is gone).
    pub smiles: String,
    /// Why parsing failed.
    #[source]
    pub source: ChemError,
}

// ─────────────────────────────────────────────────────────────────────────────
// Vocabulary
// ─────────────────────────────────────────────────────────────────────────────

/// Sorted distinct Morgan keys with an out-of-vocabulary slot at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    keys: Vec<u32>,
}

impl Vocabulary {
    /// Collect the keys of every given environment set.
    pub fn fit<'a, I>(environments: I) -> Self
    where
        I: IntoIterator<Item = &'a MorganEnvironments>,
    {
        let mut keys: Vec<u32> = environments.into_iter().flat_map(|e| e.keys()).collect();
        keys.sort_unstable();
        keys.dedup();
        Vocabulary { keys }
    }

    /// Fit on the parsed records of a table.
    pub fn fit_table(table: &Table) -> Self {
        Self::fit(table.iter().filter_map(|r| r.structure.parsed()).map(|p| &p.environments))
    }

    /// Number of known keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// No known keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Row reserved for unseen keys.
    pub fn oov_slot(&self) -> usize {
        self.keys.len()
    }

    /// Rows of an embedding built from this vocabulary.
    pub fn n_rows(&self) -> usize {
        self.keys.len() + 1
    }

    /// Whether the key was seen while fitting.
    pub fn contains(&self, key: u32) -> bool {
        self.keys.binary_search(&key).is_ok()
    }

    /// Row of `key`, or [`Vocabulary::oov_slot`].
    pub fn position(&self, key: u32) -> usize {
        self.keys.binary_search(&key).unwrap_or(self.keys.len())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-record transforms
// ─────────────────────────────────────────────────────────────────────────────

/// Scatter `(key, radius)` counts into a `(vocab.n_rows(), radius + 1)` array.
/// Environments beyond `radius` are ignored.
pub fn count_embedding(environments: &MorganEnvironments, vocab: &Vocabulary, radius: usize) -> Array2<f32> {
    let mut out = Array2::<f32>::zeros((vocab.n_rows(), radius + 1));
    for ((key, r), count) in environments.counts() {
        if r <= radius {
            out[[vocab.position(key), r]] += count as f32;
        }
    }
    out
}

/// Parse `smiles` and build its count embedding.
pub fn embed_smiles(smiles: &str, vocab: &Vocabulary, radius: usize) -> std::result::Result<Array2<f32>, EmbedError> {
    let mol = parse_smiles(smiles).map_err(|source| EmbedError { smiles: smiles.to_string(), source })?;
    Ok(count_embedding(&morgan_environments(&mol, radius), vocab, radius))
}

/// Count embedding of an already parsed record; unparseable structures give
/// an all-zero array of the same shape.
pub fn embed_or_zeros(structure: &Structure, vocab: &Vocabulary, radius: usize) -> Array2<f32> {
    match structure.parsed() {
        Some(parsed) => count_embedding(&parsed.environments, vocab, radius),
        None => Array2::zeros((vocab.n_rows(), radius + 1)),
    }
}

/// Per-record standardisation: `(x - mean) / std` over all cells. A record
/// with zero variance is only mean-centred.
pub fn standardize(embedding: ArrayView2<'_, f32>) -> Array2<f32> {
    let n = embedding.len();
    if n == 0 {
        return embedding.to_owned();
    }
    let mean = embedding.sum() / n as f32;
    let var = embedding.fold(0.0f32, |acc, &x| acc + (x - mean) * (x - mean)) / n as f32;
    let std = var.sqrt();
    if std > 0.0 {
        embedding.mapv(|x| (x - mean) / std)
    } else {
        embedding.mapv(|x| x - mean)
    }
}

/// Sparse index list over the flattened counts: `i + 1` for every non-zero
/// cell `i` in row-major order. Index 0 is left free for padding.
pub fn sparse_indices(counts: ArrayView2<'_, f32>) -> Vec<i64> {
    counts
        .iter()
        .enumerate()
        .filter(|(_, &c)| c != 0.0)
        .map(|(i, _)| i as i64 + 1)
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Descriptor scaling
// ─────────────────────────────────────────────────────────────────────────────

/// Column-wise z-scoring fitted on training rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnScaler {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl ColumnScaler {
    /// Fit means and population standard deviations. With no rows the scaler
    /// is the identity.
    pub fn fit(rows: &[Vec<f32>], width: usize) -> Self {
        if rows.is_empty() {
            return ColumnScaler { mean: vec![0.0; width], std: vec![1.0; width] };
        }
        let n = rows.len() as f32;
        let mut mean = vec![0.0f32; width];
        for row in rows {
            for (m, x) in mean.iter_mut().zip(row) {
                *m += x / n;
            }
        }
        let mut std = vec![0.0f32; width];
        for row in rows {
            for ((s, x), m) in std.iter_mut().zip(row).zip(&mean) {
                *s += (x - m) * (x - m) / n;
            }
        }
        let std = std.into_iter().map(|v| if v > 0.0 { v.sqrt() } else { 1.0 }).collect();
        ColumnScaler { mean, std }
    }

    /// Scale one row.
    pub fn transform(&self, row: &[f32]) -> Vec<f32> {
        row.iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Feature space
// ─────────────────────────────────────────────────────────────────────────────

/// All model inputs derived from one record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFeatures {
    /// Scaled descriptors followed by folded Morgan counts.
    pub dense: Vec<f32>,
    /// Flattened standardised count embedding.
    pub standardized: Vec<f32>,
    /// Sparse index list of the raw counts.
    pub indices: Vec<i64>,
}

/// Everything fitted on a training partition that later partitions reuse.
#[derive(Debug, Clone)]
pub struct FeatureSpace {
    vocab: Vocabulary,
    scaler: ColumnScaler,
    radius: usize,
    fold_bits: usize,
    policy: ParseFailurePolicy,
}

impl FeatureSpace {
    /// Fit the vocabulary and the descriptor scaler on `train`.
    ///
    /// With [`ParseFailurePolicy::Fail`] an unparseable training record is an
    /// error here, before anything is trained.
    pub fn fit(train: &Table, cfg: &EmbeddingConfig, policy: ParseFailurePolicy) -> Result<Self> {
        if policy == ParseFailurePolicy::Fail {
            check_parsed(train)?;
        }
        let vocab = Vocabulary::fit_table(train);
        let descriptor_rows: Vec<Vec<f32>> = train
            .iter()
            .filter_map(|r| r.structure.parsed())
            .map(|p| p.descriptors.to_vec().to_vec())
            .collect();
        let scaler = ColumnScaler::fit(&descriptor_rows, N_DESCRIPTORS);
        info!(
            "[Features] vocabulary of {} keys from {} training rows (radius {})",
            vocab.len(),
            train.len(),
            cfg.radius
        );
        Ok(FeatureSpace { vocab, scaler, radius: cfg.radius, fold_bits: cfg.fold_bits, policy })
    }

    /// Fitted vocabulary.
    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Configured radius.
    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Width of [`RecordFeatures::dense`].
    pub fn dense_dim(&self) -> usize {
        N_DESCRIPTORS + self.fold_bits
    }

    /// Width of [`RecordFeatures::standardized`], also the number of
    /// non-padding embedding slots addressed by [`RecordFeatures::indices`].
    pub fn flat_dim(&self) -> usize {
        self.vocab.n_rows() * (self.radius + 1)
    }

    /// Apply the parse-failure policy to a partition.
    ///
    /// Labelled partitions follow the policy. Unlabelled partitions always keep
    /// every row (zero-filled) so predictions stay aligned with the template.
    pub fn admit(&self, table: &Table, labelled: bool) -> Result<Table> {
        let failed = table.unparseable_count();
        if failed == 0 {
            return Ok(table.clone());
        }
        match (self.policy, labelled) {
            (ParseFailurePolicy::Fail, true) => {
                check_parsed(table)?;
                Ok(table.clone())
            }
            (ParseFailurePolicy::Skip, true) => {
                warn!("[Features] skipping {failed} unparseable rows of {}", table.len());
                Ok(table.iter().filter(|r| r.structure.is_parsed()).cloned().collect())
            }
            _ => {
                warn!("[Features] zero-filling {failed} unparseable rows of {}", table.len());
                Ok(table.clone())
            }
        }
    }

    /// Featurise one record. Unparseable structures give zero vectors of the
    /// declared widths and no indices.
    pub fn featurize(&self, record: &Record) -> RecordFeatures {
        let counts = embed_or_zeros(&record.structure, &self.vocab, self.radius);
        let standardized = standardize(counts.view()).iter().copied().collect();
        let indices = sparse_indices(counts.view());

        let dense = match record.structure.parsed() {
            Some(parsed) => {
                let mut dense = self.scaler.transform(&parsed.descriptors.to_vec());
                dense.extend(parsed.environments.folded_counts(self.fold_bits));
                dense
            }
            None => vec![0.0; self.dense_dim()],
        };
        debug_assert_eq!(dense.len(), self.dense_dim());
        RecordFeatures { dense, standardized, indices }
    }
}

fn check_parsed(table: &Table) -> Result<()> {
    for record in table {
        if let Structure::Unparseable(source) = &record.structure {
            return Err(Ic50Error::Embed(EmbedError { smiles: record.smiles.clone(), source: source.clone() }));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Record;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn cfg() -> EmbeddingConfig {
        EmbeddingConfig { radius: 2, fold_bits: 32 }
    }

    fn train() -> Table {
        vec![
            Record::new("a", "CCO", 2).with_pic50(6.0),
            Record::new("b", "c1ccccc1O", 2).with_pic50(7.0),
            Record::new("c", "CC(=O)N", 2).with_pic50(5.5),
        ]
        .into()
    }

    #[test]
    fn vocabulary_is_sorted_and_has_oov_slot() {
        let t = train();
        let vocab = Vocabulary::fit_table(&t);
        assert!(!vocab.is_empty());
        assert_eq!(vocab.n_rows(), vocab.len() + 1);
        assert!(vocab.keys.windows(2).all(|w| w[0] < w[1]));
        for record in &t {
            for key in record.structure.parsed().unwrap().environments.keys() {
                assert!(vocab.contains(key));
                assert!(vocab.position(key) < vocab.oov_slot());
            }
        }
    }

    #[test]
    fn unseen_keys_go_to_oov_row() {
        let vocab = Vocabulary::fit_table(&train());
        let emb = embed_smiles("FC(F)(F)Cl", &vocab, 2).unwrap();
        let total: f32 = emb.sum();
        assert!(total > 0.0);
        assert_eq!(emb.row(vocab.oov_slot()).sum(), total);
    }

    #[test]
    fn counts_match_environments() {
        let vocab = Vocabulary::fit_table(&train());
        let emb = embed_smiles("CCO", &vocab, 2).unwrap();
        let mol = parse_smiles("CCO").unwrap();
        assert_eq!(emb.sum() as usize, morgan_environments(&mol, 2).len());
        assert_eq!(emb.column(0).sum(), 3.0);
    }

    #[test]
    fn unparseable_structure_keeps_declared_shape() {
        let vocab = Vocabulary::fit_table(&train());
        let bad = Record::new("x", "C1CC(", 2);
        let emb = embed_or_zeros(&bad.structure, &vocab, 2);
        assert_eq!(emb.dim(), (vocab.n_rows(), 3));
        assert_eq!(emb.sum(), 0.0);

        let space = FeatureSpace::fit(&train(), &cfg(), ParseFailurePolicy::ZeroFill).unwrap();
        let f = space.featurize(&bad);
        assert_eq!(f.dense.len(), space.dense_dim());
        assert_eq!(f.standardized.len(), space.flat_dim());
        assert!(f.indices.is_empty());
    }

    #[test]
    fn standardize_per_record() {
        let x = array![[1.0f32, 2.0], [3.0, 4.0]];
        let z = standardize(x.view());
        assert_abs_diff_eq!(z.sum(), 0.0, epsilon = 1e-6);
        let var = z.fold(0.0, |a, &v| a + v * v) / 4.0;
        assert_abs_diff_eq!(var, 1.0, epsilon = 1e-5);

        let flat = array![[2.0f32, 2.0], [2.0, 2.0]];
        assert_eq!(standardize(flat.view()), Array2::<f32>::zeros((2, 2)));
    }

    #[test]
    fn sparse_indices_are_shifted_by_one() {
        let counts = array![[0.0f32, 2.0], [0.0, 0.0], [1.0, 0.0]];
        assert_eq!(sparse_indices(counts.view()), vec![2, 5]);
        assert!(sparse_indices(Array2::<f32>::zeros((3, 2)).view()).is_empty());
    }

    #[test]
    fn scaler_handles_constant_columns() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let s = ColumnScaler::fit(&rows, 2);
        assert_eq!(s.transform(&[2.0, 5.0]), vec![0.0, 0.0]);
        assert_eq!(s.transform(&[3.0, 6.0]), vec![1.0, 1.0]);
    }

    #[test]
    fn parse_failure_policies() {
        let mut rows = train().records().to_vec();
        rows.push(Record::new("bad", "C1CC", 2).with_pic50(5.0));
        let table: Table = rows.into();

        let skip = FeatureSpace::fit(&table, &cfg(), ParseFailurePolicy::Skip).unwrap();
        assert_eq!(skip.admit(&table, true).unwrap().len(), 3);
        assert_eq!(skip.admit(&table, false).unwrap().len(), 4);

        let zero = FeatureSpace::fit(&table, &cfg(), ParseFailurePolicy::ZeroFill).unwrap();
        assert_eq!(zero.admit(&table, true).unwrap().len(), 4);

        let err = FeatureSpace::fit(&table, &cfg(), ParseFailurePolicy::Fail).unwrap_err();
        assert!(matches!(err, Ic50Error::Embed(EmbedError { ref smiles, .. }) if smiles == "C1CC"));
    }
}
