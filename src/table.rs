//! Typed records and partitioning.
//!
//! A [`Table`] is an ordered collection of [`Record`]s. After loading, the only
//! thing that changes is which partition a record belongs to: [`Table::split`]
//! samples a random validation set and [`Table::k_fold`] rotates contiguous
//! validation windows.

use std::collections::BTreeMap;
use std::path::PathBuf;

use rand::seq::index::sample;
use rand::Rng;

use crate::chem::{morgan_environments, parse_smiles, ChemError, MolecularDescriptors, MorganEnvironments};
use crate::error::{Ic50Error, Result};

/// Structure information computed once per record.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStructure {
    /// Morgan environments up to the configured radius.
    pub environments: MorganEnvironments,
    /// Dense descriptors.
    pub descriptors: MolecularDescriptors,
}

/// Outcome of parsing a record's SMILES.
///
/// `Unparseable` is the explicit failure marker: featurisers decide what to
/// do with it instead of silently receiving zeros.
#[derive(Debug, Clone, PartialEq)]
pub enum Structure {
    /// The SMILES parsed.
    Parsed(Box<ParsedStructure>),
    /// The SMILES did not parse.
    Unparseable(ChemError),
}

impl Structure {
    /// Parse `smiles` and enumerate environments up to `radius`.
    pub fn from_smiles(smiles: &str, radius: usize) -> Self {
        match parse_smiles(smiles) {
            Ok(mol) => Structure::Parsed(Box::new(ParsedStructure {
                environments: morgan_environments(&mol, radius),
                descriptors: MolecularDescriptors::compute(&mol),
            })),
            Err(e) => Structure::Unparseable(e),
        }
    }

    /// The parsed structure, if any.
    pub fn parsed(&self) -> Option<&ParsedStructure> {
        match self {
            Structure::Parsed(p) => Some(p),
            Structure::Unparseable(_) => None,
        }
    }

    /// Whether parsing succeeded.
    pub fn is_parsed(&self) -> bool {
        matches!(self, Structure::Parsed(_))
    }
}

/// One molecule-assay measurement (or one test row).
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Row identifier: the `ID` column when present, otherwise the raw
    /// molecule id, otherwise the row number.
    pub id: String,
    /// Assay id with the source prefix stripped.
    pub assay: Option<u64>,
    /// Document id with the source prefix stripped.
    pub document: Option<u64>,
    /// Molecule id with the source prefix stripped.
    pub molecule: Option<u64>,
    /// Structure string.
    pub smiles: String,
    /// Measured IC50 in nanomolar.
    pub ic50_nm: Option<f64>,
    /// Measured pIC50.
    pub pic50: Option<f64>,
    /// Remaining columns kept after preprocessing.
    pub attributes: BTreeMap<String, String>,
    /// Parsed structure or the parse failure.
    pub structure: Structure,
    /// Pre-rendered structure image.
    pub image: Option<PathBuf>,
}

impl Record {
    /// Minimal record: id, SMILES and parsed structure; everything else empty.
    pub fn new(id: impl Into<String>, smiles: impl Into<String>, radius: usize) -> Self {
        let smiles = smiles.into();
        let structure = Structure::from_smiles(&smiles, radius);
        Record {
            id: id.into(),
            assay: None,
            document: None,
            molecule: None,
            smiles,
            ic50_nm: None,
            pic50: None,
            attributes: BTreeMap::new(),
            structure,
            image: None,
        }
    }

    /// Attach a pIC50 label (and the matching IC50 when absent).
    pub fn with_pic50(mut self, pic50: f64) -> Self {
        self.pic50 = Some(pic50);
        if self.ic50_nm.is_none() {
            self.ic50_nm = Some(crate::activity::pic50_to_ic50(pic50));
        }
        self
    }
}

/// Ordered collection of records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    records: Vec<Record>,
}

/// A training partition and its validation partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    /// Rows used for optimiser updates.
    pub train: Table,
    /// Rows used for model selection.
    pub valid: Table,
}

impl From<Vec<Record>> for Table {
    fn from(records: Vec<Record>) -> Self {
        Table { records }
    }
}

impl FromIterator<Record> for Table {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Table { records: iter.into_iter().collect() }
    }
}

impl Table {
    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// No records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Iterate over records.
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Number of records whose structure did not parse.
    pub fn unparseable_count(&self) -> usize {
        self.records.iter().filter(|r| !r.structure.is_parsed()).count()
    }

    fn pick(&self, indices: impl IntoIterator<Item = usize>) -> Table {
        indices.into_iter().map(|i| self.records[i].clone()).collect()
    }

    /// Random holdout split: `floor(len * valid_ratio)` rows are sampled for
    /// validation (in sample order), the rest stay in training in their
    /// original order.
    pub fn split<R: Rng + ?Sized>(&self, valid_ratio: f64, rng: &mut R) -> Result<Split> {
        if !(0.0..1.0).contains(&valid_ratio) {
            return Err(Ic50Error::Partition(format!(
                "valid_ratio must be in [0, 1), got {valid_ratio}"
            )));
        }
        let n = self.len();
        let n_valid = (n as f64 * valid_ratio).floor() as usize;
        let valid_idx = sample(rng, n, n_valid).into_vec();

        let mut in_valid = vec![false; n];
        for &i in &valid_idx {
            in_valid[i] = true;
        }
        let train_idx = (0..n).filter(|&i| !in_valid[i]);

        let split = Split { train: self.pick(train_idx), valid: self.pick(valid_idx) };
        debug_assert_eq!(split.train.len() + split.valid.len(), n);
        Ok(split)
    }

    /// `k` contiguous validation windows of `len / k` rows; the last window
    /// also takes the remainder so every row is validated exactly once.
    pub fn k_fold(&self, k: usize) -> Result<Vec<Split>> {
        let n = self.len();
        if k < 2 || k > n {
            return Err(Ic50Error::Partition(format!(
                "k-fold needs 2 <= k <= {n} rows, got k = {k}"
            )));
        }
        let size = n / k;
        let folds = (0..k)
            .map(|fold| {
                let start = fold * size;
                let end = if fold + 1 == k { n } else { (fold + 1) * size };
                Split {
                    train: self.pick((0..start).chain(end..n)),
                    valid: self.pick(start..end),
                }
            })
            .collect();
        Ok(folds)
    }
}

impl<'a> IntoIterator for &'a Table {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
