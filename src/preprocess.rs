//! Raw frames to typed tables.
//!
//! Training frames go through identifier decoding, constant-column removal and
//! label parsing; test frames keep every column and may lack labels. Every
//! structure string is parsed exactly once here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::activity::{ic50_to_pic50, pic50_to_ic50};
use crate::data_io::Frame;
use crate::error::{Ic50Error, Result};
use crate::table::{Record, Structure, Table};

/// Length of the source prefix on identifier columns (`CHEMBL`).
pub const SOURCE_PREFIX_LEN: usize = 6;

/// Structure column.
pub const SMILES_COLUMN: &str = "Smiles";
/// Row id column of test and submission files.
pub const ID_COLUMN: &str = "ID";
/// IC50 label column (nanomolar).
pub const IC50_COLUMN: &str = "IC50_nM";
/// pIC50 label column.
pub const PIC50_COLUMN: &str = "pIC50";
/// Prefixed assay id column.
pub const ASSAY_COLUMN: &str = "Assay ChEMBL ID";
/// Prefixed document id column.
pub const DOCUMENT_COLUMN: &str = "Document ChEMBL ID";
/// Prefixed molecule id column.
pub const MOLECULE_COLUMN: &str = "Molecule ChEMBL ID";

/// Raw columns that duplicate the labels.
const LABEL_DUPLICATES: [&str; 2] = ["Standard Value", "pChEMBL Value"];

/// Drop the source prefix of an identifier and parse the rest.
///
/// ```
/// use ic50::preprocess::strip_source_prefix;
///
/// assert_eq!(strip_source_prefix("CHEMBL4888").unwrap(), 4888);
/// assert!(strip_source_prefix("CHEMBL").is_err());
/// ```
pub fn strip_source_prefix(value: &str) -> Result<u64> {
    let value = value.trim();
    value
        .get(SOURCE_PREFIX_LEN..)
        .filter(|rest| !rest.is_empty())
        .and_then(|rest| rest.parse().ok())
        .ok_or_else(|| Ic50Error::Preprocess(format!("malformed identifier '{value}'")))
}

/// Frame-to-table conversion settings.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    radius: usize,
    image_dir: Option<PathBuf>,
}

impl Preprocessor {
    /// Parse structures with Morgan environments up to `radius`.
    pub fn new(radius: usize) -> Self {
        Preprocessor { radius, image_dir: None }
    }

    /// Attach `<dir>/<row id>.png` to every record.
    pub fn with_image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.image_dir = Some(dir.into());
        self
    }

    /// Labelled training frame: labels are required and constant columns are
    /// dropped from the retained attributes.
    pub fn process_train(&self, frame: Frame) -> Result<Table> {
        info!("[Preprocess] start preprocess train data...");
        self.process(frame, true)
    }

    /// Unlabelled (or optionally labelled) test frame.
    pub fn process_test(&self, frame: Frame) -> Result<Table> {
        info!("[Preprocess] start preprocess test data...");
        self.process(frame, false)
    }

    /// Read and process `<data_dir>/train.csv`.
    pub fn load_train<P: AsRef<Path>>(&self, data_dir: P) -> Result<Table> {
        self.process_train(Frame::from_path(data_dir.as_ref().join("train.csv"))?)
    }

    /// Read and process `<data_dir>/test.csv`.
    pub fn load_test<P: AsRef<Path>>(&self, data_dir: P) -> Result<Table> {
        self.process_test(Frame::from_path(data_dir.as_ref().join("test.csv"))?)
    }

    fn process(&self, mut frame: Frame, train: bool) -> Result<Table> {
        frame.require_column(SMILES_COLUMN)?;

        let mut records = Vec::with_capacity(frame.len());
        for row in 0..frame.len() {
            records.push(self.record(&frame, row, train)?);
        }

        if train {
            frame.drop_constant_columns();
        }
        frame.drop_columns(&LABEL_DUPLICATES);
        frame.drop_columns(&[ASSAY_COLUMN, DOCUMENT_COLUMN, MOLECULE_COLUMN]);
        frame.drop_columns(&[SMILES_COLUMN, ID_COLUMN, IC50_COLUMN, PIC50_COLUMN]);
        for (record, row) in records.iter_mut().zip(frame.rows()) {
            record.attributes = frame.headers().iter().cloned().zip(row.iter().cloned()).collect::<BTreeMap<_, _>>();
        }

        let table = Table::from(records);
        let failed = table.unparseable_count();
        if failed > 0 {
            warn!("[Preprocess] {failed} of {} structures could not be parsed", table.len());
        }
        info!("[Preprocess] end preprocess: {} rows", table.len());
        Ok(table)
    }

    fn record(&self, frame: &Frame, row: usize, train: bool) -> Result<Record> {
        let decode = |col: &str| frame.get(row, col).map(strip_source_prefix).transpose();
        let assay = decode(ASSAY_COLUMN)?;
        let document = decode(DOCUMENT_COLUMN)?;
        let molecule = decode(MOLECULE_COLUMN)?;

        let id = frame
            .get(row, ID_COLUMN)
            .or_else(|| frame.get(row, MOLECULE_COLUMN))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| row.to_string());

        let smiles = frame.get(row, SMILES_COLUMN).unwrap_or_default().to_string();
        let parse_label = |col: &str| -> Result<Option<f64>> {
            match frame.get(row, col).map(str::trim) {
                None | Some("") => Ok(None),
                Some(v) => match v.parse::<f64>() {
                    Ok(x) if x.is_finite() => Ok(Some(x)),
                    Ok(_) => Err(Ic50Error::Preprocess(format!("row {row}: {col} '{v}' is not finite"))),
                    Err(e) => Err(Ic50Error::Preprocess(format!("row {row}: bad {col} '{v}': {e}"))),
                },
            }
        };
        let mut ic50_nm = parse_label(IC50_COLUMN)?;
        if let Some(v) = ic50_nm.filter(|&v| v <= 0.0) {
            return Err(Ic50Error::Preprocess(format!("row {row}: {IC50_COLUMN} must be positive, got {v}")));
        }
        let mut pic50 = parse_label(PIC50_COLUMN)?;
        match (ic50_nm, pic50) {
            (Some(ic50), None) => pic50 = Some(ic50_to_pic50(ic50)),
            (None, Some(p)) => ic50_nm = Some(pic50_to_ic50(p)),
            (None, None) if train => {
                return Err(Ic50Error::Preprocess(format!(
                    "row {row}: training rows need {PIC50_COLUMN} or {IC50_COLUMN}"
                )))
            }
            _ => {}
        }

        Ok(Record {
            image: self.image_dir.as_ref().map(|dir| dir.join(format!("{id}.png"))),
            id,
            assay,
            document,
            molecule,
            structure: Structure::from_smiles(&smiles, self.radius),
            smiles,
            ic50_nm,
            pic50,
            attributes: BTreeMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TRAIN: &str = "\
Molecule ChEMBL ID,Standard Type,Standard Relation,Standard Value,Standard Units,pChEMBL Value,Assay ChEMBL ID,Target ChEMBL ID,Target Name,Target Organism,Target Type,Document ChEMBL ID,IC50_nM,pIC50,Smiles
CHEMBL4443947,IC50,'=',0.022,nM,10.66,CHEMBL4361896,CHEMBL3778,IRAK4,Homo sapiens,SINGLE PROTEIN,CHEMBL4359855,0.022,10.66,CC(C)(O)c1ccccc1
CHEMBL4556091,IC50,'=',0.026,nM,10.59,CHEMBL4345131,CHEMBL3778,IRAK4,Homo sapiens,SINGLE PROTEIN,CHEMBL4342485,0.026,10.59,C1CC
CHEMBL4566431,IC50,'=',0.078,nM,10.11,CHEMBL4345131,CHEMBL3778,IRAK4,Homo sapiens,SINGLE PROTEIN,CHEMBL4342485,,10.11,CCN(CC)CC
";

    #[test]
    fn strips_prefix() {
        assert_eq!(strip_source_prefix("CHEMBL3778").unwrap(), 3778);
        assert_eq!(strip_source_prefix(" CHEMBL12 ").unwrap(), 12);
        assert!(strip_source_prefix("CHEMBLx1").is_err());
        assert!(strip_source_prefix("").is_err());
    }

    #[test]
    fn train_frame_is_decoded_and_trimmed() {
        let frame = Frame::from_reader(TRAIN.as_bytes()).unwrap();
        let table = Preprocessor::new(2).process_train(frame).unwrap();
        assert_eq!(table.len(), 3);

        let first = &table.records()[0];
        assert_eq!(first.id, "CHEMBL4443947");
        assert_eq!(first.molecule, Some(4443947));
        assert_eq!(first.assay, Some(4361896));
        assert_eq!(first.document, Some(4359855));
        assert_eq!(first.pic50, Some(10.66));

        // constant columns, label duplicates and raw ids are gone
        let attrs: Vec<&String> = first.attributes.keys().collect();
        assert!(attrs.is_empty(), "unexpected attributes {attrs:?}");

        assert_eq!(table.unparseable_count(), 1);
        let third = &table.records()[2];
        assert_relative_eq!(third.ic50_nm.unwrap(), 10f64.powf(9.0 - 10.11), max_relative = 1e-12);
    }

    #[test]
    fn test_frame_keeps_ids_and_images() {
        let frame = Frame::from_reader("ID,Smiles,Extra\nTEST_000,CCO,1\nTEST_001,CCC,1\n".as_bytes()).unwrap();
        let table = Preprocessor::new(2).with_image_dir("imgs").process_test(frame).unwrap();
        let r = &table.records()[1];
        assert_eq!(r.id, "TEST_001");
        assert_eq!(r.pic50, None);
        assert_eq!(r.image.as_deref(), Some(Path::new("imgs/TEST_001.png")));
        // test frames keep constant columns
        assert_eq!(r.attributes.get("Extra").map(String::as_str), Some("1"));
    }

    #[test]
    fn missing_structure_column_or_label_fails() {
        let frame = Frame::from_reader("ID,SMILES\nA,CCO\n".as_bytes()).unwrap();
        assert!(matches!(
            Preprocessor::new(2).process_test(frame),
            Err(Ic50Error::MissingColumn(c)) if c == SMILES_COLUMN
        ));

        let frame = Frame::from_reader("ID,Smiles\nA,CCO\n".as_bytes()).unwrap();
        assert!(matches!(Preprocessor::new(2).process_train(frame), Err(Ic50Error::Preprocess(_))));
    }

    #[test]
    fn non_positive_or_non_finite_labels_fail() {
        for body in ["A,CCO,0,\n", "A,CCO,-3.5,\n", "A,CCO,inf,\n", "A,CCO,,NaN\n"] {
            let frame = Frame::from_reader(format!("ID,Smiles,IC50_nM,pIC50\n{body}").as_bytes()).unwrap();
            let result = Preprocessor::new(2).process_train(frame);
            assert!(matches!(result, Err(Ic50Error::Preprocess(_))), "{body:?} accepted");
        }
        let frame = Frame::from_reader("ID,Smiles,IC50_nM,pIC50\nA,CCO,1000,\n".as_bytes()).unwrap();
        let table = Preprocessor::new(2).process_train(frame).unwrap();
        assert_relative_eq!(table.records()[0].pic50.unwrap(), 6.0, epsilon = 1e-12);
    }
}
