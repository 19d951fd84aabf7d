//! CSV input and submission output.
//!
//! Raw files are read into a [`Frame`]: the header row plus every record as
//! string cells. Typing happens later in [`crate::preprocess`], so this module
//! never guesses at column types.
//!
//! ```
//! use ic50::data_io::Frame;
//!
//! let frame = Frame::from_reader("ID,Smiles\nTEST_0,CCO\nTEST_1,c1ccccc1\n".as_bytes())?;
//! assert_eq!(frame.len(), 2);
//! assert_eq!(frame.get(1, "Smiles"), Some("c1ccccc1"));
//! # Ok::<(), ic50::Ic50Error>(())
//! ```

use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Ic50Error, Result};

/// Name of the prediction column in submissions.
pub const SUBMISSION_COLUMN: &str = "IC50_nM";

/// Headers plus string cells, as read from a delimited file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Frame {
    /// Build a frame from parts. Every row must have one cell per header.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != headers.len()) {
            return Err(Ic50Error::Preprocess(format!(
                "row {i} has {} cells, expected {}",
                row.len(),
                headers.len()
            )));
        }
        Ok(Frame { headers, rows })
    }

    /// Read CSV (with a header row) from any reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Frame::new(headers, rows)
    }

    /// Read a CSV file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let frame = Self::from_reader(fs::File::open(path)?)?;
        info!(
            "[DataIO] loaded {} rows x {} columns from {}",
            frame.len(),
            frame.headers.len(),
            path.display()
        );
        Ok(frame)
    }

    /// Column names in file order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Rows in file order.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// No rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Position of a column that must exist.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| Ic50Error::MissingColumn(name.to_string()))
    }

    /// Cell at `row` in column `name`.
    pub fn get(&self, row: usize, name: &str) -> Option<&str> {
        let col = self.column_index(name)?;
        self.rows.get(row).map(|r| r[col].as_str())
    }

    /// Remove the named columns; names that are absent are ignored.
    pub fn drop_columns(&mut self, names: &[&str]) {
        let keep: Vec<bool> = self.headers.iter().map(|h| !names.contains(&h.as_str())).collect();
        retain_columns(&mut self.headers, &keep);
        for row in &mut self.rows {
            retain_columns(row, &keep);
        }
    }

    /// Remove every column holding exactly one distinct value and return the
    /// names removed. Empty frames are left untouched.
    pub fn drop_constant_columns(&mut self) -> Vec<String> {
        if self.rows.is_empty() {
            return Vec::new();
        }
        let keep: Vec<bool> = (0..self.headers.len())
            .map(|col| {
                let distinct: HashSet<&str> = self.rows.iter().map(|r| r[col].as_str()).collect();
                distinct.len() != 1
            })
            .collect();
        let dropped: Vec<String> = self
            .headers
            .iter()
            .zip(&keep)
            .filter(|(_, &k)| !k)
            .map(|(h, _)| h.clone())
            .collect();
        if !dropped.is_empty() {
            debug!("[DataIO] dropping constant columns: {dropped:?}");
        }
        retain_columns(&mut self.headers, &keep);
        for row in &mut self.rows {
            retain_columns(row, &keep);
        }
        dropped
    }

    /// Set (or append) a column from per-row values.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(Ic50Error::Dataset(format!(
                "column '{name}' has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        match self.column_index(name) {
            Some(col) => {
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row[col] = v;
                }
            }
            None => {
                self.headers.push(name.to_string());
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row.push(v);
                }
            }
        }
        Ok(())
    }

    /// Write as CSV, creating parent directories.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn retain_columns<T>(cells: &mut Vec<T>, keep: &[bool]) {
    let mut it = keep.iter();
    cells.retain(|_| it.next().copied().unwrap_or(true));
}

/// Fill the [`SUBMISSION_COLUMN`] of the template at `template` with `ic50_nm`
/// (one value per template row, in order) and write the result to `out`.
pub fn write_submission<P: AsRef<Path>, Q: AsRef<Path>>(template: P, out: Q, ic50_nm: &[f64]) -> Result<()> {
    let mut frame = Frame::from_path(template)?;
    frame.set_column(SUBMISSION_COLUMN, ic50_nm.iter().map(|v| v.to_string()).collect())?;
    frame.write_csv(&out)?;
    info!("[DataIO] wrote {} predictions to {}", ic50_nm.len(), out.as_ref().display());
    Ok(())
}
