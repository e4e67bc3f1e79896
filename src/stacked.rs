//! Stacked (long-form) records of occurrence counts.
//!
//! A stacked table has one record per (dimension value, species) pair with the number of
//! occurrences of that species for that value. Tables are read from delimited text with a header
//! row; the columns used are named by a [ColumnMapping] since different analysis dimensions store
//! their keys in differently named columns.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use validator::Validate;

use crate::error::SpnetError;
use crate::models::ColumnMapping;

/// 2^63, the smallest float magnitude outside the range of `i64`.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// One aggregated count of a species for one analysis dimension value.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StackedRecord {
    /// Analysis dimension value (matrix row)
    pub row_key: String,
    /// Species identifier (matrix column)
    pub column_key: String,
    /// Occurrence count
    pub value: u64,
}

impl StackedRecord {
    /// Return a new StackedRecord, rejecting empty keys and negative counts.
    ///
    /// # Arguments
    ///
    /// * `row`: Position of the record in its source, used in errors
    /// * `row_key`: Analysis dimension value
    /// * `column_key`: Species identifier
    /// * `value`: Occurrence count
    pub fn new(row: usize, row_key: &str, column_key: &str, value: i64) -> Result<Self, SpnetError> {
        let malformed = |reason: String| SpnetError::MalformedRecord { row, reason };
        if row_key.is_empty() {
            return Err(malformed("empty row key".to_string()));
        }
        if column_key.is_empty() {
            return Err(malformed("empty column key".to_string()));
        }
        let value =
            u64::try_from(value).map_err(|_| malformed(format!("negative value {}", value)))?;
        Ok(StackedRecord {
            row_key: row_key.to_string(),
            column_key: column_key.to_string(),
            value,
        })
    }

    /// Return a new StackedRecord from an unparsed count.
    ///
    /// Integral floating point text such as `3.0` is accepted since exported tables sometimes
    /// store counts as doubles.
    pub fn parse(
        row: usize,
        row_key: &str,
        column_key: &str,
        value: &str,
    ) -> Result<Self, SpnetError> {
        let value = value.trim();
        let malformed = |reason: &str| SpnetError::MalformedRecord {
            row,
            reason: format!("{} {:?}", reason, value),
        };
        let parsed = match value.parse::<i64>() {
            Ok(parsed) => parsed,
            Err(_) => match value.parse::<f64>() {
                Ok(float) if float.is_finite() && float.fract() == 0.0 => {
                    // `as` saturates, so bound the float before converting it.
                    if !(-I64_BOUND..I64_BOUND).contains(&float) {
                        return Err(malformed("value out of range"));
                    }
                    float as i64
                }
                _ => return Err(malformed("non-numeric value")),
            },
        };
        Self::new(row, row_key, column_key, parsed)
    }
}

/// Reads stacked records from a delimited text table.
pub struct StackedRecordSource<R: Read> {
    reader: csv::Reader<R>,
    key_idx: usize,
    species_idx: usize,
    value_idx: usize,
    row: usize,
}

impl StackedRecordSource<File> {
    /// Open a comma delimited file.
    pub fn from_path(path: &Path, mapping: &ColumnMapping) -> Result<Self, SpnetError> {
        let reader = csv::ReaderBuilder::new().from_path(path)?;
        Self::new(reader, mapping)
    }
}

impl<R: Read> StackedRecordSource<R> {
    /// Wrap a CSV reader, resolving the mapped columns against its header.
    pub fn new(mut reader: csv::Reader<R>, mapping: &ColumnMapping) -> Result<Self, SpnetError> {
        mapping.validate()?;
        let headers = reader.headers()?.clone();
        let find = |name: &str| {
            headers
                .iter()
                .position(|header| header == name)
                .ok_or_else(|| SpnetError::ColumnMapping {
                    expected: name.to_string(),
                    available: headers.iter().map(String::from).collect(),
                })
        };
        Ok(StackedRecordSource {
            key_idx: find(&mapping.key_fld)?,
            species_idx: find(&mapping.species_fld)?,
            value_idx: find(&mapping.value_fld)?,
            reader,
            row: 0,
        })
    }

    /// Read a delimited table from any reader.
    pub fn from_reader(
        reader: R,
        delimiter: u8,
        mapping: &ColumnMapping,
    ) -> Result<Self, SpnetError> {
        let reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .from_reader(reader);
        Self::new(reader, mapping)
    }
}

impl<R: Read> Iterator for StackedRecordSource<R> {
    type Item = Result<StackedRecord, SpnetError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut record = csv::StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(false) => None,
            Err(err) => Some(Err(err.into())),
            Ok(true) => {
                let row = self.row;
                self.row += 1;
                let field = |idx: usize| record.get(idx).unwrap_or("");
                Some(StackedRecord::parse(
                    row,
                    field(self.key_idx),
                    field(self.species_idx),
                    field(self.value_idx),
                ))
            }
        }
    }
}
