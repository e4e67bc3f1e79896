//! Sparse site by species matrix of occurrence counts.
//!
//! Rows are values of an analysis dimension (e.g. counties), columns are species and cells hold
//! occurrence counts. Real occurrence data is highly sparse, so cells are stored in compressed
//! sparse row (CSR) form: for row `r`, the column indices and values of its non-zero cells are
//! `column_indices[row_offsets[r]..row_offsets[r + 1]]` and the same range of `values`, with
//! column indices ascending.

use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use ndarray::Array1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::archive::{self, Archive, ArchiveMetadata, MatrixParts};
use crate::error::SpnetError;
use crate::models::{Axis, Compression};
use crate::stacked::StackedRecord;
use crate::table::{TableKind, TableType};
use crate::types::LabelIndex;

/// Metadata describing a matrix and the data it was built from.
#[derive(Clone, Debug, PartialEq)]
pub struct MatrixInfo {
    /// Table type; kind and dimensions of the matrix
    pub table_type: TableType,
    /// Date of the source data in `YYYY_MM_DD` format
    pub datestr: String,
    /// Name of the stacked record column the cell values came from
    pub value_fld: String,
}

impl MatrixInfo {
    /// Return a new MatrixInfo object.
    pub fn new(table_type: TableType, datestr: &str, value_fld: &str) -> Self {
        MatrixInfo {
            table_type,
            datestr: datestr.to_string(),
            value_fld: value_fld.to_string(),
        }
    }
}

/// Statistics of the cells of one row or column of a heatmap.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct VectorStatistics {
    pub axis: Axis,
    /// Index of the label on its axis
    pub index: usize,
    pub label: String,
    /// Sum of the cells
    pub total: u64,
    /// Number of non-zero cells
    pub count: u64,
    /// Smallest non-zero cell value; `None` when every cell is zero
    pub min_value: Option<u64>,
    /// Labels on the other axis whose cells hold `min_value`
    pub min_value_labels: Vec<String>,
    /// Largest cell value; `None` when every cell is zero
    pub max_value: Option<u64>,
    /// Labels on the other axis whose cells hold `max_value`
    pub max_value_labels: Vec<String>,
}

/// Accumulates stacked records into labels and summed cells.
///
/// Labels are assigned dense indices in first-seen order. The sum of all values is tracked so
/// that no row, column or matrix total can exceed `u64::MAX`.
#[derive(Default)]
struct Accumulator {
    rows: LabelIndex,
    columns: LabelIndex,
    cells: HashMap<(u32, u32), u64>,
    total: u64,
    records: usize,
}

impl Accumulator {
    fn add(&mut self, record: &StackedRecord, position: usize) -> Result<(), SpnetError> {
        self.total = checked_total(self.total, record.value, position)?;
        let row = self.rows.get_or_insert(&record.row_key)?;
        let column = self.columns.get_or_insert(&record.column_key)?;
        add_cell(&mut self.cells, (row, column), record.value, position)?;
        self.records += 1;
        Ok(())
    }

    /// Fold another accumulator, built from records following this one's, into this one.
    fn merge(&mut self, other: Accumulator, first_position: usize) -> Result<(), SpnetError> {
        self.total = checked_total(self.total, other.total, first_position)?;
        let rows = other
            .rows
            .as_slice()
            .iter()
            .map(|label| self.rows.get_or_insert(label))
            .collect::<Result<Vec<u32>, _>>()?;
        let columns = other
            .columns
            .as_slice()
            .iter()
            .map(|label| self.columns.get_or_insert(label))
            .collect::<Result<Vec<u32>, _>>()?;
        for ((row, column), value) in other.cells {
            let key = (rows[row as usize], columns[column as usize]);
            add_cell(&mut self.cells, key, value, first_position)?;
        }
        self.records += other.records;
        Ok(())
    }

    fn finish(self, info: MatrixInfo) -> Result<HeatmapMatrix, SpnetError> {
        if self.records == 0 {
            return Err(SpnetError::EmptySource);
        }
        let mut cells: Vec<((u32, u32), u64)> = self
            .cells
            .into_iter()
            .filter(|(_, value)| *value > 0)
            .collect();
        cells.sort_unstable_by_key(|(key, _)| *key);
        Ok(HeatmapMatrix::from_sorted_cells(
            info,
            self.rows,
            self.columns,
            cells,
        ))
    }
}

fn checked_total(total: u64, value: u64, position: usize) -> Result<u64, SpnetError> {
    total
        .checked_add(value)
        .ok_or_else(|| SpnetError::MalformedRecord {
            row: position,
            reason: "count overflows the matrix total".to_string(),
        })
}

fn add_cell(
    cells: &mut HashMap<(u32, u32), u64>,
    key: (u32, u32),
    value: u64,
    position: usize,
) -> Result<(), SpnetError> {
    let cell = cells.entry(key).or_insert(0);
    *cell = cell
        .checked_add(value)
        .ok_or_else(|| SpnetError::MalformedRecord {
            row: position,
            reason: "count overflows when summed with earlier records".to_string(),
        })?;
    Ok(())
}

/// Sparse matrix of occurrence counts, analysis dimension values by species.
///
/// The sum of all cells always fits in a `u64`, so totals never overflow.
#[derive(Clone, Debug, PartialEq)]
pub struct HeatmapMatrix {
    info: MatrixInfo,
    rows: LabelIndex,
    columns: LabelIndex,
    /// Offset of each row's first cell; `rows.len() + 1` entries.
    row_offsets: Vec<usize>,
    column_indices: Vec<u32>,
    values: Vec<u64>,
}

impl HeatmapMatrix {
    /// Build a matrix from stacked records in a single pass.
    ///
    /// Cells for recurring (row, column) pairs are summed. Any record error aborts the build.
    ///
    /// # Arguments
    ///
    /// * `records`: Stacked records, or errors from reading them
    /// * `info`: Matrix metadata; the table type must be of kind `matrix`
    #[tracing::instrument(level = "DEBUG", skip(records))]
    pub fn build<I>(records: I, info: MatrixInfo) -> Result<Self, SpnetError>
    where
        I: IntoIterator<Item = Result<StackedRecord, SpnetError>>,
    {
        check_kind(&info)?;
        let mut accumulator = Accumulator::default();
        for (position, record) in records.into_iter().enumerate() {
            accumulator.add(&record?, position)?;
        }
        accumulator.finish(info)
    }

    /// Build a matrix from in-memory stacked records using Rayon.
    ///
    /// The records are split into `partitions` contiguous runs which are accumulated in parallel
    /// and then merged in run order. Labels therefore receive the same first-seen indices as
    /// [HeatmapMatrix::build] regardless of the number of partitions or worker threads.
    #[tracing::instrument(level = "DEBUG", skip(records), fields(records = records.len()))]
    pub fn build_parallel(
        records: &[StackedRecord],
        partitions: usize,
        info: MatrixInfo,
    ) -> Result<Self, SpnetError> {
        check_kind(&info)?;
        let chunk_size = records.len().div_ceil(partitions.max(1)).max(1);
        let partials = records
            .par_chunks(chunk_size)
            .enumerate()
            .map(|(chunk, run)| {
                let mut accumulator = Accumulator::default();
                for (offset, record) in run.iter().enumerate() {
                    accumulator.add(record, chunk * chunk_size + offset)?;
                }
                Ok(accumulator)
            })
            .collect::<Result<Vec<Accumulator>, SpnetError>>()?;
        let mut merged = Accumulator::default();
        for (chunk, partial) in partials.into_iter().enumerate() {
            merged.merge(partial, chunk * chunk_size)?;
        }
        merged.finish(info)
    }

    /// Assemble a matrix from cells sorted by (row, column) with no duplicate keys.
    fn from_sorted_cells(
        info: MatrixInfo,
        rows: LabelIndex,
        columns: LabelIndex,
        cells: Vec<((u32, u32), u64)>,
    ) -> Self {
        let mut row_offsets = vec![0; rows.len() + 1];
        let mut column_indices = Vec::with_capacity(cells.len());
        let mut values = Vec::with_capacity(cells.len());
        for ((row, column), value) in cells {
            row_offsets[row as usize + 1] += 1;
            column_indices.push(column);
            values.push(value);
        }
        for r in 0..rows.len() {
            row_offsets[r + 1] += row_offsets[r];
        }
        HeatmapMatrix {
            info,
            rows,
            columns,
            row_offsets,
            column_indices,
            values,
        }
    }

    /// Assemble a matrix from labels and coordinate-list cells, validating them.
    ///
    /// Used when reading persisted matrices.
    pub fn from_coo(
        info: MatrixInfo,
        rows: LabelIndex,
        columns: LabelIndex,
        cells: impl IntoIterator<Item = (u32, u32, u64)>,
    ) -> Result<Self, SpnetError> {
        let mut sorted = Vec::new();
        for (row, column, value) in cells {
            if row as usize >= rows.len() || column as usize >= columns.len() {
                return Err(SpnetError::archive(format!(
                    "cell ({}, {}) out of bounds for shape ({}, {})",
                    row,
                    column,
                    rows.len(),
                    columns.len()
                )));
            }
            if value > 0 {
                sorted.push(((row, column), value));
            }
        }
        sorted.sort_unstable_by_key(|(key, _)| *key);
        if sorted.windows(2).any(|pair| pair[0].0 == pair[1].0) {
            return Err(SpnetError::archive("duplicate cell"));
        }
        sorted
            .iter()
            .try_fold(0u64, |total, (_, value)| total.checked_add(*value))
            .ok_or_else(|| SpnetError::archive("cell values overflow the matrix total"))?;
        Ok(Self::from_sorted_cells(info, rows, columns, sorted))
    }

    /// Matrix metadata.
    pub fn info(&self) -> &MatrixInfo {
        &self.info
    }

    /// Table type of the matrix.
    pub fn table_type(&self) -> TableType {
        self.info.table_type
    }

    /// Date of the source data.
    pub fn datestr(&self) -> &str {
        &self.info.datestr
    }

    /// Row labels (analysis dimension values) in index order.
    pub fn row_categories(&self) -> &[String] {
        self.rows.as_slice()
    }

    /// Column labels (species) in index order.
    pub fn column_categories(&self) -> &[String] {
        self.columns.as_slice()
    }

    /// Labels of one axis.
    pub fn labels(&self, axis: Axis) -> &LabelIndex {
        match axis {
            Axis::Row => &self.rows,
            Axis::Column => &self.columns,
        }
    }

    /// Number of rows and columns.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    /// Number of non-zero cells.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Whether the matrix has no rows or no columns.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }

    /// Non-zero cells of a row by index, as (column index, value).
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, u64)> + '_ {
        let range = self.row_offsets[row]..self.row_offsets[row + 1];
        self.column_indices[range.clone()]
            .iter()
            .zip(&self.values[range])
            .map(|(column, value)| (*column as usize, *value))
    }

    /// All non-zero cells as (row index, column index, value), in row-major order.
    pub fn iter_cells(&self) -> impl Iterator<Item = (usize, usize, u64)> + '_ {
        (0..self.rows.len()).flat_map(move |r| self.row(r).map(move |(c, v)| (r, c, v)))
    }

    /// Value of the cell at a row and column label; 0 for absent cells.
    ///
    /// Returns `None` if either label does not exist.
    pub fn get(&self, row_label: &str, column_label: &str) -> Option<u64> {
        let row = self.rows.position(row_label)?;
        let column = self.columns.position(column_label)?;
        let range = self.row_offsets[row]..self.row_offsets[row + 1];
        let value = match self.column_indices[range.clone()].binary_search(&(column as u32)) {
            Ok(idx) => self.values[range.start + idx],
            Err(_) => 0,
        };
        Some(value)
    }

    /// Non-zero cells of the row or column with a label, as (other axis label, value).
    ///
    /// Returns `None` if the label does not exist.
    pub fn vector(&self, label: &str, axis: Axis) -> Option<Vec<(&str, u64)>> {
        let idx = self.labels(axis).position(label)?;
        let other = self.labels(axis.other()).as_slice();
        let vector = self
            .vector_cells(idx, axis)
            .into_iter()
            .map(|(i, value)| (other[i].as_str(), value))
            .collect();
        Some(vector)
    }

    /// Non-zero cells of a row or column by index, as (other axis index, value).
    fn vector_cells(&self, idx: usize, axis: Axis) -> Vec<(usize, u64)> {
        match axis {
            Axis::Row => self.row(idx).collect(),
            Axis::Column => self
                .iter_cells()
                .filter(|(_, c, _)| *c == idx)
                .map(|(r, _, v)| (r, v))
                .collect(),
        }
    }

    /// Statistics of the row or column with a label, including the labels on the other axis
    /// that hold its extreme values.
    ///
    /// Returns `None` if the label does not exist.
    pub fn vector_statistics(&self, label: &str, axis: Axis) -> Option<VectorStatistics> {
        let index = self.labels(axis).position(label)?;
        let cells = self.vector_cells(index, axis);
        let other = self.labels(axis.other());
        let labels_holding = |target: Option<u64>| -> Vec<String> {
            cells
                .iter()
                .filter(|(_, value)| Some(*value) == target)
                .filter_map(|(i, _)| other.label(*i))
                .map(String::from)
                .collect()
        };
        let min_value = cells.iter().map(|(_, value)| *value).min();
        let max_value = cells.iter().map(|(_, value)| *value).max();
        Some(VectorStatistics {
            axis,
            index,
            label: label.to_string(),
            total: cells.iter().map(|(_, value)| *value).sum(),
            count: cells.len() as u64,
            min_value,
            min_value_labels: labels_holding(min_value),
            max_value,
            max_value_labels: labels_holding(max_value),
        })
    }

    /// Sum of all cells.
    pub fn total(&self) -> u64 {
        self.values.iter().sum()
    }

    /// Sum of each row (`Axis::Row`) or each column (`Axis::Column`).
    pub fn totals(&self, axis: Axis) -> Array1<u64> {
        self.fold_axis(axis, |value| value)
    }

    /// Number of non-zero cells in each row or each column.
    pub fn nonzero_counts(&self, axis: Axis) -> Array1<u64> {
        self.fold_axis(axis, |_| 1)
    }

    /// Serialise the matrix to an archive.
    pub fn to_archive(&self) -> Result<Archive, SpnetError> {
        let metadata = ArchiveMetadata::new(&self.info, None);
        let cells = self
            .iter_cells()
            .map(|(r, c, v)| Ok((u32::try_from(r)?, u32::try_from(c)?, v)))
            .collect::<Result<Vec<_>, SpnetError>>()?;
        MatrixParts::to_archive(
            &metadata,
            self.row_categories(),
            self.column_categories(),
            cells.into_iter(),
        )
    }

    /// Deserialise a matrix from an archive.
    pub fn from_archive(archive: &Archive) -> Result<Self, SpnetError> {
        let parts = MatrixParts::from_archive(archive, TableKind::Matrix)?;
        Self::from_coo(parts.metadata.info(), parts.rows, parts.columns, parts.cells)
    }

    /// Write the matrix archive to a directory, returning its path.
    pub fn write_to_dir(&self, dir: &Path, compression: Compression) -> Result<PathBuf, SpnetError> {
        let metadata = ArchiveMetadata::new(&self.info, None);
        archive::write_to_dir(&self.to_archive()?, &metadata, dir, compression)
    }

    /// Read a matrix archive file.
    pub fn read_from_file(path: &Path) -> Result<Self, SpnetError> {
        Self::from_archive(&Archive::read_file(path)?)
    }

    fn fold_axis(&self, axis: Axis, measure: impl Fn(u64) -> u64) -> Array1<u64> {
        let mut result = Array1::zeros(self.labels(axis).len());
        for (r, c, value) in self.iter_cells() {
            let idx = match axis {
                Axis::Row => r,
                Axis::Column => c,
            };
            result[idx] += measure(value);
        }
        result
    }
}

fn check_kind(info: &MatrixInfo) -> Result<(), SpnetError> {
    if info.table_type.kind() != TableKind::Matrix {
        return Err(SpnetError::table_type(
            info.table_type.code(),
            "heatmap table type must be a matrix",
        ));
    }
    Ok(())
}
