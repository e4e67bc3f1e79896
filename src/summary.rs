//! Per-label totals and non-zero counts along one axis of a heatmap.

use std::path::{Path, PathBuf};

use ndarray::Array1;
use ndarray_stats::interpolate::Midpoint;
use ndarray_stats::{Quantile1dExt, QuantileExt};
use noisy_float::types::n64;
use serde::{Deserialize, Serialize};

use crate::archive::{self, Archive, ArchiveMetadata, MatrixParts};
use crate::error::SpnetError;
use crate::heatmap::{HeatmapMatrix, MatrixInfo, VectorStatistics};
use crate::models::{Axis, Compression};
use crate::table::{AnalysisDimension, TableKind, TableType};
use crate::types::LabelIndex;

/// Column labels of persisted summaries.
const COUNT_COLUMN: &str = "count";
const TOTAL_COLUMN: &str = "total";

/// Summary of one axis of a heatmap.
///
/// For each label of the axis, `totals` holds the sum of its cells and `counts` the number of
/// labels on the other axis with a positive value. As for the heatmap, the sum of all totals fits
/// in a `u64`.
#[derive(Clone, Debug, PartialEq)]
pub struct SummaryMatrix {
    info: MatrixInfo,
    axis: Axis,
    labels: LabelIndex,
    totals: Array1<u64>,
    counts: Array1<u64>,
}

/// Descriptive statistics of the totals and counts of a summary.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AxisStatistics {
    /// Summarised axis
    pub axis: Axis,
    /// Number of labels on the axis
    pub label_count: usize,
    /// Sum of all totals
    pub grand_total: u64,
    pub min_total: u64,
    /// Labels with the smallest total
    pub min_total_labels: Vec<String>,
    pub max_total: u64,
    /// Labels with the largest total
    pub max_total_labels: Vec<String>,
    pub mean_total: f64,
    pub median_total: f64,
    pub min_count: u64,
    /// Labels with the smallest count
    pub min_count_labels: Vec<String>,
    pub max_count: u64,
    /// Labels with the largest count
    pub max_count_labels: Vec<String>,
    pub mean_count: f64,
    pub median_count: f64,
}

/// One row or column of a heatmap set against the statistics of its whole axis.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LabelComparison {
    pub vector: VectorStatistics,
    pub axis: AxisStatistics,
}

impl LabelComparison {
    /// Difference between the label's total and the mean total of its axis.
    pub fn total_from_mean(&self) -> f64 {
        self.vector.total as f64 - self.axis.mean_total
    }

    /// Difference between the label's non-zero count and the mean count of its axis.
    pub fn count_from_mean(&self) -> f64 {
        self.vector.count as f64 - self.axis.mean_count
    }
}

/// Compare the row or column with a label to every row or column of a heatmap.
///
/// Returns `None` if the label does not exist on the axis.
pub fn compare_to_others(
    heatmap: &HeatmapMatrix,
    label: &str,
    axis: Axis,
) -> Result<Option<LabelComparison>, SpnetError> {
    let Some(vector) = heatmap.vector_statistics(label, axis) else {
        return Ok(None);
    };
    let axis = SummaryMatrix::from_heatmap(heatmap, axis)?.statistics()?;
    Ok(Some(LabelComparison { vector, axis }))
}

/// Summarise one axis of a heatmap.
pub fn summarize(heatmap: &HeatmapMatrix, axis: Axis) -> Result<SummaryMatrix, SpnetError> {
    SummaryMatrix::from_heatmap(heatmap, axis)
}

impl SummaryMatrix {
    /// Summarise one axis of a heatmap.
    ///
    /// The summary table type pairs the summarised axis' dimension with the other axis'
    /// dimension, e.g. `county_x_species_summary` for the rows of a county by species matrix and
    /// `species_x_county_summary` for its columns.
    #[tracing::instrument(level = "DEBUG", skip(heatmap), fields(table_type = %heatmap.table_type()))]
    pub fn from_heatmap(heatmap: &HeatmapMatrix, axis: Axis) -> Result<Self, SpnetError> {
        let matrix_type = heatmap.table_type();
        let species = matrix_type.dim1().unwrap_or(AnalysisDimension::Species);
        let (dim0, dim1) = match axis {
            Axis::Row => (matrix_type.dim0(), species),
            Axis::Column => (species, matrix_type.dim0()),
        };
        let table_type = TableType::new(TableKind::Summary, dim0, Some(dim1))?;
        let info = MatrixInfo::new(table_type, heatmap.datestr(), &heatmap.info().value_fld);
        Ok(SummaryMatrix {
            info,
            axis,
            labels: heatmap.labels(axis).clone(),
            totals: heatmap.totals(axis),
            counts: heatmap.nonzero_counts(axis),
        })
    }

    /// Summary metadata.
    pub fn info(&self) -> &MatrixInfo {
        &self.info
    }

    /// Summarised axis of the source heatmap.
    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// Labels in index order.
    pub fn labels(&self) -> &[String] {
        self.labels.as_slice()
    }

    /// Total of each label.
    pub fn totals(&self) -> &Array1<u64> {
        &self.totals
    }

    /// Non-zero count of each label.
    pub fn counts(&self) -> &Array1<u64> {
        &self.counts
    }

    /// Total and non-zero count of a label, if present.
    pub fn get(&self, label: &str) -> Option<(u64, u64)> {
        let idx = self.labels.position(label)?;
        Some((self.totals[idx], self.counts[idx]))
    }

    /// Compute descriptive statistics of the totals and counts.
    pub fn statistics(&self) -> Result<AxisStatistics, SpnetError> {
        let empty = || SpnetError::EmptyMatrix {
            operation: "axis statistics",
        };
        let min_total = *self.totals.min().map_err(|_| empty())?;
        let max_total = *self.totals.max().map_err(|_| empty())?;
        let min_count = *self.counts.min().map_err(|_| empty())?;
        let max_count = *self.counts.max().map_err(|_| empty())?;
        Ok(AxisStatistics {
            axis: self.axis,
            label_count: self.labels.len(),
            grand_total: self.totals.sum(),
            min_total,
            min_total_labels: self.labels_where(&self.totals, min_total),
            max_total,
            max_total_labels: self.labels_where(&self.totals, max_total),
            mean_total: mean(&self.totals),
            median_total: median(&self.totals),
            min_count,
            min_count_labels: self.labels_where(&self.counts, min_count),
            max_count,
            max_count_labels: self.labels_where(&self.counts, max_count),
            mean_count: mean(&self.counts),
            median_count: median(&self.counts),
        })
    }

    fn labels_where(&self, values: &Array1<u64>, target: u64) -> Vec<String> {
        values
            .iter()
            .zip(self.labels.as_slice())
            .filter(|(value, _)| **value == target)
            .map(|(_, label)| label.clone())
            .collect()
    }

    /// Serialise the summary to an archive.
    ///
    /// Rows are the summarised labels; the two columns are `count` and `total`.
    pub fn to_archive(&self) -> Result<Archive, SpnetError> {
        let metadata = ArchiveMetadata::new(&self.info, None);
        let columns = [COUNT_COLUMN.to_string(), TOTAL_COLUMN.to_string()];
        let mut cells = Vec::new();
        for (i, (count, total)) in self.counts.iter().zip(&self.totals).enumerate() {
            let row = u32::try_from(i)?;
            if *count > 0 {
                cells.push((row, 0, *count));
            }
            if *total > 0 {
                cells.push((row, 1, *total));
            }
        }
        MatrixParts::to_archive(&metadata, self.labels(), &columns, cells.into_iter())
    }

    /// Deserialise a summary from an archive.
    pub fn from_archive(archive: &Archive) -> Result<Self, SpnetError> {
        let parts = MatrixParts::from_archive(archive, TableKind::Summary)?;
        if parts.columns.as_slice() != [COUNT_COLUMN, TOTAL_COLUMN] {
            return Err(SpnetError::archive("summary columns must be count and total"));
        }
        let table_type = parts.metadata.table_type;
        let axis = if table_type.dim0().is_analysis() {
            Axis::Row
        } else {
            Axis::Column
        };
        let mut totals = Array1::zeros(parts.rows.len());
        let mut counts = Array1::zeros(parts.rows.len());
        for (row, column, value) in parts.cells {
            let row = row as usize;
            if row >= parts.rows.len() || column > 1 {
                return Err(SpnetError::archive(format!(
                    "cell ({}, {}) out of bounds",
                    row, column
                )));
            }
            match column {
                0 => counts[row] = value,
                _ => totals[row] = value,
            }
        }
        totals
            .iter()
            .try_fold(0u64, |sum, total| sum.checked_add(*total))
            .ok_or_else(|| SpnetError::archive("summary totals overflow the grand total"))?;
        Ok(SummaryMatrix {
            info: parts.metadata.info(),
            axis,
            labels: parts.rows,
            totals,
            counts,
        })
    }

    /// Write the summary archive to a directory, returning its path.
    pub fn write_to_dir(&self, dir: &Path, compression: Compression) -> Result<PathBuf, SpnetError> {
        let metadata = ArchiveMetadata::new(&self.info, None);
        archive::write_to_dir(&self.to_archive()?, &metadata, dir, compression)
    }

    /// Read a summary archive file.
    pub fn read_from_file(path: &Path) -> Result<Self, SpnetError> {
        Self::from_archive(&Archive::read_file(path)?)
    }
}

fn mean(values: &Array1<u64>) -> f64 {
    values.mapv(|value| value as f64).mean().unwrap_or(0.0)
}

fn median(values: &Array1<u64>) -> f64 {
    values
        .mapv(|value| n64(value as f64))
        .quantile_mut(n64(0.5), &Midpoint)
        .map(f64::from)
        .unwrap_or(0.0)
}
