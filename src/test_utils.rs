use crate::error::SpnetError;
use crate::heatmap::{HeatmapMatrix, MatrixInfo};
use crate::stacked::StackedRecord;
use crate::table::{AnalysisDimension, TableType, OCCURRENCE_COUNT_FLD};

/// Date string used by test matrices.
pub(crate) const TEST_DATESTR: &str = "2024_02_01";

/// Create county by species matrix metadata.
pub(crate) fn matrix_info() -> MatrixInfo {
    MatrixInfo::new(
        TableType::matrix(AnalysisDimension::County).unwrap(),
        TEST_DATESTR,
        OCCURRENCE_COUNT_FLD,
    )
}

/// Create stacked records from (row key, column key, value) triples.
pub(crate) fn records(triples: &[(&str, &str, i64)]) -> Vec<Result<StackedRecord, SpnetError>> {
    triples
        .iter()
        .enumerate()
        .map(|(row, (row_key, column_key, value))| {
            StackedRecord::new(row, row_key, column_key, *value)
        })
        .collect()
}

/// Stacked records of two counties and two species, with a repeated county1/sp1 pair.
pub(crate) fn scenario_records() -> Vec<StackedRecord> {
    records(&[
        ("county1", "sp1", 3),
        ("county1", "sp2", 1),
        ("county2", "sp1", 2),
        ("county1", "sp1", 2),
    ])
    .into_iter()
    .collect::<Result<_, _>>()
    .unwrap()
}

/// Build the matrix of [scenario_records].
pub(crate) fn scenario_heatmap() -> HeatmapMatrix {
    HeatmapMatrix::build(scenario_records().into_iter().map(Ok), matrix_info()).unwrap()
}

/// Build a matrix from (row key, column key, value) triples.
pub(crate) fn heatmap(triples: &[(&str, &str, i64)]) -> HeatmapMatrix {
    HeatmapMatrix::build(records(triples), matrix_info()).unwrap()
}
