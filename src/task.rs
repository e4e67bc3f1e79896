//! The calc_stats batch pipeline.
//!
//! Reads a stacked records table, builds the heatmap, its two summaries, the PAM and the PAM
//! statistics, writes each to a compressed archive and optionally uploads the archives to object
//! storage.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::{event, Level};

use crate::error::SpnetError;
use crate::heatmap::{HeatmapMatrix, MatrixInfo};
use crate::models::{Axis, ColumnMapping, Compression};
use crate::pam::Pam;
use crate::s3_client::{object_key, S3Client};
use crate::stacked::{StackedRecord, StackedRecordSource};
use crate::summary::SummaryMatrix;
use crate::table::{self, AnalysisDimension, TableType};

/// Settings of one calc_stats run.
#[derive(Clone, Debug, PartialEq)]
pub struct StatsConfig {
    /// Delimited stacked records file
    pub stacked_file: PathBuf,
    /// Analysis dimension of the matrix rows
    pub dimension: AnalysisDimension,
    /// Date of the data in `YYYY_MM_DD` format
    pub datestr: String,
    /// Input columns
    pub mapping: ColumnMapping,
    /// Field delimiter of the input
    pub delimiter: u8,
    /// Minimum occurrence count for a species to be present at a site
    pub min_presence_count: u64,
    /// Directory for output archives
    pub output_dir: PathBuf,
    pub compression: Compression,
    /// Number of partitions for a parallel build, or `None` to build sequentially
    pub partitions: Option<usize>,
}

impl StatsConfig {
    /// Resolve the date of the data.
    ///
    /// An explicit date string wins, then the date in the stacked file's name, then today.
    pub fn resolve_datestr(
        datestr: Option<&str>,
        stacked_file: &Path,
    ) -> Result<String, SpnetError> {
        if let Some(datestr) = datestr {
            table::validate_datestr(datestr)?;
            return Ok(datestr.to_string());
        }
        let parsed = stacked_file
            .to_str()
            .and_then(|name| table::parse_filename(name).ok());
        Ok(match parsed {
            Some(parsed) => parsed.datestr,
            None => table::current_datestr(),
        })
    }
}

/// Build the heatmap from the stacked records file.
#[tracing::instrument(level = "INFO", skip_all, fields(file = %config.stacked_file.display()))]
pub fn build_heatmap(config: &StatsConfig) -> Result<HeatmapMatrix, SpnetError> {
    let info = MatrixInfo::new(
        TableType::matrix(config.dimension)?,
        &config.datestr,
        &config.mapping.value_fld,
    );
    let file = File::open(&config.stacked_file)?;
    let source = StackedRecordSource::from_reader(file, config.delimiter, &config.mapping)?;
    let heatmap = match config.partitions {
        Some(partitions) => {
            let records = source.collect::<Result<Vec<StackedRecord>, _>>()?;
            HeatmapMatrix::build_parallel(&records, partitions, info)?
        }
        None => HeatmapMatrix::build(source, info)?,
    };
    let (rows, columns) = heatmap.shape();
    event!(
        Level::INFO,
        rows,
        columns,
        nnz = heatmap.nnz(),
        "Built {}",
        heatmap.table_type()
    );
    Ok(heatmap)
}

/// Run the pipeline, returning the paths of the archives written.
///
/// The presence threshold is checked before anything is written.
#[tracing::instrument(level = "INFO", skip_all)]
pub fn calc_stats(config: &StatsConfig) -> Result<Vec<PathBuf>, SpnetError> {
    if config.min_presence_count < 1 {
        return Err(SpnetError::Threshold {
            min_presence_count: config.min_presence_count,
        });
    }
    fs::create_dir_all(&config.output_dir)?;
    let dir = config.output_dir.as_path();
    let compression = config.compression;

    let heatmap = build_heatmap(config)?;
    let mut paths = vec![heatmap.write_to_dir(dir, compression)?];
    for axis in [Axis::Row, Axis::Column] {
        let summary = SummaryMatrix::from_heatmap(&heatmap, axis)?;
        paths.push(summary.write_to_dir(dir, compression)?);
    }

    let mut pam = Pam::from_heatmap(&heatmap, config.min_presence_count)?;
    drop(heatmap);
    pam.calc_all_stats();
    if let Some(diversity) = pam.diversity_stats() {
        event!(
            Level::INFO,
            gamma = diversity.gamma,
            occupied_sites = diversity.occupied_sites,
            whittaker_beta = diversity.whittaker_beta,
            "Computed PAM statistics"
        );
    }
    paths.push(pam.write_to_dir(dir, compression)?);
    paths.push(pam.statistics()?.write_to_dir(dir, compression)?);

    for path in &paths {
        event!(Level::INFO, "Wrote {}", path.display());
    }
    Ok(paths)
}

/// Upload files to an S3 bucket, returning their object keys.
///
/// # Arguments
///
/// * `client`: S3 client
/// * `bucket`: Name of the bucket
/// * `prefix`: Optional key prefix for the objects
/// * `paths`: Files to upload; each object is named after its file
#[tracing::instrument(level = "INFO", skip(client, paths))]
pub async fn upload_outputs(
    client: &S3Client,
    bucket: &str,
    prefix: Option<&str>,
    paths: &[PathBuf],
) -> Result<Vec<String>, SpnetError> {
    let mut keys = Vec::with_capacity(paths.len());
    for path in paths {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let key = object_key(prefix, &filename);
        let data = tokio::fs::read(path).await?;
        client.upload_object(bucket, &key, data.into()).await?;
        event!(Level::INFO, "Uploaded s3://{}/{}", bucket, key);
        keys.push(key);
    }
    Ok(keys)
}
