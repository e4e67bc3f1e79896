//! This crate builds species by analysis-dimension matrices from aggregated biodiversity
//! occurrence counts and computes presence/absence statistics from them, for the Specify Network
//! project.
//!
//! Occurrence counts arrive as a stacked (long-form) table with one record per
//! (dimension value, species) pair, e.g. the number of occurrences of each species in each US
//! county. From this the crate derives:
//!
//! * a sparse site by species [heatmap](crate::heatmap::HeatmapMatrix) of occurrence counts;
//! * [summaries](crate::summary::SummaryMatrix) of totals and counts along each axis;
//! * a [presence/absence matrix](crate::pam::Pam) and its site, species and diversity
//!   statistics.
//!
//! Results are persisted as compressed [archives](crate::archive) named by a fixed
//! [table naming](crate::table) convention and may be uploaded to S3-compatible object storage.
//!
//! The crate is built on top of a number of open source components.
//!
//! * [ndarray] provides the vectors used in numerical computation.
//! * [Rayon](rayon) parallelises matrix construction.
//! * [Serde](serde) performs (de)serialisation of archive metadata and statistics.
//! * [AWS SDK for S3](aws-sdk-s3) is used to interact with S3-compatible object stores.
//! * [Tokio](tokio) runs the object storage client.

pub mod archive;
pub mod cli;
pub mod compression;
pub mod error;
pub mod heatmap;
pub mod models;
pub mod pam;
pub mod s3_client;
pub mod stacked;
pub mod summary;
pub mod table;
pub mod task;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
pub mod types;
