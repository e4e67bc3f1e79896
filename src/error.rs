//! Error handling.

use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::put_object::PutObjectError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use thiserror::Error;
use tracing::{event, Level};
use zune_inflate::errors::InflateDecodeErrors;

/// Specify Network statistics error type
///
/// This type encapsulates the various errors that may occur while building matrices, computing
/// statistics and persisting results.
#[derive(Debug, Error)]
pub enum SpnetError {
    /// A persisted archive could not be parsed
    #[error("invalid archive: {reason}")]
    ArchiveFormat { reason: String },

    /// A declared column is absent from the input table
    #[error("column {expected} not found in input table (available: {})", .available.join(", "))]
    ColumnMapping {
        expected: String,
        available: Vec<String>,
    },

    /// Error parsing a delimited input table
    #[error("failed to read stacked records")]
    Csv(#[from] csv::Error),

    /// Error decompressing zlib data
    #[error("failed to decompress data")]
    DecompressionZune(#[from] InflateDecodeErrors),

    /// Attempt to perform an operation on a matrix with no rows or columns
    #[error("cannot perform {operation} on empty matrix")]
    EmptyMatrix { operation: &'static str },

    /// The stacked record source yielded no records
    #[error("stacked record source contains no records")]
    EmptySource,

    /// Filesystem or (de)compression I/O error
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Error (de)serialising JSON
    #[error("failed to (de)serialise JSON")]
    Json(#[from] serde_json::Error),

    /// A stacked record could not be accepted
    #[error("malformed stacked record {row}: {reason}")]
    MalformedRecord { row: usize, reason: String },

    /// Error while storing an object in S3
    #[error("error storing object in S3 storage")]
    S3PutObject(#[from] SdkError<PutObjectError>),

    /// Invalid table type or table filename
    #[error("invalid table type {table_type}: {reason}")]
    TableType { table_type: String, reason: String },

    /// Invalid presence threshold
    #[error("minimum presence count must be at least 1, got {min_presence_count}")]
    Threshold { min_presence_count: u64 },

    /// Error converting between integer types
    #[error(transparent)]
    TryFromInt(#[from] std::num::TryFromIntError),

    /// Error validating configuration (multiple errors)
    #[error("configuration is not valid")]
    Validation(#[from] validator::ValidationErrors),
}

impl SpnetError {
    /// Shorthand for an [SpnetError::ArchiveFormat] error.
    pub fn archive(reason: impl Into<String>) -> Self {
        SpnetError::ArchiveFormat {
            reason: reason.into(),
        }
    }

    /// Shorthand for an [SpnetError::TableType] error.
    pub fn table_type(table_type: impl Into<String>, reason: impl Into<String>) -> Self {
        SpnetError::TableType {
            table_type: table_type.into(),
            reason: reason.into(),
        }
    }
}

/// Report of an error and the chain of errors that caused it.
///
/// Implements serde (de)serialise.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct ErrorReport {
    /// Main error message
    pub message: String,

    /// Optional list of causes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caused_by: Option<Vec<String>>,
}

impl ErrorReport {
    /// Return a new ErrorReport
    ///
    /// # Arguments
    ///
    /// * `error`: The error that occurred
    pub fn new<E>(error: &E) -> Self
    where
        E: std::error::Error,
    {
        let message = error.to_string();
        let mut caused_by = None;
        let mut current = error.source();
        while let Some(source) = current {
            let mut causes: Vec<String> = caused_by.unwrap_or_default();
            causes.push(source.to_string());
            caused_by = Some(causes);
            current = source.source();
        }
        // Remove duplicate entries.
        if let Some(caused_by) = caused_by.as_mut() {
            caused_by.dedup()
        }
        ErrorReport { message, caused_by }
    }
}

/// Log an error and its causes, returning the report.
pub fn report(error: &SpnetError) -> ErrorReport {
    event!(Level::ERROR, "{}", error.to_string());
    let mut current = error.source();
    while let Some(source) = current {
        event!(Level::ERROR, "Caused by: {}", source.to_string());
        current = source.source();
    }
    ErrorReport::new(error)
}
