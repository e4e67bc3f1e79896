//! Data types and associated functions and methods

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use validator::{Validate, ValidationError};

/// Matrix axis
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Axis {
    /// Axis 0: analysis dimension values (sites)
    Row,
    /// Axis 1: species
    Column,
}

impl Axis {
    /// Returns the other axis.
    pub fn other(self) -> Self {
        match self {
            Self::Row => Self::Column,
            Self::Column => Self::Row,
        }
    }
}

/// Compression algorithm
#[derive(Clone, Copy, Debug, Default, Deserialize, Display, PartialEq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Compression {
    /// Gzip
    #[default]
    Gzip,
    /// Zlib
    Zlib,
}

impl Compression {
    /// File extension for archives written with this algorithm.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Gzip => ".gz",
            Self::Zlib => ".zz",
        }
    }
}

/// Names of the columns holding the row key, species key and count of stacked records.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_column_mapping"))]
pub struct ColumnMapping {
    /// Column containing analysis dimension values (matrix rows)
    #[validate(length(min = 1, message = "key_fld must not be empty"))]
    pub key_fld: String,
    /// Column containing species identifiers (matrix columns)
    #[validate(length(min = 1, message = "species_fld must not be empty"))]
    pub species_fld: String,
    /// Column containing occurrence counts (matrix values)
    #[validate(length(min = 1, message = "value_fld must not be empty"))]
    pub value_fld: String,
}

impl ColumnMapping {
    /// Return a new ColumnMapping object.
    pub fn new(key_fld: &str, species_fld: &str, value_fld: &str) -> Self {
        ColumnMapping {
            key_fld: key_fld.to_string(),
            species_fld: species_fld.to_string(),
            value_fld: value_fld.to_string(),
        }
    }
}

/// Validate that the three columns are distinct
fn validate_column_mapping(mapping: &ColumnMapping) -> Result<(), ValidationError> {
    if mapping.key_fld == mapping.species_fld
        || mapping.key_fld == mapping.value_fld
        || mapping.species_fld == mapping.value_fld
    {
        let mut error = ValidationError::new("Column mapping fields must be distinct");
        error.add_param("key_fld".into(), &mapping.key_fld);
        error.add_param("species_fld".into(), &mapping.species_fld);
        error.add_param("value_fld".into(), &mapping.value_fld);
        return Err(error);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_test::{assert_de_tokens, assert_de_tokens_error, Token};

    #[test]
    fn test_column_mapping() {
        let mapping = ColumnMapping::new("county", "taxonkey_species", "occ_count");
        assert_de_tokens(
            &mapping,
            &[
                Token::Struct {
                    name: "ColumnMapping",
                    len: 3,
                },
                Token::Str("key_fld"),
                Token::Str("county"),
                Token::Str("species_fld"),
                Token::Str("taxonkey_species"),
                Token::Str("value_fld"),
                Token::Str("occ_count"),
                Token::StructEnd,
            ],
        );
        mapping.validate().unwrap()
    }

    #[test]
    fn test_column_mapping_unknown_field() {
        assert_de_tokens_error::<ColumnMapping>(
            &[
                Token::Struct {
                    name: "ColumnMapping",
                    len: 1,
                },
                Token::Str("foo"),
            ],
            "unknown field `foo`, expected one of `key_fld`, `species_fld`, `value_fld`",
        )
    }

    #[test]
    fn test_column_mapping_missing_field() {
        assert_de_tokens_error::<ColumnMapping>(
            &[
                Token::Struct {
                    name: "ColumnMapping",
                    len: 1,
                },
                Token::Str("key_fld"),
                Token::Str("county"),
                Token::StructEnd,
            ],
            "missing field `species_fld`",
        )
    }

    #[test]
    #[should_panic(expected = "key_fld must not be empty")]
    fn test_column_mapping_empty_key() {
        let mapping = ColumnMapping::new("", "taxonkey_species", "occ_count");
        mapping.validate().unwrap()
    }

    #[test]
    #[should_panic(expected = "Column mapping fields must be distinct")]
    fn test_column_mapping_duplicate_fields() {
        let mapping = ColumnMapping::new("county", "county", "occ_count");
        mapping.validate().unwrap()
    }

    #[test]
    fn test_axis() {
        assert_eq!(Axis::Column, Axis::Row.other());
        assert_eq!(Axis::Row, Axis::Column.other());
        assert_eq!("row", Axis::Row.to_string());
    }

    #[test]
    fn test_compression() {
        assert_de_tokens(
            &Compression::Zlib,
            &[
                Token::Enum {
                    name: "Compression",
                },
                Token::Str("zlib"),
                Token::Unit,
            ],
        );
        assert_eq!(Compression::Gzip, Compression::default());
        assert_eq!(".gz", Compression::Gzip.extension());
        assert_eq!("zlib", Compression::Zlib.to_string());
    }
}
