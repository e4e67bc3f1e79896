//! Table types and the filename convention for derived artifacts.
//!
//! Every artifact is named `<dim0>[_x_<dim1>]_<datatype>_<YYYY_MM_DD>[<ext>]`, for example
//! `county_x_species_matrix_2024_02_01.gz`. A [TableType] pairs a [TableKind] with the analysis
//! dimensions of its axes and is validated when constructed, so a parsed filename can be routed
//! straight to the matching reconstruction logic.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum_macros::Display;

use crate::error::SpnetError;

/// Separator between filename components.
pub const SEP: &str = "_";

/// Separator between the two dimensions of a table.
pub const DIM_SEP: &str = "_x_";

/// Suffix appended to tables exported by Redshift, before the file extension.
pub const REDSHIFT_PART_SUFFIX: &str = "_000";

/// Field holding the unique species identifier (taxon key concatenated with species name).
pub const SPECIES_FLD: &str = "taxonkey_species";

/// Field holding occurrence counts in stacked records.
pub const OCCURRENCE_COUNT_FLD: &str = "occ_count";

/// Field holding species counts in counts tables.
pub const SPECIES_COUNT_FLD: &str = "species_count";

/// Kinds of aggregated data tables.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum TableKind {
    /// Stacked records of dimension value, species, occurrence count
    List,
    /// Occurrence and species counts per dimension value
    Counts,
    /// Per-label totals and non-zero counts along one axis of a matrix
    Summary,
    /// Sparse site by species occurrence matrix
    Matrix,
    /// Presence-absence matrix
    Pam,
    /// Statistics computed from a presence-absence matrix
    Stats,
}

impl TableKind {
    /// All table kinds.
    pub const ALL: [TableKind; 6] = [
        TableKind::List,
        TableKind::Counts,
        TableKind::Summary,
        TableKind::Matrix,
        TableKind::Pam,
        TableKind::Stats,
    ];

    /// Code used in filenames.
    pub fn code(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Counts => "counts",
            Self::Summary => "summary",
            Self::Matrix => "matrix",
            Self::Pam => "pam",
            Self::Stats => "stats",
        }
    }
}

impl FromStr for TableKind {
    type Err = SpnetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TableKind::ALL
            .into_iter()
            .find(|kind| kind.code() == s)
            .ok_or_else(|| SpnetError::table_type(s, format!("unknown datatype {}", s)))
    }
}

/// Dimensions used to partition occurrence records.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum AnalysisDimension {
    /// GBIF dataset
    Dataset,
    /// US county
    County,
    /// US state
    State,
    /// American Indian, Alaska Native, and Native Hawaiian area
    Aiannh,
    /// Species; always the column axis of a matrix
    Species,
}

impl AnalysisDimension {
    /// All dimensions.
    pub const ALL: [AnalysisDimension; 5] = [
        AnalysisDimension::Dataset,
        AnalysisDimension::County,
        AnalysisDimension::State,
        AnalysisDimension::Aiannh,
        AnalysisDimension::Species,
    ];

    /// Code used in filenames.
    pub fn code(self) -> &'static str {
        match self {
            Self::Dataset => "dataset",
            Self::County => "county",
            Self::State => "state",
            Self::Aiannh => "aiannh",
            Self::Species => "species",
        }
    }

    /// Column holding this dimension's values in stacked records.
    pub fn key_fld(self) -> &'static str {
        match self {
            Self::Dataset => "dataset_key",
            Self::County => "census_county",
            Self::State => "census_state",
            Self::Aiannh => "aiannh_name",
            Self::Species => SPECIES_FLD,
        }
    }

    /// Whether this is an analysis dimension (anything but species).
    pub fn is_analysis(self) -> bool {
        self != Self::Species
    }
}

impl FromStr for AnalysisDimension {
    type Err = SpnetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalysisDimension::ALL
            .into_iter()
            .find(|dim| dim.code() == s)
            .ok_or_else(|| SpnetError::table_type(s, format!("unknown dimension {}", s)))
    }
}

/// A validated table type: kind of data plus the dimensions of axis 0 and axis 1.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TableType {
    kind: TableKind,
    dim0: AnalysisDimension,
    dim1: Option<AnalysisDimension>,
}

impl TableType {
    /// Return a new TableType, checking the dimensions are valid for the kind.
    ///
    /// * `counts` tables have a single analysis dimension.
    /// * `matrix`, `pam` and `stats` tables have an analysis dimension on rows and species on
    ///   columns.
    /// * `list` and `summary` tables pair an analysis dimension with species, in either order.
    pub fn new(
        kind: TableKind,
        dim0: AnalysisDimension,
        dim1: Option<AnalysisDimension>,
    ) -> Result<Self, SpnetError> {
        let table_type = TableType { kind, dim0, dim1 };
        let invalid = |reason: &str| SpnetError::table_type(table_type.code(), reason);
        match kind {
            TableKind::Counts => {
                if !dim0.is_analysis() {
                    return Err(invalid("first dimension must be an analysis dimension"));
                }
                if dim1.is_some() {
                    return Err(invalid("counts tables have no second dimension"));
                }
            }
            TableKind::Matrix | TableKind::Pam | TableKind::Stats => {
                if !dim0.is_analysis() {
                    return Err(invalid("rows must be an analysis dimension"));
                }
                if dim1 != Some(AnalysisDimension::Species) {
                    return Err(invalid("columns must be species"));
                }
            }
            TableKind::List | TableKind::Summary => match dim1 {
                Some(dim1) if dim0.is_analysis() != dim1.is_analysis() => (),
                _ => {
                    return Err(invalid(
                        "dimensions must be species and an analysis dimension",
                    ))
                }
            },
        }
        Ok(table_type)
    }

    /// Table type of a species by dimension matrix.
    pub fn matrix(dim0: AnalysisDimension) -> Result<Self, SpnetError> {
        Self::new(TableKind::Matrix, dim0, Some(AnalysisDimension::Species))
    }

    /// Return the same dimensions with a different kind.
    pub fn with_kind(self, kind: TableKind) -> Result<Self, SpnetError> {
        Self::new(kind, self.dim0, self.dim1)
    }

    /// Kind of data in the table.
    pub fn kind(&self) -> TableKind {
        self.kind
    }

    /// Dimension of axis 0 (rows).
    pub fn dim0(&self) -> AnalysisDimension {
        self.dim0
    }

    /// Dimension of axis 1 (columns), if any.
    pub fn dim1(&self) -> Option<AnalysisDimension> {
        self.dim1
    }

    /// Data contents portion of the code, e.g. `county_x_species`.
    pub fn contents(&self) -> String {
        match self.dim1 {
            Some(dim1) => format!("{}{}{}", self.dim0.code(), DIM_SEP, dim1.code()),
            None => self.dim0.code().to_string(),
        }
    }

    /// Table type code, e.g. `county_x_species_matrix`.
    pub fn code(&self) -> String {
        format!("{}{}{}", self.contents(), SEP, self.kind.code())
    }

    /// Build the filename for this table.
    ///
    /// # Arguments
    ///
    /// * `datestr`: Date of the data in `YYYY_MM_DD` format
    /// * `ext`: File extension including the leading `.`, or an empty string
    pub fn filename(&self, datestr: &str, ext: &str) -> Result<String, SpnetError> {
        validate_datestr(datestr)?;
        Ok(format!("{}{}{}{}", self.code(), SEP, datestr, ext))
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for TableType {
    type Err = SpnetError;

    /// Parse a table type code into kind and dimensions.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (contents, datatype) = s
            .rsplit_once(SEP)
            .ok_or_else(|| SpnetError::table_type(s, "missing datatype"))?;
        let kind = datatype
            .parse::<TableKind>()
            .map_err(|_| SpnetError::table_type(s, format!("unknown datatype {}", datatype)))?;
        let parse_dim = |code: &str| {
            code.parse::<AnalysisDimension>()
                .map_err(|_| SpnetError::table_type(s, format!("unknown dimension {}", code)))
        };
        let (dim0, dim1) = match contents.split_once(DIM_SEP) {
            Some((dim0, dim1)) => (parse_dim(dim0)?, Some(parse_dim(dim1)?)),
            None => (parse_dim(contents)?, None),
        };
        TableType::new(kind, dim0, dim1)
    }
}

impl Serialize for TableType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.code())
    }
}

impl<'de> Deserialize<'de> for TableType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        code.parse().map_err(serde::de::Error::custom)
    }
}

/// Components recovered from a table filename.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedFilename {
    /// Table type
    pub table_type: TableType,
    /// Date of the data in `YYYY_MM_DD` format
    pub datestr: String,
    /// Everything after the date, e.g. `.gz` or `_000.parquet`
    pub rest: String,
}

/// Parse a table filename, which may include a directory path.
///
/// Handles both `<table>_<date>.<ext>` and Redshift exports named `<table>_<date>_000.<ext>`.
pub fn parse_filename(filename: &str) -> Result<ParsedFilename, SpnetError> {
    let basename = std::path::Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| SpnetError::table_type(filename, "not a filename"))?;
    // Extension starts at the first '.', table codes and dates never contain one.
    let (stem, ext) = match basename.find('.') {
        Some(idx) => basename.split_at(idx),
        None => (basename, ""),
    };
    let (stem, rest) = match stem.strip_suffix(REDSHIFT_PART_SUFFIX) {
        Some(stripped) => (stripped, format!("{}{}", REDSHIFT_PART_SUFFIX, ext)),
        None => (stem, ext.to_string()),
    };
    let date_len = "YYYY_MM_DD".len();
    if stem.len() < date_len + 2 || !stem.is_char_boundary(stem.len() - date_len) {
        return Err(SpnetError::table_type(basename, "missing date"));
    }
    let (table_code, datestr) = stem.split_at(stem.len() - date_len);
    validate_datestr(datestr).map_err(|_| SpnetError::table_type(basename, "missing date"))?;
    let table_code = table_code
        .strip_suffix(SEP)
        .ok_or_else(|| SpnetError::table_type(basename, "missing separator before date"))?;
    Ok(ParsedFilename {
        table_type: table_code.parse()?,
        datestr: datestr.to_string(),
        rest,
    })
}

/// Check a date string is in `YYYY_MM_DD` format.
pub fn validate_datestr(datestr: &str) -> Result<(), SpnetError> {
    let parts: Vec<&str> = datestr.split(SEP).collect();
    let valid = matches!(parts.as_slice(), [year, month, day]
        if year.len() == 4 && month.len() == 2 && day.len() == 2
            && parts.iter().all(|part| part.chars().all(|c| c.is_ascii_digit())));
    if !valid {
        return Err(SpnetError::table_type(
            datestr,
            "date must be in YYYY_MM_DD format",
        ));
    }
    Ok(())
}

/// Today's UTC date in `YYYY_MM_DD` format.
pub fn current_datestr() -> String {
    let today = time::OffsetDateTime::now_utc().date();
    format!(
        "{:04}{}{:02}{}{:02}",
        today.year(),
        SEP,
        u8::from(today.month()),
        SEP,
        today.day()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use AnalysisDimension::*;

    #[test]
    fn table_type_codes() {
        let matrix = TableType::matrix(County).unwrap();
        assert_eq!("county_x_species_matrix", matrix.code());
        let counts = TableType::new(TableKind::Counts, State, None).unwrap();
        assert_eq!("state_counts", counts.to_string());
        let summary = TableType::new(TableKind::Summary, Species, Some(Dataset)).unwrap();
        assert_eq!("species_x_dataset_summary", summary.code());
    }

    #[test]
    fn table_type_invalid_counts() {
        assert!(TableType::new(TableKind::Counts, Species, None).is_err());
        assert!(TableType::new(TableKind::Counts, County, Some(Species)).is_err());
    }

    #[test]
    fn table_type_invalid_matrix() {
        assert!(TableType::new(TableKind::Matrix, Species, Some(County)).is_err());
        assert!(TableType::new(TableKind::Pam, County, Some(State)).is_err());
        assert!(TableType::new(TableKind::Stats, County, None).is_err());
    }

    #[test]
    fn table_type_invalid_summary() {
        assert!(TableType::new(TableKind::Summary, County, Some(State)).is_err());
        assert!(TableType::new(TableKind::List, Species, Some(Species)).is_err());
        assert!(TableType::new(TableKind::List, County, None).is_err());
    }

    #[test]
    fn table_type_with_kind() {
        let matrix = TableType::matrix(Dataset).unwrap();
        let pam = matrix.with_kind(TableKind::Pam).unwrap();
        assert_eq!("dataset_x_species_pam", pam.code());
        assert!(matrix.with_kind(TableKind::Counts).is_err());
    }

    #[test]
    fn table_type_parse() {
        let table_type: TableType = "county_x_species_list".parse().unwrap();
        assert_eq!(TableKind::List, table_type.kind());
        assert_eq!(County, table_type.dim0());
        assert_eq!(Some(Species), table_type.dim1());
        let counts: TableType = "aiannh_counts".parse().unwrap();
        assert_eq!(None, counts.dim1());
    }

    #[test]
    fn table_type_parse_invalid() {
        assert!("county".parse::<TableType>().is_err());
        assert!("county_x_species_heatmap".parse::<TableType>().is_err());
        assert!("planet_x_species_matrix".parse::<TableType>().is_err());
    }

    #[test]
    fn table_type_serde() {
        let matrix = TableType::matrix(County).unwrap();
        let json = serde_json::to_string(&matrix).unwrap();
        assert_eq!(r#""county_x_species_matrix""#, json);
        let parsed: TableType = serde_json::from_str(&json).unwrap();
        assert_eq!(matrix, parsed);
        assert!(serde_json::from_str::<TableType>(r#""county_matrix""#).is_err());
    }

    #[test]
    fn filename_build_and_parse() {
        let stats = TableType::new(TableKind::Stats, State, Some(Species)).unwrap();
        let filename = stats.filename("2024_02_01", ".gz").unwrap();
        assert_eq!("state_x_species_stats_2024_02_01.gz", filename);
        let parsed = parse_filename(&format!("/tmp/{}", filename)).unwrap();
        assert_eq!(stats, parsed.table_type);
        assert_eq!("2024_02_01", parsed.datestr);
        assert_eq!(".gz", parsed.rest);
    }

    #[test]
    fn filename_parse_redshift_export() {
        let parsed = parse_filename("county_x_species_list_2024_03_01_000.parquet").unwrap();
        assert_eq!(
            TableType::new(TableKind::List, County, Some(Species)).unwrap(),
            parsed.table_type
        );
        assert_eq!("2024_03_01", parsed.datestr);
        assert_eq!("_000.parquet", parsed.rest);
    }

    #[test]
    fn filename_parse_no_extension() {
        let parsed = parse_filename("species_x_county_summary_2024_03_01").unwrap();
        assert_eq!(TableKind::Summary, parsed.table_type.kind());
        assert_eq!(Species, parsed.table_type.dim0());
        assert_eq!("", parsed.rest);
    }

    #[test]
    fn filename_parse_invalid() {
        assert!(parse_filename("county_x_species_matrix.gz").is_err());
        assert!(parse_filename("county_x_species_matrix_2024_3_01.gz").is_err());
        assert!(parse_filename("2024_03_01.gz").is_err());
        assert!(parse_filename("county_x_species_matrix2024_03_01.gz").is_err());
    }

    #[test]
    fn filename_invalid_datestr() {
        let matrix = TableType::matrix(County).unwrap();
        assert!(matrix.filename("2024-02-01", ".gz").is_err());
    }

    #[test]
    fn current_datestr_is_valid() {
        validate_datestr(&current_datestr()).unwrap();
    }
}
