//! Command Line Interface (CLI) arguments.

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use crate::error::SpnetError;
use crate::models::{ColumnMapping, Compression};
use crate::s3_client::S3Credentials;
use crate::table::{AnalysisDimension, OCCURRENCE_COUNT_FLD, SPECIES_FLD};
use crate::task::StatsConfig;

/// Build species by dimension matrices, PAMs and biodiversity statistics from stacked occurrence
/// counts
#[derive(Clone, Debug, Parser)]
#[command(name = "spnet-stats", version)]
pub struct CommandLineArgs {
    /// Delimited file of stacked (dimension value, species, count) records with a header row
    #[arg(env = "SPNET_STACKED_FILE")]
    pub stacked_file: String,
    /// Analysis dimension of the matrix rows
    #[arg(long, default_value = "county", value_parser = parse_dimension, env = "SPNET_DIMENSION")]
    pub dimension: AnalysisDimension,
    /// Date of the data in YYYY_MM_DD format. Defaults to the date in the stacked file name, or
    /// today
    #[arg(long, env = "SPNET_DATESTR")]
    pub datestr: Option<String>,
    /// Column containing dimension values. Defaults to the dimension's key field
    #[arg(long, env = "SPNET_KEY_FLD")]
    pub key_fld: Option<String>,
    /// Column containing species identifiers
    #[arg(long, default_value = SPECIES_FLD, env = "SPNET_SPECIES_FLD")]
    pub species_fld: String,
    /// Column containing occurrence counts
    #[arg(long, default_value = OCCURRENCE_COUNT_FLD, env = "SPNET_VALUE_FLD")]
    pub value_fld: String,
    /// Field delimiter of the stacked file
    #[arg(long, default_value = ",", value_parser = parse_delimiter, env = "SPNET_DELIMITER")]
    pub delimiter: u8,
    /// Minimum occurrence count for a species to be considered present at a site
    #[arg(
        long,
        default_value_t = 1,
        value_parser = clap::value_parser!(u64).range(1..),
        env = "SPNET_MIN_PRESENCE_COUNT"
    )]
    pub min_presence_count: u64,
    /// Directory in which to write output archives
    #[arg(long, default_value = "/tmp", env = "SPNET_OUTPUT_DIR")]
    pub output_dir: String,
    /// Compression algorithm for output archives
    #[arg(long, value_enum, default_value_t = Compression::Gzip, env = "SPNET_COMPRESSION")]
    pub compression: Compression,
    /// Whether to use Rayon to build the matrix in parallel.
    #[arg(long, default_value_t = false, env = "SPNET_USE_RAYON")]
    pub use_rayon: bool,
    /// Number of partitions for a parallel build
    #[arg(long, default_value_t = num_cpus::get(), env = "SPNET_PARTITIONS")]
    pub partitions: usize,
    /// S3-compatible object store to upload archives to
    #[arg(long, env = "SPNET_S3_ENDPOINT")]
    pub s3_endpoint: Option<Url>,
    /// Bucket to upload archives to
    #[arg(long, requires = "s3_endpoint", env = "SPNET_S3_BUCKET")]
    pub s3_bucket: Option<String>,
    /// Key prefix for uploaded archives
    #[arg(long, default_value = "summary", env = "SPNET_S3_PREFIX")]
    pub s3_prefix: String,
    /// Object store access key
    #[arg(long, requires = "s3_secret_key", env = "SPNET_S3_ACCESS_KEY")]
    pub s3_access_key: Option<String>,
    /// Object store secret key
    #[arg(long, requires = "s3_access_key", env = "SPNET_S3_SECRET_KEY", hide_env_values = true)]
    pub s3_secret_key: Option<String>,
}

/// Parse an analysis dimension code; species are always the matrix columns.
fn parse_dimension(s: &str) -> Result<AnalysisDimension, String> {
    match s.parse::<AnalysisDimension>() {
        Ok(dimension) if dimension.is_analysis() => Ok(dimension),
        _ => {
            let codes: Vec<&str> = AnalysisDimension::ALL
                .iter()
                .filter(|dim| dim.is_analysis())
                .map(|dim| dim.code())
                .collect();
            Err(format!("expected one of {}", codes.join(", ")))
        }
    }
}

fn parse_delimiter(s: &str) -> Result<u8, String> {
    let delimiter = match s {
        "\\t" | "tab" => "\t",
        _ => s,
    };
    match delimiter.as_bytes() {
        [byte] => Ok(*byte),
        _ => Err("delimiter must be a single byte".to_string()),
    }
}

/// Expand a leading `~` in a path.
fn expand(path: &str) -> Result<PathBuf, SpnetError> {
    Ok(expanduser::expanduser(path)?)
}

impl CommandLineArgs {
    /// Resolve the arguments into the settings of a calc_stats run.
    pub fn stats_config(&self) -> Result<StatsConfig, SpnetError> {
        let stacked_file = expand(&self.stacked_file)?;
        let key_fld = self
            .key_fld
            .clone()
            .unwrap_or_else(|| self.dimension.key_fld().to_string());
        Ok(StatsConfig {
            datestr: StatsConfig::resolve_datestr(self.datestr.as_deref(), &stacked_file)?,
            stacked_file,
            dimension: self.dimension,
            mapping: ColumnMapping::new(&key_fld, &self.species_fld, &self.value_fld),
            delimiter: self.delimiter,
            min_presence_count: self.min_presence_count,
            output_dir: expand(&self.output_dir)?,
            compression: self.compression,
            partitions: self.use_rayon.then_some(self.partitions),
        })
    }

    /// Object store credentials, if any.
    pub fn s3_credentials(&self) -> S3Credentials {
        match (&self.s3_access_key, &self.s3_secret_key) {
            (Some(access_key), Some(secret_key)) => {
                S3Credentials::access_key(access_key, secret_key)
            }
            _ => S3Credentials::None,
        }
    }

    /// Object store endpoint and bucket, if uploads are configured.
    pub fn s3_target(&self) -> Option<(&Url, &str)> {
        match (&self.s3_endpoint, &self.s3_bucket) {
            (Some(endpoint), Some(bucket)) => Some((endpoint, bucket.as_str())),
            _ => None,
        }
    }
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_args(args: &[&str]) -> CommandLineArgs {
        CommandLineArgs::try_parse_from(std::iter::once("spnet-stats").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn defaults() {
        let args = parse_args(&["/data/state_x_species_list_2024_02_01_000.csv"]);
        assert_eq!(AnalysisDimension::County, args.dimension);
        assert_eq!(1, args.min_presence_count);
        assert_eq!(Compression::Gzip, args.compression);
        assert_eq!(b',', args.delimiter);
        assert!(args.s3_target().is_none());
        assert!(args.s3_credentials() == S3Credentials::None);
        let config = args.stats_config().unwrap();
        assert_eq!("2024_02_01", config.datestr);
        assert_eq!(
            ColumnMapping::new("census_county", "taxonkey_species", "occ_count"),
            config.mapping
        );
        assert_eq!(PathBuf::from("/tmp"), config.output_dir);
        assert_eq!(None, config.partitions);
    }

    #[test]
    fn overrides() {
        let args = parse_args(&[
            "records.tsv",
            "--dimension",
            "state",
            "--datestr",
            "2023_01_01",
            "--key-fld",
            "state_code",
            "--delimiter",
            "\\t",
            "--min-presence-count",
            "3",
            "--compression",
            "zlib",
            "--use-rayon",
            "--partitions",
            "4",
            "--s3-endpoint",
            "http://localhost:9000",
            "--s3-bucket",
            "bison",
            "--s3-access-key",
            "user",
            "--s3-secret-key",
            "password",
        ]);
        let config = args.stats_config().unwrap();
        assert_eq!(AnalysisDimension::State, config.dimension);
        assert_eq!("2023_01_01", config.datestr);
        assert_eq!("state_code", config.mapping.key_fld);
        assert_eq!(b'\t', config.delimiter);
        assert_eq!(3, config.min_presence_count);
        assert_eq!(Compression::Zlib, config.compression);
        assert_eq!(Some(4), config.partitions);
        let (endpoint, bucket) = args.s3_target().unwrap();
        assert_eq!("http://localhost:9000/", endpoint.as_str());
        assert_eq!("bison", bucket);
        assert!(args.s3_credentials() == S3Credentials::access_key("user", "password"));
    }

    #[test]
    fn invalid_dimension() {
        let result =
            CommandLineArgs::try_parse_from(["spnet-stats", "x.csv", "--dimension", "species"]);
        assert!(result.is_err());
    }

    #[test]
    fn invalid_min_presence_count() {
        let result = CommandLineArgs::try_parse_from([
            "spnet-stats",
            "x.csv",
            "--min-presence-count",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn invalid_delimiter() {
        assert_eq!(Ok(b';'), parse_delimiter(";"));
        assert!(parse_delimiter(";;").is_err());
    }

    #[test]
    fn bucket_requires_endpoint() {
        let result =
            CommandLineArgs::try_parse_from(["spnet-stats", "x.csv", "--s3-bucket", "b"]);
        assert!(result.is_err());
    }
}
