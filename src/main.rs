//! This file defines the spnet-stats binary entry point.

use std::process::ExitCode;

use spnet_stats::cli::{self, CommandLineArgs};
use spnet_stats::error::{self, SpnetError};
use spnet_stats::s3_client::S3Client;
use spnet_stats::task;
use spnet_stats::tracing;

/// Build and persist the matrices and statistics, then upload them if configured.
async fn run(args: &CommandLineArgs) -> Result<(), SpnetError> {
    let config = args.stats_config()?;
    let paths = task::calc_stats(&config)?;
    if let Some((endpoint, bucket)) = args.s3_target() {
        let client = S3Client::new(endpoint, args.s3_credentials()).await;
        task::upload_outputs(&client, bucket, Some(&args.s3_prefix), &paths).await?;
    }
    Ok(())
}

/// Application entry point
#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    tracing::init_tracing();
    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error::report(&err);
            ExitCode::FAILURE
        }
    }
}
