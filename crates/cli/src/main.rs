//! `featurize` -- TF-IDF featurization workflow driver.
//!
//! # Environment variables
//!
//! | Variable               | Flag             | Default                                   |
//! |------------------------|------------------|-------------------------------------------|
//! | `AWS_REGION`           | `--region`       | `us-east-1`                               |
//! | `AWS_ACCOUNT_ID`       | `--account`      | -- (image commands)                       |
//! | `FEATURIZE_BUCKET`     | `--bucket`       | -- (storage commands)                     |
//! | `FEATURIZE_ROLE_ARN`   | `--role-arn`     | -- (`submit`)                             |
//! | `FEATURIZE_REPOSITORY` | `--repository`   | `featurize-tfidf`                         |
//! | `FEATURIZE_IMAGE_TAG`  | `--tag`          | `latest`                                  |
//! | `PROCESSING_ENDPOINT`  | `--endpoint`     | `https://api.sagemaker.{region}.amazonaws.com` |
//! | `PROCESSING_API_TOKEN` | `--api-token`    | --                                        |
//!
//! Requests to the processing endpoint are SigV4-signed with credentials
//! from the default AWS provider chain unless `PROCESSING_API_TOKEN` is
//! set. A `.env` file in the working directory is loaded first. `RUST_LOG`
//! controls log verbosity.

use std::process::ExitCode;

use clap::Parser;
use featurize::args::Cli;
use featurize::commands;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "featurize=info,featurize_processing=info,featurize_cloud=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    tracing::debug!(region = %cli.region, command = ?cli.command, "Starting featurize");

    commands::run(cli).await
}
