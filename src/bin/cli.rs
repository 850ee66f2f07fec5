//! Sparkify warehouse CLI
//!
//! Local execution entry point. For AWS Lambda, use `dwh-lambda`.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use sparkify_dwh::{
    error::{AppError, Result},
    models::Config,
    pipeline::{Pipeline, RunMode},
    provision::{AwsControlPlane, Provisioner},
    storage::S3Preflight,
    warehouse::PgWarehouse,
};
use tokio_util::sync::CancellationToken;

/// dwh - Sparkify Redshift warehouse
#[derive(Parser, Debug)]
#[command(
    name = "dwh",
    version,
    about = "Provision a Redshift cluster and load the Sparkify star schema"
)]
struct Cli {
    /// Path to the configuration document
    #[arg(short, long, default_value = "dwh_config.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the IAM role and Redshift cluster, then save the endpoint
    Setup,

    /// Drop and recreate every table
    CreateTables,

    /// Load staging from S3 and populate the star schema
    Etl {
        /// Check that the S3 sources exist before loading
        #[arg(long)]
        preflight: bool,
    },

    /// Run the ETL, optionally provisioning a cluster and schema first
    Run {
        /// Set up the cluster and create the tables before the ETL
        #[arg(short = 'c', long)]
        create_cluster: bool,

        /// Check that the S3 sources exist before loading
        #[arg(long)]
        preflight: bool,
    },

    /// Delete the cluster, policy and role
    Cleanup,

    /// Validate the configuration document
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Cancel `token` on the first Ctrl-C.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, stopping after the current step");
            token.cancel();
        }
    });
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Provision and persist whatever was recorded, even if setup failed midway.
async fn setup(config: &mut Config, path: &Path, cancel: CancellationToken) -> Result<()> {
    config.validate_for_provision()?;
    let control = AwsControlPlane::from_region(&config.aws.region).await;
    let result = Provisioner::new(&control)
        .with_cancellation(cancel)
        .setup(config)
        .await;

    config.save(path)?;
    log::info!("Configuration saved to {}", path.display());

    let description = result?;
    print_json(&description)
}

async fn run_pipeline(
    config: &Config,
    mode: RunMode,
    preflight: bool,
    cancel: CancellationToken,
) -> Result<()> {
    mode.validate(config)?;
    let warehouse = PgWarehouse::connect(&config.cluster, config.pipeline.connect_timeout()).await?;
    log::info!("Running {:?} against {}", mode, warehouse.endpoint());
    let probe = if preflight {
        Some(S3Preflight::from_region(&config.aws.region).await)
    } else {
        None
    };

    let mut pipeline = Pipeline::new(config, &warehouse).with_cancellation(cancel);
    if let Some(probe) = &probe {
        pipeline = pipeline.with_probe(probe);
    }

    let result = pipeline.run(mode).await;
    print_json(pipeline.report())?;
    result
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("Sparkify warehouse tooling starting...");

    let mut config = Config::load(&cli.config)?;
    log::info!("Loaded configuration from {}", cli.config.display());

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    match cli.command {
        Command::Setup => {
            setup(&mut config, &cli.config, cancel).await?;
        }

        Command::CreateTables => {
            run_pipeline(&config, RunMode::SchemaOnly, false, cancel).await?;
        }

        Command::Etl { preflight } => {
            run_pipeline(&config, RunMode::EtlOnly, preflight, cancel).await?;
        }

        Command::Run {
            create_cluster,
            preflight,
        } => {
            let mode = if create_cluster {
                log::info!("Step 1/2: Setting up the cluster...");
                setup(&mut config, &cli.config, cancel.clone()).await?;
                log::info!("Step 2/2: Creating tables and running the ETL...");
                RunMode::Full
            } else {
                RunMode::EtlOnly
            };
            run_pipeline(&config, mode, preflight, cancel).await?;
        }

        Command::Cleanup => {
            config.validate_for_teardown()?;
            let control = AwsControlPlane::from_region(&config.aws.region).await;
            let report = Provisioner::new(&control).teardown(&config).await;
            print_json(&report)?;

            if !report.is_clean() {
                return Err(AppError::aws(
                    "cleanup",
                    format!("{} teardown step(s) failed", report.failed.len()),
                ));
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            match config.validate_for_etl() {
                Ok(()) => log::info!("✓ ETL keys OK"),
                Err(e) => {
                    log::error!("Config validation failed: {}", e);
                    return Err(e);
                }
            }
            let provision_ok = match config.validate_for_provision() {
                Ok(()) => {
                    log::info!("✓ Provisioning keys OK");
                    true
                }
                Err(e) => {
                    log::warn!("Provisioning is not configured: {}", e);
                    false
                }
            };

            if provision_ok {
                log::info!("All validations passed!");
            } else {
                log::info!("ETL keys valid; provisioning keys incomplete");
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
