//! AWS Lambda entry point for the Sparkify ETL
//!
//! Deploy with `cargo lambda build --release --features lambda`.
//! The configuration document is read from `DWH_CONFIG_PATH`.

use lambda_runtime::{Error as LambdaError, LambdaEvent, service_fn};
use serde::{Deserialize, Serialize};
use sparkify_dwh::{
    error::{AppError, Result},
    models::Config,
    pipeline::{Pipeline, PipelineState, RunMode, RunReport},
    warehouse::PgWarehouse,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONFIG_ENV: &str = "DWH_CONFIG_PATH";

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum InvocationMode {
    Full,
    #[default]
    Etl,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Request {
    mode: InvocationMode,
    /// Recreate the schema before an `etl` run
    create_tables: bool,
}

impl Request {
    fn run_mode(&self) -> RunMode {
        match (self.mode, self.create_tables) {
            (InvocationMode::Full, _) | (InvocationMode::Etl, true) => RunMode::Full,
            (InvocationMode::Etl, false) => RunMode::EtlOnly,
        }
    }
}

#[derive(Debug, Serialize)]
struct Response {
    success: bool,
    state: Option<PipelineState>,
    report: Option<RunReport>,
    error: Option<String>,
}

/// Main entry point for the AWS Lambda function.
#[tokio::main]
async fn main() -> std::result::Result<(), LambdaError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Sparkify ETL Lambda starting...");
    lambda_runtime::run(service_fn(handler)).await
}

/// Handler for AWS Lambda events.
async fn handler(event: LambdaEvent<Request>) -> std::result::Result<Response, LambdaError> {
    let mode = event.payload.run_mode();
    info!("Received invocation: {:?} -> {:?}", event.payload, mode);

    let (report, result) = match run_lambda_pipeline(mode).await {
        Ok((report, result)) => (Some(report), result),
        Err(e) => (None, Err(e)),
    };

    let response = match result {
        Ok(()) => {
            info!("Lambda execution successful");
            Response {
                success: true,
                state: report.as_ref().map(|r| r.state.clone()),
                report,
                error: None,
            }
        }
        Err(e) => {
            error!("Lambda execution failed: {}", e);
            Response {
                success: false,
                state: report.as_ref().map(|r| r.state.clone()),
                report,
                error: Some(e.to_string()),
            }
        }
    };
    Ok(response)
}

/// Outer error means the run never started; the inner result is the run's own.
async fn run_lambda_pipeline(mode: RunMode) -> Result<(RunReport, Result<()>)> {
    let path = std::env::var(CONFIG_ENV)
        .map_err(|_| AppError::config(format!("{CONFIG_ENV} is not set")))?;
    let config = Config::load(&path)?;
    mode.validate(&config)?;

    let warehouse =
        PgWarehouse::connect(&config.cluster, config.pipeline.connect_timeout()).await?;
    let mut pipeline = Pipeline::new(&config, &warehouse);
    let result = pipeline.run(mode).await;
    Ok((pipeline.into_report(), result))
}
