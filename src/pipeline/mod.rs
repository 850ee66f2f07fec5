//! ETL pipeline: schema, staging and transform stages behind a state machine.
//!
//! - `SchemaManager`: drop and recreate every table
//! - `StagingLoader`: COPY the S3 logs into the staging tables
//! - `TransformExecutor`: INSERT/SELECT into the star schema
//! - `Pipeline`: runs the stages in order and records a `RunReport`

mod lock;
mod report;
mod schema;
mod staging;
mod state;
mod transform;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Config, Stage};
use crate::sql::Statement;
use crate::storage::SourceProbe;
use crate::warehouse::Warehouse;

pub use lock::RunLock;
pub use report::{RunReport, StageProgress};
pub use schema::SchemaManager;
pub use staging::StagingLoader;
pub use state::PipelineState;
pub use transform::TransformExecutor;

/// Which stages a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Schema, staging, then transform.
    #[default]
    Full,
    /// Staging then transform, against tables that already exist.
    EtlOnly,
    /// Drop and recreate the tables only.
    SchemaOnly,
}

impl RunMode {
    /// The stage a run in this mode starts with.
    pub fn first_stage(self) -> Stage {
        match self {
            RunMode::EtlOnly => Stage::Staging,
            RunMode::Full | RunMode::SchemaOnly => Stage::Schema,
        }
    }

    /// Check the configuration keys this mode needs before connecting.
    pub fn validate(self, config: &Config) -> Result<()> {
        match self {
            RunMode::SchemaOnly => config.validate_for_connection(),
            RunMode::Full | RunMode::EtlOnly => config.validate_for_etl(),
        }
    }
}

/// One end-to-end run against an exclusively owned warehouse connection.
pub struct Pipeline<'a> {
    config: &'a Config,
    warehouse: &'a dyn Warehouse,
    probe: Option<&'a dyn SourceProbe>,
    cancel: CancellationToken,
    report: RunReport,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, warehouse: &'a dyn Warehouse) -> Self {
        Self {
            config,
            warehouse,
            probe: None,
            cancel: CancellationToken::new(),
            report: RunReport::new(),
        }
    }

    /// Abort between statements once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Check S3 sources before loading them.
    pub fn with_probe(mut self, probe: &'a dyn SourceProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn state(&self) -> &PipelineState {
        &self.report.state
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn into_report(self) -> RunReport {
        self.report
    }

    /// Run the stages `mode` selects.
    ///
    /// On failure the state becomes `Failed` with the stage that was running,
    /// and the error is returned. The report keeps the per-stage progress.
    pub async fn run(&mut self, mode: RunMode) -> Result<()> {
        let result = self.drive(mode).await;

        if let Err(e) = &result {
            let stage = match e {
                AppError::Statement { stage, .. } | AppError::Cancelled { stage } => *stage,
                _ if self.report.state == PipelineState::Init => mode.first_stage(),
                _ => self
                    .report
                    .state
                    .pending_stage()
                    .unwrap_or_else(|| mode.first_stage()),
            };
            log::error!("Pipeline failed in {} stage: {}", stage, e);
            self.report.state.fail(stage, e);
        }

        self.report.finished_at = Some(chrono::Utc::now());
        self.report.log_summary();
        result
    }

    /// Drop and recreate the tables without loading anything.
    pub async fn create_tables(&mut self) -> Result<()> {
        self.run(RunMode::SchemaOnly).await
    }

    async fn drive(&mut self, mode: RunMode) -> Result<()> {
        mode.validate(self.config)?;

        let _lock = match &self.config.pipeline.lock_file {
            Some(path) => {
                let lock = RunLock::acquire(path).await?;
                log::debug!("Holding run lock {}", lock.path().display());
                Some(lock)
            }
            None => None,
        };

        let mut report = std::mem::take(&mut self.report);
        let result = self.drive_stages(mode, &mut report).await;
        self.report = report;
        result
    }

    async fn drive_stages(&self, mode: RunMode, report: &mut RunReport) -> Result<()> {
        if mode == RunMode::EtlOnly {
            log::info!("Using existing schema");
            report.state.advance();
        } else {
            check_cancelled(&self.cancel, Stage::Schema)?;
            SchemaManager::new(self.config, self.warehouse, self.cancel.clone())
                .run(&mut report.schema)
                .await?;
            report.state.advance();
            if mode == RunMode::SchemaOnly {
                return Ok(());
            }
        }

        check_cancelled(&self.cancel, Stage::Staging)?;
        let mut loader = StagingLoader::new(self.config, self.warehouse, self.cancel.clone());
        if let Some(probe) = self.probe {
            loader = loader.with_probe(probe);
        }
        loader.run(report).await?;
        report.state.advance();

        check_cancelled(&self.cancel, Stage::Transform)?;
        TransformExecutor::new(self.config, self.warehouse, self.cancel.clone())
            .run(report)
            .await?;
        report.state.advance();

        // Transformed -> Done
        report.state.advance();
        Ok(())
    }
}

fn check_cancelled(cancel: &CancellationToken, stage: Stage) -> Result<()> {
    if cancel.is_cancelled() {
        Err(AppError::Cancelled { stage })
    } else {
        Ok(())
    }
}

/// Execute one statement, refusing to start it if the run was cancelled.
async fn run_statement(
    warehouse: &dyn Warehouse,
    statement: &Statement,
    cancel: &CancellationToken,
) -> Result<u64> {
    check_cancelled(cancel, statement.stage)?;
    log::debug!(
        "[{}] {} {}: {}",
        statement.stage,
        statement.kind,
        statement.table,
        statement.sql
    );
    warehouse
        .execute(&statement.sql)
        .await
        .map_err(|e| AppError::statement(statement.stage, statement.table, e))
}
