// src/pipeline/staging.rs

use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Config, Stage};
use crate::pipeline::{RunReport, StageProgress, check_cancelled, run_statement};
use crate::sql::{self, CopySource, JsonMapping};
use crate::storage::SourceProbe;
use crate::warehouse::Warehouse;

/// Bulk-loads the two staging tables from object storage.
pub struct StagingLoader<'a> {
    config: &'a Config,
    warehouse: &'a dyn Warehouse,
    probe: Option<&'a dyn SourceProbe>,
    cancel: CancellationToken,
}

impl<'a> StagingLoader<'a> {
    pub fn new(config: &'a Config, warehouse: &'a dyn Warehouse, cancel: CancellationToken) -> Self {
        Self {
            config,
            warehouse,
            probe: None,
            cancel,
        }
    }

    /// Verify each source before issuing its COPY.
    pub fn with_probe(mut self, probe: &'a dyn SourceProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Load `staging_events`, then `staging_songs`.
    ///
    /// Row counts land in `report.row_counts`. A failing COPY is reported
    /// with the S3 path it was reading from.
    pub async fn run(&self, report: &mut RunReport) -> Result<()> {
        let statements = sql::load_statements(self.config)?;
        report.staging = StageProgress::planned(statements.len());

        for statement in &statements {
            let Some(source) = CopySource::for_table(statement.table, self.config) else {
                continue;
            };

            if let Some(probe) = self.probe {
                check_cancelled(&self.cancel, Stage::Staging)?;
                self.verify_source(probe, &source).await?;
            }

            log::info!("Loading {} from {}", source.table, source.path);
            run_statement(self.warehouse, statement, &self.cancel)
                .await
                .map_err(|e| match e {
                    AppError::Statement {
                        stage,
                        table,
                        message,
                    } => AppError::Statement {
                        stage,
                        table,
                        message: format!("loading from {}: {}", source.path, message),
                    },
                    other => other,
                })?;
            report.staging.completed += 1;

            let count = self
                .warehouse
                .query_scalar(&sql::count_query(source.table))
                .await;
            match count {
                Ok(rows) => {
                    log::info!("Loaded {} rows into {}", rows, source.table);
                    report.row_counts.insert(source.table, rows);
                }
                Err(e) => log::warn!("Could not count rows in {}: {}", source.table, e),
            }
        }

        log::info!("Loaded the staging tables");
        Ok(())
    }

    async fn verify_source(&self, probe: &dyn SourceProbe, source: &CopySource<'_>) -> Result<()> {
        probe.verify_prefix(source.path).await?;
        if let JsonMapping::JsonPaths(path) = source.mapping {
            probe.verify_object(path).await?;
        }
        Ok(())
    }
}
