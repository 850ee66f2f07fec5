// src/pipeline/transform.rs

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{Config, Table};
use crate::pipeline::{RunReport, StageProgress, run_statement};
use crate::sql::{self, Statement, TransformPlan};
use crate::warehouse::Warehouse;

/// Populates the fact and dimension tables from staging.
pub struct TransformExecutor<'a> {
    config: &'a Config,
    warehouse: &'a dyn Warehouse,
    cancel: CancellationToken,
}

impl<'a> TransformExecutor<'a> {
    pub fn new(config: &'a Config, warehouse: &'a dyn Warehouse, cancel: CancellationToken) -> Self {
        Self {
            config,
            warehouse,
            cancel,
        }
    }

    /// Run the fact insert, the dimension inserts, then the optional `times`
    /// insert, and finally record row counts and unmatched events.
    ///
    /// Each table is written by exactly one statement, so running the
    /// dimension inserts concurrently never puts two writers on one table.
    pub async fn run(&self, report: &mut RunReport) -> Result<()> {
        let plan = TransformPlan::new(self.config);
        report.transform = StageProgress::planned(plan.len());

        self.insert(&plan.fact, report).await?;

        if self.config.pipeline.concurrent_dimensions {
            self.insert_concurrently(&plan.dimensions, report).await?;
        } else {
            for statement in &plan.dimensions {
                self.insert(statement, report).await?;
            }
        }

        if let Some(statement) = &plan.time {
            self.insert(statement, report).await?;
        }

        log::info!("Loaded the production tables");
        self.collect_diagnostics(&plan, report).await;
        Ok(())
    }

    async fn insert(&self, statement: &Statement, report: &mut RunReport) -> Result<()> {
        let rows = run_statement(self.warehouse, statement, &self.cancel).await?;
        Self::record(statement.table, rows, report);
        Ok(())
    }

    async fn insert_concurrently(
        &self,
        statements: &[Statement],
        report: &mut RunReport,
    ) -> Result<()> {
        let results = join_all(
            statements
                .iter()
                .map(|s| run_statement(self.warehouse, s, &self.cancel)),
        )
        .await;

        // Credit every insert that landed before surfacing the first failure.
        let mut first_error = None;
        for (statement, result) in statements.iter().zip(results) {
            match result {
                Ok(rows) => Self::record(statement.table, rows, report),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn record(table: Table, rows: u64, report: &mut RunReport) {
        log::info!("Inserted {} rows into {}", rows, table);
        report.rows_inserted.insert(table, rows);
        report.transform.completed += 1;
    }

    /// Row counts are diagnostics only; a failing count is logged, not raised.
    async fn collect_diagnostics(&self, plan: &TransformPlan, report: &mut RunReport) {
        for statement in plan.iter() {
            match self
                .warehouse
                .query_scalar(&sql::count_query(statement.table))
                .await
            {
                Ok(rows) => {
                    report.row_counts.insert(statement.table, rows);
                }
                Err(e) => log::warn!("Could not count rows in {}: {}", statement.table, e),
            }
        }

        let strategy = self.config.pipeline.match_strategy;
        let plays = self.warehouse.query_scalar(&sql::play_events_query()).await;
        let unmatched = self
            .warehouse
            .query_scalar(&sql::unmatched_events_query(strategy))
            .await;

        match (plays, unmatched) {
            (Ok(plays), Ok(unmatched)) => {
                report.play_events = Some(plays);
                report.unmatched_events = Some(unmatched);
                if unmatched > 0 {
                    log::warn!(
                        "{} of {} play events matched no song under {:?} and were left out of songplays",
                        unmatched,
                        plays,
                        strategy
                    );
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                log::warn!("Could not measure unmatched play events: {}", e);
            }
        }
    }
}
