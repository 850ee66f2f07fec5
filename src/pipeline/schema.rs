// src/pipeline/schema.rs

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::Config;
use crate::pipeline::{StageProgress, run_statement};
use crate::sql::{self, StatementKind};
use crate::warehouse::Warehouse;

/// Drops and recreates all seven tables.
///
/// Running it twice leaves the same empty tables behind: every drop is
/// `IF EXISTS` and every create follows its drop.
pub struct SchemaManager<'a> {
    config: &'a Config,
    warehouse: &'a dyn Warehouse,
    cancel: CancellationToken,
}

impl<'a> SchemaManager<'a> {
    pub fn new(config: &'a Config, warehouse: &'a dyn Warehouse, cancel: CancellationToken) -> Self {
        Self {
            config,
            warehouse,
            cancel,
        }
    }

    /// Execute all drops, then all creates, committing each one.
    ///
    /// Stops at the first failure. `progress.completed` is left at the
    /// number of statements that succeeded.
    pub async fn run(&self, progress: &mut StageProgress) -> Result<()> {
        let statements = sql::schema_statements(self.config);
        *progress = StageProgress::planned(statements.len());
        let drops = statements
            .iter()
            .filter(|s| s.kind == StatementKind::Drop)
            .count();

        for statement in &statements {
            run_statement(self.warehouse, statement, &self.cancel).await?;
            progress.completed += 1;
            if progress.completed == drops {
                log::info!("All tables dropped");
            }
        }

        log::info!("All tables created");
        Ok(())
    }
}
