//! SQL statement registry.
//!
//! Every statement the pipeline issues is rendered here from the
//! configuration, in the order the stages execute them:
//!
//! - Schema: one `DROP TABLE IF EXISTS` per table, then one `CREATE TABLE`
//!   per table, both in [`Table::ALL`] order.
//! - Staging: `COPY` into `staging_events`, then into `staging_songs`.
//! - Transform: the `songplays` insert, then users, songs and artists, then
//!   optionally `times`, which reads from `songplays`.

pub mod staging;
pub mod tables;
pub mod transform;

use std::fmt;

use crate::error::Result;
use crate::models::{Config, Stage, Table};

pub use staging::{CopySource, JsonMapping, copy_statement};
pub use tables::{ColumnDef, ColumnType, TableDef, create_statement, definition, drop_statement};
pub use transform::{
    count_query, dimension_insert, play_events_query, songplays_insert, times_insert,
    unmatched_events_query,
};

/// Kind of statement, for logging and progress accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Drop,
    Create,
    Copy,
    Insert,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatementKind::Drop => "drop",
            StatementKind::Create => "create",
            StatementKind::Copy => "copy",
            StatementKind::Insert => "insert",
        })
    }
}

/// One rendered SQL statement and the table it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub stage: Stage,
    pub table: Table,
    pub kind: StatementKind,
    pub sql: String,
}

impl Statement {
    fn new(stage: Stage, table: Table, kind: StatementKind, sql: String) -> Self {
        Self {
            stage,
            table,
            kind,
            sql,
        }
    }
}

/// Ordered statements for the schema stage: all drops, then all creates.
pub fn schema_statements(config: &Config) -> Vec<Statement> {
    let dialect = config.pipeline.dialect;
    let drops = Table::ALL
        .iter()
        .map(|&t| Statement::new(Stage::Schema, t, StatementKind::Drop, drop_statement(t)));
    let creates = Table::ALL.iter().map(|&t| {
        Statement::new(
            Stage::Schema,
            t,
            StatementKind::Create,
            create_statement(t, dialect),
        )
    });
    drops.chain(creates).collect()
}

/// Ordered COPY statements for the staging stage.
pub fn load_statements(config: &Config) -> Result<Vec<Statement>> {
    Table::STAGING
        .iter()
        .filter_map(|&t| CopySource::for_table(t, config))
        .map(|source| {
            let sql = copy_statement(&source, config)?;
            Ok(Statement::new(
                Stage::Staging,
                source.table,
                StatementKind::Copy,
                sql,
            ))
        })
        .collect()
}

/// Transform statements grouped by their ordering constraints.
#[derive(Debug, Clone)]
pub struct TransformPlan {
    /// Fact insert. Needs both staging tables loaded.
    pub fact: Statement,
    /// Dimension inserts. Independent of each other and of the fact table.
    pub dimensions: Vec<Statement>,
    /// `times` insert. Needs `songplays` populated.
    pub time: Option<Statement>,
}

impl TransformPlan {
    pub fn new(config: &Config) -> Self {
        let pipeline = &config.pipeline;
        let fact = Statement::new(
            Stage::Transform,
            Table::Songplays,
            StatementKind::Insert,
            songplays_insert(pipeline.match_strategy),
        );
        let dimensions = Table::STAGED_DIMENSIONS
            .iter()
            .filter_map(|&t| {
                dimension_insert(t, pipeline.dedup)
                    .map(|sql| Statement::new(Stage::Transform, t, StatementKind::Insert, sql))
            })
            .collect();
        let time = pipeline.populate_time.then(|| {
            Statement::new(
                Stage::Transform,
                Table::Times,
                StatementKind::Insert,
                times_insert(),
            )
        });

        Self {
            fact,
            dimensions,
            time,
        }
    }

    /// Total number of insert statements in the plan.
    pub fn len(&self) -> usize {
        1 + self.dimensions.len() + usize::from(self.time.is_some())
    }

    /// Statements in serial execution order.
    pub fn iter(&self) -> impl Iterator<Item = &Statement> {
        std::iter::once(&self.fact)
            .chain(self.dimensions.iter())
            .chain(self.time.iter())
    }
}

/// Quote a string as a SQL literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
