// src/sql/staging.rs

//! Bulk-load statements for the staging tables.

use crate::error::{AppError, Result};
use crate::models::{Config, Dialect, Table};

use super::quote_literal;

/// How JSON fields map onto staging columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonMapping<'a> {
    /// Explicit JSONPaths document at the given S3 path.
    JsonPaths(&'a str),
    /// Match JSON keys to column names.
    Auto,
}

/// A staging load: which table, from where, and how fields map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopySource<'a> {
    pub table: Table,
    pub path: &'a str,
    pub mapping: JsonMapping<'a>,
}

impl<'a> CopySource<'a> {
    /// Source for a staging table. Event logs need a JSONPaths document because
    /// their field names (`userId`, `sessionId`, ...) differ from the columns.
    pub fn for_table(table: Table, config: &'a Config) -> Option<Self> {
        match table {
            Table::StagingEvents => Some(Self {
                table,
                path: &config.s3.log_data,
                mapping: JsonMapping::JsonPaths(&config.s3.log_jsonpath),
            }),
            Table::StagingSongs => Some(Self {
                table,
                path: &config.s3.song_data,
                mapping: JsonMapping::Auto,
            }),
            _ => None,
        }
    }
}

/// Render the COPY statement for `source`.
///
/// Loads authenticate with the cluster's IAM role rather than embedded keys.
pub fn copy_statement(source: &CopySource<'_>, config: &Config) -> Result<String> {
    if config.pipeline.dialect != Dialect::Redshift {
        return Err(AppError::config(format!(
            "loading {} from {} requires the redshift dialect",
            source.table, source.path
        )));
    }

    let format = match source.mapping {
        JsonMapping::JsonPaths(path) => quote_literal(path),
        JsonMapping::Auto => quote_literal("auto"),
    };

    let mut sql = format!(
        "COPY {} FROM {}\nCREDENTIALS {}\nFORMAT AS JSON {}\nREGION {}\nTRUNCATECOLUMNS BLANKSASNULL EMPTYASNULL",
        source.table.name(),
        quote_literal(source.path),
        quote_literal(&format!("aws_iam_role={}", config.iam_role.arn)),
        format,
        quote_literal(&config.aws.region),
    );
    if config.pipeline.max_load_errors > 0 {
        sql.push_str(&format!("\nMAXERROR {}", config.pipeline.max_load_errors));
    }
    sql.push(';');
    Ok(sql)
}
