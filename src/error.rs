// src/error.rs

//! Unified error handling for the warehouse tooling.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::models::{Stage, Table};

/// Result type alias for warehouse operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Warehouse or object storage could not be reached
    #[error("Connection error for {target}: {message}")]
    Connection { target: String, message: String },

    /// A SQL statement failed
    #[error("Statement failed in {stage} stage on table {table}: {message}")]
    Statement {
        stage: Stage,
        table: Table,
        message: String,
    },

    /// An AWS control-plane call failed
    #[error("AWS {operation} failed: {message}")]
    Aws { operation: String, message: String },

    /// Waiting on an external system ran out of time
    #[error("Timed out after {waited_secs}s waiting for {what}")]
    Timeout { what: String, waited_secs: u64 },

    /// The run was cancelled between statements
    #[error("Run cancelled before completing the {stage} stage")]
    Cancelled { stage: Stage },

    /// Another run holds the run lock
    #[error("Another run holds the lock at {}", .0.display())]
    Locked(PathBuf),

    /// A query returned something other than what the caller expected
    #[error("Unexpected result from {query}: {message}")]
    UnexpectedResult { query: String, message: String },

    /// Database driver error
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error naming the unreachable target.
    pub fn connection(target: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Connection {
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// Create a statement error naming the failing stage and table.
    pub fn statement(stage: Stage, table: Table, message: impl fmt::Display) -> Self {
        Self::Statement {
            stage,
            table,
            message: message.to_string(),
        }
    }

    /// Create an AWS control-plane error.
    pub fn aws(operation: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Aws {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error was produced by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
