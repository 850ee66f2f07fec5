// src/models/mod.rs

//! Domain models for the warehouse tooling.
//!
//! This module contains the configuration document, the warehouse table
//! catalogue and the behavioural options shared across pipeline stages.

mod config;
mod options;
mod table;

// Re-export all public types
pub use config::{
    AwsConfig, ClusterConfig, Config, IamRoleConfig, PipelineConfig, ProvisionConfig, S3Config,
};
pub use options::{DedupPolicy, Dialect, MatchStrategy};
pub use table::{Stage, Table};
