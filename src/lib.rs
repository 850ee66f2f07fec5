// src/lib.rs

//! Sparkify warehouse library: cluster provisioning and the S3-to-Redshift ETL.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod provision;
pub mod sql;
pub mod storage;
pub mod utils;
pub mod warehouse;
