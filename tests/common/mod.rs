#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use sparkify_dwh::error::{AppError, Result};
use sparkify_dwh::models::Config;
use sparkify_dwh::warehouse::Warehouse;
use tokio_util::sync::CancellationToken;

/// Warehouse double that records every statement it is sent.
#[derive(Default)]
pub struct RecordingWarehouse {
    executed: Mutex<Vec<String>>,
    fail_on: Option<String>,
    cancel_after: Option<(usize, CancellationToken)>,
    scalars: Vec<(String, i64)>,
    rows_per_insert: u64,
    delay: Option<Duration>,
}

impl RecordingWarehouse {
    pub fn new() -> Self {
        Self {
            rows_per_insert: 3,
            ..Self::default()
        }
    }

    /// Fail the first statement containing `pattern`.
    pub fn failing_on(mut self, pattern: &str) -> Self {
        self.fail_on = Some(pattern.to_string());
        self
    }

    /// Cancel `token` once `n` statements have run.
    pub fn cancelling_after(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    /// Answer scalar queries containing `pattern` with `value`. Others return 0.
    pub fn with_scalar(mut self, pattern: &str, value: i64) -> Self {
        self.scalars.push((pattern.to_string(), value));
        self
    }

    /// Sleep before completing each statement.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    /// First line of each executed statement.
    pub fn heads(&self) -> Vec<String> {
        self.executed()
            .iter()
            .map(|sql| sql.lines().next().unwrap_or_default().to_string())
            .collect()
    }
}

#[async_trait]
impl Warehouse for RecordingWarehouse {
    async fn execute(&self, sql: &str) -> Result<u64> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let count = {
            let mut executed = self.executed.lock().unwrap();
            executed.push(sql.to_string());
            executed.len()
        };

        if let Some(pattern) = &self.fail_on {
            if sql.contains(pattern.as_str()) {
                return Err(AppError::connection("recording", "relation does not exist"));
            }
        }

        if let Some((n, token)) = &self.cancel_after {
            if count >= *n {
                token.cancel();
            }
        }

        Ok(if sql.starts_with("INSERT") {
            self.rows_per_insert
        } else {
            0
        })
    }

    async fn query_scalar(&self, sql: &str) -> Result<i64> {
        Ok(self
            .scalars
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map_or(0, |(_, value)| *value))
    }
}

/// A configuration that passes ETL validation.
pub fn etl_config() -> Config {
    let mut config = Config::default();
    config.cluster.host = "dwh.example.redshift.amazonaws.com".to_string();
    config.cluster.db_name = "sparkify".to_string();
    config.cluster.db_user = "dwhuser".to_string();
    config.cluster.db_password = "Passw0rd".to_string();
    config.cluster.db_port = Some(5439);
    config.s3.log_data = "s3://udacity-dend/log_data".to_string();
    config.s3.song_data = "s3://udacity-dend/song_data".to_string();
    config.s3.log_jsonpath = "s3://udacity-dend/log_json_path.json".to_string();
    config.aws.region = "us-west-2".to_string();
    config.iam_role.arn = "arn:aws:iam::123456789012:role/dwhRole".to_string();
    config
}
