//! PostgreSQL wire-protocol warehouse client.
//!
//! Redshift accepts the simple-query protocol, so every statement goes out
//! as plain text and runs in its own implicit transaction.

use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};

use crate::error::{AppError, Result};
use crate::models::ClusterConfig;
use crate::warehouse::Warehouse;

/// Warehouse backed by a single `tokio-postgres` connection.
pub struct PgWarehouse {
    client: Client,
    driver: JoinHandle<()>,
    endpoint: String,
}

impl PgWarehouse {
    /// Open a connection using the five `CLUSTER` connection keys.
    pub async fn connect(cluster: &ClusterConfig, timeout: Duration) -> Result<Self> {
        let endpoint = cluster.endpoint();
        log::info!("Connecting to warehouse: {}", cluster.redacted());

        let mut pg = tokio_postgres::Config::new();
        pg.host(&cluster.host)
            .port(cluster.port())
            .dbname(&cluster.db_name)
            .user(&cluster.db_user)
            .password(&cluster.db_password)
            .connect_timeout(timeout);

        let (client, connection) = pg
            .connect(NoTls)
            .await
            .map_err(|e| AppError::connection(&endpoint, e))?;

        let driver_endpoint = endpoint.clone();
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::error!("Warehouse connection to {} closed: {}", driver_endpoint, e);
            }
        });

        log::info!("Connected to {}", endpoint);
        Ok(Self {
            client,
            driver,
            endpoint,
        })
    }

    /// `host:port` of the connected warehouse.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn execute(&self, sql: &str) -> Result<u64> {
        let messages = self.client.simple_query(sql).await?;
        Ok(rows_affected(&messages))
    }

    async fn query_scalar(&self, sql: &str) -> Result<i64> {
        let messages = self.client.simple_query(sql).await?;
        let unexpected = |message: &str| AppError::UnexpectedResult {
            query: sql.to_string(),
            message: message.to_string(),
        };

        let row = messages
            .iter()
            .find_map(|m| match m {
                SimpleQueryMessage::Row(row) => Some(row),
                _ => None,
            })
            .ok_or_else(|| unexpected("no rows returned"))?;

        let value = row
            .get(0)
            .ok_or_else(|| unexpected("first column is NULL"))?;
        value
            .trim()
            .parse()
            .map_err(|e| unexpected(&format!("'{value}' is not an integer: {e}")))
    }
}

impl Drop for PgWarehouse {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

fn rows_affected(messages: &[SimpleQueryMessage]) -> u64 {
    messages
        .iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::CommandComplete(n) => Some(*n),
            _ => None,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_command_completions() {
        let messages = vec![
            SimpleQueryMessage::CommandComplete(3),
            SimpleQueryMessage::CommandComplete(4),
        ];
        assert_eq!(rows_affected(&messages), 7);
        assert_eq!(rows_affected(&[]), 0);
    }

    #[tokio::test]
    async fn unreachable_host_is_connection_error() {
        let cluster = ClusterConfig {
            host: "127.0.0.1".to_string(),
            db_name: "dev".to_string(),
            db_user: "etl".to_string(),
            db_password: "secret".to_string(),
            db_port: Some(1),
            ..ClusterConfig::default()
        };

        let err = PgWarehouse::connect(&cluster, Duration::from_secs(2))
            .await
            .err()
            .unwrap();
        match err {
            AppError::Connection { target, .. } => assert_eq!(target, "127.0.0.1:1"),
            other => panic!("expected connection error, got {other}"),
        }
    }
}
