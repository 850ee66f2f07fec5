//! Application configuration structures.
//!
//! The document keeps the upper-case section and key names of the
//! `dwh_config.json` file the provisioning scripts have always written, so an
//! existing file loads unchanged. Unknown top-level sections are preserved
//! across [`Config::save`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AppError, Result};
use crate::models::{DedupPolicy, Dialect, MatchStrategy};

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Cluster identity and database connection parameters
    #[serde(rename = "CLUSTER", default)]
    pub cluster: ClusterConfig,

    /// Object-storage source locations
    #[serde(rename = "S3", default)]
    pub s3: S3Config,

    #[serde(rename = "AWS", default)]
    pub aws: AwsConfig,

    /// Role the cluster assumes to read from S3
    #[serde(rename = "IAM_ROLE", default)]
    pub iam_role: IamRoleConfig,

    /// ETL behaviour
    #[serde(rename = "PIPELINE", default)]
    pub pipeline: PipelineConfig,

    /// Cluster provisioning behaviour
    #[serde(rename = "PROVISION", default)]
    pub provision: ProvisionConfig,

    /// Sections this crate does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Config {
    /// Load configuration from a JSON file, or TOML when the extension is `.toml`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        if is_toml {
            toml::from_str(content)
                .map_err(|e| AppError::config(format!("invalid TOML in {}: {e}", path.display())))
        } else {
            serde_json::from_str(content)
                .map_err(|e| AppError::config(format!("invalid JSON in {}: {e}", path.display())))
        }
    }

    /// Write the configuration back as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Check the five keys a warehouse connection needs.
    pub fn validate_for_connection(&self) -> Result<()> {
        report_missing(self.cluster.missing_connection_keys())
    }

    /// Check the keys the ETL needs: a connection and COPY parameters.
    pub fn validate_for_etl(&self) -> Result<()> {
        let mut missing = self.cluster.missing_connection_keys();
        missing.extend(self.s3.missing_keys());
        require(&mut missing, "IAM_ROLE.ARN", &self.iam_role.arn);
        require(&mut missing, "AWS.REGION", &self.aws.region);
        self.pipeline.validate()?;
        report_missing(missing)
    }

    /// Check the keys the control plane needs to create or delete a cluster.
    pub fn validate_for_provision(&self) -> Result<()> {
        let mut missing = Vec::new();
        require(&mut missing, "AWS.REGION", &self.aws.region);
        require(&mut missing, "CLUSTER.IDENTIFIER", &self.cluster.identifier);
        require(&mut missing, "CLUSTER.CLUSTER_TYPE", &self.cluster.cluster_type);
        require(&mut missing, "CLUSTER.NODE_TYPE", &self.cluster.node_type);
        require(&mut missing, "CLUSTER.DB_NAME", &self.cluster.db_name);
        require(&mut missing, "CLUSTER.DB_USER", &self.cluster.db_user);
        require(&mut missing, "CLUSTER.DB_PASSWORD", &self.cluster.db_password);
        if self.cluster.db_port.is_none() {
            missing.push("CLUSTER.DB_PORT");
        }
        require(&mut missing, "IAM_ROLE.NAME", &self.iam_role.name);
        require(&mut missing, "IAM_ROLE.POLICY_NAME", &self.iam_role.policy_name);
        if self.iam_role.trust_policy.is_none() {
            missing.push("IAM_ROLE.TRUST_POLICY");
        }
        if self.iam_role.managed_policy.is_none() {
            missing.push("IAM_ROLE.MANAGED_POLICY");
        }
        if self.provision.poll_timeout_secs == 0 {
            return Err(AppError::config("PROVISION.POLL_TIMEOUT_SECS must be > 0"));
        }
        report_missing(missing)
    }

    /// Check the keys teardown needs to find what setup created.
    pub fn validate_for_teardown(&self) -> Result<()> {
        let mut missing = Vec::new();
        require(&mut missing, "AWS.REGION", &self.aws.region);
        require(&mut missing, "CLUSTER.IDENTIFIER", &self.cluster.identifier);
        require(&mut missing, "IAM_ROLE.NAME", &self.iam_role.name);
        report_missing(missing)
    }
}

fn require(missing: &mut Vec<&'static str>, key: &'static str, value: &str) {
    if value.trim().is_empty() {
        missing.push(key);
    }
}

fn report_missing(missing: Vec<&'static str>) -> Result<()> {
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::config(format!(
            "missing required keys: {}",
            missing.join(", ")
        )))
    }
}

/// `CLUSTER` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ClusterConfig {
    /// Endpoint address, filled in by provisioning
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub db_name: String,

    #[serde(default)]
    pub db_user: String,

    #[serde(default)]
    pub db_password: String,

    #[serde(default, deserialize_with = "lenient::number_or_string")]
    pub db_port: Option<u16>,

    /// Redshift cluster identifier
    #[serde(default)]
    pub identifier: String,

    /// `single-node` or `multi-node`
    #[serde(default)]
    pub cluster_type: String,

    #[serde(default)]
    pub node_type: String,

    #[serde(default, deserialize_with = "lenient::number_or_string")]
    pub num_nodes: Option<u32>,
}

impl ClusterConfig {
    fn missing_connection_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        require(&mut missing, "CLUSTER.HOST", &self.host);
        require(&mut missing, "CLUSTER.DB_NAME", &self.db_name);
        require(&mut missing, "CLUSTER.DB_USER", &self.db_user);
        require(&mut missing, "CLUSTER.DB_PASSWORD", &self.db_password);
        if self.db_port.is_none() {
            missing.push("CLUSTER.DB_PORT");
        }
        missing
    }

    /// Port, or Redshift's default when unset.
    pub fn port(&self) -> u16 {
        self.db_port.unwrap_or(5439)
    }

    /// libpq-style connection string built from the five connection keys.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} dbname={} user={} password={} port={}",
            self.host,
            self.db_name,
            self.db_user,
            self.db_password,
            self.port()
        )
    }

    /// Connection string with the password masked, safe for logs.
    pub fn redacted(&self) -> String {
        format!(
            "host={} dbname={} user={} password=*** port={}",
            self.host,
            self.db_name,
            self.db_user,
            self.port()
        )
    }

    /// `host:port` label used in connection errors.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port())
    }
}

/// `S3` section: newline-delimited JSON sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct S3Config {
    /// Event log prefix, e.g. `s3://udacity-dend/log_data`
    #[serde(default)]
    pub log_data: String,

    /// Song metadata prefix
    #[serde(default)]
    pub song_data: String,

    /// JSONPaths document mapping log fields to `staging_events` columns
    #[serde(default)]
    pub log_jsonpath: String,
}

impl S3Config {
    fn missing_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        require(&mut missing, "S3.LOG_DATA", &self.log_data);
        require(&mut missing, "S3.SONG_DATA", &self.song_data);
        require(&mut missing, "S3.LOG_JSONPATH", &self.log_jsonpath);
        missing
    }
}

/// `AWS` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AwsConfig {
    #[serde(default)]
    pub region: String,
}

/// `IAM_ROLE` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct IamRoleConfig {
    #[serde(default)]
    pub name: String,

    /// Role ARN, filled in by provisioning
    #[serde(default)]
    pub arn: String,

    #[serde(default)]
    pub policy_name: String,

    /// Managed policy ARN, filled in by provisioning
    #[serde(default)]
    pub policy_arn: String,

    /// Assume-role policy document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_policy: Option<Value>,

    /// Permissions attached to the role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_policy: Option<Value>,
}

/// `PIPELINE` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PipelineConfig {
    #[serde(default)]
    pub dialect: Dialect,

    #[serde(default)]
    pub match_strategy: MatchStrategy,

    #[serde(default)]
    pub dedup: DedupPolicy,

    /// Run the users/songs/artists inserts concurrently
    #[serde(default)]
    pub concurrent_dimensions: bool,

    /// Populate the `times` dimension from `songplays`
    #[serde(default)]
    pub populate_time: bool,

    /// Rows a COPY may reject before the load fails
    #[serde(default)]
    pub max_load_errors: u32,

    /// Lock file serializing runs on this host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_file: Option<PathBuf>,

    #[serde(default = "defaults::connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl PipelineConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.connect_timeout_secs == 0 {
            return Err(AppError::config("PIPELINE.CONNECT_TIMEOUT_SECS must be > 0"));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            match_strategy: MatchStrategy::default(),
            dedup: DedupPolicy::default(),
            concurrent_dimensions: false,
            populate_time: false,
            max_load_errors: 0,
            lock_file: None,
            connect_timeout_secs: defaults::connect_timeout(),
        }
    }
}

/// `PROVISION` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ProvisionConfig {
    /// Delay between cluster status polls
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_secs: u64,

    /// Give up waiting for `available` after this long
    #[serde(default = "defaults::poll_timeout")]
    pub poll_timeout_secs: u64,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: defaults::poll_interval(),
            poll_timeout_secs: defaults::poll_timeout(),
        }
    }
}

mod defaults {
    pub fn connect_timeout() -> u64 {
        30
    }
    pub fn poll_interval() -> u64 {
        30
    }
    pub fn poll_timeout() -> u64 {
        60 * 6
    }
}

/// The config file has historically stored numbers as strings.
mod lenient {
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::Deserialize;
    use serde::de::{Deserializer, Error};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    pub fn number_or_string<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr + TryFrom<u64>,
        <T as FromStr>::Err: Display,
        <T as TryFrom<u64>>::Error: Display,
    {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Number(n)) => T::try_from(n).map(Some).map_err(D::Error::custom),
            Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
            Some(Raw::Text(s)) => s.trim().parse().map(Some).map_err(D::Error::custom),
        }
    }
}
