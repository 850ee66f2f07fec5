//! Cluster provisioning and teardown.
//!
//! Setup creates the IAM role the cluster uses to read S3, attaches the
//! managed policy, launches the cluster and waits for it to come up.
//! Teardown reverses those steps. Both are linear sequences of control-plane
//! calls; the only waiting is the availability poll.

mod aws;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Config, Stage};

pub use aws::AwsControlPlane;

/// Parameters for launching a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSpec {
    pub identifier: String,
    pub db_name: String,
    pub cluster_type: String,
    pub node_type: String,
    pub master_username: String,
    pub master_password: String,
    pub port: u16,
    /// Only sent for multi-node clusters.
    pub num_nodes: Option<u32>,
    pub role_arn: String,
}

impl ClusterSpec {
    pub fn from_config(config: &Config, role_arn: impl Into<String>) -> Self {
        let cluster = &config.cluster;
        Self {
            identifier: cluster.identifier.clone(),
            db_name: cluster.db_name.clone(),
            cluster_type: cluster.cluster_type.clone(),
            node_type: cluster.node_type.clone(),
            master_username: cluster.db_user.clone(),
            master_password: cluster.db_password.clone(),
            port: cluster.port(),
            num_nodes: cluster
                .num_nodes
                .filter(|_| cluster.cluster_type.eq_ignore_ascii_case("multi-node")),
            role_arn: role_arn.into(),
        }
    }
}

/// What `describe_clusters` reports for one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterDescription {
    pub status: String,
    pub address: Option<String>,
    pub port: Option<u16>,
}

impl ClusterDescription {
    pub fn is_available(&self) -> bool {
        self.status == "available"
    }
}

/// The IAM and Redshift operations provisioning needs.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Create a role and return its ARN.
    async fn create_role(&self, name: &str, trust_policy: &str) -> Result<String>;

    /// Create a managed policy and return its ARN.
    async fn create_policy(&self, name: &str, document: &str) -> Result<String>;

    async fn attach_role_policy(&self, role: &str, policy_arn: &str) -> Result<()>;

    async fn get_role_arn(&self, role: &str) -> Result<String>;

    async fn create_cluster(&self, spec: &ClusterSpec) -> Result<()>;

    async fn describe_cluster(&self, identifier: &str) -> Result<ClusterDescription>;

    /// Delete without a final snapshot.
    async fn delete_cluster(&self, identifier: &str) -> Result<()>;

    async fn detach_role_policy(&self, role: &str, policy_arn: &str) -> Result<()>;

    async fn delete_policy(&self, policy_arn: &str) -> Result<()>;

    async fn delete_role(&self, role: &str) -> Result<()>;
}

/// A teardown step that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedStep {
    pub operation: &'static str,
    pub error: String,
}

/// Outcome of a best-effort teardown.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TeardownReport {
    pub completed: Vec<&'static str>,
    pub failed: Vec<FailedStep>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, operation: &'static str, result: Result<()>) {
        match result {
            Ok(()) => {
                log::info!("{} succeeded", operation);
                self.completed.push(operation);
            }
            Err(e) => {
                log::warn!("{} failed: {}", operation, e);
                self.failed.push(FailedStep {
                    operation,
                    error: e.to_string(),
                });
            }
        }
    }
}

/// Drives setup and teardown against a control plane.
pub struct Provisioner<'a> {
    control: &'a dyn ControlPlane,
    cancel: CancellationToken,
}

impl<'a> Provisioner<'a> {
    pub fn new(control: &'a dyn ControlPlane) -> Self {
        Self {
            control,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Create role, policy and cluster, then wait for the cluster.
    ///
    /// ARNs and the endpoint are written into `config` as soon as they are
    /// known, so the caller can persist them even when a later step fails
    /// and cleanup still has something to delete.
    pub async fn setup(&self, config: &mut Config) -> Result<ClusterDescription> {
        config.validate_for_provision()?;

        let role = config.iam_role.name.clone();
        let trust_policy = policy_document(&config.iam_role.trust_policy, "TRUST_POLICY")?;
        let managed_policy = policy_document(&config.iam_role.managed_policy, "MANAGED_POLICY")?;

        log::info!("Creating IAM Role: {}", role);
        self.control.create_role(&role, &trust_policy).await?;

        log::info!("Creating managed policy: {}", config.iam_role.policy_name);
        let policy_arn = self
            .control
            .create_policy(&config.iam_role.policy_name, &managed_policy)
            .await?;
        config.iam_role.policy_arn = policy_arn.clone();

        log::info!(
            "Attaching policy: {} to IAM Role {}",
            config.iam_role.policy_name,
            role
        );
        self.control.attach_role_policy(&role, &policy_arn).await?;

        let role_arn = self.control.get_role_arn(&role).await?;
        config.iam_role.arn = role_arn.clone();

        log::info!("Creating Redshift Cluster: {}", config.cluster.identifier);
        let spec = ClusterSpec::from_config(config, role_arn);
        self.control.create_cluster(&spec).await?;

        let description = self.wait_until_available(config).await?;
        if let Some(address) = &description.address {
            config.cluster.host = address.clone();
        }
        if let Some(port) = description.port {
            config.cluster.db_port = Some(port);
        }

        log::info!("Cluster {} is now live!", config.cluster.identifier);
        Ok(description)
    }

    /// Poll until the cluster reports `available` or the timeout passes.
    pub async fn wait_until_available(&self, config: &Config) -> Result<ClusterDescription> {
        let identifier = &config.cluster.identifier;
        let interval = Duration::from_secs(config.provision.poll_interval_secs);
        let timeout = Duration::from_secs(config.provision.poll_timeout_secs);
        let deadline = Instant::now() + timeout;

        log::info!("Waiting for cluster {} to become live", identifier);
        loop {
            if Instant::now() >= deadline {
                log::error!(
                    "Cluster response has timed out. Run cleanup to remove partial resources."
                );
                return Err(AppError::Timeout {
                    what: format!("cluster {identifier} to become available"),
                    waited_secs: timeout.as_secs(),
                });
            }

            let description = self.control.describe_cluster(identifier).await?;
            if description.is_available() {
                return Ok(description);
            }
            log::info!("Cluster {} status: {}", identifier, description.status);

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(AppError::Cancelled { stage: Stage::Provision });
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// Delete cluster, detach and delete policy, delete role.
    ///
    /// Every step is attempted even if an earlier one failed.
    pub async fn teardown(&self, config: &Config) -> TeardownReport {
        let mut report = TeardownReport::default();
        let role = &config.iam_role.name;
        let policy_arn = &config.iam_role.policy_arn;

        log::info!("Deleting Redshift Cluster: {}", config.cluster.identifier);
        report.record(
            "delete_cluster",
            self.control.delete_cluster(&config.cluster.identifier).await,
        );

        if policy_arn.is_empty() {
            let missing = || Err(AppError::config("IAM_ROLE.POLICY_ARN is not recorded"));
            report.record("detach_role_policy", missing());
            report.record("delete_policy", missing());
        } else {
            log::info!("Detaching policy: {}", config.iam_role.policy_name);
            report.record(
                "detach_role_policy",
                self.control.detach_role_policy(role, policy_arn).await,
            );
            log::info!("Deleting policy: {}", config.iam_role.policy_name);
            report.record("delete_policy", self.control.delete_policy(policy_arn).await);
        }

        log::info!("Deleting IAM Role: {}", role);
        report.record("delete_role", self.control.delete_role(role).await);

        report
    }
}

fn policy_document(value: &Option<serde_json::Value>, key: &str) -> Result<String> {
    let value = value
        .as_ref()
        .ok_or_else(|| AppError::config(format!("IAM_ROLE.{key} is missing")))?;
    Ok(serde_json::to_string(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeControlPlane {
        calls: Mutex<Vec<String>>,
        statuses: Mutex<VecDeque<&'static str>>,
        fail: Option<&'static str>,
    }

    impl FakeControlPlane {
        fn with_statuses(statuses: &[&'static str]) -> Self {
            Self {
                statuses: Mutex::new(statuses.iter().copied().collect()),
                ..Self::default()
            }
        }

        fn failing(mut self, operation: &'static str) -> Self {
            self.fail = Some(operation);
            self
        }

        fn call(&self, operation: &'static str) -> Result<()> {
            self.calls.lock().unwrap().push(operation.to_string());
            if self.fail == Some(operation) {
                return Err(AppError::aws(operation, "AccessDenied"));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ControlPlane for FakeControlPlane {
        async fn create_role(&self, name: &str, _trust_policy: &str) -> Result<String> {
            self.call("create_role")?;
            Ok(format!("arn:aws:iam::123456789012:role/{name}"))
        }

        async fn create_policy(&self, name: &str, _document: &str) -> Result<String> {
            self.call("create_policy")?;
            Ok(format!("arn:aws:iam::123456789012:policy/{name}"))
        }

        async fn attach_role_policy(&self, _role: &str, _policy_arn: &str) -> Result<()> {
            self.call("attach_role_policy")
        }

        async fn get_role_arn(&self, role: &str) -> Result<String> {
            self.call("get_role_arn")?;
            Ok(format!("arn:aws:iam::123456789012:role/{role}"))
        }

        async fn create_cluster(&self, _spec: &ClusterSpec) -> Result<()> {
            self.call("create_cluster")
        }

        async fn describe_cluster(&self, _identifier: &str) -> Result<ClusterDescription> {
            self.call("describe_cluster")?;
            let status = self
                .statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or("creating");
            let available = status == "available";
            Ok(ClusterDescription {
                status: status.to_string(),
                address: available.then(|| "dwh.example.redshift.amazonaws.com".to_string()),
                port: available.then_some(5439),
            })
        }

        async fn delete_cluster(&self, _identifier: &str) -> Result<()> {
            self.call("delete_cluster")
        }

        async fn detach_role_policy(&self, _role: &str, _policy_arn: &str) -> Result<()> {
            self.call("detach_role_policy")
        }

        async fn delete_policy(&self, _policy_arn: &str) -> Result<()> {
            self.call("delete_policy")
        }

        async fn delete_role(&self, _role: &str) -> Result<()> {
            self.call("delete_role")
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.aws.region = "us-west-2".to_string();
        config.cluster.identifier = "dwhCluster".to_string();
        config.cluster.cluster_type = "multi-node".to_string();
        config.cluster.node_type = "dc2.large".to_string();
        config.cluster.num_nodes = Some(4);
        config.cluster.db_name = "sparkify".to_string();
        config.cluster.db_user = "dwhuser".to_string();
        config.cluster.db_password = "Passw0rd".to_string();
        config.cluster.db_port = Some(5439);
        config.iam_role.name = "dwhRole".to_string();
        config.iam_role.policy_name = "dwhS3ReadOnly".to_string();
        config.iam_role.trust_policy = Some(serde_json::json!({ "Version": "2012-10-17" }));
        config.iam_role.managed_policy = Some(serde_json::json!({ "Version": "2012-10-17" }));
        config
    }

    #[tokio::test(start_paused = true)]
    async fn setup_records_arns_and_endpoint() {
        let control = FakeControlPlane::with_statuses(&["creating", "creating", "available"]);
        let mut config = config();

        let description = Provisioner::new(&control).setup(&mut config).await.unwrap();

        assert!(description.is_available());
        assert_eq!(config.cluster.host, "dwh.example.redshift.amazonaws.com");
        assert_eq!(config.iam_role.arn, "arn:aws:iam::123456789012:role/dwhRole");
        assert_eq!(
            config.iam_role.policy_arn,
            "arn:aws:iam::123456789012:policy/dwhS3ReadOnly"
        );
        assert_eq!(
            control.calls(),
            vec![
                "create_role",
                "create_policy",
                "attach_role_policy",
                "get_role_arn",
                "create_cluster",
                "describe_cluster",
                "describe_cluster",
                "describe_cluster",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn policy_arn_is_kept_when_a_later_step_fails() {
        let control = FakeControlPlane::default().failing("create_cluster");
        let mut config = config();

        let err = Provisioner::new(&control).setup(&mut config).await.unwrap_err();

        assert!(matches!(err, AppError::Aws { .. }));
        assert!(!config.iam_role.policy_arn.is_empty());
        assert!(!config.iam_role.arn.is_empty());
        assert!(config.cluster.host.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_when_cluster_never_becomes_available() {
        let control = FakeControlPlane::default();
        let mut config = config();
        config.provision.poll_interval_secs = 30;
        config.provision.poll_timeout_secs = 120;

        let err = Provisioner::new(&control)
            .wait_until_available(&config)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Timeout { waited_secs: 120, .. }));
        // Polls at 0, 30, 60 and 90 seconds.
        assert_eq!(control.calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_stops_when_cancelled() {
        let control = FakeControlPlane::default();
        let config = config();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = Provisioner::new(&control)
            .with_cancellation(cancel)
            .wait_until_available(&config)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Cancelled { stage: Stage::Provision }));
    }

    #[tokio::test]
    async fn setup_rejects_incomplete_config_before_any_call() {
        let control = FakeControlPlane::default();
        let mut config = config();
        config.iam_role.trust_policy = None;

        let err = Provisioner::new(&control).setup(&mut config).await.unwrap_err();

        assert!(err.to_string().contains("IAM_ROLE.TRUST_POLICY"));
        assert!(control.calls().is_empty());
    }

    #[tokio::test]
    async fn teardown_continues_past_failures() {
        let control = FakeControlPlane::default().failing("delete_cluster");
        let mut config = config();
        config.iam_role.policy_arn = "arn:aws:iam::123456789012:policy/dwhS3ReadOnly".to_string();

        let report = Provisioner::new(&control).teardown(&config).await;

        assert!(!report.is_clean());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].operation, "delete_cluster");
        assert_eq!(
            report.completed,
            vec!["detach_role_policy", "delete_policy", "delete_role"]
        );
    }

    #[tokio::test]
    async fn teardown_without_policy_arn_skips_policy_calls() {
        let control = FakeControlPlane::default();
        let report = Provisioner::new(&control).teardown(&config()).await;

        assert_eq!(report.completed, vec!["delete_cluster", "delete_role"]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(control.calls(), vec!["delete_cluster", "delete_role"]);
    }

    #[test]
    fn single_node_spec_omits_node_count() {
        let mut config = config();
        assert_eq!(ClusterSpec::from_config(&config, "arn").num_nodes, Some(4));

        config.cluster.cluster_type = "single-node".to_string();
        assert_eq!(ClusterSpec::from_config(&config, "arn").num_nodes, None);
    }
}
