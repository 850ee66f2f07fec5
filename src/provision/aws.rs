//! IAM and Redshift control plane backed by the AWS SDK.

use async_trait::async_trait;
use aws_sdk_iam::Client as IamClient;
use aws_sdk_redshift::Client as RedshiftClient;

use crate::error::{AppError, Result};
use crate::provision::{ClusterDescription, ClusterSpec, ControlPlane};
use crate::utils::aws::{error_message, load_sdk_config};

const ROLE_DESCRIPTION: &str = "Allows Redshift clusters to call AWS services on your behalf.";
const POLICY_DESCRIPTION: &str = "Read-only access to the song and event logs for COPY.";

#[derive(Clone)]
pub struct AwsControlPlane {
    iam: IamClient,
    redshift: RedshiftClient,
}

impl AwsControlPlane {
    pub fn new(iam: IamClient, redshift: RedshiftClient) -> Self {
        Self { iam, redshift }
    }

    pub async fn from_region(region: &str) -> Self {
        let config = load_sdk_config(region).await;
        Self::new(IamClient::new(&config), RedshiftClient::new(&config))
    }
}

#[async_trait]
impl ControlPlane for AwsControlPlane {
    async fn create_role(&self, name: &str, trust_policy: &str) -> Result<String> {
        let output = self
            .iam
            .create_role()
            .path("/")
            .role_name(name)
            .description(ROLE_DESCRIPTION)
            .assume_role_policy_document(trust_policy)
            .send()
            .await
            .map_err(|e| AppError::aws("CreateRole", error_message(&e)))?;

        output
            .role()
            .map(|role| role.arn().to_string())
            .ok_or_else(|| AppError::aws("CreateRole", "response carried no role"))
    }

    async fn create_policy(&self, name: &str, document: &str) -> Result<String> {
        let output = self
            .iam
            .create_policy()
            .policy_name(name)
            .description(POLICY_DESCRIPTION)
            .policy_document(document)
            .send()
            .await
            .map_err(|e| AppError::aws("CreatePolicy", error_message(&e)))?;

        output
            .policy()
            .and_then(|policy| policy.arn())
            .map(str::to_string)
            .ok_or_else(|| AppError::aws("CreatePolicy", "response carried no policy ARN"))
    }

    async fn attach_role_policy(&self, role: &str, policy_arn: &str) -> Result<()> {
        self.iam
            .attach_role_policy()
            .role_name(role)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| AppError::aws("AttachRolePolicy", error_message(&e)))?;
        Ok(())
    }

    async fn get_role_arn(&self, role: &str) -> Result<String> {
        let output = self
            .iam
            .get_role()
            .role_name(role)
            .send()
            .await
            .map_err(|e| AppError::aws("GetRole", error_message(&e)))?;

        output
            .role()
            .map(|role| role.arn().to_string())
            .ok_or_else(|| AppError::aws("GetRole", "response carried no role"))
    }

    async fn create_cluster(&self, spec: &ClusterSpec) -> Result<()> {
        let mut request = self
            .redshift
            .create_cluster()
            .cluster_identifier(&spec.identifier)
            .cluster_type(&spec.cluster_type)
            .node_type(&spec.node_type)
            .db_name(&spec.db_name)
            .master_username(&spec.master_username)
            .master_user_password(&spec.master_password)
            .port(i32::from(spec.port))
            .iam_roles(&spec.role_arn);

        if let Some(nodes) = spec.num_nodes {
            let nodes = i32::try_from(nodes)
                .map_err(|_| AppError::config(format!("CLUSTER.NUM_NODES out of range: {nodes}")))?;
            request = request.number_of_nodes(nodes);
        }

        request
            .send()
            .await
            .map_err(|e| AppError::aws("CreateCluster", error_message(&e)))?;
        Ok(())
    }

    async fn describe_cluster(&self, identifier: &str) -> Result<ClusterDescription> {
        let output = self
            .redshift
            .describe_clusters()
            .cluster_identifier(identifier)
            .send()
            .await
            .map_err(|e| AppError::aws("DescribeClusters", error_message(&e)))?;

        let cluster = output.clusters().first().ok_or_else(|| {
            AppError::aws("DescribeClusters", format!("cluster {identifier} not found"))
        })?;
        let endpoint = cluster.endpoint();

        Ok(ClusterDescription {
            status: cluster.cluster_status().unwrap_or("unknown").to_string(),
            address: endpoint.and_then(|e| e.address()).map(str::to_string),
            port: endpoint
                .and_then(|e| e.port())
                .and_then(|port| u16::try_from(port).ok()),
        })
    }

    async fn delete_cluster(&self, identifier: &str) -> Result<()> {
        self.redshift
            .delete_cluster()
            .cluster_identifier(identifier)
            .skip_final_cluster_snapshot(true)
            .send()
            .await
            .map_err(|e| AppError::aws("DeleteCluster", error_message(&e)))?;
        Ok(())
    }

    async fn detach_role_policy(&self, role: &str, policy_arn: &str) -> Result<()> {
        self.iam
            .detach_role_policy()
            .role_name(role)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| AppError::aws("DetachRolePolicy", error_message(&e)))?;
        Ok(())
    }

    async fn delete_policy(&self, policy_arn: &str) -> Result<()> {
        self.iam
            .delete_policy()
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| AppError::aws("DeletePolicy", error_message(&e)))?;
        Ok(())
    }

    async fn delete_role(&self, role: &str) -> Result<()> {
        self.iam
            .delete_role()
            .role_name(role)
            .send()
            .await
            .map_err(|e| AppError::aws("DeleteRole", error_message(&e)))?;
        Ok(())
    }
}
