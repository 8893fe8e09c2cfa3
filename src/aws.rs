//! AWS ECS and STS integration module.
//!
//! This module provides a client wrapper for the AWS ECS and STS services,
//! with the read-only calls the resolver chain needs: caller identity,
//! cluster/service/task listings, and a single-task describe.

use anyhow::{Context, Result};
use aws_sdk_ecs::types::DesiredStatus;
use aws_sdk_ecs::Client;
use aws_sdk_sts::Client as StsClient;

/// Client for interacting with AWS ECS and STS.
///
/// Wraps the AWS SDK clients and provides convenient methods for the
/// resolution chain. All methods are read-only; nothing here mutates
/// cluster or service state.
pub struct EcsClient {
    /// AWS ECS SDK client
    client: Client,
    /// AWS STS SDK client, used only for caller identity
    sts_client: StsClient,
}

/// The subset of task attributes the resolver inspects.
#[derive(Debug, Clone)]
pub struct TaskDetails {
    /// Full task ARN
    pub task_arn: String,
    /// The task's group field, e.g. `service:form-runner-adapter`
    pub group: Option<String>,
    /// Whether ECS Exec is enabled on the task
    pub exec_enabled: bool,
}

impl EcsClient {
    /// Creates a new client with optional region and profile configuration.
    ///
    /// # Arguments
    /// * `region` - Optional AWS region override (e.g., "eu-west-2")
    /// * `profile` - Optional AWS profile name from ~/.aws/credentials
    ///
    /// # Errors
    /// This function will return an error if:
    /// - AWS credentials cannot be resolved
    /// - The specified profile doesn't exist
    /// - The specified region is invalid
    pub async fn new(region: Option<String>, profile: Option<String>) -> Result<Self> {
        let mut config_loader = aws_config::from_env();

        // Set region if provided
        if let Some(region_str) = region {
            config_loader = config_loader.region(aws_config::Region::new(region_str));
        }

        // Set profile if provided
        if let Some(profile_name) = profile {
            config_loader = config_loader.profile_name(profile_name);
        }

        let config = config_loader.load().await;
        let client = Client::new(&config);
        let sts_client = StsClient::new(&config);
        Ok(Self { client, sts_client })
    }

    /// Returns the AWS account ID of the ambient credentials.
    ///
    /// # Errors
    /// This function will return an error if the STS GetCallerIdentity call
    /// fails or the response carries no account field.
    pub async fn caller_account_id(&self) -> Result<String> {
        let resp = self.sts_client.get_caller_identity().send().await?;

        resp.account()
            .map(str::to_string)
            .context("caller identity response did not include an account id")
    }

    /// Lists the full ARNs of all ECS clusters in the configured region.
    ///
    /// The resolver matches on ARN substrings, so unlike a name listing the
    /// ARNs are returned untouched.
    ///
    /// # Errors
    /// This function will return an error if the ListClusters call fails.
    pub async fn list_cluster_arns(&self) -> Result<Vec<String>> {
        let resp = self.client.list_clusters().send().await?;

        Ok(resp.cluster_arns().to_vec())
    }

    /// Lists the full ARNs of all services in a cluster.
    ///
    /// # Arguments
    /// * `cluster` - The cluster name or ARN
    ///
    /// # Errors
    /// This function will return an error if:
    /// - The ListServices call fails
    /// - The cluster doesn't exist
    pub async fn list_service_arns(&self, cluster: &str) -> Result<Vec<String>> {
        let resp = self.client.list_services().cluster(cluster).send().await?;

        Ok(resp.service_arns().to_vec())
    }

    /// Lists the ARNs of the RUNNING tasks for a service.
    ///
    /// # Arguments
    /// * `cluster` - The cluster name or ARN
    /// * `service` - The service name or ARN
    ///
    /// # Errors
    /// This function will return an error if:
    /// - The ListTasks call fails
    /// - The cluster or service doesn't exist
    pub async fn list_running_task_arns(&self, cluster: &str, service: &str) -> Result<Vec<String>> {
        let resp = self
            .client
            .list_tasks()
            .cluster(cluster)
            .service_name(service)
            .desired_status(DesiredStatus::Running)
            .send()
            .await?;

        Ok(resp.task_arns().to_vec())
    }

    /// Describes a single task and extracts the fields the resolver checks.
    ///
    /// # Arguments
    /// * `cluster` - The cluster name or ARN
    /// * `task_arn` - The full task ARN
    ///
    /// # Errors
    /// This function will return an error if:
    /// - The DescribeTasks call fails
    /// - The task is not present in the response
    pub async fn describe_task(&self, cluster: &str, task_arn: &str) -> Result<TaskDetails> {
        let resp = self
            .client
            .describe_tasks()
            .cluster(cluster)
            .tasks(task_arn)
            .send()
            .await?;

        let task = resp
            .tasks()
            .first()
            .with_context(|| format!("task {task_arn} not found in cluster {cluster}"))?;

        Ok(TaskDetails {
            task_arn: task.task_arn().unwrap_or(task_arn).to_string(),
            group: task.group().map(str::to_string),
            exec_enabled: task.enable_execute_command(),
        })
    }
}
