//! Account-to-task resolution chain.
//!
//! Maps the caller's AWS account to an environment, then walks
//! account -> cluster -> service -> running task -> exec check. Each step
//! consumes the previous step's output and the first failure is terminal;
//! there are no retries.

use crate::aws::EcsClient;
use anyhow::Result;
use std::fmt;
use thiserror::Error;

/// Deployment environment, derived from the AWS account ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Test,
    Dev,
    Uat,
    Prod,
}

impl Environment {
    /// Lowercase label as it appears in cluster names and hostnames.
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Test => "test",
            Environment::Dev => "dev",
            Environment::Uat => "uat",
            Environment::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account-ID prefixes for the four pre-award accounts.
const ACCOUNT_PREFIXES: [(&str, Environment); 4] = [
    ("0443", Environment::Test),
    ("3621", Environment::Dev),
    ("7148", Environment::Uat),
    ("5290", Environment::Prod),
];

/// Substring identifying the target service within a cluster.
const SERVICE_MARKER: &str = "form-runner-adapter";

/// Errors raised by the resolution chain, tagged by stage.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The account ID matches none of the known prefixes. This is a hard
    /// failure: an unmapped account must never fall through to an empty
    /// environment label.
    #[error("account {0} does not map to a known environment")]
    UnknownEnvironment(String),

    /// No cluster ARN contains `pre-award-<env>`
    #[error("no cluster matching pre-award-{0} found")]
    ClusterNotFound(Environment),

    /// No service ARN in the cluster contains the service marker
    #[error("no form-runner-adapter service found in cluster {0}")]
    ServiceNotFound(String),

    /// The service has no task in RUNNING state
    #[error("no running task found for service {0}")]
    NoRunningTask(String),

    /// The task exists but ECS Exec is disabled on it
    #[error("ECS Exec is not enabled on the running task; enable it with:\n  {remediation}")]
    ExecNotEnabled { remediation: String },
}

/// A fully resolved, exec-enabled running task.
#[derive(Debug, Clone)]
pub struct ResolvedTask {
    pub environment: Environment,
    pub cluster_arn: String,
    pub cluster_name: String,
    pub service_name: String,
    pub task_arn: String,
}

impl ResolvedTask {
    /// Short task ID, the final path segment of the ARN.
    pub fn task_id(&self) -> &str {
        name_from_arn(&self.task_arn)
    }
}

/// Maps an account ID onto its environment via the fixed prefix table.
pub fn environment_for_account(account_id: &str) -> Option<Environment> {
    ACCOUNT_PREFIXES
        .iter()
        .find(|(prefix, _)| account_id.starts_with(prefix))
        .map(|(_, env)| *env)
}

/// Picks the first cluster ARN containing `pre-award-<env>`.
pub fn select_cluster(arns: &[String], environment: Environment) -> Option<&String> {
    let marker = format!("pre-award-{environment}");
    arns.iter().find(|arn| arn.contains(&marker))
}

/// Picks the first service ARN containing the service marker.
pub fn select_service(arns: &[String]) -> Option<&String> {
    arns.iter().find(|arn| arn.contains(SERVICE_MARKER))
}

/// Extracts the final `/` segment of an ARN.
pub fn name_from_arn(arn: &str) -> &str {
    arn.split('/').next_back().unwrap_or(arn)
}

/// Builds the exact command that enables ECS Exec on the service.
///
/// The service name is reconstructed from the task's group field by
/// stripping its `service:` prefix.
pub fn remediation_command(cluster_name: &str, group: &str) -> String {
    let service = group.strip_prefix("service:").unwrap_or(group);
    format!(
        "aws ecs update-service --cluster {cluster_name} --service {service} \
         --enable-execute-command --force-new-deployment"
    )
}

/// Runs the full resolution chain against live AWS APIs.
///
/// Prints one progress line per successful stage. All calls are read-only.
///
/// # Errors
/// Returns a stage-tagged [`ResolveError`] for the documented failure modes,
/// or the underlying AWS error if an API call itself fails.
pub async fn resolve(client: &EcsClient) -> Result<ResolvedTask> {
    let account_id = client.caller_account_id().await?;
    let environment = environment_for_account(&account_id)
        .ok_or_else(|| ResolveError::UnknownEnvironment(account_id.clone()))?;
    println!("Account {account_id} -> environment {environment}");

    let cluster_arns = client.list_cluster_arns().await?;
    let cluster_arn = select_cluster(&cluster_arns, environment)
        .ok_or(ResolveError::ClusterNotFound(environment))?
        .clone();
    let cluster_name = name_from_arn(&cluster_arn).to_string();
    println!("Cluster {cluster_name}");

    let service_arns = client.list_service_arns(&cluster_arn).await?;
    let service_arn = select_service(&service_arns)
        .ok_or_else(|| ResolveError::ServiceNotFound(cluster_name.clone()))?
        .clone();
    let service_name = name_from_arn(&service_arn).to_string();
    println!("Service {service_name}");

    let task_arns = client
        .list_running_task_arns(&cluster_arn, &service_arn)
        .await?;
    let task_arn = task_arns
        .first()
        .ok_or_else(|| ResolveError::NoRunningTask(service_name.clone()))?
        .clone();

    let details = client.describe_task(&cluster_arn, &task_arn).await?;
    if !details.exec_enabled {
        let group = details.group.as_deref().unwrap_or(&service_name);
        return Err(ResolveError::ExecNotEnabled {
            remediation: remediation_command(&cluster_name, group),
        }
        .into());
    }
    println!("Task {} (exec enabled)", name_from_arn(&task_arn));

    Ok(ResolvedTask {
        environment,
        cluster_arn,
        cluster_name,
        service_name,
        task_arn,
    })
}
