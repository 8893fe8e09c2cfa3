//! forms-cache-probe - locate the form-runner-adapter task and scan its
//! Redis cache for duplicated form configurations.
//!
//! The probe resolves the running ECS task for the current account's
//! pre-award environment, ships a typed scan payload into the container
//! over ECS Exec, and prints a report of forms whose cached content is
//! byte-identical, grouped by SHA-256 digest.

mod aws;
mod config;
mod remote;
mod resolver;
mod scan;

use anyhow::Result;
use aws::EcsClient;
use config::Config;
use remote::ScanRequest;

/// Application entry point.
///
/// Takes no arguments. Exits 1 on any resolution failure; when the remote
/// scan itself fails, the exit code reflects the remote command's status.
#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::load()?;
    let client = EcsClient::new(config.aws.region.clone(), config.aws.profile.clone()).await?;

    let resolved = resolver::resolve(&client).await?;

    let request = ScanRequest {
        key_prefix: config.scan.key_prefix,
        config_key: config.redis.config_key,
        fallback_substring: config.redis.fallback_substring,
        verify_tls: config.redis.verify_tls,
    };

    println!(
        "Scanning {}* inside {}/{} (task {}) ...",
        request.key_prefix,
        resolved.cluster_name,
        resolved.service_name,
        resolved.task_id()
    );
    let scan_run = remote::run_scan(&resolved.cluster_arn, &resolved.task_arn, &request).await?;

    if let Some(remote_err) = &scan_run.response.error {
        eprintln!("Remote scan failed:\n{remote_err}");
        let code = if scan_run.exit_code != 0 {
            scan_run.exit_code
        } else {
            1
        };
        std::process::exit(code);
    }

    let groups = scan::group_entries(&scan_run.response.entries, &request.key_prefix);
    print!("{}", scan::render_report(&groups, resolved.environment));

    Ok(())
}
