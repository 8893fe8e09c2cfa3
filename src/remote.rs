//! Remote scan transport over the ECS Exec channel.
//!
//! The probe ships a small Node.js dumper into the container rather than
//! talking to Redis directly, because the cache endpoint is only reachable
//! from inside the task's network. The contract is typed on both ends: a
//! [`ScanRequest`] is serialized into the script, and the script prints a
//! [`ScanResponse`] as JSON between sentinel markers so it can be cut out
//! of the session-manager banner noise. The remote side only dumps raw
//! entries; all filtering and grouping happens locally where it can be
//! unit tested.

use anyhow::{anyhow, bail, Context, Result};
use base64::prelude::{Engine, BASE64_STANDARD};
use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Marker printed by the remote script immediately before the response JSON.
const RESPONSE_BEGIN: &str = "__FORMS_CACHE_PROBE_BEGIN__";
/// Marker printed immediately after the response JSON.
const RESPONSE_END: &str = "__FORMS_CACHE_PROBE_END__";

/// Placeholder in the script template replaced by the request JSON.
const REQUEST_PLACEHOLDER: &str = "__REQUEST_JSON__";

/// Node.js dumper executed inside the container.
///
/// Connection URI resolution follows the request: the named config key is
/// consulted first, then a substring scan over all env values as fallback.
/// The Redis connection is always TLS; certificate verification follows
/// `verifyTls`. The connection is released on both success and error paths.
const SCRIPT_TEMPLATE: &str = r#"
const request = __REQUEST_JSON__;

function resolveUri() {
  const named = process.env[request.configKey];
  if (named) return named;
  const hit = Object.values(process.env).find(
    (value) => value && value.includes(request.fallbackSubstring)
  );
  if (!hit) {
    throw new Error(
      'no Redis URI found: env var ' + request.configKey +
      ' is unset and no env value contains "' + request.fallbackSubstring + '"'
    );
  }
  return hit;
}

(async () => {
  const { createClient } = require('redis');
  const response = { entries: [] };
  let client;
  try {
    client = createClient({
      url: resolveUri(),
      socket: { tls: true, rejectUnauthorized: request.verifyTls },
    });
    await client.connect();
    const keys = await client.keys(request.keyPrefix + '*');
    for (const key of keys) {
      const value = await client.get(key);
      if (!value) continue;
      response.entries.push({ key, value });
    }
  } catch (err) {
    response.error = String(err && err.stack ? err.stack : err);
  } finally {
    if (client && client.isOpen) await client.disconnect();
  }
  console.log('__FORMS_CACHE_PROBE_BEGIN__');
  console.log(JSON.stringify(response));
  console.log('__FORMS_CACHE_PROBE_END__');
  process.exit(response.error ? 1 : 0);
})();
"#;

/// Parameters the remote dumper needs, serialized into the script.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    /// Key namespace to enumerate, e.g. `forms:cache:`
    pub key_prefix: String,
    /// Env var holding the Redis connection URI
    pub config_key: String,
    /// Substring scanned for across env values when the named key is unset
    pub fallback_substring: String,
    /// Whether the remote TLS connection verifies certificates
    pub verify_tls: bool,
}

/// One raw cache entry as dumped by the remote side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
}

/// Structured reply printed by the remote script.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ScanResponse {
    #[serde(default)]
    pub entries: Vec<CacheEntry>,
    /// Verbatim remote stack trace, set instead of entries on failure
    #[serde(default)]
    pub error: Option<String>,
}

/// Outcome of one remote invocation.
#[derive(Debug)]
pub struct RemoteScan {
    pub response: ScanResponse,
    /// Exit status of the `aws ecs execute-command` subprocess
    pub exit_code: i32,
}

/// Renders the dumper script with the request embedded.
pub fn dumper_script(request: &ScanRequest) -> Result<String> {
    let request_json =
        serde_json::to_string(request).context("failed to serialize scan request")?;
    Ok(SCRIPT_TEMPLATE.replace(REQUEST_PLACEHOLDER, &request_json))
}

/// Builds the single interactive command sent to the container.
///
/// The script is base64-encoded so that no shell quoting survives the
/// exec channel, then decoded and piped into the container's Node runtime.
pub fn remote_command(request: &ScanRequest) -> Result<String> {
    let encoded = BASE64_STANDARD.encode(dumper_script(request)?);
    Ok(format!("/bin/sh -c \"echo {encoded} | base64 -d | node\""))
}

/// Cuts the marker-delimited response JSON out of the captured output.
pub fn extract_response(output: &str) -> Result<ScanResponse> {
    let start = output
        .find(RESPONSE_BEGIN)
        .ok_or_else(|| anyhow!("remote output did not contain a response payload"))?
        + RESPONSE_BEGIN.len();
    let end = output[start..]
        .find(RESPONSE_END)
        .ok_or_else(|| anyhow!("remote response payload was truncated"))?
        + start;

    serde_json::from_str(output[start..end].trim())
        .context("failed to deserialize remote scan response")
}

/// Runs the scan inside the resolved task via `aws ecs execute-command`.
///
/// The AWS CLI (with the session-manager-plugin) owns the interactive SSM
/// session; the probe captures its output and extracts the typed response.
///
/// # Errors
/// This function will return an error if:
/// - The subprocess cannot be spawned (CLI or plugin missing)
/// - The command exits zero but produces no parseable response
pub async fn run_scan(
    cluster: &str,
    task_arn: &str,
    request: &ScanRequest,
) -> Result<RemoteScan> {
    let command = remote_command(request)?;

    let output = Command::new("aws")
        .args([
            "ecs",
            "execute-command",
            "--cluster",
            cluster,
            "--task",
            task_arn,
            "--interactive",
            "--command",
            &command,
        ])
        .output()
        .await
        .context("failed to run aws ecs execute-command (AWS CLI and session-manager-plugin required)")?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let exit_code = output.status.code().unwrap_or(1);

    match extract_response(&stdout) {
        Ok(response) => Ok(RemoteScan {
            response,
            exit_code,
        }),
        // The exec session itself failed before the script could reply;
        // surface the raw channel output verbatim.
        Err(_) if exit_code != 0 => Ok(RemoteScan {
            response: ScanResponse {
                entries: Vec::new(),
                error: Some(format!("{stdout}{stderr}")),
            },
            exit_code,
        }),
        Err(err) => bail!("{err}\n--- remote output ---\n{stdout}{stderr}"),
    }
}
