//! Configuration management for forms-cache-probe.
//!
//! This module handles loading configuration from a TOML file located at
//! `~/.forms-cache-probe/config.toml`. Configuration covers AWS settings
//! and the remote Redis scan parameters. A default file is written on
//! first run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Main configuration structure for forms-cache-probe.
///
/// All options fall back to sensible defaults when absent from the file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// AWS-specific configuration options
    #[serde(default)]
    pub aws: AwsConfig,

    /// Remote Redis connection configuration
    #[serde(default)]
    pub redis: RedisConfig,

    /// Cache scan configuration
    #[serde(default)]
    pub scan: ScanConfig,
}

/// AWS SDK configuration options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AwsConfig {
    /// Default AWS region (e.g., "eu-west-2")
    /// If not specified, will use AWS SDK's default resolution (env vars, profile, etc.)
    pub region: Option<String>,

    /// AWS profile name to use from ~/.aws/credentials
    /// If not specified, will use the default profile
    pub profile: Option<String>,
}

/// How the remote side locates and connects to Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Name of the env var inside the container holding the connection URI
    #[serde(default = "default_config_key")]
    pub config_key: String,

    /// Substring scanned for across all env values when the named key is
    /// unset. ElastiCache endpoints contain this by default.
    #[serde(default = "default_fallback_substring")]
    pub fallback_substring: String,

    /// Verify the TLS certificate of the Redis endpoint. Off by default:
    /// the internal ElastiCache endpoint presents a certificate that does
    /// not match the discovered hostname.
    #[serde(default)]
    pub verify_tls: bool,
}

/// Cache scan options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Key namespace holding cached form configurations
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

// Default value functions for serde
fn default_config_key() -> String {
    "REDIS_INSTANCE_URI".to_string()
}

fn default_fallback_substring() -> String {
    ".cache.amazonaws.com".to_string()
}

fn default_key_prefix() -> String {
    "forms:cache:".to_string()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            config_key: default_config_key(),
            fallback_substring: default_fallback_substring(),
            verify_tls: false,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
        }
    }
}

impl Config {
    /// Returns the path to the configuration directory (~/.forms-cache-probe/)
    pub fn config_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Failed to determine home directory")?;
        Ok(home_dir.join(".forms-cache-probe"))
    }

    /// Returns the path to the configuration file (~/.forms-cache-probe/config.toml)
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Loads configuration from the config file, creating a default if it doesn't exist.
    ///
    /// # Behavior
    /// 1. If the config file exists, parse and return it
    /// 2. If the config file doesn't exist, create default config file and return defaults
    /// 3. If parsing fails, return error with context
    ///
    /// # Errors
    /// This function will return an error if:
    /// - Home directory cannot be determined
    /// - File I/O operations fail
    /// - TOML parsing fails
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {config_path:?}"))?;

            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {config_path:?}"))?;

            Ok(config)
        } else {
            // Create default config file
            let default_config = Config::default();
            default_config.create_default_config()?;
            Ok(default_config)
        }
    }

    /// Creates a default configuration file at ~/.forms-cache-probe/config.toml
    ///
    /// # Errors
    /// This function will return an error if:
    /// - Directory creation fails
    /// - File write operations fail
    pub fn create_default_config(&self) -> Result<()> {
        let config_dir = Self::config_dir()?;
        let config_path = Self::config_file_path()?;

        // Create directory if it doesn't exist
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {config_dir:?}"))?;
        }

        // Generate default config with comments
        let default_toml = r#"# forms-cache-probe Configuration File
# This file is automatically generated with default values.

[aws]
# Default AWS region to use (optional)
# If not specified, uses AWS SDK's default resolution (env vars, ~/.aws/config, etc.)
# region = "eu-west-2"

# AWS profile to use from ~/.aws/credentials (optional)
# If not specified, uses the default profile
# profile = "default"

[redis]
# Env var inside the container that holds the Redis connection URI
config_key = "REDIS_INSTANCE_URI"

# When config_key is unset remotely, the first env value containing this
# substring is used instead
fallback_substring = ".cache.amazonaws.com"

# Verify the TLS certificate of the Redis endpoint. The internal
# ElastiCache endpoint presents a certificate that does not match the
# discovered hostname, so this is off by default. Turn it on if your
# endpoint has a proper certificate.
verify_tls = false

[scan]
# Key namespace holding cached form configurations
key_prefix = "forms:cache:"
"#;

        fs::write(&config_path, default_toml)
            .with_context(|| format!("Failed to write config file: {config_path:?}"))?;

        Ok(())
    }
}
