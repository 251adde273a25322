//! Configuration loading via `ortho-config`.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::instance::{DeploySettings, LaunchTarget};
use crate::keys::DEFAULT_KEYS_BASE_URL;
use crate::wait::{DEFAULT_MAX_RETRIES, RetryBudget};

/// Provider and deploy settings derived from defaults, `vista.toml`,
/// environment variables and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "VISTA",
    discovery(
        app_name = "vista",
        env_var = "VISTA_CONFIG_PATH",
        config_file_name = "vista.toml",
        dotfile_name = ".vista.toml",
        project_file_name = "vista.toml"
    )
)]
pub struct VistaConfig {
    /// AWS region hosting the instances.
    #[ortho_config(default = "us-east-1".to_owned())]
    pub region: String,
    /// Availability zone new instances are placed in.
    #[ortho_config(default = "us-east-1a".to_owned())]
    pub availability_zone: String,
    /// Lightsail bundle (instance size).
    #[ortho_config(default = "small_2_0".to_owned())]
    pub bundle_id: String,
    /// Lightsail blueprint used when no snapshot can be restored.
    #[ortho_config(default = "amazon_linux_2".to_owned())]
    pub blueprint_id: String,
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Number of readiness checks before giving up.
    #[ortho_config(default = 30)]
    pub poll_max_retries: u32,
    /// Seconds between two readiness checks.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
    /// Command run instead of `docker compose up` by the update script.
    pub launch_command: Option<String>,
    /// Extra `KEY=value` lines written to the instance environment file.
    pub env_vars: Option<String>,
    /// Snapshot restored in preference to one taken from the same instance.
    pub snapshot_name: Option<String>,
    /// `user:password` embedded in the reported URL.
    pub basic_auth: Option<String>,
    /// Base URL serving `<user>.keys` listings.
    #[ortho_config(default = DEFAULT_KEYS_BASE_URL.to_owned())]
    pub keys_base_url: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl VistaConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to vista.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("vista")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and the `vista.toml` key that provide the value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::Invalid`] when the retry budget is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.region,
            &FieldMetadata::new("AWS region", "VISTA_REGION", "region"),
        )?;
        Self::require_field(
            &self.availability_zone,
            &FieldMetadata::new(
                "availability zone",
                "VISTA_AVAILABILITY_ZONE",
                "availability_zone",
            ),
        )?;
        Self::require_field(
            &self.bundle_id,
            &FieldMetadata::new("instance bundle", "VISTA_BUNDLE_ID", "bundle_id"),
        )?;
        Self::require_field(
            &self.blueprint_id,
            &FieldMetadata::new("instance blueprint", "VISTA_BLUEPRINT_ID", "blueprint_id"),
        )?;
        Self::require_field(
            &self.ssh_bin,
            &FieldMetadata::new("ssh executable", "VISTA_SSH_BIN", "ssh_bin"),
        )?;
        Self::require_field(
            &self.keys_base_url,
            &FieldMetadata::new("key listing URL", "VISTA_KEYS_BASE_URL", "keys_base_url"),
        )?;
        if self.poll_max_retries == 0 {
            return Err(ConfigError::Invalid(String::from(
                "poll_max_retries must be at least 1: set VISTA_POLL_MAX_RETRIES or add poll_max_retries to vista.toml",
            )));
        }
        Ok(())
    }

    /// Builds the placement of new instances.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn launch_target(&self) -> Result<LaunchTarget, ConfigError> {
        self.validate()?;
        Ok(LaunchTarget {
            availability_zone: self.availability_zone.trim().to_owned(),
            bundle_id: self.bundle_id.trim().to_owned(),
            blueprint_id: self.blueprint_id.trim().to_owned(),
        })
    }

    /// Returns the retry budget of the readiness polls.
    #[must_use]
    pub const fn retry_budget(&self) -> RetryBudget {
        RetryBudget::new(
            self.poll_max_retries,
            Duration::from_secs(self.poll_interval_secs),
        )
    }

    /// Builds the deploy settings shared by every instance.
    #[must_use]
    pub fn deploy_settings(&self) -> DeploySettings {
        let owned = |value: Option<&String>| {
            value
                .map(|inner| inner.trim().to_owned())
                .unwrap_or_default()
        };
        DeploySettings {
            snapshot_name: owned(self.snapshot_name.as_ref()),
            basic_auth: self
                .basic_auth
                .as_deref()
                .map(str::trim)
                .filter(|auth| !auth.is_empty())
                .map(str::to_owned),
            launch_command: owned(self.launch_command.as_ref()),
            env_vars: self.env_vars.clone().unwrap_or_default(),
            poll: self.retry_budget(),
        }
    }
}

impl Default for VistaConfig {
    fn default() -> Self {
        Self {
            region: String::from("us-east-1"),
            availability_zone: String::from("us-east-1a"),
            bundle_id: String::from("small_2_0"),
            blueprint_id: String::from("amazon_linux_2"),
            ssh_bin: String::from("ssh"),
            poll_max_retries: DEFAULT_MAX_RETRIES,
            poll_interval_secs: 5,
            launch_command: None,
            env_vars: None,
            snapshot_name: None,
            basic_auth: None,
            keys_base_url: DEFAULT_KEYS_BASE_URL.to_owned(),
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is out of range.
    #[error("invalid configuration value: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
