//! Core library for the Vista preview-environment orchestrator.
//!
//! The crate provisions one disposable Lightsail instance per preview
//! environment: it restores the freshest snapshot or boots a blueprint,
//! waits for the instance to run and accept SSH, opens the requested ports,
//! installs the deploy scripts and reports the public URL. Cloud calls go
//! through the [`ComputeApi`] trait and remote steps through
//! [`RemoteExecutor`], so the whole lifecycle runs against test doubles.

pub mod compute;
pub mod config;
pub mod firewall;
pub mod hostname;
pub mod instance;
pub mod keys;
pub mod naming;
pub mod provision;
pub mod remote;
pub mod test_support;
pub mod wait;

pub use compute::{
    AccessDetails, ComputeApi, ComputeFuture, InstanceDetails, LaunchRequest, LightsailApi,
    LightsailError, OperationResult, Snapshot,
};
pub use config::{ConfigError, VistaConfig};
pub use firewall::{FirewallError, PortRule};
pub use instance::{
    DEFAULT_COMPOSE_FILE, DEFAULT_DNS, DEFAULT_PORT, DeploySettings, Instance, InstanceError,
    InstanceOptions, InstanceOptionsBuilder, LaunchTarget, Provisioned,
};
pub use keys::{GitHubKeys, KeyError, KeySource};
pub use remote::{
    CommandOutput, CommandRunner, ProcessCommandRunner, RemoteError, RemoteExecutor, StagingDir,
};
pub use wait::RetryBudget;
