//! Cloud compute abstraction consumed by the instance lifecycle.
//!
//! The orchestrator only needs a handful of control-plane operations. They
//! are expressed as a trait over plain records so the lifecycle can be driven
//! by the Lightsail client in production and by an in-memory double in tests.

pub mod lightsail;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use crate::firewall::PortRule;

pub use lightsail::{LightsailApi, LightsailError};

/// Future returned by compute operations.
pub type ComputeFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Parameters shared by both instance creation paths.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchRequest {
    /// Normalised instance name.
    pub name: String,
    /// Availability zone the instance is placed in.
    pub availability_zone: String,
    /// Sizing plan identifier.
    pub bundle_id: String,
    /// Shell payload executed on first boot.
    pub user_data: String,
    /// Tags attached to the instance.
    pub tags: BTreeMap<String, String>,
}

/// Instance attributes reported by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceDetails {
    /// Instance name.
    pub name: String,
    /// Provider state name (for example `running`).
    pub state: Option<String>,
    /// Public IPv4 address once assigned.
    pub public_ip: Option<String>,
}

/// Short-lived SSH credentials issued by the provider.
#[derive(Clone, Eq, PartialEq)]
pub struct AccessDetails {
    /// Login user on the instance.
    pub username: String,
    /// Address to connect to.
    pub ip_address: String,
    /// PEM encoded private key.
    pub private_key: String,
    /// OpenSSH certificate signing the key.
    pub cert_key: String,
}

impl std::fmt::Debug for AccessDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessDetails")
            .field("username", &self.username)
            .field("ip_address", &self.ip_address)
            .field("private_key", &"<redacted>")
            .field("cert_key", &"<redacted>")
            .finish()
    }
}

/// Point-in-time image of a previous instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Snapshot {
    /// Snapshot name.
    pub name: String,
    /// Provider state name (`available` once usable).
    pub state: String,
    /// Name of the instance the snapshot was taken from.
    pub from_instance_name: Option<String>,
    /// Creation time in seconds since the Unix epoch.
    pub created_at: i64,
}

/// Outcome of an asynchronous provider operation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OperationResult {
    /// Provider error code, absent on success.
    pub error_code: Option<String>,
    /// Human readable error details.
    pub error_details: Option<String>,
}

/// Control-plane operations used by the instance lifecycle.
pub trait ComputeApi {
    /// Provider specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates an instance from a base image.
    fn create_from_blueprint<'a>(
        &'a self,
        request: &'a LaunchRequest,
        blueprint_id: &'a str,
    ) -> ComputeFuture<'a, (), Self::Error>;

    /// Creates an instance restored from `snapshot_name`.
    fn create_from_snapshot<'a>(
        &'a self,
        request: &'a LaunchRequest,
        snapshot_name: &'a str,
    ) -> ComputeFuture<'a, (), Self::Error>;

    /// Returns the instance state name, or `None` when the instance does not
    /// exist (yet).
    fn instance_state<'a>(&'a self, name: &'a str)
    -> ComputeFuture<'a, Option<String>, Self::Error>;

    /// Returns the instance attributes.
    fn instance<'a>(&'a self, name: &'a str) -> ComputeFuture<'a, InstanceDetails, Self::Error>;

    /// Issues short-lived SSH credentials for the instance.
    fn access_details<'a>(&'a self, name: &'a str)
    -> ComputeFuture<'a, AccessDetails, Self::Error>;

    /// Lists every instance snapshot visible to the account.
    fn snapshots(&self) -> ComputeFuture<'_, Vec<Snapshot>, Self::Error>;

    /// Replaces the public ingress rules of the instance.
    fn put_public_ports<'a>(
        &'a self,
        name: &'a str,
        rules: &'a [PortRule],
    ) -> ComputeFuture<'a, (), Self::Error>;

    /// Deletes the instance and returns the provider operations.
    fn delete_instance<'a>(
        &'a self,
        name: &'a str,
    ) -> ComputeFuture<'a, Vec<OperationResult>, Self::Error>;
}
