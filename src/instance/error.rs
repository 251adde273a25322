//! Errors raised by the instance lifecycle.

use thiserror::Error;

use crate::firewall::FirewallError;
use crate::keys::KeyError;
use crate::provision::ScriptError;
use crate::remote::RemoteError;

/// Errors surfaced while launching, provisioning or destroying an instance.
#[derive(Debug, Error)]
pub enum InstanceError<ComputeError>
where
    ComputeError: std::error::Error + 'static,
{
    /// Raised when a readiness poll exhausts its retry budget.
    #[error("instance {instance} did not {condition} in time; aborting")]
    Timeout {
        /// Readiness condition that was awaited.
        condition: &'static str,
        /// Normalised instance name.
        instance: String,
    },
    /// Raised when a script required by the deploy cannot be copied.
    #[error("unable to copy the {artifact} to {target} on the instance; aborting")]
    Transfer {
        /// Human readable artifact name.
        artifact: &'static str,
        /// Remote destination path.
        target: &'static str,
    },
    /// Raised when the provider reports a failed delete operation.
    #[error("failed to destroy instance: {code} {details}")]
    Destroy {
        /// Provider error code.
        code: String,
        /// Provider error details.
        details: String,
    },
    /// Raised when a cloud API call fails.
    #[error("cloud API call {operation} failed: {source}")]
    Compute {
        /// Operation that failed.
        operation: &'static str,
        /// Provider specific error.
        #[source]
        source: ComputeError,
    },
    /// Raised when the SSH client cannot be driven.
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// Raised when a port specification is invalid.
    #[error(transparent)]
    Firewall(#[from] FirewallError),
    /// Raised when admin keys cannot be resolved.
    #[error(transparent)]
    Keys(#[from] KeyError),
    /// Raised when the update script cannot be rendered.
    #[error(transparent)]
    Script(#[from] ScriptError),
}

impl<ComputeError> InstanceError<ComputeError>
where
    ComputeError: std::error::Error + 'static,
{
    pub(super) fn compute(operation: &'static str) -> impl FnOnce(ComputeError) -> Self {
        move |source| Self::Compute { operation, source }
    }
}
