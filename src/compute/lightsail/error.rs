//! Error types for the Lightsail client.

use thiserror::Error;

/// Errors raised by the Lightsail implementation of
/// [`ComputeApi`](crate::compute::ComputeApi).
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LightsailError {
    /// Wrapper for failures reported by the AWS SDK.
    #[error("lightsail {operation} failed: {message}")]
    Provider {
        /// API operation that failed.
        operation: &'static str,
        /// Error chain rendered by the SDK.
        message: String,
    },
    /// Raised when a response lacks a field the orchestrator relies on.
    #[error("lightsail {operation} response is missing {field}")]
    MissingField {
        /// API operation that returned the response.
        operation: &'static str,
        /// Name of the missing field.
        field: &'static str,
    },
}

impl LightsailError {
    pub(super) fn provider<E>(operation: &'static str, err: &E) -> Self
    where
        E: std::error::Error + 'static,
    {
        Self::Provider {
            operation,
            message: aws_sdk_lightsail::error::DisplayErrorContext(err).to_string(),
        }
    }
}
