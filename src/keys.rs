//! Resolution of admin identities to SSH public keys.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tracing::debug;

/// Default location serving `<user>.keys` listings.
pub const DEFAULT_KEYS_BASE_URL: &str = "https://github.com";

/// Future returned by [`KeySource::public_keys`].
pub type KeyFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<String>, KeyError>> + Send + 'a>>;

/// Errors raised while fetching admin keys.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum KeyError {
    /// Raised when the key listing for an admin cannot be retrieved.
    #[error("failed to fetch public keys for {admin}: {message}")]
    Fetch {
        /// Admin identity whose keys were requested.
        admin: String,
        /// Transport or status error description.
        message: String,
    },
}

/// Source of SSH public keys for an admin identity.
pub trait KeySource {
    /// Returns the public keys registered for `admin`, one per entry.
    fn public_keys<'a>(&'a self, admin: &'a str) -> KeyFuture<'a>;
}

/// Fetches keys from a GitHub style `<base>/<user>.keys` endpoint.
#[derive(Clone, Debug)]
pub struct GitHubKeys {
    client: reqwest::Client,
    base_url: String,
}

impl GitHubKeys {
    /// Creates a key source rooted at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn keys_url(&self, admin: &str) -> String {
        format!("{}/{admin}.keys", self.base_url.trim_end_matches('/'))
    }
}

impl Default for GitHubKeys {
    fn default() -> Self {
        Self::new(DEFAULT_KEYS_BASE_URL)
    }
}

impl KeySource for GitHubKeys {
    fn public_keys<'a>(&'a self, admin: &'a str) -> KeyFuture<'a> {
        Box::pin(async move {
            let url = self.keys_url(admin);
            debug!(admin, url = %url, "fetching admin public keys");
            let fetch_error = |err: reqwest::Error| KeyError::Fetch {
                admin: admin.to_owned(),
                message: err.to_string(),
            };
            let body = self
                .client
                .get(&url)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(fetch_error)?
                .text()
                .await
                .map_err(fetch_error)?;
            Ok(parse_key_listing(&body))
        })
    }
}

/// Splits a key listing into non-empty trimmed lines.
#[must_use]
pub fn parse_key_listing(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}
