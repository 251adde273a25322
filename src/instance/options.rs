//! Caller supplied settings for an [`Instance`](super::Instance).

use std::collections::BTreeSet;

use crate::firewall::{ANY_IPV4, SSH_PORT};
use crate::naming::normalize_name;
use crate::wait::RetryBudget;

/// Default base domain of derived hostnames.
pub const DEFAULT_DNS: &str = "nip.io";

/// Default port of the reported URL.
pub const DEFAULT_PORT: &str = "80";

/// Default compose file forwarded to the update script.
pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";

/// Preview environment settings resolved by [`InstanceOptionsBuilder`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceOptions {
    /// Name as supplied by the caller, before normalisation.
    pub name: String,
    /// DNS-safe label used as the first part of the public hostname.
    pub subdomain: String,
    /// Identities whose public keys are authorised on the instance.
    pub admins: Vec<String>,
    /// Ingress ranges allowed to reach the exposed ports.
    pub cidrs: BTreeSet<String>,
    /// Port of the reported URL.
    pub default_port: String,
    /// Port specifications opened on the instance, without duplicates.
    pub ports: Vec<String>,
    /// Compose files passed to the update script.
    pub compose_files: Vec<String>,
    /// Registry URIs of the form `docker://[user[:password]@]host`.
    pub registries: Vec<String>,
    /// Base domain of the public hostname.
    pub dns: String,
    /// Optional DNS-safe label inserted between subdomain and IP address.
    pub ip_prefix: Option<String>,
    /// Whether the swap tuning steps run on first boot.
    pub swap_enabled: bool,
}

impl InstanceOptions {
    /// Starts a builder for an environment named `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> InstanceOptionsBuilder {
        InstanceOptionsBuilder::new(name)
    }
}

/// Builder for [`InstanceOptions`] that trims inputs and fills defaults.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceOptionsBuilder {
    name: String,
    subdomain: Option<String>,
    admins: Vec<String>,
    cidrs: Vec<String>,
    default_port: Option<String>,
    ports: Vec<String>,
    compose_files: Vec<String>,
    registries: Vec<String>,
    dns: Option<String>,
    ip_prefix: Option<String>,
    disable_swap: bool,
}

impl InstanceOptionsBuilder {
    /// Creates a builder for an environment named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Overrides the hostname label; defaults to the raw name.
    #[must_use]
    pub fn subdomain(mut self, value: impl Into<String>) -> Self {
        self.subdomain = Some(value.into());
        self
    }

    /// Sets the admin identities.
    #[must_use]
    pub fn admins<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.admins = values.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the ingress ranges; defaults to `0.0.0.0/0`.
    #[must_use]
    pub fn cidrs<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cidrs = values.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the port of the reported URL; defaults to `80`.
    #[must_use]
    pub fn default_port(mut self, value: impl Into<String>) -> Self {
        self.default_port = Some(value.into());
        self
    }

    /// Sets additional port specifications to open.
    #[must_use]
    pub fn ports<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ports = values.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the compose files; defaults to `docker-compose.yml`.
    #[must_use]
    pub fn compose_files<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compose_files = values.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the registry URIs.
    #[must_use]
    pub fn registries<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registries = values.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the base domain; defaults to `nip.io`.
    #[must_use]
    pub fn dns(mut self, value: impl Into<String>) -> Self {
        self.dns = Some(value.into());
        self
    }

    /// Sets the optional hostname label placed before the IP address.
    #[must_use]
    pub fn ip_prefix(mut self, value: Option<String>) -> Self {
        self.ip_prefix = value;
        self
    }

    /// Skips the swap tuning steps on first boot.
    #[must_use]
    pub const fn disable_swap(mut self, value: bool) -> Self {
        self.disable_swap = value;
        self
    }

    /// Resolves defaults and returns the options.
    ///
    /// Blank entries are dropped from every list. The URL port and the SSH
    /// port are always opened.
    #[must_use]
    pub fn build(self) -> InstanceOptions {
        let default_port = non_blank(self.default_port).unwrap_or_else(|| DEFAULT_PORT.to_owned());

        let mut cidrs: BTreeSet<String> = trimmed(self.cidrs).into_iter().collect();
        if cidrs.is_empty() {
            cidrs.insert(ANY_IPV4.to_owned());
        }

        let mut ports = Vec::new();
        for port in trimmed(self.ports)
            .into_iter()
            .chain([default_port.clone(), SSH_PORT.to_string()])
        {
            if !ports.contains(&port) {
                ports.push(port);
            }
        }

        let mut compose_files = trimmed(self.compose_files);
        if compose_files.is_empty() {
            compose_files.push(DEFAULT_COMPOSE_FILE.to_owned());
        }

        InstanceOptions {
            subdomain: dns_label(self.subdomain).unwrap_or_else(|| normalize_name(&self.name)),
            name: self.name,
            admins: trimmed(self.admins),
            cidrs,
            default_port,
            ports,
            compose_files,
            registries: trimmed(self.registries),
            dns: non_blank(self.dns).unwrap_or_else(|| DEFAULT_DNS.to_owned()),
            ip_prefix: dns_label(self.ip_prefix),
            swap_enabled: !self.disable_swap,
        }
    }
}

fn trimmed(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .collect()
}

fn dns_label(value: Option<String>) -> Option<String> {
    value
        .map(|inner| normalize_name(&inner))
        .filter(|label| !label.is_empty())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|inner| inner.trim().to_owned())
        .filter(|inner| !inner.is_empty())
}

/// Provider placement used by [`Instance::launch`](super::Instance::launch).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchTarget {
    /// Availability zone the instance is placed in.
    pub availability_zone: String,
    /// Sizing plan identifier.
    pub bundle_id: String,
    /// Base image used when no snapshot can be restored.
    pub blueprint_id: String,
}

/// Deploy settings shared by every preview environment.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeploySettings {
    /// Configured snapshot to restore; empty disables name matching.
    pub snapshot_name: String,
    /// `user:password` embedded in the reported URL.
    pub basic_auth: Option<String>,
    /// Command replacing `docker compose up` in the update script.
    pub launch_command: String,
    /// Extra `KEY=value` lines for the environment file.
    pub env_vars: String,
    /// Retry budget of both readiness polls.
    pub poll: RetryBudget,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn applies_defaults() {
        let options = InstanceOptions::builder("Feature/X").build();

        assert_eq!(options.subdomain, "feature-x");
        assert_eq!(options.cidrs, BTreeSet::from([String::from("0.0.0.0/0")]));
        assert_eq!(options.default_port, "80");
        assert_eq!(options.ports, ["80", "22"]);
        assert_eq!(options.compose_files, ["docker-compose.yml"]);
        assert_eq!(options.dns, "nip.io");
        assert_eq!(options.ip_prefix, None);
        assert!(options.swap_enabled);
    }

    #[rstest]
    #[case(None, None, "feature-login-page", None)]
    #[case(Some("Team_A/Preview"), Some("EU West"), "team-a-preview", Some("eu-west"))]
    #[case(Some("!!!"), Some("//"), "feature-login-page", None)]
    fn hostname_labels_are_dns_safe(
        #[case] subdomain: Option<&str>,
        #[case] ip_prefix: Option<&str>,
        #[case] expected_subdomain: &str,
        #[case] expected_prefix: Option<&str>,
    ) {
        let mut builder = InstanceOptions::builder("Feature/Login_Page")
            .ip_prefix(ip_prefix.map(str::to_owned));
        if let Some(label) = subdomain {
            builder = builder.subdomain(label);
        }
        let options = builder.build();

        assert_eq!(options.name, "Feature/Login_Page");
        assert_eq!(options.subdomain, expected_subdomain);
        assert_eq!(options.ip_prefix.as_deref(), expected_prefix);
    }

    #[rstest]
    fn ports_keep_first_occurrence_order() {
        let options = InstanceOptions::builder("x")
            .ports(["22", "443", " 443 ", "8080-8090/udp"])
            .default_port("443")
            .build();

        assert_eq!(options.ports, ["22", "443", "8080-8090/udp"]);
    }

    #[rstest]
    fn blank_values_fall_back_to_defaults() {
        let options = InstanceOptions::builder("x")
            .subdomain("  ")
            .dns("")
            .ip_prefix(Some(String::from(" ")))
            .compose_files(["", " "])
            .cidrs([""])
            .build();

        assert_eq!(options.subdomain, "x");
        assert_eq!(options.dns, "nip.io");
        assert_eq!(options.ip_prefix, None);
        assert_eq!(options.compose_files, ["docker-compose.yml"]);
        assert!(options.cidrs.contains(ANY_IPV4));
    }

    #[rstest]
    fn disable_swap_turns_off_swap_steps() {
        let options = InstanceOptions::builder("x").disable_swap(true).build();
        assert!(!options.swap_enabled);
    }
}
