//! Ingress rule derivation from declarative port specs.
//!
//! Port specs take the form `<start>[-<end>][/<protocol>]`. The provider
//! replaces the full rule set on every update, so the rules are always derived
//! from the complete port list.

use std::collections::BTreeSet;

use thiserror::Error;

/// CIDR range that allows traffic from any IPv4 address.
pub const ANY_IPV4: &str = "0.0.0.0/0";

/// Port that always stays reachable from everywhere.
pub const SSH_PORT: u16 = 22;

const DEFAULT_PROTOCOL: &str = "tcp";

/// Ingress rule applied to the instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PortRule {
    /// First port of the range.
    pub from_port: u16,
    /// Last port of the range (inclusive).
    pub to_port: u16,
    /// Transport protocol (`tcp`, `udp` or `all`).
    pub protocol: String,
    /// Source ranges allowed to reach the ports.
    pub cidrs: Vec<String>,
}

/// Errors raised while parsing port specs.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FirewallError {
    /// Raised when a port bound is not a valid port number.
    #[error("invalid port '{value}' in port spec '{spec}'")]
    InvalidPort {
        /// Full port spec as supplied by the caller.
        spec: String,
        /// Offending port bound.
        value: String,
    },
}

/// Parses a single port spec into an ingress rule.
///
/// The protocol defaults to `tcp` and the end of the range defaults to its
/// start. A rule starting at port 22 always allows [`ANY_IPV4`] so that
/// administrative access cannot be locked out by a restrictive CIDR list.
///
/// # Errors
///
/// Returns [`FirewallError::InvalidPort`] when a bound is not a number in
/// `0..=65535`.
pub fn parse_port_spec(spec: &str, cidrs: &BTreeSet<String>) -> Result<PortRule, FirewallError> {
    let (range, protocol) = spec.split_once('/').unwrap_or((spec, DEFAULT_PROTOCOL));
    let (start, end) = range.split_once('-').unwrap_or((range, range));

    let from_port = parse_port(spec, start)?;
    let to_port = parse_port(spec, end)?;
    let protocol = if protocol.trim().is_empty() {
        DEFAULT_PROTOCOL
    } else {
        protocol.trim()
    };

    let cidrs = if from_port == SSH_PORT {
        vec![ANY_IPV4.to_owned()]
    } else {
        cidrs.iter().cloned().collect()
    };

    Ok(PortRule {
        from_port,
        to_port,
        protocol: protocol.to_owned(),
        cidrs,
    })
}

/// Derives the full ingress rule set for `ports`.
///
/// # Errors
///
/// Returns the first [`FirewallError`] raised by [`parse_port_spec`].
pub fn port_rules<S: AsRef<str>>(
    ports: &[S],
    cidrs: &BTreeSet<String>,
) -> Result<Vec<PortRule>, FirewallError> {
    ports
        .iter()
        .map(|spec| parse_port_spec(spec.as_ref(), cidrs))
        .collect()
}

fn parse_port(spec: &str, value: &str) -> Result<u16, FirewallError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|_| FirewallError::InvalidPort {
            spec: spec.to_owned(),
            value: value.to_owned(),
        })
}
