//! Command-line interface definitions for the `vista` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `vista` binary.
#[derive(Debug, Parser)]
#[command(
    name = "vista",
    about = "Provision and tear down disposable preview environments",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Launch, provision and deploy a preview environment.
    #[command(name = "up", about = "Launch, provision and deploy a preview environment")]
    Up(UpCommand),
    /// Destroy a preview environment.
    #[command(name = "down", about = "Destroy a preview environment")]
    Down(DownCommand),
}

/// Arguments for the `vista up` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct UpCommand {
    /// Name of the environment, normalised into the instance name.
    pub(crate) name: String,
    /// Label used in the public hostname; defaults to the raw name.
    #[arg(long, value_name = "LABEL")]
    pub(crate) subdomain: Option<String>,
    /// GitHub users whose public keys are authorised on the instance.
    #[arg(long = "admin", value_name = "USER", value_delimiter = ',')]
    pub(crate) admins: Vec<String>,
    /// Ingress ranges allowed to reach the exposed ports.
    #[arg(long = "cidr", value_name = "CIDR", value_delimiter = ',')]
    pub(crate) cidrs: Vec<String>,
    /// Port of the reported URL (`443` switches the URL to https).
    #[arg(long, value_name = "PORT")]
    pub(crate) default_port: Option<String>,
    /// Extra port specifications, `start[-end][/protocol]`.
    #[arg(long = "port", value_name = "SPEC", value_delimiter = ',')]
    pub(crate) ports: Vec<String>,
    /// Compose files passed to `docker compose -f`.
    #[arg(long = "compose-file", value_name = "FILE", value_delimiter = ',')]
    pub(crate) compose_files: Vec<String>,
    /// Registry credentials, `docker://[user[:password]@]host`.
    #[arg(long = "registry", value_name = "URI")]
    pub(crate) registries: Vec<String>,
    /// Base domain of the public hostname.
    #[arg(long, value_name = "DOMAIN")]
    pub(crate) dns: Option<String>,
    /// Label inserted between the subdomain and the IP address.
    #[arg(long, value_name = "LABEL")]
    pub(crate) ip_prefix: Option<String>,
    /// Skip the swap tuning steps on first boot.
    #[arg(long)]
    pub(crate) disable_swap: bool,
    /// Extra instance tags, `key=value`.
    #[arg(long = "tag", value_name = "KEY=VALUE", value_parser = parse_tag)]
    pub(crate) tags: Vec<(String, String)>,
}

/// Arguments for the `vista down` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct DownCommand {
    /// Name of the environment to destroy.
    pub(crate) name: String,
}

fn parse_tag(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("tag '{raw}' must have the form key=value"))?;
    let trimmed_key = key.trim();
    if trimmed_key.is_empty() {
        return Err(format!("tag '{raw}' has an empty key"));
    }
    Ok((trimmed_key.to_owned(), value.trim().to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn up_accepts_repeated_and_delimited_lists() {
        let cli = Cli::try_parse_from([
            "vista",
            "up",
            "feature/x",
            "--admin",
            "alice,bob",
            "--port",
            "443",
            "--port",
            "5432/udp",
            "--tag",
            "repo=acme/web",
            "--disable-swap",
        ])
        .expect("valid arguments");

        let Cli::Up(up) = cli else {
            panic!("expected up command");
        };
        assert_eq!(up.name, "feature/x");
        assert_eq!(up.admins, ["alice", "bob"]);
        assert_eq!(up.ports, ["443", "5432/udp"]);
        assert_eq!(
            up.tags,
            [(String::from("repo"), String::from("acme/web"))]
        );
        assert!(up.disable_swap);
    }

    #[rstest]
    #[case("novalue")]
    #[case("=value")]
    fn rejects_malformed_tags(#[case] raw: &str) {
        assert!(parse_tag(raw).is_err());
    }

    #[rstest]
    fn down_requires_a_name() {
        assert!(Cli::try_parse_from(["vista", "down"]).is_err());
    }
}
