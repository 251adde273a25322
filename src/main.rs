//! Binary entry point for the `vista` CLI.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vista::{
    ConfigError, DeploySettings, GitHubKeys, Instance, InstanceError, InstanceOptions,
    LightsailApi, LightsailError, ProcessCommandRunner, RemoteError, RemoteExecutor, StagingDir,
    VistaConfig,
};

mod cli;

use cli::{Cli, DownCommand, UpCommand};

/// Environment variable holding the log filter directives.
const LOG_ENV: &str = "VISTA_LOG";

type LiveInstance = Instance<LightsailApi, ProcessCommandRunner, GitHubKeys>;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("local staging error: {0}")]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Instance(#[from] InstanceError<LightsailError>),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Up(command) => up(&command).await,
        Cli::Down(command) => down(command).await,
    }
}

async fn up(command: &UpCommand) -> Result<i32, CliError> {
    let config = VistaConfig::load_without_cli_args()?;
    let target = config.launch_target()?;
    let tags: BTreeMap<String, String> = command.tags.iter().cloned().collect();
    let mut instance = connect(
        &config,
        instance_options(command),
        config.deploy_settings(),
    )
    .await?;

    let provisioned = instance.provision(&target, &tags).await?;
    instance.run_update_script().await?;

    writeln!(io::stdout(), "{}", provisioned.url).ok();
    if instance.success() {
        info!(url = %provisioned.url, "preview environment ready");
        Ok(0)
    } else {
        warn!(url = %provisioned.url, "one or more remote steps failed");
        Ok(1)
    }
}

async fn down(command: DownCommand) -> Result<i32, CliError> {
    let config = VistaConfig::load_without_cli_args()?;
    config.validate()?;
    let options = InstanceOptions::builder(command.name).build();
    let mut instance = connect(&config, options, config.deploy_settings()).await?;
    instance.destroy().await?;
    Ok(0)
}

async fn connect(
    config: &VistaConfig,
    options: InstanceOptions,
    settings: DeploySettings,
) -> Result<LiveInstance, CliError> {
    let compute = LightsailApi::from_region(config.region.trim()).await;
    let remote = RemoteExecutor::new(
        ProcessCommandRunner,
        config.ssh_bin.trim(),
        StagingDir::in_temp_dir()?,
    );
    let keys = GitHubKeys::new(config.keys_base_url.trim());
    Ok(Instance::new(options, settings, compute, remote, keys))
}

fn instance_options(command: &UpCommand) -> InstanceOptions {
    InstanceOptions::builder(command.name.clone())
        .subdomain(command.subdomain.clone().unwrap_or_default())
        .admins(command.admins.iter().cloned())
        .cidrs(command.cidrs.iter().cloned())
        .default_port(command.default_port.clone().unwrap_or_default())
        .ports(command.ports.iter().cloned())
        .compose_files(command.compose_files.iter().cloned())
        .registries(command.registries.iter().cloned())
        .dns(command.dns.clone().unwrap_or_default())
        .ip_prefix(command.ip_prefix.clone())
        .disable_swap(command.disable_swap)
        .build()
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use vista::DEFAULT_DNS;

    #[rstest]
    fn instance_options_follow_flags() {
        let cli = Cli::try_parse_from([
            "vista",
            "up",
            "Feature_X",
            "--admin",
            "alice",
            "--default-port",
            "443",
            "--port",
            "8080",
            "--ip-prefix",
            "preview",
            "--disable-swap",
        ])
        .expect("valid arguments");
        let Cli::Up(command) = cli else {
            panic!("expected up command");
        };

        let options = instance_options(&command);
        assert_eq!(options.subdomain, "feature-x");
        assert_eq!(options.admins, ["alice"]);
        assert_eq!(options.ports, ["8080", "443", "22"]);
        assert_eq!(options.dns, DEFAULT_DNS);
        assert_eq!(options.ip_prefix.as_deref(), Some("preview"));
        assert!(!options.swap_enabled);
    }

    #[rstest]
    fn write_error_renders_instance_errors() {
        let mut buf = Vec::new();
        let err = CliError::Instance(InstanceError::Destroy {
            code: String::from("NotFound"),
            details: String::from("instance is gone"),
        });
        write_error(&mut buf, &err);
        let rendered = String::from_utf8(buf).expect("utf8");
        assert_eq!(rendered, "failed to destroy instance: NotFound instance is gone\n");
    }

    #[rstest]
    fn write_error_renders_config_errors() {
        let mut buf = Vec::new();
        let err = CliError::Config(ConfigError::Invalid(String::from("bad")));
        write_error(&mut buf, &err);
        let rendered = String::from_utf8(buf).expect("utf8");
        assert!(rendered.starts_with("configuration error:"), "{rendered}");
    }
}
