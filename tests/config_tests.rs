//! Validation and loading tests for the provider configuration.

use rstest::*;
use vista::{LaunchTarget, RetryBudget, VistaConfig, config::ConfigError};

#[fixture]
fn valid_config() -> VistaConfig {
    VistaConfig {
        region: String::from("eu-west-1"),
        availability_zone: String::from("eu-west-1a"),
        bundle_id: String::from("medium_2_0"),
        blueprint_id: String::from("amazon_linux_2"),
        ..VistaConfig::default()
    }
}

#[rstest]
fn defaults_validate(valid_config: VistaConfig) {
    assert!(valid_config.validate().is_ok());
    assert!(VistaConfig::default().validate().is_ok());
}

/// Each required field names the environment variable and the TOML key that
/// supply it.
#[rstest]
#[case::region(|cfg: &mut VistaConfig| cfg.region.clear(), "VISTA_REGION", "region")]
#[case::zone(
    |cfg: &mut VistaConfig| cfg.availability_zone = String::from("  "),
    "VISTA_AVAILABILITY_ZONE",
    "availability_zone"
)]
#[case::bundle(|cfg: &mut VistaConfig| cfg.bundle_id.clear(), "VISTA_BUNDLE_ID", "bundle_id")]
#[case::blueprint(
    |cfg: &mut VistaConfig| cfg.blueprint_id.clear(),
    "VISTA_BLUEPRINT_ID",
    "blueprint_id"
)]
#[case::ssh_bin(|cfg: &mut VistaConfig| cfg.ssh_bin.clear(), "VISTA_SSH_BIN", "ssh_bin")]
#[case::keys(
    |cfg: &mut VistaConfig| cfg.keys_base_url.clear(),
    "VISTA_KEYS_BASE_URL",
    "keys_base_url"
)]
fn validation_errors_are_actionable(
    valid_config: VistaConfig,
    #[case] mutate: fn(&mut VistaConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    let mut cfg = valid_config;
    mutate(&mut cfg);

    let error = cfg.validate().expect_err("validation should fail");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error, got {error:?}");
    };
    assert!(message.contains(env_var), "should mention {env_var}: {message}");
    assert!(message.contains(toml_key), "should mention {toml_key}: {message}");
    assert!(message.contains("vista.toml"), "should mention vista.toml: {message}");
}

#[rstest]
fn zero_retries_are_rejected(valid_config: VistaConfig) {
    let cfg = VistaConfig {
        poll_max_retries: 0,
        ..valid_config
    };

    let error = cfg.validate().expect_err("zero retries should fail");
    assert!(
        matches!(error, ConfigError::Invalid(ref message) if message.contains("VISTA_POLL_MAX_RETRIES")),
        "unexpected error: {error}"
    );
}

#[rstest]
fn launch_target_copies_placement(valid_config: VistaConfig) {
    let cfg = VistaConfig {
        bundle_id: String::from(" medium_2_0 "),
        ..valid_config
    };

    let target = cfg
        .launch_target()
        .unwrap_or_else(|err| panic!("valid config yields target: {err}"));
    assert_eq!(
        target,
        LaunchTarget {
            availability_zone: String::from("eu-west-1a"),
            bundle_id: String::from("medium_2_0"),
            blueprint_id: String::from("amazon_linux_2"),
        }
    );
}

#[rstest]
fn launch_target_requires_valid_config(valid_config: VistaConfig) {
    let cfg = VistaConfig {
        region: String::new(),
        ..valid_config
    };
    assert!(cfg.launch_target().is_err());
}

#[tokio::test]
async fn environment_overrides_defaults() {
    let _guard = vista::test_support::EnvGuard::set_vars(&[
        ("VISTA_REGION", "ap-south-1"),
        ("VISTA_POLL_MAX_RETRIES", "7"),
        ("VISTA_SNAPSHOT_NAME", "golden"),
    ])
    .await;

    let config = VistaConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("config should load from env: {err}"));

    assert_eq!(config.region, "ap-south-1");
    assert_eq!(config.bundle_id, "small_2_0");
    assert_eq!(config.poll_max_retries, 7);
    assert_eq!(config.deploy_settings().snapshot_name, "golden");
    assert_eq!(
        config.retry_budget(),
        RetryBudget::new(7, std::time::Duration::from_secs(5))
    );
}
