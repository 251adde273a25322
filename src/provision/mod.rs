//! Shell payloads executed on the preview instance.
//!
//! The bootstrap payload is handed to the provider as user-data and runs once
//! on first boot. Instances restored from a snapshot already carry the whole
//! setup, so they only restart the container engine.

mod registry;
mod update_script;

pub use registry::{
    DEFAULT_REGISTRY_HOST, REGISTRY_SCHEME, RegistryScript, SkippedRegistry,
    TOKEN_PLACEHOLDER_USERNAME, compile_registry_script,
};
pub use update_script::{ScriptError, UpdateScriptContext, render_update_script};

/// Login user created by the base image.
pub const ADMIN_USER: &str = "ec2-user";

/// Authorised keys file of [`ADMIN_USER`].
pub const AUTHORIZED_KEYS_PATH: &str = "/home/ec2-user/.ssh/authorized_keys";

/// Directory on the instance that holds the application checkout.
pub const REMOTE_APP_PATH: &str = "/app";

/// Directory holding orchestrator state on the instance.
pub const STATE_DIR: &str = "/etc/vista";

/// Sentinel file signalling that first-boot provisioning completed.
pub const READY_MARKER_PATH: &str = "/etc/vista/ready";

/// Environment file sourced by login shells and the update script.
pub const ENV_FILE_PATH: &str = "/etc/vista/env";

/// Remote location of the rendered update script.
pub const REMOTE_UPDATE_SCRIPT_PATH: &str = "/tmp/update_script.sh";

/// Remote location of the registry login script.
pub const REMOTE_PRE_SCRIPT_PATH: &str = "/tmp/pre_script.sh";

/// Release of the docker compose CLI plugin installed on first boot.
pub const COMPOSE_VERSION: &str = "v2.29.7";

const PROFILE_SNIPPET_PATH: &str = "/etc/profile.d/vista.sh";
const COMPOSE_PLUGIN_DIR: &str = "/usr/local/lib/docker/cli-plugins";

/// Builds the first-boot payload as a single `&&`-joined command.
///
/// Steps, in order: authorise admin keys, prepare the application directory
/// and login profile, optionally tune swap, install and start docker with the
/// compose plugin, and finally create the ready marker.
#[must_use]
pub fn setup_command(ssh_public_keys: &[String], swap_enabled: bool) -> String {
    let mut steps = vec![ssh_access(ssh_public_keys)];
    steps.extend(prepare_user(REMOTE_APP_PATH));
    if swap_enabled {
        steps.extend(setup_swapping());
    }
    steps.extend(install_and_setup_docker());
    steps.push(finish_setup());

    steps
        .into_iter()
        .filter(|step| !step.is_empty())
        .collect::<Vec<_>>()
        .join(" && ")
}

/// Builds the payload for an instance restored from a snapshot.
#[must_use]
pub fn restart_command() -> String {
    String::from("service docker restart")
}

fn ssh_access(ssh_public_keys: &[String]) -> String {
    format!(
        "echo '{}' > {AUTHORIZED_KEYS_PATH}",
        ssh_public_keys.join("\n")
    )
}

fn prepare_user(remote_app_path: &str) -> Vec<String> {
    vec![
        format!(
            "mkdir -p {remote_app_path} && chown -R {ADMIN_USER}:{ADMIN_USER} {remote_app_path}"
        ),
        format!("echo 'cd {remote_app_path}' > {PROFILE_SNIPPET_PATH}"),
        format!(
            "echo '[[ -f {ENV_FILE_PATH} ]] && set -o allexport && source {ENV_FILE_PATH} && set +o allexport' >> {PROFILE_SNIPPET_PATH}"
        ),
    ]
}

fn setup_swapping() -> Vec<String> {
    vec![
        String::from(
            r"sed -i '/^tmpfs/c\tmpfs       \/dev\/shm    tmpfs   defaults,size=256M  0   0' /etc/fstab",
        ),
        String::from("echo 'vm.vfs_cache_pressure=50' | tee -a /etc/sysctl.conf"),
    ]
}

fn install_and_setup_docker() -> Vec<String> {
    vec![
        String::from("yum install -y docker"),
        format!("mkdir -p {COMPOSE_PLUGIN_DIR}"),
        format!(
            "curl -fsSL \"https://github.com/docker/compose/releases/download/{COMPOSE_VERSION}/docker-compose-linux-$(uname -m)\" -o {COMPOSE_PLUGIN_DIR}/docker-compose"
        ),
        format!("chmod +x {COMPOSE_PLUGIN_DIR}/docker-compose"),
        format!("usermod -aG docker {ADMIN_USER}"),
        String::from("service docker start"),
        String::from(
            "echo 'docker image prune -a --filter=\"until=96h\" --force' > /etc/cron.daily/docker-prune && chmod a+x /etc/cron.daily/docker-prune",
        ),
    ]
}

fn finish_setup() -> String {
    format!(
        "mkdir -p {STATE_DIR} && touch {READY_MARKER_PATH} && chown -R {ADMIN_USER}:{ADMIN_USER} {STATE_DIR}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Vec<String> {
        vec![
            String::from("ssh-ed25519 AAAA alice"),
            String::from("ssh-rsa BBBB bob"),
        ]
    }

    #[test]
    fn setup_command_orders_steps() {
        let command = setup_command(&keys(), true);
        let positions: Vec<usize> = [
            AUTHORIZED_KEYS_PATH,
            PROFILE_SNIPPET_PATH,
            "vm.vfs_cache_pressure",
            "yum install -y docker",
            READY_MARKER_PATH,
        ]
        .iter()
        .map(|needle| {
            command
                .find(needle)
                .unwrap_or_else(|| panic!("missing {needle} in {command}"))
        })
        .collect();

        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted, "steps out of order: {command}");
    }

    #[test]
    fn setup_command_writes_every_key() {
        let command = setup_command(&keys(), false);
        assert!(command.starts_with("echo 'ssh-ed25519 AAAA alice\nssh-rsa BBBB bob' > "));
    }

    #[test]
    fn swap_steps_are_optional() {
        let without = setup_command(&keys(), false);
        assert!(!without.contains("/etc/fstab"));
        assert!(!without.contains("vfs_cache_pressure"));

        let with = setup_command(&keys(), true);
        assert!(with.contains("size=256M"));
    }

    #[test]
    fn setup_command_installs_prune_job_and_marker() {
        let command = setup_command(&keys(), true);
        assert!(command.contains("until=96h"));
        assert!(command.contains("usermod -aG docker ec2-user"));
        assert!(command.ends_with("chown -R ec2-user:ec2-user /etc/vista"));
        assert!(!command.contains(" &&  && "));
    }

    #[test]
    fn restart_command_only_restarts_docker() {
        assert_eq!(restart_command(), "service docker restart");
    }
}
