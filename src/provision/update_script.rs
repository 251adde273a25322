//! Rendering of the deploy script copied to the instance.

use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

const UPDATE_SCRIPT_TEMPLATE: &str = include_str!("update_script.sh.tera");

/// Values substituted into the update script template.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct UpdateScriptContext {
    /// Application directory on the instance.
    pub remote_app_path: String,
    /// Compose files passed to `docker compose -f`.
    pub compose_files: Vec<String>,
    /// Public IP address of the instance.
    pub public_ip: String,
    /// Derived public hostname.
    pub public_dns: String,
    /// Admin identities with SSH access.
    pub admins: Vec<String>,
    /// URL reported for the preview environment.
    pub url: String,
    /// Command replacing the default `docker compose up` when not empty.
    pub custom_launch_command: String,
    /// Extra `KEY=value` lines appended to the environment file.
    pub custom_env_vars: String,
}

/// Errors raised while rendering the update script.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Raised when the template cannot be rendered with the given context.
    #[error("failed to render update script: {0}")]
    Render(#[from] tera::Error),
}

/// Renders the update script for `context`.
///
/// # Errors
///
/// Returns [`ScriptError::Render`] when template rendering fails.
pub fn render_update_script(context: &UpdateScriptContext) -> Result<String, ScriptError> {
    let values = Context::from_serialize(context)?;
    Ok(Tera::one_off(UPDATE_SCRIPT_TEMPLATE, &values, false)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn context() -> UpdateScriptContext {
        UpdateScriptContext {
            remote_app_path: String::from("/app"),
            compose_files: vec![
                String::from("docker-compose.yml"),
                String::from("docker-compose.preview.yml"),
            ],
            public_ip: String::from("3.4.5.6"),
            public_dns: String::from("feature-3-4-5-6.nip.io"),
            admins: vec![String::from("alice"), String::from("bob")],
            url: String::from("http://feature-3-4-5-6.nip.io:80"),
            custom_launch_command: String::new(),
            custom_env_vars: String::from("FOO=bar"),
        }
    }

    #[rstest]
    fn renders_default_compose_launch(context: UpdateScriptContext) {
        let script = render_update_script(&context).expect("template renders");

        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains("cd /app"));
        assert!(script.contains("PREVIEW_URL=http://feature-3-4-5-6.nip.io:80"));
        assert!(script.contains("PREVIEW_ADMINS=alice,bob"));
        assert!(script.contains("FOO=bar"));
        assert!(script.contains(
            "docker compose -f docker-compose.yml -f docker-compose.preview.yml up --wait --remove-orphans -d"
        ));
    }

    #[rstest]
    fn custom_launch_command_replaces_compose(context: UpdateScriptContext) {
        let custom = UpdateScriptContext {
            custom_launch_command: String::from("make preview"),
            ..context
        };
        let script = render_update_script(&custom).expect("template renders");

        assert!(script.contains("make preview"));
        assert!(!script.contains("docker compose"));
    }

    #[rstest]
    fn runs_registry_logins_before_launch(context: UpdateScriptContext) {
        let script = render_update_script(&context).expect("template renders");
        let pre_script = script.find("/tmp/pre_script.sh").expect("pre script call");
        let launch = script.find("docker compose").expect("launch call");
        assert!(pre_script < launch);
    }
}
