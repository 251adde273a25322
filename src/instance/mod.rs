//! Lifecycle of a single preview instance.
//!
//! An [`Instance`] walks through launch, the two readiness polls, ingress
//! configuration and the deploy of the scripts that start the application.
//! Every cloud interaction goes through [`ComputeApi`] and every remote step
//! through [`RemoteExecutor`], so the whole flow can be exercised with test
//! doubles.

mod error;
mod options;
mod snapshot;

use std::collections::BTreeMap;

use tracing::{debug, error, info, warn};

use crate::compute::{AccessDetails, ComputeApi, InstanceDetails, LaunchRequest, Snapshot};
use crate::firewall::port_rules;
use crate::hostname::{derive_hostname, public_url};
use crate::keys::KeySource;
use crate::naming::normalize_name;
use crate::provision::{
    AUTHORIZED_KEYS_PATH, READY_MARKER_PATH, REMOTE_APP_PATH, REMOTE_PRE_SCRIPT_PATH,
    REMOTE_UPDATE_SCRIPT_PATH, UpdateScriptContext, compile_registry_script,
    render_update_script, restart_command, setup_command,
};
use crate::remote::{CommandRunner, RemoteExecutor};
use crate::wait::try_wait_until;

pub use error::InstanceError;
pub use options::{
    DEFAULT_COMPOSE_FILE, DEFAULT_DNS, DEFAULT_PORT, DeploySettings, InstanceOptions,
    InstanceOptionsBuilder, LaunchTarget,
};
pub use snapshot::{AVAILABLE_STATE, select_latest_snapshot};

/// Tag key identifying resources created by this tool.
pub const STACK_TAG_KEY: &str = "stack";

/// Value of [`STACK_TAG_KEY`].
pub const STACK_NAME: &str = "vista";

const RUNNING_STATE: &str = "running";

/// Lazily populated lookups, scoped to one [`Instance`].
#[derive(Clone, Debug, Default)]
pub struct InstanceCache {
    ssh_public_keys: Option<Vec<String>>,
    latest_snapshot: Option<Option<Snapshot>>,
    instance_details: Option<InstanceDetails>,
    access_details: Option<AccessDetails>,
}

/// Addresses reported once an instance is provisioned.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Provisioned {
    /// URL of the preview environment.
    pub url: String,
    /// Public IP address of the instance.
    pub public_ip: String,
    /// Derived public hostname.
    pub hostname: String,
}

type InstanceResult<T, C> = Result<T, InstanceError<<C as ComputeApi>::Error>>;

/// A preview instance and the collaborators needed to drive it.
#[derive(Debug)]
pub struct Instance<C, R, K>
where
    C: ComputeApi,
    R: CommandRunner,
    K: KeySource,
{
    name: String,
    options: InstanceOptions,
    settings: DeploySettings,
    compute: C,
    remote: RemoteExecutor<R>,
    keys: K,
    cache: InstanceCache,
}

impl<C, R, K> Instance<C, R, K>
where
    C: ComputeApi,
    R: CommandRunner,
    K: KeySource,
{
    /// Creates an instance handle; the name is normalised immediately.
    #[must_use]
    pub fn new(
        options: InstanceOptions,
        settings: DeploySettings,
        compute: C,
        remote: RemoteExecutor<R>,
        keys: K,
    ) -> Self {
        Self {
            name: normalize_name(&options.name),
            options,
            settings,
            compute,
            remote,
            keys,
            cache: InstanceCache::default(),
        }
    }

    /// Normalised instance name used for every cloud API call.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved caller options.
    #[must_use]
    pub const fn options(&self) -> &InstanceOptions {
        &self.options
    }

    /// Remote executor holding the command history.
    #[must_use]
    pub const fn remote(&self) -> &RemoteExecutor<R> {
        &self.remote
    }

    /// Returns `true` when every remote command recorded so far succeeded.
    #[must_use]
    pub fn success(&self) -> bool {
        self.remote.success()
    }

    /// Public keys of all admins, in admin order and without duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::Keys`] when a key listing cannot be fetched.
    pub async fn ssh_public_keys(&mut self) -> InstanceResult<Vec<String>, C> {
        if let Some(keys) = &self.cache.ssh_public_keys {
            return Ok(keys.clone());
        }

        let mut keys: Vec<String> = Vec::new();
        for admin in &self.options.admins {
            for key in self.keys.public_keys(admin).await? {
                if !key.is_empty() && !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        debug!(instance = %self.name, count = keys.len(), "resolved admin public keys");
        self.cache.ssh_public_keys = Some(keys.clone());
        Ok(keys)
    }

    /// Newest snapshot this instance can be restored from, if any.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::Compute`] when listing snapshots fails.
    pub async fn latest_snapshot(&mut self) -> InstanceResult<Option<Snapshot>, C> {
        if let Some(cached) = &self.cache.latest_snapshot {
            return Ok(cached.clone());
        }

        let snapshots = self
            .compute
            .snapshots()
            .await
            .map_err(InstanceError::compute("get_instance_snapshots"))?;
        let latest = select_latest_snapshot(snapshots, &self.settings.snapshot_name, &self.name);
        self.cache.latest_snapshot = Some(latest.clone());
        Ok(latest)
    }

    /// Instance attributes reported by the provider, cached after the first
    /// successful lookup.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::Compute`] when the lookup fails.
    pub async fn instance_details(&mut self) -> InstanceResult<InstanceDetails, C> {
        if let Some(details) = &self.cache.instance_details {
            return Ok(details.clone());
        }

        let details = self
            .compute
            .instance(&self.name)
            .await
            .map_err(InstanceError::compute("get_instance"))?;
        self.cache.instance_details = Some(details.clone());
        Ok(details)
    }

    async fn access_details(&mut self) -> InstanceResult<AccessDetails, C> {
        if let Some(access) = &self.cache.access_details {
            return Ok(access.clone());
        }

        let access = self
            .compute
            .access_details(&self.name)
            .await
            .map_err(InstanceError::compute("get_instance_access_details"))?;
        debug!(instance = %self.name, access = ?access, "fetched access details");
        self.cache.access_details = Some(access.clone());
        Ok(access)
    }

    /// Public IP address, as reported with the SSH access details.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::Compute`] when the access details cannot be
    /// fetched.
    pub async fn public_ip(&mut self) -> InstanceResult<String, C> {
        Ok(self.access_details().await?.ip_address)
    }

    /// Certificate-safe public hostname of the instance.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`Instance::public_ip`].
    pub async fn public_dns(&mut self) -> InstanceResult<String, C> {
        let public_ip = self.public_ip().await?;
        Ok(derive_hostname(
            &self.options.subdomain,
            self.options.ip_prefix.as_deref(),
            &public_ip,
            &self.options.dns,
        ))
    }

    /// URL of the preview environment.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`Instance::public_ip`].
    pub async fn url(&mut self) -> InstanceResult<String, C> {
        let hostname = self.public_dns().await?;
        Ok(public_url(
            &self.options.default_port,
            self.settings.basic_auth.as_deref(),
            &hostname,
        ))
    }

    /// Creates the instance, restoring the latest snapshot when one exists.
    ///
    /// `tags` are merged over the stack tag; caller values win.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError`] when keys, snapshots or the create call fail.
    pub async fn launch(
        &mut self,
        target: &LaunchTarget,
        tags: &BTreeMap<String, String>,
    ) -> InstanceResult<(), C> {
        let mut merged = BTreeMap::from([(STACK_TAG_KEY.to_owned(), STACK_NAME.to_owned())]);
        merged.extend(tags.iter().map(|(key, value)| (key.clone(), value.clone())));

        let mut request = LaunchRequest {
            name: self.name.clone(),
            availability_zone: target.availability_zone.clone(),
            bundle_id: target.bundle_id.clone(),
            user_data: String::new(),
            tags: merged,
        };

        if let Some(snapshot) = self.latest_snapshot().await? {
            info!(instance = %self.name, snapshot = %snapshot.name, "restoring instance from snapshot");
            request.user_data = restart_command();
            self.compute
                .create_from_snapshot(&request, &snapshot.name)
                .await
                .map_err(InstanceError::compute("create_instances_from_snapshot"))?;
        } else {
            let keys = self.ssh_public_keys().await?;
            info!(
                instance = %self.name,
                blueprint = %target.blueprint_id,
                "creating instance from blueprint"
            );
            request.user_data = setup_command(&keys, self.options.swap_enabled);
            self.compute
                .create_from_blueprint(&request, &target.blueprint_id)
                .await
                .map_err(InstanceError::compute("create_instances"))?;
        }
        Ok(())
    }

    /// Polls until the provider reports the instance as running.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::Timeout`] when the budget is exhausted and
    /// [`InstanceError::Compute`] for API failures other than not-found.
    pub async fn wait_until_running(&mut self) -> InstanceResult<(), C> {
        self.cache.instance_details = None;
        let budget = self.settings.poll;
        let this = &*self;
        let running = try_wait_until(budget, || this.is_running()).await?;
        if !running {
            error!(instance = %self.name, "timeout while waiting for instance to run");
            return Err(InstanceError::Timeout {
                condition: "become running",
                instance: self.name.clone(),
            });
        }

        let details = self.instance_details().await?;
        info!(
            instance = %self.name,
            public_ip = details.public_ip.as_deref().unwrap_or_default(),
            "instance is running"
        );
        Ok(())
    }

    async fn is_running(&self) -> InstanceResult<bool, C> {
        info!(instance = %self.name, "waiting for instance to be running");
        let state = self
            .compute
            .instance_state(&self.name)
            .await
            .map_err(InstanceError::compute("get_instance_state"))?;
        Ok(state.as_deref() == Some(RUNNING_STATE))
    }

    /// Polls until the ready marker written on first boot exists.
    ///
    /// Probes are not recorded in the command history.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::Timeout`] when the budget is exhausted.
    pub async fn wait_until_ssh_ready(&mut self) -> InstanceResult<(), C> {
        let access = self.access_details().await?;
        let command = format!("test -f {READY_MARKER_PATH}");
        let budget = self.settings.poll;
        let remote = &self.remote;
        let name = &self.name;
        let ready = try_wait_until(budget, || {
            info!(instance = %name, "waiting for ssh");
            let probe = remote.probe(&access, &command);
            async move { probe }
        })
        .await?;

        if ready {
            info!(instance = %self.name, "instance ssh access ok");
            Ok(())
        } else {
            error!(instance = %self.name, "instance ssh access ko");
            Err(InstanceError::Timeout {
                condition: "accept SSH connections",
                instance: self.name.clone(),
            })
        }
    }

    /// Applies the ingress rules derived from the configured ports.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::Firewall`] for invalid port specifications and
    /// [`InstanceError::Compute`] when the rules cannot be applied.
    pub async fn open_ports(&mut self) -> InstanceResult<(), C> {
        let rules = port_rules(&self.options.ports, &self.options.cidrs)?;
        info!(instance = %self.name, ports = ?self.options.ports, "opening ports");
        self.compute
            .put_public_ports(&self.name, &rules)
            .await
            .map_err(InstanceError::compute("put_instance_public_ports"))
    }

    /// Re-deploys the authorised keys file.
    ///
    /// Returns whether the copy succeeded; failures are only recorded.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError`] when keys or credentials cannot be obtained
    /// or the SSH client cannot be started.
    pub async fn setup_ssh_access(&mut self) -> InstanceResult<bool, C> {
        let keys = self.ssh_public_keys().await?.join("\n");
        let access = self.access_details().await?;
        let copied = self
            .remote
            .upload(&access, "authorized_keys", &keys, AUTHORIZED_KEYS_PATH, "0600")?;
        if !copied {
            warn!(instance = %self.name, "unable to refresh authorized keys");
        }
        Ok(copied)
    }

    /// Renders the update script and copies it to the instance.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::Transfer`] when the copy fails.
    pub async fn setup_update_script(&mut self) -> InstanceResult<(), C> {
        let public_ip = self.public_ip().await?;
        let public_dns = self.public_dns().await?;
        let url = self.url().await?;
        let script = render_update_script(&UpdateScriptContext {
            remote_app_path: REMOTE_APP_PATH.to_owned(),
            compose_files: self.options.compose_files.clone(),
            public_ip,
            public_dns,
            admins: self.options.admins.clone(),
            url,
            custom_launch_command: self.settings.launch_command.clone(),
            custom_env_vars: self.settings.env_vars.clone(),
        })?;

        self.copy_required("update script", &script, REMOTE_UPDATE_SCRIPT_PATH)
            .await
    }

    /// Compiles the registry login script and copies it to the instance.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::Transfer`] when the copy fails.
    pub async fn setup_prepost_scripts(&mut self) -> InstanceResult<(), C> {
        let compiled = compile_registry_script(&self.options.registries);
        if !compiled.skipped.is_empty() {
            debug!(
                instance = %self.name,
                skipped = compiled.skipped.len(),
                "some registries were skipped"
            );
        }
        self.copy_required("pre script", &compiled.script, REMOTE_PRE_SCRIPT_PATH)
            .await
    }

    async fn copy_required(
        &mut self,
        artifact: &'static str,
        contents: &str,
        target: &'static str,
    ) -> InstanceResult<(), C> {
        let access = self.access_details().await?;
        let file_name = artifact.replace(' ', "_");
        if self
            .remote
            .upload(&access, &file_name, contents, target, "0755")?
        {
            Ok(())
        } else {
            error!(instance = %self.name, artifact, target, "copy failed");
            Err(InstanceError::Transfer { artifact, target })
        }
    }

    /// Runs the whole launch sequence and reports the public addresses.
    ///
    /// # Errors
    ///
    /// Returns the first [`InstanceError`] raised by a step.
    pub async fn provision(
        &mut self,
        target: &LaunchTarget,
        tags: &BTreeMap<String, String>,
    ) -> InstanceResult<Provisioned, C> {
        self.launch(target, tags).await?;
        self.wait_until_running().await?;
        self.open_ports().await?;
        self.wait_until_ssh_ready().await?;
        self.setup_ssh_access().await?;
        self.setup_update_script().await?;
        self.setup_prepost_scripts().await?;

        let provisioned = Provisioned {
            url: self.url().await?,
            public_ip: self.public_ip().await?,
            hostname: self.public_dns().await?,
        };
        info!(
            instance = %self.name,
            url = %provisioned.url,
            public_ip = %provisioned.public_ip,
            "instance provisioned"
        );
        Ok(provisioned)
    }

    /// Executes the deployed update script.
    ///
    /// The outcome is recorded in the history and returned; a failing script
    /// is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError`] when credentials cannot be obtained or the
    /// SSH client cannot be started.
    pub async fn run_update_script(&mut self) -> InstanceResult<bool, C> {
        let access = self.access_details().await?;
        info!(instance = %self.name, "running update script");
        Ok(self
            .remote
            .execute(&access, REMOTE_UPDATE_SCRIPT_PATH, None)?)
    }

    /// Deletes the instance.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::Destroy`] when the provider reports any error
    /// code, even an empty one, for the delete operation.
    pub async fn destroy(&mut self) -> InstanceResult<(), C> {
        info!(instance = %self.name, "destroying instance");
        let operations = self
            .compute
            .delete_instance(&self.name)
            .await
            .map_err(InstanceError::compute("delete_instance"))?;

        match operations.into_iter().next() {
            Some(operation) => match operation.error_code {
                Some(code) => Err(InstanceError::Destroy {
                    code,
                    details: operation.error_details.unwrap_or_default(),
                }),
                None => {
                    info!(instance = %self.name, "instance destroyed");
                    Ok(())
                }
            },
            None => {
                info!(instance = %self.name, "no delete operation reported");
                Ok(())
            }
        }
    }
}
