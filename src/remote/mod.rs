//! Remote command execution over the system `ssh` client.
//!
//! Every call authenticates with the short-lived key pair and certificate
//! issued by the provider. The credentials are written to an owner-only
//! staging directory for the duration of a single invocation and deleted as
//! soon as it returns. Each attempt is appended to a history so the caller can
//! report whether every remote step succeeded.

mod staging;

use std::ffi::OsString;
use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

use crate::compute::AccessDetails;

pub use staging::{StagedFile, StagingDir};

/// SSH options applied to every invocation.
pub const SSH_OPTIONS: [&str; 6] = [
    "ServerAliveInterval=15",
    "IdentitiesOnly=yes",
    "StrictHostKeyChecking=no",
    "UserKnownHostsFile=/dev/null",
    "LogLevel=ERROR",
    "ConnectTimeout=10",
];

const PRIVATE_KEY_FILE: &str = "id_session";
const CERTIFICATE_FILE: &str = "id_session-cert.pub";

/// Errors raised while executing remote commands.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RemoteError {
    /// Raised when the SSH client cannot be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error message.
        message: String,
    },
    /// Raised when a credential or artifact cannot be staged locally.
    #[error("failed to stage {path}: {message}")]
    Staging {
        /// Local path being written.
        path: Utf8PathBuf,
        /// Operating system error message.
        message: String,
    },
}

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with `args`, feeding `input` to its standard input.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Spawn`] if the command cannot be started.
    fn run(
        &self,
        program: &str,
        args: &[OsString],
        input: Option<&[u8]>,
    ) -> Result<CommandOutput, RemoteError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[OsString],
        input: Option<&[u8]>,
    ) -> Result<CommandOutput, RemoteError> {
        let spawn_error = |err: std::io::Error| RemoteError::Spawn {
            program: program.to_owned(),
            message: err.to_string(),
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        if let (Some(bytes), Some(mut stdin)) = (input, child.stdin.take()) {
            match stdin.write_all(bytes) {
                Ok(()) => {}
                // The exit status below reports why the child stopped reading.
                Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                    debug!(program, "child closed its input early");
                }
                Err(err) => return Err(spawn_error(err)),
            }
        }

        let output = child.wait_with_output().map_err(spawn_error)?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// One remote command and whether it exited successfully.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshAttempt {
    /// Command executed on the instance.
    pub command: String,
    /// `true` when the command exited with status zero.
    pub success: bool,
}

/// Runs commands on an instance and records their outcomes.
#[derive(Debug)]
pub struct RemoteExecutor<R: CommandRunner> {
    runner: R,
    ssh_bin: String,
    staging: StagingDir,
    history: Vec<SshAttempt>,
}

impl<R: CommandRunner> RemoteExecutor<R> {
    /// Creates an executor that stages credentials in `staging`.
    #[must_use]
    pub fn new(runner: R, ssh_bin: impl Into<String>, staging: StagingDir) -> Self {
        Self {
            runner,
            ssh_bin: ssh_bin.into(),
            staging,
            history: Vec::new(),
        }
    }

    /// Executes `command` on the instance described by `access`.
    ///
    /// Returns whether the command exited with status zero. Non-zero exits are
    /// recorded in the history and are not errors.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when credentials cannot be staged or the SSH
    /// client cannot be spawned.
    ///
    /// # Security
    ///
    /// `command` is passed verbatim to the remote shell.
    pub fn execute(
        &mut self,
        access: &AccessDetails,
        command: &str,
        input: Option<&[u8]>,
    ) -> Result<bool, RemoteError> {
        let output = self.invoke(access, command, input)?;
        let success = output.is_success();
        if success {
            debug!(host = %access.ip_address, command, "remote command succeeded");
        } else {
            warn!(
                host = %access.ip_address,
                command,
                status = ?output.code,
                stderr = %output.stderr.trim(),
                "remote command failed"
            );
        }
        self.history.push(SshAttempt {
            command: command.to_owned(),
            success,
        });
        Ok(success)
    }

    /// Executes `command` without recording it in the history.
    ///
    /// Used for readiness checks where a non-zero exit only means "not yet".
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when credentials cannot be staged or the SSH
    /// client cannot be spawned.
    pub fn probe(&self, access: &AccessDetails, command: &str) -> Result<bool, RemoteError> {
        let output = self.invoke(access, command, None)?;
        debug!(host = %access.ip_address, command, status = ?output.code, "probe finished");
        Ok(output.is_success())
    }

    fn invoke(
        &self,
        access: &AccessDetails,
        command: &str,
        input: Option<&[u8]>,
    ) -> Result<CommandOutput, RemoteError> {
        let key = self
            .staging
            .write_private(PRIVATE_KEY_FILE, access.private_key.as_bytes())?;
        let cert = self
            .staging
            .write_private(CERTIFICATE_FILE, access.cert_key.as_bytes())?;
        let args = ssh_args(access, &key, &cert, command);
        self.runner.run(&self.ssh_bin, &args, input)
    }

    /// Copies `contents` to `target` on the instance and applies `mode`.
    ///
    /// The artifact is staged locally as `artifact` and streamed through the
    /// SSH channel's standard input.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when staging or spawning fails.
    pub fn upload(
        &mut self,
        access: &AccessDetails,
        artifact: &str,
        contents: &str,
        target: &str,
        mode: &str,
    ) -> Result<bool, RemoteError> {
        let staged = self.staging.write_private(artifact, contents.as_bytes())?;
        let bytes = std::fs::read(staged.path()).map_err(|err| RemoteError::Staging {
            path: staged.path().to_path_buf(),
            message: err.to_string(),
        })?;
        drop(staged);

        let target_arg = shell_escape::unix::escape(target.into());
        let command = format!("cat - > {target_arg} && chmod {mode} {target_arg}");
        self.execute(access, &command, Some(&bytes))
    }

    /// Returns `true` when every recorded command succeeded.
    #[must_use]
    pub fn success(&self) -> bool {
        self.history.iter().all(|attempt| attempt.success)
    }

    /// Returns the recorded attempts in execution order.
    #[must_use]
    pub fn history(&self) -> &[SshAttempt] {
        &self.history
    }

    /// Returns the underlying command runner.
    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }
}

fn ssh_args(
    access: &AccessDetails,
    key: &StagedFile<'_>,
    cert: &StagedFile<'_>,
    command: &str,
) -> Vec<OsString> {
    let mut args = Vec::with_capacity(SSH_OPTIONS.len() * 2 + 6);
    for option in SSH_OPTIONS {
        args.push(OsString::from("-o"));
        args.push(OsString::from(option));
    }
    args.push(OsString::from("-o"));
    args.push(OsString::from(format!("CertificateFile={}", cert.path())));
    args.push(OsString::from("-i"));
    args.push(OsString::from(key.path().as_str()));
    args.push(OsString::from(format!(
        "{}@{}",
        access.username, access.ip_address
    )));
    args.push(OsString::from(command));
    args
}
