//! Thin async wrapper around the `docker` command-line client.
//!
//! Every invocation is bounded by the command timeout of its [`DockerCli`]. A
//! command that runs over is killed and reported as [`DockerError::Timeout`].

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::{Output, Stdio},
    time::{Duration, Instant},
};

use hermetic_config::DEFAULT_COMMAND_TIMEOUT_SECS;
use tokio::process::Command;

/// Label attached to every container this crate creates.
pub const INSTANCE_LABEL: &str = "hermetic.instance";

/// Poll interval of the blocking removal used on `Drop` paths.
const BLOCKING_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A resolved `docker` executable.
#[derive(Debug, Clone)]
pub struct DockerCli {
    bin: PathBuf,
    timeout: Duration,
}

impl DockerCli {
    /// Locate `docker` in `PATH`.
    pub fn from_path() -> Result<Self, which::Error> {
        which::which("docker").map(Self::with_bin)
    }

    /// Use an explicit executable, which must exist.
    pub fn at(bin: impl Into<PathBuf>) -> Result<Self, which::Error> {
        which::which(bin.into()).map(Self::with_bin)
    }

    fn with_bin(bin: PathBuf) -> Self {
        Self {
            bin,
            timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }

    /// Upper bound on every command run through this client.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn bin(&self) -> &Path {
        &self.bin
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `docker <args>` and returns its trimmed stdout.
    pub async fn exec<I, S>(&self, args: I) -> Result<String, DockerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let output = self.output(args.into_iter().map(Into::into).collect()).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Force-removes a container and its anonymous volumes.
    ///
    /// A container that no longer exists counts as removed.
    pub async fn remove(&self, name: &str) -> Result<(), DockerError> {
        match self.exec(["rm", "-f", "-v", name]).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_no_such_container() => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Blocking variant of [`remove`](Self::remove) for `Drop` paths.
    ///
    /// Bounded by the same command timeout; a hung `docker rm` is killed.
    pub fn remove_blocking(&self, name: &str) -> Result<(), DockerError> {
        let mut child = std::process::Command::new(&self.bin)
            .args(["rm", "-f", "-v", name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DockerError::Spawn { source })?;

        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(DockerError::Timeout {
                        command: "rm".to_string(),
                        timeout: self.timeout,
                    });
                }
                Ok(None) => std::thread::sleep(BLOCKING_POLL_INTERVAL),
                Err(source) => return Err(DockerError::Spawn { source }),
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|source| DockerError::Spawn { source })?;
        match check_status(output) {
            Ok(_) => Ok(()),
            Err(err) if err.is_no_such_container() => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// The last `tail` log lines of a container, stdout and stderr interleaved.
    pub async fn logs(&self, name: &str, tail: usize) -> Result<String, DockerError> {
        let output = self
            .output(vec![
                "logs".into(),
                "--tail".into(),
                tail.to_string().into(),
                name.into(),
            ])
            .await?;

        // The postgres image logs to stderr
        let mut logs = String::from_utf8_lossy(&output.stdout).into_owned();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }

    /// Names of all containers, running or not, labelled with `instance`.
    pub async fn containers_for_instance(&self, instance: &str) -> Result<Vec<String>, DockerError> {
        let filter = format!("label={INSTANCE_LABEL}={instance}");
        let stdout = self
            .exec(["ps", "-a", "--filter", &filter, "--format", "{{.Names}}"])
            .await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Runs one command to completion within the timeout.
    ///
    /// The child is killed when the timeout fires, since dropping the output future
    /// drops a `kill_on_drop` child.
    async fn output(&self, args: Vec<OsString>) -> Result<Output, DockerError> {
        let command = args
            .first()
            .map(|arg| arg.to_string_lossy().into_owned())
            .unwrap_or_default();

        let run = Command::new(&self.bin)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                tracing::warn!(%command, timeout = ?self.timeout, "docker command timed out");
                DockerError::Timeout {
                    command,
                    timeout: self.timeout,
                }
            })?
            .map_err(|source| DockerError::Spawn { source })?;

        check_status(output)
    }
}

fn check_status(output: Output) -> Result<Output, DockerError> {
    if output.status.success() {
        return Ok(output);
    }
    Err(DockerError::Exit {
        status: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Failure of a single `docker` invocation.
#[derive(Debug, thiserror::Error)]
pub enum DockerError {
    /// The `docker` process could not be spawned.
    #[error("failed to run docker")]
    Spawn {
        #[source]
        source: std::io::Error,
    },

    /// `docker` ran but exited with a non-zero status.
    #[error("docker exited with status {status:?}: {stderr}")]
    Exit {
        status: Option<i32>,
        stderr: String,
    },

    /// `docker <command>` did not finish in time and was killed.
    #[error("docker {command} did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

impl DockerError {
    /// Whether Docker refused to publish a port because something else holds it.
    pub fn is_port_conflict(&self) -> bool {
        match self {
            Self::Exit { stderr, .. } => {
                let stderr = stderr.to_ascii_lowercase();
                stderr.contains("port is already allocated")
                    || stderr.contains("address already in use")
            }
            Self::Spawn { .. } | Self::Timeout { .. } => false,
        }
    }

    fn is_no_such_container(&self) -> bool {
        matches!(self, Self::Exit { stderr, .. } if stderr.contains("No such container"))
    }
}
