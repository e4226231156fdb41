//! Execution of target scripts.
//!
//! The script body is written to a temporary executable file and run from
//! the configured working directory. While it runs the abort flag is polled;
//! an abort asks the child to terminate, then kills it after a grace period.

use std::io::Write;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::settings::Settings;
use crate::error::{AgentError, Result};
use crate::run::{RunClient, Target};

/// Source of the run abort flag while a target runs.
#[async_trait]
pub trait AbortSource: Send + Sync {
    async fn is_abort(&self) -> Result<bool>;
}

#[async_trait]
impl AbortSource for RunClient {
    async fn is_abort(&self) -> Result<bool> {
        RunClient::is_abort(self).await
    }
}

pub struct TargetRunner {
    work_dir: PathBuf,
    abort_poll_interval: Duration,
    kill_grace: Duration,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl TargetRunner {
    pub fn new(settings: &Settings, cancel: CancellationToken) -> Self {
        Self {
            work_dir: settings.work_dir.clone(),
            abort_poll_interval: settings.abort_poll_interval,
            kill_grace: settings.kill_grace,
            timeout: settings.target_timeout,
            cancel,
        }
    }

    /// Runs `target` with `env` added to the inherited environment.
    ///
    /// Background targets are spawned and left running. Otherwise a
    /// non-zero exit raises `Execution`, an abort raises `Abort` and an
    /// expired timeout raises `Timeout`.
    pub async fn run(
        &self,
        name: &str,
        target: &Target,
        env: &[(String, String)],
        abort_source: &dyn AbortSource,
    ) -> Result<()> {
        if target.script.trim().is_empty() {
            info!(component = "target", event = "empty", target = name, "Script is empty");
            return Ok(());
        }

        let script = write_script(&target.script)?;
        let mut cmd = Command::new(&*script);
        cmd.current_dir(&self.work_dir)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let mut child = cmd
            .spawn()
            .map_err(|e| AgentError::Execution(format!("failed to start target '{name}': {e}")))?;

        if target.run_in_background {
            // The script file has to outlive this call.
            let kept = script
                .keep()
                .map_err(|e| AgentError::Execution(format!("failed to keep script of '{name}': {e}")))?;
            info!(component = "target", event = "background", target = name, pid = child.id(), script = ?kept, "target started in background");
            return Ok(());
        }

        let status = self.supervise(name, &mut child, abort_source).await?;
        drop(script);

        if status.success() {
            info!(component = "target", event = "done", target = name, "target executed");
            return Ok(());
        }
        let code = status
            .code()
            .map_or_else(|| "a signal".to_string(), |c| format!("exit code {c}"));
        error!(component = "target", event = "failed", target = name, status = %code, "target failed");
        Err(AgentError::Execution(format!("Failed executing target '{name}' with {code}")))
    }

    async fn supervise(&self, name: &str, child: &mut Child, abort_source: &dyn AbortSource) -> Result<ExitStatus> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let expired = until(deadline);
        tokio::pin!(expired);

        loop {
            tokio::select! {
                status = child.wait() => return Ok(status?),
                _ = self.cancel.cancelled() => {
                    self.stop(name, child).await;
                    return Err(AgentError::Interrupted);
                }
                _ = &mut expired => {
                    self.stop(name, child).await;
                    return Err(AgentError::Timeout(format!("target '{name}' did not finish in time")));
                }
                _ = sleep(self.abort_poll_interval) => {
                    match abort_source.is_abort().await {
                        Ok(false) => {}
                        Ok(true) => {
                            warn!(component = "target", event = "abort", target = name, "abort flag raised, stopping target");
                            self.stop(name, child).await;
                            return Err(AgentError::Abort(format!("target '{name}' stopped on abort")));
                        }
                        Err(AgentError::Interrupted) => {
                            self.stop(name, child).await;
                            return Err(AgentError::Interrupted);
                        }
                        Err(e) => {
                            warn!(component = "target", event = "abort_check_failed", target = name, error = %e, "failed to read abort flag");
                        }
                    }
                }
            }
        }
    }

    /// SIGTERM, then kill once the grace period is over.
    async fn stop(&self, name: &str, child: &mut Child) {
        terminate(child);
        tokio::select! {
            status = child.wait() => {
                debug!(component = "target", event = "terminated", target = name, status = ?status.ok(), "target terminated");
                return;
            }
            _ = sleep(self.kill_grace) => {}
        }
        warn!(component = "target", event = "kill", target = name, "target still running after grace period, killing");
        if let Err(e) = child.kill().await {
            warn!(component = "target", event = "kill_failed", target = name, error = %e, "failed to kill target");
        }
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => sleep_until(d).await,
        None => std::future::pending().await,
    }
}

#[cfg(unix)]
fn terminate(child: &Child) {
    if let Some(pid) = child.id() {
        // SAFETY: plain signal delivery to our own child pid.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

fn write_script(body: &str) -> Result<tempfile::TempPath> {
    let suffix = if cfg!(windows) { ".ps1" } else { "" };
    let mut file = tempfile::Builder::new()
        .prefix("runagent-target-")
        .suffix(suffix)
        .tempfile()?;
    file.write_all(body.as_bytes())?;
    file.flush()?;
    // Closing the handle avoids ETXTBSY on exec.
    let path = file.into_temp_path();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(path)
}
