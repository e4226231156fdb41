// Package shutdown turns OS signals into cancellation of the running lifecycle.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
#[error("graceful shutdown timeout exceeded")]
pub struct TimeoutError;

/// Graceful shutdown handler
#[derive(Clone)]
pub struct GracefulShutdown {
    shutdown_token: CancellationToken,
    timeout: Duration,
}

impl GracefulShutdown {
    pub fn new(shutdown_token: CancellationToken, timeout: Duration) -> Self {
        Self {
            shutdown_token,
            timeout,
        }
    }

    /// Cancels the token on SIGINT or SIGTERM.
    pub fn listen(&self) -> JoinHandle<()> {
        let token = self.shutdown_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!(component = "graceful-shutdown", event = "os_signal", signal = "SIGINT", "cancellation started");
                }
                _ = terminate_signal() => {
                    info!(component = "graceful-shutdown", event = "os_signal", signal = "SIGTERM", "cancellation started");
                }
                _ = token.cancelled() => return,
            }
            token.cancel();
        })
    }

    /// Waits for `task`; once cancellation started it gets the grace timeout to finish.
    pub async fn await_task<T>(&self, task: JoinHandle<T>) -> Result<T> {
        tokio::pin!(task);
        tokio::select! {
            res = &mut task => return res.context("lifecycle task failed"),
            _ = self.shutdown_token.cancelled() => {}
        }

        match timeout(self.timeout, task).await {
            Ok(res) => {
                info!(component = "graceful-shutdown", event = "shutdown_success", "agent was gracefully shut down");
                res.context("lifecycle task failed")
            }
            Err(_) => {
                warn!(
                    component = "graceful-shutdown",
                    event = "shutdown_timeout",
                    timeout_secs = self.timeout.as_secs(),
                    "lifecycle did not stop within timeout"
                );
                Err(TimeoutError.into())
            }
        }
    }
}

#[cfg(unix)]
async fn terminate_signal() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(e) => {
            warn!(component = "graceful-shutdown", event = "sigterm_unavailable", error = %e, "cannot listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}
