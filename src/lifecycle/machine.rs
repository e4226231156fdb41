//! Drive loop of the lifecycle state machine.
//!
//! Each iteration runs the hook of the current state, completes the state
//! on the server and polls until the server reports the next one. A hook
//! failure is reported on the abort key and the run still moves towards
//! Terminal so that reports are sent and resources released.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use super::hooks::{HookContext, Hooks};
use super::state::State;
use crate::error::{AgentError, Result};

/// How a drive ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub final_state: String,
    pub aborted: bool,
    /// Remote states in the order their hooks ran.
    pub visited: Vec<String>,
}

pub struct StateMachine<H: Hooks> {
    hooks: H,
    ctx: HookContext,
}

impl<H: Hooks> StateMachine<H> {
    pub fn new(hooks: H, ctx: HookContext) -> Self {
        Self { hooks, ctx }
    }

    /// Runs hooks until Terminal, Detached or a terminal-state signal.
    pub async fn drive(&mut self) -> Result<Outcome> {
        let mut state = self.ctx.client.get_state().await?;
        if state.is_empty() {
            return Err(AgentError::Execution("No state to execute specified".to_string()));
        }
        let mut visited = Vec::new();

        loop {
            visited.push(state.clone());
            info!(component = "lifecycle", event = "state_entered", state = %state, "executing state");

            let parsed = state.parse::<State>();
            let result = match parsed {
                Ok(s) => self.hooks.on_state(s, &self.ctx).await,
                Err(_) => Err(AgentError::Execution(format!("unknown state: '{state}'"))),
            };

            match result {
                Ok(()) => {}
                Err(AgentError::Abort(msg)) => {
                    warn!(component = "lifecycle", event = "abort", state = %state, detail = %msg, "Abort flag raised");
                }
                Err(AgentError::TerminalState(_)) => return self.finish(state, visited).await,
                Err(AgentError::Interrupted) => return Err(AgentError::Interrupted),
                Err(e) => {
                    error!(component = "lifecycle", event = "hook_failed", state = %state, error = %e, "Error executing node");
                    self.report_failure(&e).await?;
                }
            }

            if matches!(parsed, Ok(State::Terminal)) {
                return self.finish(state, visited).await;
            }

            match self.ctx.client.advance_state().await {
                Ok(()) => {}
                Err(AgentError::TerminalState(_)) => return self.finish(state, visited).await,
                Err(e) => return Err(e),
            }

            state = match self.wait_for_next_state(&state).await {
                Ok(next) => next,
                Err(AgentError::TerminalState(_)) => return self.finish(state, visited).await,
                Err(e) => return Err(e),
            };
            self.ctx.client.discard();
        }
    }

    /// Reports a hook failure on the abort key; only an interrupt escapes.
    async fn report_failure(&self, err: &AgentError) -> Result<()> {
        match self.ctx.client.fail(&err.to_string()).await {
            Ok(()) => Ok(()),
            Err(AgentError::Interrupted) => Err(AgentError::Interrupted),
            Err(report_err) => {
                warn!(component = "lifecycle", event = "fail_report_failed", error = %report_err, "failed to report failure to the server");
                Ok(())
            }
        }
    }

    /// Polls the remote state until it differs from `current`.
    ///
    /// Stale reads of earlier states keep polling.
    async fn wait_for_next_state(&self, current: &str) -> Result<String> {
        let settings = &self.ctx.settings;
        let deadline = Instant::now() + settings.state_timeout;
        let current_state = current.parse::<State>().ok();
        debug!(component = "lifecycle", event = "waiting", state = %current, "Waiting for next state transition");

        loop {
            let observed = self.ctx.client.get_state().await?;
            if observed != current && !is_stale(current_state, &observed) {
                return Ok(observed);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(AgentError::Timeout(format!(
                    "Timeout reached waiting for next state, current state: {current}"
                )));
            }
            let pause = settings.poll_interval.min(deadline - now).max(Duration::from_millis(1));
            tokio::select! {
                _ = self.ctx.cancel.cancelled() => return Err(AgentError::Interrupted),
                _ = sleep(pause) => {}
            }
        }
    }

    async fn finish(&self, final_state: String, visited: Vec<String>) -> Result<Outcome> {
        let aborted = match self.ctx.client.is_abort().await {
            Ok(aborted) => aborted,
            Err(AgentError::Interrupted) => return Err(AgentError::Interrupted),
            Err(e) => {
                warn!(component = "lifecycle", event = "abort_check_failed", error = %e, "could not read abort flag");
                false
            }
        };
        info!(component = "lifecycle", event = "finished", state = %final_state, aborted, "lifecycle finished");
        Ok(Outcome {
            final_state,
            aborted,
            visited,
        })
    }
}

/// True when `observed` does not move the run forward from `current`:
/// an alias of the same state or a stale earlier one.
pub fn is_stale(current: Option<State>, observed: &str) -> bool {
    match (current, observed.parse::<State>()) {
        (Some(current), Ok(next)) => !current.can_move_to(next),
        _ => false,
    }
}
