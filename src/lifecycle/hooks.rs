//! Per-state hooks invoked by the state machine.
//!
//! Default bodies implement the plain machine behaviour: announce the state,
//! bundle reports when sending reports, print the outcome at Terminal and
//! stop the loop when detached. Executors override what they need.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::report;
use super::settings::Settings;
use super::state::State;
use crate::error::{AgentError, Result};
use crate::run::RunClient;

/// Everything a hook may use while handling a state.
#[derive(Clone)]
pub struct HookContext {
    pub client: Arc<RunClient>,
    pub settings: Arc<Settings>,
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait Hooks: Send {
    async fn on_inactive(&mut self, _ctx: &HookContext) -> Result<()> {
        Ok(())
    }

    async fn on_provisioning(&mut self, _ctx: &HookContext) -> Result<()> {
        info!(component = "lifecycle", event = "action", "Initializing");
        Ok(())
    }

    async fn on_executing(&mut self, _ctx: &HookContext) -> Result<()> {
        info!(component = "lifecycle", event = "action", "Running");
        Ok(())
    }

    async fn on_sending_reports(&mut self, ctx: &HookContext) -> Result<()> {
        report::send_reports(&ctx.client, &ctx.settings).await
    }

    async fn on_ready(&mut self, _ctx: &HookContext) -> Result<()> {
        info!(component = "lifecycle", event = "action", "Ready");
        Ok(())
    }

    async fn on_finalizing(&mut self, _ctx: &HookContext) -> Result<()> {
        info!(component = "lifecycle", event = "action", "Finalizing");
        Ok(())
    }

    async fn on_terminal(&mut self, ctx: &HookContext) -> Result<()> {
        print_outcome(ctx).await
    }

    async fn on_detached(&mut self, _ctx: &HookContext) -> Result<()> {
        info!(component = "lifecycle", event = "action", "Detached");
        Err(AgentError::TerminalState("Detached".to_string()))
    }

    /// Dispatches to the hook named for `state`.
    async fn on_state(&mut self, state: State, ctx: &HookContext) -> Result<()> {
        match state {
            State::Inactive => self.on_inactive(ctx).await,
            State::Provisioning => self.on_provisioning(ctx).await,
            State::Executing => self.on_executing(ctx).await,
            State::SendingReports => self.on_sending_reports(ctx).await,
            State::Ready => self.on_ready(ctx).await,
            State::Finalizing => self.on_finalizing(ctx).await,
            State::Terminal => self.on_terminal(ctx).await,
            State::Detached => self.on_detached(ctx).await,
        }
    }
}

/// Prints success or failure depending on the abort flag.
pub async fn print_outcome(ctx: &HookContext) -> Result<()> {
    if ctx.client.is_abort().await? {
        error!(component = "lifecycle", event = "outcome", success = false, "Failed");
    } else {
        info!(component = "lifecycle", event = "outcome", success = true, "Done!");
    }
    Ok(())
}

/// Hooks of a plain machine run.
#[derive(Debug, Default)]
pub struct MachineHooks;

impl Hooks for MachineHooks {}
