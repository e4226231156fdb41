// Executor selection by run type.

use std::sync::Arc;

use super::hooks::{HookContext, MachineHooks};
use super::machine::{Outcome, StateMachine};
use super::node::NodeDeploymentHooks;
use super::target::TargetRunner;
use crate::error::{AgentError, Result};
use crate::orchestration::{CloudConnector, Coordinator, OrchestratorHooks};
use crate::run::document::CATEGORY_IMAGE;
use crate::run::keys;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    Machine,
    NodeDeployment,
    Orchestrator,
    /// Orchestrator of an image run: snapshots the creator machine.
    ImageBuild,
}

/// Run types known to the agent.
const EXECUTORS: &[(&str, ExecutorKind)] = &[
    ("Machine", ExecutorKind::Machine),
    ("Run", ExecutorKind::NodeDeployment),
    ("Orchestration", ExecutorKind::NodeDeployment),
];

impl ExecutorKind {
    pub fn from_run_type(run_type: &str) -> Result<Self> {
        EXECUTORS
            .iter()
            .find(|(name, _)| *name == run_type)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| AgentError::Client {
                status: 0,
                message: format!("Unknown executor type: {run_type}"),
            })
    }

    /// Orchestrator nodes with a connector coordinate the cloud, building an
    /// image when the run category is `Image`; every other node follows its
    /// run type.
    pub fn resolve(run_type: &str, category: &str, node_instance: &str, has_connector: bool) -> Result<Self> {
        if has_connector && node_instance.starts_with(keys::ORCHESTRATOR_PREFIX) {
            if category == CATEGORY_IMAGE {
                return Ok(ExecutorKind::ImageBuild);
            }
            return Ok(ExecutorKind::Orchestrator);
        }
        Self::from_run_type(run_type)
    }
}

/// Drives the lifecycle with the hooks of `kind`.
pub async fn drive(
    kind: ExecutorKind,
    ctx: HookContext,
    connector: Option<Arc<dyn CloudConnector>>,
) -> Result<Outcome> {
    match kind {
        ExecutorKind::Machine => StateMachine::new(MachineHooks, ctx).drive().await,
        ExecutorKind::NodeDeployment => {
            let runner = TargetRunner::new(&ctx.settings, ctx.cancel.clone());
            StateMachine::new(NodeDeploymentHooks::new(runner), ctx).drive().await
        }
        ExecutorKind::Orchestrator | ExecutorKind::ImageBuild => {
            let connector = connector.ok_or_else(|| {
                AgentError::Config("orchestrator executor requires a cloud connector".to_string())
            })?;
            let coordinator = Coordinator::new(ctx.client.clone(), connector);
            let hooks = if kind == ExecutorKind::ImageBuild {
                OrchestratorHooks::image_build(coordinator)
            } else {
                OrchestratorHooks::new(coordinator)
            };
            StateMachine::new(hooks, ctx).drive().await
        }
    }
}
