//! Hooks of a node taking part in a deployment: SSH key provisioning,
//! deployment targets and scale targets.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::hooks::{HookContext, Hooks};
use super::report;
use super::ssh;
use super::target::TargetRunner;
use crate::error::{AgentError, Result};
use crate::run::keys;
use crate::run::{NodeInstance, RunDocument, ScaleState, Target};

pub const EXECUTE_TARGET: &str = "execute";
pub const REPORT_TARGET: &str = "report";

/// Out-of-band change applied to a running deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleAction {
    NodeAdd,
    NodeRemove,
    DiskResize,
}

impl ScaleAction {
    pub fn target_name(self) -> &'static str {
        match self {
            ScaleAction::NodeAdd => "onvmadd",
            ScaleAction::NodeRemove => "onvmremove",
            ScaleAction::DiskResize => "ondiskresize",
        }
    }

    fn matches(self, state: Option<ScaleState>) -> bool {
        match self {
            ScaleAction::NodeAdd => matches!(state, Some(ScaleState::Creating | ScaleState::Created)),
            ScaleAction::NodeRemove => matches!(state, Some(ScaleState::Removing | ScaleState::Removed)),
            ScaleAction::DiskResize => matches!(state, Some(ScaleState::Resizing)),
        }
    }
}

/// Scale request found in a run document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleRequest {
    pub action: ScaleAction,
    pub node_name: String,
    pub instances: Vec<String>,
}

/// Current scale request: add, then remove, then resize, first match wins.
pub fn scale_request(doc: &RunDocument, own_instance: &str) -> Result<Option<ScaleRequest>> {
    let instances: BTreeMap<String, NodeInstance> = doc.node_instances(None)?;
    for action in [ScaleAction::NodeAdd, ScaleAction::NodeRemove, ScaleAction::DiskResize] {
        let affected: Vec<&NodeInstance> = instances
            .values()
            .filter(|ni| ni.name() != own_instance && !ni.is_orchestrator())
            .filter(|ni| action.matches(ni.scale_state()))
            .collect();
        if let Some(first) = affected.first() {
            let node_name = first.node_name().to_string();
            let instances = affected
                .iter()
                .filter(|ni| ni.node_name() == node_name)
                .map(|ni| ni.name().to_string())
                .collect();
            return Ok(Some(ScaleRequest {
                action,
                node_name,
                instances,
            }));
        }
    }
    Ok(None)
}

pub struct NodeDeploymentHooks {
    runner: TargetRunner,
    targets: BTreeMap<String, Target>,
}

impl NodeDeploymentHooks {
    pub fn new(runner: TargetRunner) -> Self {
        Self {
            runner,
            targets: BTreeMap::new(),
        }
    }

    fn base_env(ctx: &HookContext) -> Vec<(String, String)> {
        vec![
            ("RUN_ID".to_string(), ctx.client.diid().to_string()),
            ("NODE_INSTANCE_NAME".to_string(), ctx.client.node_instance_name().to_string()),
            ("SERVICE_URL".to_string(), ctx.client.endpoint().to_string()),
        ]
    }

    async fn execute_target(&self, ctx: &HookContext, name: &str, extra_env: &[(String, String)]) -> Result<()> {
        info!(component = "lifecycle", event = "target", target = name, "Executing target '{name}'");
        let Some(target) = self.targets.get(name) else {
            info!(component = "lifecycle", event = "target_missing", target = name, "Nothing to do");
            return Ok(());
        };
        let mut env = Self::base_env(ctx);
        env.extend_from_slice(extra_env);
        self.runner.run(name, target, &env, ctx.client.as_ref()).await
    }

    async fn add_ssh_key(&self, ctx: &HookContext) -> Result<()> {
        match ctx.client.get_user_parameter(keys::SSH_PUBLIC_KEY).await {
            Ok(Some(key)) => {
                info!(component = "lifecycle", event = "ssh_key", "Adding the public key");
                ssh::append_authorized_key(&ctx.settings.home_dir, &key)?;
            }
            Ok(None) => debug!(component = "lifecycle", event = "ssh_key_missing", "no public key configured for the user"),
            Err(AgentError::Config(msg)) => warn!(component = "lifecycle", event = "ssh_key_skipped", reason = %msg, "cannot read user public key"),
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

#[async_trait]
impl Hooks for NodeDeploymentHooks {
    async fn on_provisioning(&mut self, ctx: &HookContext) -> Result<()> {
        info!(component = "lifecycle", event = "action", "Initializing");

        if ctx.client.get_scale_state().await? == Some(ScaleState::Creating) {
            self.add_ssh_key(ctx).await?;
            ctx.client.set_scale_state(ScaleState::Created).await?;
        }

        info!(component = "lifecycle", event = "targets", "Getting deployment targets");
        self.targets = ctx.client.get_targets(ctx.client.node_name()).await?;
        for (name, target) in &self.targets {
            debug!(
                component = "lifecycle",
                event = "target_loaded",
                target = %name,
                background = target.run_in_background,
                script = %target.script,
                "deployment target"
            );
        }
        Ok(())
    }

    async fn on_executing(&mut self, ctx: &HookContext) -> Result<()> {
        info!(component = "lifecycle", event = "action", "Running");

        if ctx.client.get_scale_state().await? != Some(ScaleState::Operational) {
            return self.execute_target(ctx, EXECUTE_TARGET, &[]).await;
        }

        let doc = ctx.client.get_run_document().await?;
        let Some(request) = scale_request(&doc, ctx.client.node_instance_name())? else {
            info!(component = "lifecycle", event = "scale_none", "no scale action pending");
            return Ok(());
        };
        info!(
            component = "lifecycle",
            event = "scale",
            action = ?request.action,
            node = %request.node_name,
            instances = ?request.instances,
            "handling scale action"
        );
        let env = vec![
            ("SCALING_NODE_NAME".to_string(), request.node_name.clone()),
            ("SCALING_NODE_INSTANCES".to_string(), request.instances.join(" ")),
        ];
        self.execute_target(ctx, request.action.target_name(), &env).await
    }

    async fn on_sending_reports(&mut self, ctx: &HookContext) -> Result<()> {
        let target_result = self.execute_target(ctx, REPORT_TARGET, &[]).await;
        match &target_result {
            Err(AgentError::Interrupted) => return target_result,
            Err(e) => info!(component = "lifecycle", event = "report_target_failed", error = %e, "Failed executing 'report'"),
            Ok(()) => {}
        }
        let report_result = report::send_reports(&ctx.client, &ctx.settings).await;
        target_result.and(report_result)
    }

    async fn on_ready(&mut self, ctx: &HookContext) -> Result<()> {
        info!(component = "lifecycle", event = "action", "Ready");
        ctx.client.set_scale_state(ScaleState::Operational).await
    }
}
