//! Orchestration coordinator: turns scale states into connector calls and
//! decides how the orchestrator's own resources are released.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::connector::{Capabilities, CloudConnector, Vm};
use crate::error::{AgentError, Result};
use crate::lifecycle::hooks::{print_outcome, HookContext, Hooks};
use crate::run::keys;
use crate::run::{RunClient, ScaleState};

/// How the orchestrator releases its own compute resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopAction {
    StopGroup,
    StopInstance(String),
    /// The server terminates the run; the orchestrator cannot do it from inside.
    DelegateToServer,
    /// Run-forever flags keep everything up.
    KeepRunning,
}

/// Whether instances should be stopped at the end of the run.
///
/// Runs kept alive by "on error run forever" (when aborted) or "on success
/// run forever" (when not aborted, unless overridden) are left running.
pub fn need_to_stop(
    aborted: bool,
    run_parameters: &BTreeMap<String, Option<String>>,
    ignore_success_forever: bool,
) -> bool {
    let flag = |name: &str| {
        run_parameters
            .get(name)
            .and_then(|v| v.as_deref())
            .is_some_and(|v| v.trim() == "true")
    };
    if aborted {
        !flag(keys::ON_ERROR_RUN_FOREVER)
    } else {
        !(flag(keys::ON_SUCCESS_RUN_FOREVER) && !ignore_success_forever)
    }
}

pub fn decide_stop(caps: Capabilities, need_stop: bool, own_id: &str) -> StopAction {
    match (caps.grouped, need_stop, caps.can_self_terminate) {
        (true, true, true) => StopAction::StopGroup,
        (true, true, false) | (false, true, false) => StopAction::DelegateToServer,
        _ => StopAction::StopInstance(own_id.to_string()),
    }
}

/// Release decision at the end of an image build.
///
/// Run-forever on success never applies to builds, so `need_stop` comes from
/// [`need_to_stop`] with the success flag ignored.
pub fn decide_build_stop(caps: Capabilities, need_stop: bool, own_id: &str) -> StopAction {
    if !need_stop {
        return StopAction::KeepRunning;
    }
    match (caps.can_self_terminate, caps.grouped && caps.build_in_single_group) {
        (false, _) => StopAction::DelegateToServer,
        (true, true) => StopAction::StopGroup,
        (true, false) => StopAction::StopInstance(own_id.to_string()),
    }
}

pub struct Coordinator {
    client: Arc<RunClient>,
    connector: Arc<dyn CloudConnector>,
    to_be_gone: Vec<String>,
}

impl Coordinator {
    pub fn new(client: Arc<RunClient>, connector: Arc<dyn CloudConnector>) -> Self {
        Self {
            client,
            connector,
            to_be_gone: Vec::new(),
        }
    }

    fn cloud(&self) -> &str {
        self.connector.cloud_service_name()
    }

    pub async fn need_to_stop_images(&self, ignore_success_forever: bool) -> Result<bool> {
        let aborted = self.client.is_abort().await?;
        let params = self.client.get_run_parameters().await?;
        Ok(need_to_stop(aborted, &params, ignore_success_forever))
    }

    /// Starts instances in `creating` on this cloud and publishes their
    /// instance id and hostname.
    pub async fn start_node_instances(&self) -> Result<Vec<Vm>> {
        let instances = self
            .client
            .get_node_instances_in_scale_state(ScaleState::Creating, Some(self.cloud()))
            .await?;

        let mut started = Vec::with_capacity(instances.len());
        for (name, instance) in &instances {
            if instance.is_orchestrator() {
                continue;
            }
            let vm = self.connector.start(instance).await?;
            let id = self.connector.get_id(&vm);
            self.client
                .set_parameter(&keys::node(name, keys::INSTANCEID_KEY), &id, false)
                .await?;
            if let Some(ip) = self.connector.get_ip(&vm) {
                self.client
                    .set_parameter(&keys::node(name, keys::HOSTNAME_KEY), &ip, false)
                    .await?;
            }
            info!(component = "coordinator", event = "instance_started", instance = %name, id = %id, "node instance started");
            started.push(vm);
        }
        Ok(started)
    }

    /// Stops instances in `removing` and marks them `removed`.
    pub async fn stop_node_instances(&mut self) -> Result<()> {
        let instances = self
            .client
            .get_node_instances_in_scale_state(ScaleState::Removing, Some(self.cloud()))
            .await?;

        let ids: Vec<String> = instances
            .values()
            .filter_map(|ni| ni.instance_id().map(str::to_string))
            .collect();
        if !ids.is_empty() {
            info!(component = "coordinator", event = "instances_stopping", ids = ?ids, "stopping removed node instances");
            self.connector.stop(&ids).await?;
        }

        for name in instances.keys() {
            self.client.set_scale_state_on(name, ScaleState::Removed).await?;
        }
        // Set as gone once the run is Ready.
        self.to_be_gone = instances.into_keys().collect();
        Ok(())
    }

    pub async fn set_removed_instances_as_gone(&mut self) -> Result<()> {
        for name in std::mem::take(&mut self.to_be_gone) {
            self.client.set_scale_state_on(&name, ScaleState::Gone).await?;
        }
        Ok(())
    }

    /// Stops every node of the deployment on this cloud when stopping is wanted.
    ///
    /// Grouped connectors release nodes with the orchestrator's group.
    pub async fn stop_nodes(&self) -> Result<()> {
        if !self.need_to_stop_images(false).await? {
            return Ok(());
        }
        if !self.connector.capabilities().grouped {
            let ids: Vec<String> = self
                .client
                .get_node_instances(Some(self.cloud()))
                .await?
                .values()
                .filter(|ni| !ni.is_orchestrator())
                .filter_map(|ni| ni.instance_id().map(str::to_string))
                .collect();
            if !ids.is_empty() {
                info!(component = "coordinator", event = "nodes_stopping", count = ids.len(), "stopping deployment nodes");
                self.connector.stop(&ids).await?;
            }
        }
        Ok(())
    }

    /// Snapshots the creator machine and records the new image id on the
    /// image resource for this cloud.
    pub async fn build_image(&self) -> Result<String> {
        let instances = self
            .client
            .get_node_instances_in_scale_state(ScaleState::Creating, Some(self.cloud()))
            .await?;
        let creator = instances.get(keys::MACHINE_NAME).ok_or_else(|| {
            AgentError::Execution(format!(
                "Failed to get node instance for instance named \"{}\"",
                keys::MACHINE_NAME
            ))
        })?;
        let resource_uri = creator
            .image_resource_uri()
            .ok_or_else(|| AgentError::Document("creator image has no resource uri".to_string()))?;

        let image_id = self.connector.build_image(creator).await?;
        info!(component = "coordinator", event = "image_built", image = %image_id, "image built");
        self.client
            .put_new_image_id(resource_uri, self.cloud(), &image_id)
            .await?;
        Ok(image_id)
    }

    /// Stops the creator machine of an image build unless it shares the
    /// orchestrator's group.
    pub async fn stop_creator(&self) -> Result<()> {
        if !self.need_to_stop_images(true).await? {
            return Ok(());
        }
        let caps = self.connector.capabilities();
        if caps.grouped && caps.build_in_single_group {
            return Ok(());
        }
        let key = keys::node(keys::MACHINE_NAME, keys::INSTANCEID_KEY);
        match self.client.get_parameter(&key, true).await {
            Ok(id) if !id.is_empty() => {
                info!(component = "coordinator", event = "creator_stopping", id = %id, "stopping image creator");
                self.connector.stop(std::slice::from_ref(&id)).await
            }
            Ok(_) | Err(AgentError::NotYetSet(_)) | Err(AgentError::NotFound(_)) => {
                warn!(component = "coordinator", event = "creator_id_missing", "creator instance id unknown, nothing to stop");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Releases the orchestrator's own resource; returns what was done.
    pub async fn stop_orchestrator(&self, is_build_image: bool) -> Result<StopAction> {
        let need_stop = self.need_to_stop_images(is_build_image).await?;
        let own_key = keys::node(self.client.node_instance_name(), keys::INSTANCEID_KEY);
        let own_id = match self.client.get_parameter(&own_key, true).await {
            Ok(id) => id,
            Err(AgentError::NotYetSet(_)) => String::new(),
            Err(e) => return Err(e),
        };

        let caps = self.connector.capabilities();
        let action = if is_build_image {
            decide_build_stop(caps, need_stop, &own_id)
        } else {
            decide_stop(caps, need_stop, &own_id)
        };
        info!(component = "coordinator", event = "orchestrator_stop", action = ?action, build = is_build_image, "releasing orchestrator");
        match &action {
            StopAction::StopGroup => self.connector.stop_group().await?,
            StopAction::DelegateToServer => self.client.terminate_run().await?,
            StopAction::KeepRunning => {}
            StopAction::StopInstance(id) if id.is_empty() => {
                warn!(component = "coordinator", event = "orchestrator_id_missing", "orchestrator instance id unknown, nothing to stop");
            }
            StopAction::StopInstance(id) => self.connector.stop(std::slice::from_ref(id)).await?,
        }
        Ok(action)
    }
}

/// Hooks of the orchestrator node, for a deployment or an image build.
pub struct OrchestratorHooks {
    coordinator: Coordinator,
    build_image: bool,
}

impl OrchestratorHooks {
    pub fn new(coordinator: Coordinator) -> Self {
        Self {
            coordinator,
            build_image: false,
        }
    }

    pub fn image_build(coordinator: Coordinator) -> Self {
        Self {
            coordinator,
            build_image: true,
        }
    }
}

#[async_trait]
impl Hooks for OrchestratorHooks {
    async fn on_provisioning(&mut self, _ctx: &HookContext) -> Result<()> {
        info!(component = "lifecycle", event = "action", "Provisioning node instances");
        self.coordinator.start_node_instances().await.map(|_| ())
    }

    async fn on_executing(&mut self, _ctx: &HookContext) -> Result<()> {
        info!(component = "lifecycle", event = "action", "Running");
        if self.build_image {
            return self.coordinator.build_image().await.map(|_| ());
        }
        self.coordinator.stop_node_instances().await
    }

    async fn on_ready(&mut self, _ctx: &HookContext) -> Result<()> {
        info!(component = "lifecycle", event = "action", "Ready");
        self.coordinator.set_removed_instances_as_gone().await
    }

    async fn on_finalizing(&mut self, _ctx: &HookContext) -> Result<()> {
        info!(component = "lifecycle", event = "action", "Finalizing");
        if self.build_image {
            return self.coordinator.stop_creator().await;
        }
        self.coordinator.stop_nodes().await
    }

    async fn on_terminal(&mut self, ctx: &HookContext) -> Result<()> {
        // Print first: stopping our own instance may end this process.
        print_outcome(ctx).await?;
        self.coordinator.stop_orchestrator(self.build_image).await.map(|_| ())
    }
}
