// Cloud connector interface used by the orchestrator.

use async_trait::async_trait;

use crate::error::Result;
use crate::run::NodeInstance;

/// What a connector supports. Fixed when the connector is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Instances are started and stopped as one group.
    pub grouped: bool,
    /// The orchestrator may stop its own instance or group.
    pub can_self_terminate: bool,
    /// An image build runs the orchestrator and the creator in one group.
    pub build_in_single_group: bool,
}

/// Virtual machine started for a node instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vm {
    pub id: String,
    pub ip: Option<String>,
    pub node_instance: String,
}

#[async_trait]
pub trait CloudConnector: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    fn cloud_service_name(&self) -> &str;

    async fn start(&self, node: &NodeInstance) -> Result<Vm>;

    /// Stops instances by id; grouped connectors stop the groups owning them.
    async fn stop(&self, ids: &[String]) -> Result<()>;

    /// Stops the whole group the orchestrator belongs to.
    async fn stop_group(&self) -> Result<()>;

    /// Snapshots the running creator instance into a new image; returns its id.
    async fn build_image(&self, node: &NodeInstance) -> Result<String>;

    fn get_ip(&self, vm: &Vm) -> Option<String> {
        vm.ip.clone()
    }

    fn get_id(&self, vm: &Vm) -> String {
        vm.id.clone()
    }
}
