// Node instances of a run and their scale state.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::document::ImageTargets;
use super::keys;
use crate::error::AgentError;

/// Position of a node instance in the add/remove/resize workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScaleState {
    Creating,
    Created,
    Removing,
    Removed,
    Gone,
    Resizing,
    Operational,
}

impl ScaleState {
    pub fn as_str(self) -> &'static str {
        match self {
            ScaleState::Creating => "creating",
            ScaleState::Created => "created",
            ScaleState::Removing => "removing",
            ScaleState::Removed => "removed",
            ScaleState::Gone => "gone",
            ScaleState::Resizing => "resizing",
            ScaleState::Operational => "operational",
        }
    }
}

impl fmt::Display for ScaleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScaleState {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "creating" => Ok(ScaleState::Creating),
            "created" => Ok(ScaleState::Created),
            "removing" => Ok(ScaleState::Removing),
            "removed" => Ok(ScaleState::Removed),
            "gone" => Ok(ScaleState::Gone),
            "resizing" => Ok(ScaleState::Resizing),
            "operational" => Ok(ScaleState::Operational),
            other => Err(AgentError::Document(format!("unknown scale state: '{other}'"))),
        }
    }
}

/// One participant of a run, built from its runtime parameters.
#[derive(Debug, Clone, Default)]
pub struct NodeInstance {
    params: BTreeMap<String, String>,
    image_attributes: BTreeMap<String, String>,
    image_targets: Option<ImageTargets>,
}

impl NodeInstance {
    pub fn new(params: BTreeMap<String, String>) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn name(&self) -> &str {
        self.get(keys::NODE_INSTANCE_NAME_KEY).unwrap_or_default()
    }

    /// Node name without multiplicity, e.g. `apache` for `apache.2`.
    pub fn node_name(&self) -> &str {
        match self.get(keys::NODE_NAME_KEY) {
            Some(name) if !name.is_empty() => name,
            _ => keys::base_node_name(self.name()),
        }
    }

    /// Multiplicity index, `None` for singletons such as orchestrators.
    pub fn multiplicity(&self) -> Option<u32> {
        self.name()
            .split_once(keys::MULTIPLICITY_SEPARATOR)
            .and_then(|(_, idx)| idx.parse().ok())
    }

    pub fn cloud_service(&self) -> &str {
        self.get(keys::CLOUDSERVICE_KEY).unwrap_or_default()
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.get(keys::INSTANCEID_KEY).filter(|id| !id.is_empty())
    }

    pub fn hostname(&self) -> Option<&str> {
        self.get(keys::HOSTNAME_KEY).filter(|h| !h.is_empty())
    }

    /// Current scale state; `None` when unset or not understood.
    pub fn scale_state(&self) -> Option<ScaleState> {
        self.get(keys::SCALE_STATE_KEY).and_then(|s| s.parse().ok())
    }

    /// Networks from `<cloud>.networks`, comma separated.
    pub fn networks(&self) -> Vec<String> {
        let key = format!("{}.networks", self.cloud_service());
        self.get(&key)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn instance_type(&self) -> Option<&str> {
        let key = format!("{}.instance.type", self.cloud_service());
        self.get(&key).filter(|t| !t.is_empty())
    }

    pub fn is_orchestrator(&self) -> bool {
        self.name().starts_with(keys::ORCHESTRATOR_PREFIX)
    }

    pub fn image_attributes(&self) -> &BTreeMap<String, String> {
        &self.image_attributes
    }

    /// Server resource of the image backing this instance, e.g. `module/base/ubuntu/12`.
    pub fn image_resource_uri(&self) -> Option<&str> {
        self.image_attributes
            .get(keys::RESOURCE_URI_ATTRIBUTE)
            .map(String::as_str)
            .filter(|uri| !uri.is_empty())
    }

    pub fn set_image_attributes(&mut self, attributes: BTreeMap<String, String>) {
        self.image_attributes = attributes;
    }

    pub fn image_targets(&self) -> Option<&ImageTargets> {
        self.image_targets.as_ref()
    }

    pub fn set_image_targets(&mut self, targets: ImageTargets) {
        self.image_targets = Some(targets);
    }
}
