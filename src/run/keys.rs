// Runtime parameter keys and url fragments shared by the run client and the lifecycle.

/// Prefix of deployment-wide parameters.
pub const GLOBAL_PREFIX: &str = "ss:";

/// Separator between a node instance name and its property.
pub const PROPERTY_SEPARATOR: char = ':';

/// Separator between a node name and its multiplicity index.
pub const MULTIPLICITY_SEPARATOR: char = '.';

pub const ABORT_KEY: &str = "abort";
pub const STATE_KEY: &str = "state";
pub const COMPLETE_KEY: &str = "complete";
pub const SCALE_STATE_KEY: &str = "scale.state";
pub const CLOUDSERVICE_KEY: &str = "cloudservice";
pub const INSTANCEID_KEY: &str = "instanceid";
pub const HOSTNAME_KEY: &str = "hostname";
pub const NODE_NAME_KEY: &str = "nodename";
pub const NODE_INSTANCE_NAME_KEY: &str = "node_instance_name";
pub const ID_KEY: &str = "id";

pub const ORCHESTRATOR_PREFIX: &str = "orchestrator";
/// Instance name of the creator machine in an image build.
pub const MACHINE_NAME: &str = "machine";
/// Image attribute pointing at the image resource on the server.
pub const RESOURCE_URI_ATTRIBUTE: &str = "resourceUri";

pub const RUN_RESOURCE_PATH: &str = "/run";
pub const REPORTS_RESOURCE_PATH: &str = "/reports";
pub const USER_RESOURCE_PATH: &str = "/user";
pub const IGNORE_ABORT_QUERY: &str = "?ignoreabort=true";

pub const ON_ERROR_RUN_FOREVER: &str = "General.On Error Run Forever";
pub const ON_SUCCESS_RUN_FOREVER: &str = "General.On Success Run Forever";
pub const SSH_PUBLIC_KEY: &str = "General.ssh.public.key";

/// `ss:<property>`
pub fn global(property: &str) -> String {
    format!("{GLOBAL_PREFIX}{property}")
}

/// `<node-instance>:<property>`
pub fn node(instance: &str, property: &str) -> String {
    format!("{instance}{PROPERTY_SEPARATOR}{property}")
}

/// Node name without its multiplicity index.
pub fn base_node_name(instance: &str) -> &str {
    instance
        .split(MULTIPLICITY_SEPARATOR)
        .next()
        .unwrap_or(instance)
}
