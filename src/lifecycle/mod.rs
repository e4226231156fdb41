// Package lifecycle drives a node through the run states.

pub mod hooks;
pub mod kind;
pub mod machine;
pub mod node;
pub mod report;
pub mod settings;
pub mod ssh;
pub mod state;
pub mod target;

#[cfg(test)]
mod node_test;
#[cfg(test)]
mod ssh_test;

pub use hooks::{HookContext, Hooks, MachineHooks};
pub use kind::{drive, ExecutorKind};
pub use machine::{Outcome, StateMachine};
pub use node::NodeDeploymentHooks;
pub use settings::Settings;
pub use state::State;
pub use target::{AbortSource, TargetRunner};
