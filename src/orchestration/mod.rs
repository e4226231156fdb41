// Package orchestration starts and stops cloud instances on behalf of a run.

pub mod connector;
pub mod coordinator;


pub use connector::{Capabilities, CloudConnector, Vm};
pub use coordinator::{decide_build_stop, decide_stop, need_to_stop, Coordinator, OrchestratorHooks, StopAction};
