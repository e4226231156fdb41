// Lifecycle states of a run and their ordering.

use std::fmt;
use std::str::FromStr;

use crate::error::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Inactive,
    Provisioning,
    Executing,
    SendingReports,
    Ready,
    Finalizing,
    Terminal,
    /// Side exit, final wherever it is reached.
    Detached,
}

impl State {
    /// Position in the forward-only ordering.
    pub fn rank(self) -> u8 {
        match self {
            State::Inactive => 0,
            State::Provisioning => 1,
            State::Executing => 2,
            State::SendingReports => 3,
            State::Ready => 4,
            State::Finalizing => 5,
            State::Terminal => 6,
            State::Detached => 7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Inactive => "Inactive",
            State::Provisioning => "Provisioning",
            State::Executing => "Executing",
            State::SendingReports => "SendingReports",
            State::Ready => "Ready",
            State::Finalizing => "Finalizing",
            State::Terminal => "Terminal",
            State::Detached => "Detached",
        }
    }

    pub fn is_final(self) -> bool {
        matches!(self, State::Terminal | State::Detached)
    }

    /// Whether moving from `self` to `next` keeps the run moving forward.
    ///
    /// Mutable runs go back from Ready to Provisioning to handle a scale
    /// request; that is the only backward edge.
    pub fn can_move_to(self, next: State) -> bool {
        next.rank() > self.rank()
            || next == State::Detached
            || (self == State::Ready && next == State::Provisioning)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Inactive" => Ok(State::Inactive),
            "Initializing" | "Provisioning" => Ok(State::Provisioning),
            "Running" | "Executing" => Ok(State::Executing),
            "SendingFinalReport" | "SendingReports" => Ok(State::SendingReports),
            "Ready" => Ok(State::Ready),
            "Finalizing" => Ok(State::Finalizing),
            "Terminal" | "Done" | "Aborted" | "Cancelled" => Ok(State::Terminal),
            "Detached" => Ok(State::Detached),
            other => Err(AgentError::Execution(format!("unknown state: '{other}'"))),
        }
    }
}
