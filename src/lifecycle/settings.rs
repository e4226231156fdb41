// Lifecycle settings resolved from configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{Config, ConfigTrait};

pub const DEFAULT_STATE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_ABORT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Settings {
    /// Bound on waiting for the server to move to the next state.
    pub state_timeout: Duration,
    pub poll_interval: Duration,
    /// How often a running target checks the abort flag.
    pub abort_poll_interval: Duration,
    pub kill_grace: Duration,
    pub target_timeout: Option<Duration>,
    /// Working directory of target scripts.
    pub work_dir: PathBuf,
    /// Where report bundles are written before upload.
    pub reports_dir: PathBuf,
    /// Files and directories archived into the report bundle.
    pub report_paths: Vec<PathBuf>,
    pub home_dir: PathBuf,
}

impl Settings {
    pub fn from_cfg(cfg: &Config) -> Self {
        let lc = cfg.lifecycle().cloned().unwrap_or_default();
        let tmp = std::env::temp_dir();
        Self {
            state_timeout: lc.state_timeout.unwrap_or(DEFAULT_STATE_TIMEOUT),
            poll_interval: lc.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            abort_poll_interval: lc.abort_poll_interval.unwrap_or(DEFAULT_ABORT_POLL_INTERVAL),
            kill_grace: lc.kill_grace.unwrap_or(DEFAULT_KILL_GRACE),
            target_timeout: lc.target_timeout,
            work_dir: lc.work_dir.unwrap_or_else(|| tmp.clone()),
            reports_dir: lc.reports_dir.unwrap_or_else(|| tmp.clone()),
            report_paths: lc
                .report_paths
                .unwrap_or_else(|| vec![tmp.join("runagent").join("reports")]),
            home_dir: cfg.home_dir(),
        }
    }
}
