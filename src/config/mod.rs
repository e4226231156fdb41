// Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const PROD: &str = "prod";
pub const TEST: &str = "test";

pub const DEFAULT_COOKIE_NAME: &str = "com.sixsq.slipstream.cookie";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Agent {
    #[serde(rename = "agent")]
    pub agent: AgentBox,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentBox {
    pub env: String,
    pub logs: Option<Logs>,
    pub server: Server,
    pub retry: Option<Retry>,
    pub run: Run,
    pub lifecycle: Option<Lifecycle>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logs {
    pub level: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Server {
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(rename = "cookie_file")]
    pub cookie_file: Option<PathBuf>,
    #[serde(rename = "cookie_name")]
    pub cookie_name: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Retry {
    #[serde(rename = "throttle_floor", default, with = "humantime_serde")]
    pub throttle_floor: Option<Duration>,
    #[serde(rename = "throttle_span", default, with = "humantime_serde")]
    pub throttle_span: Option<Duration>,
    #[serde(rename = "throttle_cap", default, with = "humantime_serde")]
    pub throttle_cap: Option<Duration>,
    #[serde(rename = "backoff_step", default, with = "humantime_serde")]
    pub backoff_step: Option<Duration>,
    #[serde(rename = "backoff_cap", default, with = "humantime_serde")]
    pub backoff_cap: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub horizon: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Run {
    pub diid: String,
    #[serde(rename = "node_instance")]
    pub node_instance: String,
    #[serde(rename = "ignore_abort", default)]
    pub ignore_abort: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Lifecycle {
    #[serde(rename = "state_timeout", default, with = "humantime_serde")]
    pub state_timeout: Option<Duration>,
    #[serde(rename = "poll_interval", default, with = "humantime_serde")]
    pub poll_interval: Option<Duration>,
    #[serde(rename = "abort_poll_interval", default, with = "humantime_serde")]
    pub abort_poll_interval: Option<Duration>,
    #[serde(rename = "kill_grace", default, with = "humantime_serde")]
    pub kill_grace: Option<Duration>,
    #[serde(rename = "target_timeout", default, with = "humantime_serde")]
    pub target_timeout: Option<Duration>,
    #[serde(rename = "work_dir")]
    pub work_dir: Option<PathBuf>,
    #[serde(rename = "reports_dir")]
    pub reports_dir: Option<PathBuf>,
    #[serde(rename = "report_paths")]
    pub report_paths: Option<Vec<PathBuf>>,
    #[serde(rename = "home_dir")]
    pub home_dir: Option<PathBuf>,
}

// Config trait
pub trait ConfigTrait {
    fn logs(&self) -> Option<&Logs>;
    fn is_prod(&self) -> bool;
    fn server(&self) -> &Server;
    fn retry(&self) -> Option<&Retry>;
    fn run(&self) -> &Run;
    fn lifecycle(&self) -> Option<&Lifecycle>;
}

// Config type alias for convenience
pub type Config = Agent;

impl ConfigTrait for Config {
    fn logs(&self) -> Option<&Logs> {
        self.agent.logs.as_ref()
    }

    fn is_prod(&self) -> bool {
        self.agent.env == PROD
    }

    fn server(&self) -> &Server {
        &self.agent.server
    }

    fn retry(&self) -> Option<&Retry> {
        self.agent.retry.as_ref()
    }

    fn run(&self) -> &Run {
        &self.agent.run
    }

    fn lifecycle(&self) -> Option<&Lifecycle> {
        self.agent.lifecycle.as_ref()
    }
}

impl Config {
    /// Loads configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let abs_path = path
            .canonicalize()
            .with_context(|| format!("failed to resolve absolute config filepath: {:?}", path))?;

        let data = std::fs::read_to_string(&abs_path)
            .with_context(|| format!("read config yaml file {:?}", abs_path))?;

        Self::parse(&data).with_context(|| format!("unmarshal yaml from {:?}", abs_path))
    }

    /// Parses and validates configuration from YAML text.
    pub fn parse(data: &str) -> Result<Self> {
        let mut cfg: Agent = serde_yaml::from_str(data)?;

        let endpoint = cfg.agent.server.endpoint.trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            anyhow::bail!("server.endpoint must be configured");
        }
        cfg.agent.server.endpoint = endpoint;

        if cfg.agent.run.diid.is_empty() {
            anyhow::bail!("run.diid must be configured");
        }
        if cfg.agent.run.node_instance.is_empty() {
            anyhow::bail!("run.node_instance must be configured");
        }

        if cfg.agent.server.username.is_some() != cfg.agent.server.password.is_some() {
            anyhow::bail!("server.username and server.password must be set together");
        }

        Ok(cfg)
    }

    /// Path of the cookie jar; defaults to `~/.runagent/cookies.txt`.
    pub fn cookie_file(&self) -> PathBuf {
        if let Some(path) = self.server().cookie_file.clone() {
            return path;
        }
        self.home_dir().join(".runagent").join("cookies.txt")
    }

    pub fn cookie_name(&self) -> &str {
        self.server()
            .cookie_name
            .as_deref()
            .unwrap_or(DEFAULT_COOKIE_NAME)
    }

    pub fn home_dir(&self) -> PathBuf {
        self.lifecycle()
            .and_then(|l| l.home_dir.clone())
            .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn request_timeout(&self) -> Duration {
        self.server().timeout.unwrap_or(Duration::from_secs(60))
    }
}

// Test config is always available for integration tests
mod test_config;
pub use test_config::new_test_config;
