use super::{Agent, AgentBox, Config};
use std::path::Path;
use std::time::Duration;

/// Creates a new test configuration pointing at `endpoint`, keeping all
/// scratch files under `scratch`.
pub fn new_test_config(endpoint: &str, scratch: &Path) -> Config {
    Agent {
        agent: AgentBox {
            env: super::TEST.to_string(),
            logs: Some(super::Logs {
                level: Some("debug".to_string()),
            }),
            server: super::Server {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                username: Some("test".to_string()),
                password: Some("tesTtesT".to_string()),
                cookie_file: Some(scratch.join("cookies.txt")),
                cookie_name: None,
                timeout: Some(Duration::from_secs(5)),
            },
            retry: Some(super::Retry {
                throttle_floor: Some(Duration::from_millis(20)),
                throttle_span: Some(Duration::from_millis(100)),
                throttle_cap: Some(Duration::from_millis(150)),
                backoff_step: Some(Duration::from_millis(10)),
                backoff_cap: Some(Duration::from_millis(50)),
                horizon: Some(Duration::from_secs(2)),
            }),
            run: super::Run {
                diid: "1234-abcd".to_string(),
                node_instance: "apache.1".to_string(),
                ignore_abort: false,
            },
            lifecycle: Some(super::Lifecycle {
                state_timeout: Some(Duration::from_secs(3)),
                poll_interval: Some(Duration::from_millis(10)),
                abort_poll_interval: Some(Duration::from_millis(20)),
                kill_grace: Some(Duration::from_millis(200)),
                target_timeout: Some(Duration::from_secs(10)),
                work_dir: Some(scratch.to_path_buf()),
                reports_dir: Some(scratch.join("bundles")),
                report_paths: Some(vec![scratch.join("logs")]),
                home_dir: Some(scratch.join("home")),
            }),
        },
    }
}
