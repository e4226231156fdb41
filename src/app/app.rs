// Agent application: builds the run client and drives the node lifecycle.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{Config, ConfigTrait};
use crate::error::Result;
use crate::http::Transport;
use crate::lifecycle::{self, ExecutorKind, HookContext, Outcome, Settings};
use crate::orchestration::CloudConnector;
use crate::run::RunClient;

/// Encapsulates one agent run for one node instance.
pub struct App {
    cfg: Config,
    shutdown_token: CancellationToken,
    connector: Option<Arc<dyn CloudConnector>>,
}

impl App {
    pub fn new(shutdown_token: CancellationToken, cfg: Config) -> Self {
        Self {
            cfg,
            shutdown_token,
            connector: None,
        }
    }

    /// Attaches the cloud connector used when this node is an orchestrator.
    pub fn with_connector(mut self, connector: Arc<dyn CloudConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Resolves the executor from the run type and drives the lifecycle.
    pub async fn run(&self) -> Result<Outcome> {
        let transport = Arc::new(Transport::from_cfg(&self.cfg, self.shutdown_token.clone())?);
        let client = Arc::new(RunClient::from_cfg(&self.cfg, transport)?);
        let settings = Arc::new(Settings::from_cfg(&self.cfg));

        let run_type = client.get_run_type().await?;
        let category = client.get_run_category().await?;
        let kind = ExecutorKind::resolve(
            &run_type,
            &category,
            client.node_instance_name(),
            self.connector.is_some(),
        )?;
        info!(
            component = "app",
            event = "started",
            diid = %self.cfg.run().diid,
            node = %client.node_instance_name(),
            run_type = %run_type,
            category = %category,
            executor = ?kind,
            "agent lifecycle"
        );

        let ctx = HookContext {
            client,
            settings,
            cancel: self.shutdown_token.clone(),
        };
        lifecycle::drive(kind, ctx, self.connector.clone()).await
    }
}
