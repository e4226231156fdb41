// Main entrypoint for the run agent.

use runagent::app::App;
use runagent::config::{Config, ConfigTrait};
use runagent::error::AgentError;
use runagent::shutdown::GracefulShutdown;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const CONFIG_PATH: &str = "cfg/runagent.cfg.yaml";
const CONFIG_PATH_LOCAL: &str = "cfg/runagent.cfg.local.yaml";

/// Drives one node instance of a run through its lifecycle.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Custom config file path
    #[arg(short, long, value_name = "FILE")]
    cfg: Option<PathBuf>,
}

/// Loads the configuration struct from YAML file.
/// Tries local config first, then falls back to default config.
fn load_cfg(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    if let Some(custom_path) = path {
        let cfg = Config::load(&custom_path)
            .with_context(|| format!("failed to load custom config from {:?}", custom_path))?;
        return Ok((cfg, custom_path));
    }

    match Config::load(CONFIG_PATH_LOCAL) {
        Ok(cfg) => Ok((cfg, PathBuf::from(CONFIG_PATH_LOCAL))),
        Err(_) => {
            let cfg = Config::load(CONFIG_PATH)
                .with_context(|| format!("failed to load config from {}", CONFIG_PATH))?;
            Ok((cfg, PathBuf::from(CONFIG_PATH)))
        }
    }
}

/// Configures structured logging based on configuration.
fn configure_logger(cfg: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let log_level = cfg
        .logs()
        .and_then(|logs| logs.level.as_ref())
        .map(|s| s.as_str())
        .unwrap_or("info");

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if cfg.is_prod() {
        // Production: JSON format
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        // Development: Pretty console format
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (cfg, path) = match load_cfg(args.cfg) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(AgentError::Config(e.to_string()).exit_code());
        }
    };

    configure_logger(&cfg);
    info!(component = "config", event = "load_success", path = ?path, "config loaded");

    let code = tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?
        .block_on(async_main(cfg))?;

    std::process::exit(code);
}

async fn async_main(cfg: Config) -> Result<i32> {
    let shutdown_token = CancellationToken::new();

    let graceful_shutdown = GracefulShutdown::new(shutdown_token.clone(), Duration::from_secs(30));
    graceful_shutdown.listen();

    let app = App::new(shutdown_token.clone(), cfg);
    let task = tokio::spawn(async move { app.run().await });

    let code = match graceful_shutdown.await_task(task).await? {
        Ok(outcome) => {
            info!(
                component = "main",
                event = "finished",
                state = %outcome.final_state,
                aborted = outcome.aborted,
                "run agent finished"
            );
            0
        }
        Err(e) => {
            error!(
                component = "main",
                event = "failed",
                error = %e,
                exit_code = e.exit_code(),
                "run agent failed"
            );
            e.exit_code()
        }
    };

    shutdown_token.cancel();
    Ok(code)
}
