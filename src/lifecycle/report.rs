//! End-of-run report bundle: a gzipped tar of the configured report paths,
//! uploaded to the run's reports resource.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::task::spawn_blocking;
use tracing::{info, warn};

use super::settings::Settings;
use crate::error::{AgentError, Result};
use crate::run::RunClient;

/// `{node}_report_{timestamp}.tgz`, timestamp in UTC without colons.
pub fn report_file_name(node: &str, at: DateTime<Utc>) -> String {
    format!("{node}_report_{}.tgz", at.format("%Y-%m-%dT%H%M%SZ"))
}

/// Archives `paths` into `{reports_dir}/{report_file_name}`.
///
/// Paths that do not exist are skipped.
pub async fn bundle(node: &str, reports_dir: &Path, paths: &[PathBuf]) -> Result<PathBuf> {
    let target = reports_dir.join(report_file_name(node, Utc::now()));
    let reports_dir = reports_dir.to_owned();
    let paths = paths.to_vec();
    let out = target.clone();

    spawn_blocking(move || bundle_sync(&reports_dir, &out, &paths))
        .await
        .map_err(|e| AgentError::Internal(format!("report bundling task failed: {e}")))?
        .map_err(|e| AgentError::Execution(format!("Failed to bundle reports: {e}")))?;

    Ok(target)
}

fn bundle_sync(reports_dir: &Path, out: &Path, paths: &[PathBuf]) -> std::io::Result<()> {
    std::fs::create_dir_all(reports_dir)?;
    let file = File::create(out)?;
    let mut archive = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    archive.follow_symlinks(false);

    for path in paths {
        if !path.exists() {
            warn!(component = "report", event = "path_missing", path = ?path, "report path does not exist, skipping");
            continue;
        }
        let name = archive_name(path);
        if path.is_dir() {
            archive.append_dir_all(&name, path)?;
        } else {
            archive.append_path_with_name(path, &name)?;
        }
    }

    archive.into_inner()?.finish()?.sync_all()
}

/// Entry name inside the archive: the path without its root.
fn archive_name(path: &Path) -> PathBuf {
    let relative: PathBuf = path
        .components()
        .filter(|c| matches!(c, std::path::Component::Normal(_)))
        .collect();
    if relative.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        relative
    }
}

/// Bundles the report paths and uploads the archive.
pub async fn send_reports(client: &RunClient, settings: &Settings) -> Result<()> {
    info!(component = "lifecycle", event = "action", "Sending report");
    let archive = bundle(client.node_instance_name(), &settings.reports_dir, &settings.report_paths).await?;
    client.upload_report(&archive).await
}
