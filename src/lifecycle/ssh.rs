// Authorised SSH key provisioning for the node's login user.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;

pub fn authorized_keys_path(home: &Path) -> PathBuf {
    home.join(".ssh").join("authorized_keys")
}

/// Appends `key` to `~/.ssh/authorized_keys` unless it is already there.
///
/// Returns whether the file changed.
pub fn append_authorized_key(home: &Path, key: &str) -> Result<bool> {
    let key = key.trim();
    if key.is_empty() {
        return Ok(false);
    }

    let path = authorized_keys_path(home);
    let dir = home.join(".ssh");
    std::fs::create_dir_all(&dir)?;
    set_mode(&dir, 0o700)?;

    let existing = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    if existing.lines().any(|line| line.trim() == key) {
        return Ok(false);
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    if !existing.is_empty() && !existing.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    writeln!(file, "{key}")?;
    file.sync_all()?;
    set_mode(&path, 0o600)?;

    info!(component = "ssh", event = "key_added", path = ?path, "public key added to authorized keys");
    Ok(true)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
