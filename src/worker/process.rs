use std::collections::HashSet;
use std::path::Path;

use tokio::process::Command;

use crate::error::{ResqError, Result};

/// Process ids currently alive on this host, as reported by `ps`.
pub async fn live_pids() -> Result<HashSet<u32>> {
    let output = Command::new("ps").args(["-A", "-o", "pid="]).output().await?;
    if !output.status.success() {
        return Err(ResqError::Internal(format!(
            "ps exited with {:?}",
            output.status.code()
        )));
    }
    Ok(parse_pids(&String::from_utf8_lossy(&output.stdout)))
}

/// Write this process's pid to `path`, replacing any previous content.
pub fn write_pid_file(path: &Path) -> Result<()> {
    std::fs::write(path, std::process::id().to_string())?;
    Ok(())
}

/// Remove a pid file written by [`write_pid_file`]. A missing file is fine.
pub fn remove_pid_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

fn parse_pids(listing: &str) -> HashSet<u32> {
    listing
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}
