//! Removal of stale scratch files

use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::config::CleanupConfig;

/// Remove entries of `dir` whose modification time is older than `ttl`.
///
/// Returns the number of removed entries. Entries that disappear while the
/// sweep runs are logged and skipped.
pub fn cleanup_tmp(dir: &Path, ttl: Duration) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Cleanup skipped, cannot read {}: {}", dir.display(), e);
            return 0;
        }
    };

    let now = SystemTime::now();
    let mut removed = 0;

    for entry in entries.flatten() {
        let path = entry.path();
        let age = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => now.duration_since(modified).unwrap_or_default(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("Item not found during cleanup (possibly already deleted): {}", path.display());
                continue;
            }
            Err(e) => {
                tracing::error!("Error reading {}: {}", path.display(), e);
                continue;
            }
        };
        if age <= ttl {
            continue;
        }

        tracing::info!("Attempting to remove old item: {}", path.display());
        let result = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };

        match result {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("Item not found during cleanup (possibly already deleted): {}", path.display());
            }
            Err(e) => tracing::error!("Error removing item {}: {}", path.display(), e),
        }
    }

    removed
}

/// Sweep the scratch directory every `interval_secs` on a background task
pub fn spawn_cleanup_task(config: CleanupConfig) -> tokio::task::JoinHandle<()> {
    tracing::info!(
        "Scratch cleanup every {}s for {} (ttl {}s)",
        config.interval_secs,
        config.scratch_dir.display(),
        config.ttl_secs
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(config.interval_secs.max(1)));
        let ttl = Duration::from_secs(config.ttl_secs);
        loop {
            ticker.tick().await;
            let dir = config.scratch_dir.clone();
            match tokio::task::spawn_blocking(move || cleanup_tmp(&dir, ttl)).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Removed {} stale scratch items", n),
                Err(e) => tracing::error!("Cleanup task failed: {}", e),
            }
        }
    })
}
