//! Snapshot file and backup rotation
//!
//! Layout under the data directory:
//!
//! ```text
//! data/
//!   trade-data.json          primary snapshot
//!   backups/
//!     backup-<ms>.json       one full copy per save
//! ```
//!
//! The primary file is replaced via a temp file and rename. The backup is
//! written afterwards and the backup directory is then pruned, so a crash
//! between the steps can leave backups behind the primary file.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tracing::{debug, error, info, warn};

use super::models::Snapshot;
use crate::error::StoreError;

pub const DATA_FILE: &str = "trade-data.json";
pub const BACKUP_DIR: &str = "backups";
const BACKUP_PREFIX: &str = "backup-";
const BACKUP_SUFFIX: &str = ".json";

/// A backup file found in the backup directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFile {
    pub path: PathBuf,
    /// Millisecond timestamp parsed from the filename
    pub timestamp_ms: i64,
}

/// Reads and writes the snapshot and its backups
pub struct SnapshotFile {
    data_file: PathBuf,
    backup_dir: PathBuf,
    retention: usize,
    /// Last backup stamp handed out; keeps names unique within a process
    last_backup_ms: i64,
}

impl SnapshotFile {
    /// `retention` is clamped to 1 so the backup just written always survives.
    pub fn new(data_dir: &Path, retention: usize) -> Self {
        Self {
            data_file: data_dir.join(DATA_FILE),
            backup_dir: data_dir.join(BACKUP_DIR),
            retention: retention.max(1),
            last_backup_ms: 0,
        }
    }

    pub fn data_file(&self) -> &Path {
        &self.data_file
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Create the data and backup directories.
    pub async fn prepare(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.backup_dir)
            .await
            .map_err(|e| StoreError::persistence(&self.backup_dir, e))
    }

    /// Load the snapshot, or `None` when there is nothing usable on disk.
    ///
    /// A file that does not parse is renamed to `<file>.corrupt-<ms>` so the
    /// caller can start fresh without overwriting it.
    pub async fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        let bytes = match fs::read(&self.data_file).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::persistence(&self.data_file, e)),
        };

        match serde_json::from_slice::<Snapshot>(&bytes) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(parse_err) => {
                let aside = self
                    .data_file
                    .with_extension(format!("json.corrupt-{}", Utc::now().timestamp_millis()));
                error!(
                    path = %self.data_file.display(),
                    moved_to = %aside.display(),
                    error = %parse_err,
                    "Snapshot is unreadable, starting fresh"
                );
                fs::rename(&self.data_file, &aside)
                    .await
                    .map_err(|e| StoreError::persistence(&self.data_file, e))?;
                Ok(None)
            }
        }
    }

    /// Write the primary file, then a backup, then prune old backups.
    ///
    /// Returns the backup path. Pruning failures are logged and swallowed.
    pub async fn save(&mut self, snapshot: &Snapshot) -> Result<PathBuf, StoreError> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;

        self.write_primary(&bytes).await?;
        let backup = self.write_backup(&bytes).await?;

        if let Err(e) = self.prune_backups().await {
            warn!(error = %e, "Backup cleanup failed");
        }

        debug!(bytes = bytes.len(), backup = %backup.display(), "Saved snapshot");
        Ok(backup)
    }

    async fn write_primary(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let tmp = self.data_file.with_extension("json.tmp");
        fs::write(&tmp, bytes)
            .await
            .map_err(|e| StoreError::persistence(&tmp, e))?;
        fs::rename(&tmp, &self.data_file)
            .await
            .map_err(|e| StoreError::persistence(&self.data_file, e))
    }

    async fn write_backup(&mut self, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let stamp = Utc::now().timestamp_millis().max(self.last_backup_ms + 1);
        self.last_backup_ms = stamp;

        let path = self
            .backup_dir
            .join(format!("{BACKUP_PREFIX}{stamp}{BACKUP_SUFFIX}"));
        fs::write(&path, bytes)
            .await
            .map_err(|e| StoreError::persistence(&path, e))?;
        Ok(path)
    }

    /// Backups sorted newest first. Files whose name does not carry a
    /// timestamp are ignored.
    pub async fn list_backups(&self) -> Result<Vec<BackupFile>, StoreError> {
        let mut entries = fs::read_dir(&self.backup_dir)
            .await
            .map_err(|e| StoreError::persistence(&self.backup_dir, e))?;

        let mut backups = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::persistence(&self.backup_dir, e))?
        {
            let name = entry.file_name();
            if let Some(timestamp_ms) = name.to_str().and_then(parse_backup_stamp) {
                backups.push(BackupFile {
                    path: entry.path(),
                    timestamp_ms,
                });
            }
        }

        backups.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        Ok(backups)
    }

    /// Delete all but the newest `retention` backups; returns how many were
    /// removed.
    pub async fn prune_backups(&self) -> Result<usize, StoreError> {
        let backups = self.list_backups().await?;
        let mut removed = 0;
        for old in backups.iter().skip(self.retention) {
            fs::remove_file(&old.path)
                .await
                .map_err(|e| StoreError::persistence(&old.path, e))?;
            removed += 1;
        }
        if removed > 0 {
            info!(removed, kept = self.retention, "Pruned old backups");
        }
        Ok(removed)
    }
}

fn parse_backup_stamp(name: &str) -> Option<i64> {
    name.strip_prefix(BACKUP_PREFIX)?
        .strip_suffix(BACKUP_SUFFIX)?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_backup_stamp() {
        assert_eq!(parse_backup_stamp("backup-1714550400000.json"), Some(1714550400000));
        assert_eq!(parse_backup_stamp("backup-abc.json"), None);
        assert_eq!(parse_backup_stamp("trade-data.json"), None);
        assert_eq!(parse_backup_stamp("backup-1.json.tmp"), None);
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let dir = TempDir::new().unwrap();
        let file = SnapshotFile::new(dir.path(), 10);
        file.prepare().await.unwrap();
        assert!(file.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_moved_aside() {
        let dir = TempDir::new().unwrap();
        let file = SnapshotFile::new(dir.path(), 10);
        file.prepare().await.unwrap();
        std::fs::write(file.data_file(), b"{ not json").unwrap();

        assert!(file.load().await.unwrap().is_none());
        assert!(!file.data_file().exists());

        let aside: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
            .collect();
        assert_eq!(aside.len(), 1);
    }

    #[tokio::test]
    async fn test_backup_names_are_unique_and_pruned() {
        let dir = TempDir::new().unwrap();
        let mut file = SnapshotFile::new(dir.path(), 3);
        file.prepare().await.unwrap();

        let snapshot = Snapshot::default();
        let mut written = Vec::new();
        for _ in 0..5 {
            written.push(file.save(&snapshot).await.unwrap());
        }

        let backups = file.list_backups().await.unwrap();
        assert_eq!(backups.len(), 3);
        let kept: Vec<_> = backups.iter().map(|b| b.path.clone()).collect();
        let newest: Vec<_> = written.iter().rev().take(3).cloned().collect();
        assert_eq!(kept, newest);
    }

    #[tokio::test]
    async fn test_zero_retention_keeps_latest_backup() {
        let dir = TempDir::new().unwrap();
        let mut file = SnapshotFile::new(dir.path(), 0);
        file.prepare().await.unwrap();

        let snapshot = Snapshot::default();
        file.save(&snapshot).await.unwrap();
        let latest = file.save(&snapshot).await.unwrap();

        let backups = file.list_backups().await.unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].path, latest);
        assert!(latest.exists());
    }

    #[tokio::test]
    async fn test_unrelated_files_survive_pruning() {
        let dir = TempDir::new().unwrap();
        let mut file = SnapshotFile::new(dir.path(), 1);
        file.prepare().await.unwrap();
        let stray = file.backup_dir().join("README.txt");
        std::fs::write(&stray, b"keep me").unwrap();

        let snapshot = Snapshot::default();
        file.save(&snapshot).await.unwrap();
        file.save(&snapshot).await.unwrap();

        assert!(stray.exists());
        assert_eq!(file.list_backups().await.unwrap().len(), 1);
    }
}
