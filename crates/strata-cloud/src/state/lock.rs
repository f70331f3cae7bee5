//! State lock
//!
//! `.strata/lock.json` is created exclusively. Whoever creates it holds
//! the state until the [`StateLock`] guard is released or dropped.
//!
//! The lock is written to a private file first and hard-linked into place,
//! so `lock.json` never exists without its content. A lock that still
//! cannot be parsed is judged stale by its modification time.

use super::StateManager;
use crate::error::{CloudError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Lock information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub id: String,
    pub holder: String,
    pub operation: String,
    pub acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn new(operation: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            holder: holder(),
            operation: operation.to_string(),
            acquired_at: Utc::now(),
        }
    }

    fn is_stale(&self, timeout: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.acquired_at);
        age.to_std().is_ok_and(|age| age >= timeout)
    }
}

fn holder() -> String {
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{}@{} (pid {})", whoami(), host, std::process::id())
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

impl StateManager {
    /// Acquire the state lock for `operation`.
    ///
    /// A lock older than `timeout` is considered abandoned and taken over.
    pub async fn acquire_lock(&self, operation: &str, timeout: Duration) -> Result<StateLock> {
        self.ensure_state_dir().await?;
        let lock_path = self.lock_path();

        // Later passes only happen after a stale lock was removed or the
        // holder released between our attempts.
        for _ in 0..3 {
            let info = LockInfo::new(operation);
            if self.try_create_lock(&info).await? {
                tracing::debug!(id = %info.id, operation, "Acquired state lock");
                return Ok(StateLock {
                    lock_path,
                    info,
                    released: false,
                });
            }

            match self.read_lock().await {
                Ok(Some(existing)) => {
                    if !existing.is_stale(timeout) {
                        return Err(CloudError::StateLocked {
                            id: existing.id,
                            holder: existing.holder,
                            operation: existing.operation,
                            acquired_at: existing.acquired_at,
                        });
                    }
                    tracing::warn!(
                        id = %existing.id,
                        holder = %existing.holder,
                        acquired_at = %existing.acquired_at,
                        "Taking over stale state lock"
                    );
                    remove_if_present(&lock_path).await?;
                }
                Ok(None) => {}
                Err(CloudError::Json(e)) => {
                    if !self.lock_file_older_than(timeout).await? {
                        return Err(CloudError::StateError(format!(
                            "lock file {} is unreadable ({}); it is taken over once older than {}s",
                            lock_path.display(),
                            e,
                            timeout.as_secs()
                        )));
                    }
                    tracing::warn!(path = %lock_path.display(), error = %e, "Taking over unreadable stale state lock");
                    remove_if_present(&lock_path).await?;
                }
                Err(e) => return Err(e),
            }
        }

        Err(CloudError::StateError(
            "could not acquire state lock".to_string(),
        ))
    }

    /// Publish `info` as the lock. False when a lock already exists.
    async fn try_create_lock(&self, info: &LockInfo) -> Result<bool> {
        let lock_path = self.lock_path();
        let staging = self.state_dir().join(format!("lock.{}.tmp", info.id));
        fs::write(&staging, serde_json::to_string_pretty(info)?).await?;

        let linked = fs::hard_link(&staging, &lock_path).await;
        fs::remove_file(&staging).await?;
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn lock_file_older_than(&self, timeout: Duration) -> Result<bool> {
        let modified = match fs::metadata(self.lock_path()).await {
            Ok(metadata) => metadata.modified()?,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };
        Ok(modified.elapsed().is_ok_and(|age| age >= timeout))
    }

    /// Current lock holder, if any
    pub async fn read_lock(&self) -> Result<Option<LockInfo>> {
        match fs::read_to_string(self.lock_path()).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a lock left behind by a dead process. The id must match.
    pub async fn force_unlock(&self, id: &str) -> Result<LockInfo> {
        let existing = match self.read_lock().await {
            Ok(Some(existing)) => existing,
            Ok(None) => return Err(CloudError::NotLocked),
            Err(CloudError::Json(e)) => {
                return Err(CloudError::StateError(format!(
                    "lock file {} is unreadable ({}); remove it by hand if no strata process is running",
                    self.lock_path().display(),
                    e
                )));
            }
            Err(e) => return Err(e),
        };
        if existing.id != id {
            return Err(CloudError::LockMismatch {
                expected: id.to_string(),
                found: existing.id,
            });
        }
        fs::remove_file(self.lock_path()).await?;
        tracing::warn!(id = %existing.id, holder = %existing.holder, "Force-unlocked state");
        Ok(existing)
    }
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// RAII guard for the state lock
#[derive(Debug)]
pub struct StateLock {
    lock_path: PathBuf,
    info: LockInfo,
    released: bool,
}

impl StateLock {
    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.still_owned() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!(id = %self.info.id, "Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }

    /// False once someone force-unlocked and re-locked the state.
    fn still_owned(&self) -> bool {
        std::fs::read_to_string(&self.lock_path)
            .ok()
            .and_then(|c| serde_json::from_str::<LockInfo>(&c).ok())
            .is_some_and(|l| l.id == self.info.id)
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.still_owned() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_second_acquire_fails_while_held() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock("apply", HOUR).await.unwrap();
        let err = manager.acquire_lock("apply", HOUR).await.unwrap_err();
        match err {
            CloudError::StateLocked { id, .. } => assert_eq!(id, lock.id()),
            other => panic!("expected StateLocked, got {:?}", other),
        }

        lock.release().await.unwrap();
        assert!(manager.read_lock().await.unwrap().is_none());
        manager.acquire_lock("apply", HOUR).await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_releases_lock() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        {
            let _lock = manager.acquire_lock("apply", HOUR).await.unwrap();
            assert!(manager.lock_path().exists());
        }
        assert!(!manager.lock_path().exists());
    }

    #[tokio::test]
    async fn test_stale_lock_is_taken_over() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let stale = LockInfo {
            id: "old".to_string(),
            holder: "gone".to_string(),
            operation: "apply".to_string(),
            acquired_at: Utc::now() - chrono::Duration::hours(2),
        };
        std::fs::create_dir_all(manager.state_dir()).unwrap();
        std::fs::write(manager.lock_path(), serde_json::to_string(&stale).unwrap()).unwrap();

        let lock = manager.acquire_lock("apply", HOUR).await.unwrap();
        assert_ne!(lock.id(), "old");
    }

    #[tokio::test]
    async fn test_lock_file_holds_content_once_acquired() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock("apply", HOUR).await.unwrap();
        assert_eq!(manager.read_lock().await.unwrap().as_ref(), Some(lock.info()));
        let leftovers: Vec<_> = std::fs::read_dir(manager.state_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_lock_expires_by_age() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        std::fs::create_dir_all(manager.state_dir()).unwrap();
        std::fs::write(manager.lock_path(), "").unwrap();

        let err = manager.acquire_lock("apply", HOUR).await.unwrap_err();
        assert!(matches!(err, CloudError::StateError(_)));
        assert!(matches!(
            manager.force_unlock("anything").await,
            Err(CloudError::StateError(_))
        ));

        let lock = manager.acquire_lock("apply", Duration::ZERO).await.unwrap();
        assert_eq!(manager.read_lock().await.unwrap().unwrap().id, lock.id());
    }

    #[tokio::test]
    async fn test_force_unlock_requires_matching_id() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        assert!(matches!(
            manager.force_unlock("nope").await,
            Err(CloudError::NotLocked)
        ));

        let lock = manager.acquire_lock("apply", HOUR).await.unwrap();
        assert!(matches!(
            manager.force_unlock("nope").await,
            Err(CloudError::LockMismatch { .. })
        ));

        let removed = manager.force_unlock(lock.id()).await.unwrap();
        assert_eq!(removed.operation, "apply");
        assert!(manager.read_lock().await.unwrap().is_none());
    }
}
