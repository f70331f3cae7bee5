//! State management for applied resources
//!
//! Manages the `.strata/state.json` file which records the last known
//! real-world state of every resource.

mod lock;
mod store;

pub use lock::{LockInfo, StateLock};
pub use store::StateStore;

use crate::error::{CloudError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use strata_core::{ResourceAddress, ResourceState, StateSnapshot};
use tokio::fs;

pub const STATE_VERSION: u32 = 1;
pub const STATE_DIR: &str = ".strata";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// Persisted state document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    /// State file format version
    pub version: u32,

    /// Incremented on every save
    pub serial: u64,

    /// Identifies one state history across saves
    pub lineage: String,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    pub resources: BTreeMap<ResourceAddress, ResourceState>,
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            serial: 0,
            lineage: uuid::Uuid::new_v4().to_string(),
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl StateDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.resources.clone()
    }

    pub fn get(&self, address: &ResourceAddress) -> Option<&ResourceState> {
        self.resources.get(address)
    }

    pub fn set(&mut self, state: ResourceState) {
        self.resources.insert(state.address.clone(), state);
        self.updated_at = Utc::now();
    }

    pub fn remove(&mut self, address: &ResourceAddress) -> Option<ResourceState> {
        let result = self.resources.remove(address);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// State manager for reading/writing state files
#[derive(Debug, Clone)]
pub struct StateManager {
    /// Project root directory
    project_root: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Get the state directory path
    pub fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    /// Ensure the state directory exists
    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the current state
    pub async fn load(&self) -> Result<StateDocument> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(StateDocument::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: StateDocument = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!(
            serial = state.serial,
            resources = state.resources.len(),
            "Loaded state"
        );
        Ok(state)
    }

    /// Save the state, bumping its serial. The previous file is kept as
    /// `state.json.backup`.
    pub async fn save(&self, state: &mut StateDocument) -> Result<()> {
        self.ensure_state_dir().await?;

        state.serial += 1;
        state.updated_at = Utc::now();

        let path = self.state_path();
        let backup = self.backup_path();
        if path.exists() {
            fs::copy(&path, &backup).await?;
        }

        // Write to a sibling file first so a crash never leaves a torn state.json
        let staging = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(state)?;
        fs::write(&staging, content).await?;
        fs::rename(&staging, &path).await?;

        tracing::debug!(
            serial = state.serial,
            resources = state.resources.len(),
            "Saved state"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn vpc() -> ResourceState {
        ResourceState::new(
            ResourceAddress::new("vpc", "main"),
            "vpc-1",
            [("cidr_block".to_string(), json!("10.0.0.0/16"))]
                .into_iter()
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = StateDocument::new();
        state.set(vpc());
        manager.save(&mut state).await.unwrap();

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.resources.len(), 1);
        assert_eq!(loaded.serial, 1);
        assert_eq!(loaded.lineage, state.lineage);
        assert!(loaded.get(&ResourceAddress::new("vpc", "main")).is_some());
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let state = manager.load().await.unwrap();
        assert!(state.is_empty());
        assert_eq!(state.serial, 0);
    }

    #[tokio::test]
    async fn test_save_keeps_backup_and_bumps_serial() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = StateDocument::new();
        manager.save(&mut state).await.unwrap();
        state.set(vpc());
        manager.save(&mut state).await.unwrap();

        assert_eq!(state.serial, 2);
        let backup: StateDocument =
            serde_json::from_str(&std::fs::read_to_string(manager.backup_path()).unwrap()).unwrap();
        assert_eq!(backup.serial, 1);
        assert!(backup.is_empty());
    }

    #[tokio::test]
    async fn test_newer_version_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = StateDocument::new();
        state.version = STATE_VERSION + 1;
        std::fs::create_dir_all(manager.state_dir()).unwrap();
        std::fs::write(manager.state_path(), serde_json::to_string(&state).unwrap()).unwrap();

        assert!(matches!(
            manager.load().await,
            Err(CloudError::StateError(_))
        ));
    }

    #[test]
    fn test_document_uses_address_keys() {
        let mut state = StateDocument::new();
        state.set(vpc());
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["resources"]["vpc.main"]["id"], json!("vpc-1"));
    }
}
