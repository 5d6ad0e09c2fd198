//! Durable contract snapshots keyed by contract identity.
//!
//! The engine persists the full `ContractState` after every node transition,
//! so a crash between "node executed" and "checkpoint written" loses at most
//! the last uncommitted node. Stores are constructed by the host process and
//! injected into the engine.

use crate::state::ContractState;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Durable key-value persistence for contract snapshots.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a full snapshot. Must complete before the next node runs.
    async fn save(&self, state: &ContractState) -> Result<()>;

    /// Load the last persisted snapshot for a contract, if any.
    async fn load(&self, contract_id: Uuid) -> Result<Option<ContractState>>;

    /// Drop a contract's snapshot.
    async fn remove(&self, contract_id: Uuid) -> Result<()>;

    /// Contract ids with a stored snapshot.
    async fn list(&self) -> Result<Vec<Uuid>>;
}

/// JSON-file store: one pretty-printed snapshot per contract under a
/// directory. Writes go through a temp file and rename so a crash mid-write
/// never corrupts the previous snapshot.
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create checkpoint dir {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, contract_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", contract_id))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, state: &ContractState) -> Result<()> {
        let json =
            serde_json::to_string_pretty(state).context("Failed to serialize contract state")?;
        let path = self.path_for(state.id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write checkpoint {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to commit checkpoint {}", path.display()))?;
        debug!(contract_id = %state.id, phase = %state.phase, "checkpoint written");
        Ok(())
    }

    async fn load(&self, contract_id: Uuid) -> Result<Option<ContractState>> {
        let path = self.path_for(contract_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let state: ContractState = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse checkpoint {}", path.display()))?;
                Ok(Some(state))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read checkpoint {}", path.display())),
        }
    }

    async fn remove(&self, contract_id: Uuid) -> Result<()> {
        let path = self.path_for(contract_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove checkpoint {}", path.display()))
            }
        }
    }

    async fn list(&self) -> Result<Vec<Uuid>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to read checkpoint dir {}", self.dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false)
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                && let Ok(id) = Uuid::parse_str(stem)
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// In-memory store for tests and embedded use.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    inner: Mutex<HashMap<Uuid, ContractState>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, state: &ContractState) -> Result<()> {
        self.inner.lock().await.insert(state.id, state.clone());
        Ok(())
    }

    async fn load(&self, contract_id: Uuid) -> Result<Option<ContractState>> {
        Ok(self.inner.lock().await.get(&contract_id).cloned())
    }

    async fn remove(&self, contract_id: Uuid) -> Result<()> {
        self.inner.lock().await.remove(&contract_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self.inner.lock().await.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}
