//! Project records — the collaborator store boundary.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use trellis_core::{ProjectId, ProjectSlug};

use crate::error::{StorageError, StorageResult};

/// The selected active release of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseArtifact {
    /// Version label shown in status output, e.g. `"v3"` or a commit id.
    pub version: String,
    /// Compiled WASM module bytes.
    #[serde(with = "serde_bytes_base64")]
    pub wasm: Vec<u8>,
}

/// Everything the runtime needs to know about a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Stable project identifier.
    pub id: ProjectId,
    /// URL-facing slug.
    pub slug: ProjectSlug,
    /// Whether the collaborator considers this project running. Consulted
    /// by Autostart; written back on crash/stop.
    pub running: bool,
    /// The active release, if one has been published.
    pub release: Option<ReleaseArtifact>,
    /// Environment variables exposed to the script's env capability.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Collaborator-owned goal/metric values exposed read-only to the
    /// script's goal accessor.
    #[serde(default)]
    pub goals: HashMap<String, serde_json::Value>,
}

/// Read/write access to project records.
///
/// Owned by a collaborator service; the runtime touches only the running
/// flag and reads the active release.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Fetch a project record by id.
    async fn get(&self, id: &ProjectId) -> StorageResult<Option<ProjectRecord>>;

    /// Resolve a slug to a project id.
    async fn find_by_slug(&self, slug: &ProjectSlug) -> StorageResult<Option<ProjectId>>;

    /// List every project whose running flag is set.
    async fn list_running(&self) -> StorageResult<Vec<ProjectRecord>>;

    /// Persist the running flag for a project.
    async fn set_running(&self, id: &ProjectId, running: bool) -> StorageResult<()>;
}

/// In-memory [`ProjectStore`] for tests and standalone deployments.
#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    records: RwLock<HashMap<ProjectId, ProjectRecord>>,
}

impl MemoryProjectStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record.
    pub async fn upsert(&self, record: ProjectRecord) {
        let mut records = self.records.write().await;
        records.insert(record.id.clone(), record);
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn get(&self, id: &ProjectId) -> StorageResult<Option<ProjectRecord>> {
        let records = self.records.read().await;
        Ok(records.get(id).cloned())
    }

    async fn find_by_slug(&self, slug: &ProjectSlug) -> StorageResult<Option<ProjectId>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|r| r.slug == *slug)
            .map(|r| r.id.clone()))
    }

    async fn list_running(&self) -> StorageResult<Vec<ProjectRecord>> {
        let records = self.records.read().await;
        let mut running: Vec<ProjectRecord> =
            records.values().filter(|r| r.running).cloned().collect();
        running.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(running)
    }

    async fn set_running(&self, id: &ProjectId, running: bool) -> StorageResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StorageError::UnknownProject(id.to_string()))?;
        record.running = running;
        Ok(())
    }
}

/// Serialize WASM bytes as base64 so project records stay JSON-friendly.
mod serde_bytes_base64 {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
