//! JSON snapshot persistence for the in-memory graph

use super::{MessageId, MessageNode, SummaryId, SummaryNode, UserNode};
use crate::error::{NyxError, NyxResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct SnapshotMessage {
    pub sender_id: String,
    #[serde(flatten)]
    pub message: MessageNode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct SnapshotSummary {
    pub user_id: String,
    #[serde(flatten)]
    pub summary: SummaryNode,
}

/// Serialized form of the whole graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct GraphSnapshot {
    pub version: u32,
    pub users: Vec<UserNode>,
    pub messages: Vec<SnapshotMessage>,
    pub summaries: Vec<SnapshotSummary>,
    #[serde(default)]
    pub replies: Vec<(MessageId, MessageId)>,
    #[serde(default)]
    pub part_of: Vec<(MessageId, SummaryId)>,
    #[serde(default)]
    pub knows: Vec<(String, String)>,
}

impl Default for GraphSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            users: Vec::new(),
            messages: Vec::new(),
            summaries: Vec::new(),
            replies: Vec::new(),
            part_of: Vec::new(),
            knows: Vec::new(),
        }
    }
}

/// Write the snapshot next to `path` and rename it into place
pub(super) fn save(snapshot: &GraphSnapshot, path: &Path) -> NyxResult<()> {
    let bytes =
        serde_json::to_vec(snapshot).map_err(|e| NyxError::storage("snapshot_encode", e))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| NyxError::storage("snapshot_mkdir", e))?;
    }

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).map_err(|e| NyxError::storage("snapshot_write", e))?;
    fs::rename(&tmp, path).map_err(|e| NyxError::storage("snapshot_rename", e))?;
    Ok(())
}

/// Read a snapshot; `None` when the file does not exist yet
pub(super) fn load(path: &Path) -> NyxResult<Option<GraphSnapshot>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(NyxError::storage("snapshot_read", e)),
    };

    let snapshot: GraphSnapshot =
        serde_json::from_slice(&bytes).map_err(|e| NyxError::storage("snapshot_decode", e))?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(NyxError::constraint(
            "snapshot_version",
            format!("expected {SNAPSHOT_VERSION}, found {}", snapshot.version),
        ));
    }
    Ok(Some(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("absent.json")).unwrap().is_none());
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("graph.json");

        save(&GraphSnapshot::default(), &path).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        let loaded = load(&path).unwrap().unwrap();
        assert!(loaded.users.is_empty());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        fs::write(&path, r#"{"version":99,"users":[],"messages":[],"summaries":[]}"#).unwrap();

        let err = load(&path).unwrap_err();
        assert!(err.is_storage());
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(load(&path), Err(NyxError::Storage { .. })));
    }
}
