use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{PreviewError, Result};
use crate::models::{DeploymentId, Job, StatusRecord};
use crate::services::queue::QUEUE_KEY;

const STATE_FILE: &str = "state.json";

/// One stored value. Port assignments are bare integers, status records are
/// objects and the job queue is a list of JSON-encoded jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entry {
    Port(u16),
    Status(StatusRecord),
    List(Vec<String>),
}

type Entries = BTreeMap<String, Entry>;

/// Durable key/value store for deployment records and the job queue.
///
/// All entries live in memory behind one lock and every mutation rewrites
/// `<state-dir>/state.json` through a temp file and rename, so a reader never
/// sees a half-written file and a failed write leaves memory untouched.
pub struct RecordStore {
    state_file_path: Option<PathBuf>,
    entries: Mutex<Entries>,
}

impl RecordStore {
    pub async fn open(state_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(state_dir)
            .await
            .map_err(|e| PreviewError::Store(format!("failed to create state dir: {e}")))?;
        let state_file_path = state_dir.join(STATE_FILE);
        let entries = load_entries(&state_file_path).await?;
        tracing::debug!(path = %state_file_path.display(), keys = entries.len(), "opened record store");
        Ok(Self {
            state_file_path: Some(state_file_path),
            entries: Mutex::new(entries),
        })
    }

    /// Non-persistent store.
    pub fn in_memory() -> Self {
        Self {
            state_file_path: None,
            entries: Mutex::new(Entries::new()),
        }
    }

    /// Read-only view of a state directory, as written by a running daemon.
    pub async fn read_snapshot(state_dir: &Path) -> Result<StoreSnapshot> {
        let entries = load_entries(&state_dir.join(STATE_FILE)).await?;
        Ok(StoreSnapshot { entries })
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            entries: self.entries.lock().await.clone(),
        }
    }

    pub async fn get_port(&self, key: &str) -> Option<u16> {
        match self.entries.lock().await.get(key) {
            Some(Entry::Port(port)) => Some(*port),
            _ => None,
        }
    }

    pub async fn set_port(&self, key: &str, port: u16) -> Result<()> {
        self.set_ports(&[(key.to_string(), port)]).await
    }

    pub async fn set_ports(&self, ports: &[(String, u16)]) -> Result<()> {
        self.update(|entries| {
            for (key, port) in ports {
                entries.insert(key.clone(), Entry::Port(*port));
            }
        })
        .await
    }

    /// Every persisted port assignment, across all identities.
    pub async fn port_values(&self) -> HashSet<u16> {
        self.entries
            .lock()
            .await
            .values()
            .filter_map(|entry| match entry {
                Entry::Port(port) => Some(*port),
                _ => None,
            })
            .collect()
    }

    pub async fn get_status(&self, id: &DeploymentId) -> Option<StatusRecord> {
        match self.entries.lock().await.get(&id.status_key()) {
            Some(Entry::Status(record)) => Some(record.clone()),
            _ => None,
        }
    }

    pub async fn set_status(&self, id: &DeploymentId, record: StatusRecord) -> Result<()> {
        tracing::debug!(deploy_id = %id, status = record.status.as_str(), "status transition");
        self.update(|entries| {
            entries.insert(id.status_key(), Entry::Status(record));
        })
        .await
    }

    pub async fn statuses(&self) -> Vec<(DeploymentId, StatusRecord)> {
        statuses_of(&*self.entries.lock().await)
    }

    /// Delete several keys in one write. Missing keys are ignored.
    pub async fn delete_keys(&self, keys: &[String]) -> Result<()> {
        self.update(|entries| {
            for key in keys {
                entries.remove(key);
            }
        })
        .await
    }

    /// Keys matching a glob pattern where `*` is any run of characters and
    /// `?` a single character, e.g. `*-STATUS`.
    pub async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let regex = glob_to_regex(pattern)?;
        Ok(self
            .entries
            .lock()
            .await
            .keys()
            .filter(|key| regex.is_match(key))
            .cloned()
            .collect())
    }

    pub async fn list(&self, key: &str) -> Vec<String> {
        match self.entries.lock().await.get(key) {
            Some(Entry::List(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    /// Read-modify-write of a list under the store lock. No other operation
    /// observes the list between the read and the write.
    pub async fn modify_list<T>(&self, key: &str, f: impl FnOnce(&mut Vec<String>) -> T) -> Result<T> {
        self.update(|entries| {
            let mut items = match entries.remove(key) {
                Some(Entry::List(items)) => items,
                _ => Vec::new(),
            };
            let out = f(&mut items);
            entries.insert(key.to_string(), Entry::List(items));
            out
        })
        .await
    }

    async fn update<T>(&self, f: impl FnOnce(&mut Entries) -> T) -> Result<T> {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        let out = f(&mut next);
        self.persist(&next).await?;
        *entries = next;
        Ok(out)
    }

    async fn persist(&self, entries: &Entries) -> Result<()> {
        let Some(path) = &self.state_file_path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(entries)?;
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json)
            .await
            .map_err(|e| PreviewError::Store(format!("failed to write state file: {e}")))?;
        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| PreviewError::Store(format!("failed to replace state file: {e}")))?;
        Ok(())
    }
}

/// Point-in-time copy of the store contents.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    entries: Entries,
}

impl StoreSnapshot {
    pub fn statuses(&self) -> Vec<(DeploymentId, StatusRecord)> {
        statuses_of(&self.entries)
    }

    pub fn port(&self, id: &DeploymentId) -> Option<u16> {
        match self.entries.get(id.port_key()) {
            Some(Entry::Port(port)) => Some(*port),
            _ => None,
        }
    }

    /// Queued jobs in order. Entries that fail to decode are skipped.
    pub fn jobs(&self) -> Vec<Job> {
        match self.entries.get(QUEUE_KEY) {
            Some(Entry::List(items)) => items
                .iter()
                .filter_map(|raw| serde_json::from_str(raw).ok())
                .collect(),
            _ => Vec::new(),
        }
    }
}

async fn load_entries(path: &Path) -> Result<Entries> {
    let exists = tokio::fs::try_exists(path)
        .await
        .map_err(|e| PreviewError::Store(format!("failed to stat state file: {e}")))?;
    if !exists {
        return Ok(Entries::new());
    }
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PreviewError::Store(format!("failed to read state file: {e}")))?;
    if json.trim().is_empty() {
        return Ok(Entries::new());
    }
    Ok(serde_json::from_str(&json)?)
}

fn statuses_of(entries: &Entries) -> Vec<(DeploymentId, StatusRecord)> {
    entries
        .iter()
        .filter_map(|(key, entry)| match entry {
            Entry::Status(record) => {
                DeploymentId::from_status_key(key).map(|id| (id, record.clone()))
            }
            _ => None,
        })
        .collect()
}

fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            _ => expr.push_str(&regex::escape(&c.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| PreviewError::Store(format!("bad key pattern '{pattern}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeploymentStatus, Revision};

    fn record(status: DeploymentStatus) -> StatusRecord {
        StatusRecord::new(
            status,
            &Revision {
                clone_url: "https://github.com/acme/app.git".into(),
                branch: "feature-x".into(),
                sha: "abc123".into(),
            },
        )
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = DeploymentId::from("acme-app-pr-7");
        {
            let store = RecordStore::open(dir.path()).await.unwrap();
            store.set_port(id.port_key(), 4001).await.unwrap();
            store.set_status(&id, record(DeploymentStatus::Running)).await.unwrap();
            store
                .modify_list("queue", |items| items.push("a".into()))
                .await
                .unwrap();
        }
        let store = RecordStore::open(dir.path()).await.unwrap();
        assert_eq!(store.get_port("acme-app-pr-7").await, Some(4001));
        assert_eq!(
            store.get_status(&id).await.unwrap().status,
            DeploymentStatus::Running
        );
        assert_eq!(store.list("queue").await, vec!["a".to_string()]);
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn persisted_layout_uses_wire_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).await.unwrap();
        let id = DeploymentId::from("acme-app-pr-7");
        store.set_status(&id, record(DeploymentStatus::Building)).await.unwrap();
        store.set_port(id.port_key(), 4000).await.unwrap();

        let json: serde_json::Value = serde_json::from_str(
            &tokio::fs::read_to_string(dir.path().join("state.json"))
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(json["acme-app-pr-7"], 4000);
        assert_eq!(json["acme-app-pr-7-STATUS"]["status"], "BUILDING");
        assert_eq!(
            json["acme-app-pr-7-STATUS"]["cloneUrl"],
            "https://github.com/acme/app.git"
        );
    }

    #[tokio::test]
    async fn keys_matching_status_pattern() {
        let store = RecordStore::in_memory();
        for id in ["a-pr-1", "b-branch-main"] {
            let id = DeploymentId::from(id);
            store.set_status(&id, record(DeploymentStatus::Running)).await.unwrap();
            store.set_port(id.port_key(), 4000).await.unwrap();
        }
        let mut keys = store.keys_matching("*-STATUS").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a-pr-1-STATUS", "b-branch-main-STATUS"]);
        assert_eq!(store.keys_matching("a-pr-?").await.unwrap(), vec!["a-pr-1"]);
    }

    #[tokio::test]
    async fn delete_keys_removes_all_at_once() {
        let store = RecordStore::in_memory();
        let id = DeploymentId::from("a-pr-1");
        store.set_status(&id, record(DeploymentStatus::Running)).await.unwrap();
        store
            .set_ports(&[("a-pr-1".into(), 4000), ("a-pr-1-api".into(), 4001)])
            .await
            .unwrap();
        assert_eq!(store.port_values().await, HashSet::from([4000, 4001]));

        store
            .delete_keys(&[id.status_key(), "a-pr-1".into(), "a-pr-1-api".into(), "missing".into()])
            .await
            .unwrap();
        assert!(store.get_status(&id).await.is_none());
        assert!(store.port_values().await.is_empty());
    }

    #[tokio::test]
    async fn snapshot_reads_without_opening() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).await.unwrap();
        let id = DeploymentId::from("a-pr-1");
        store.set_status(&id, record(DeploymentStatus::Rebuilding)).await.unwrap();
        store.set_port(id.port_key(), 4005).await.unwrap();

        let snapshot = RecordStore::read_snapshot(dir.path()).await.unwrap();
        let statuses = snapshot.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].0, id);
        assert_eq!(snapshot.port(&id), Some(4005));
        assert!(snapshot.jobs().is_empty());

        let empty = tempfile::tempdir().unwrap();
        assert!(RecordStore::read_snapshot(empty.path())
            .await
            .unwrap()
            .statuses()
            .is_empty());
    }

    #[tokio::test]
    async fn unreadable_state_dir_is_an_error_not_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("plain-file");
        std::fs::write(&not_a_dir, "x").unwrap();

        let err = RecordStore::read_snapshot(&not_a_dir).await.unwrap_err();
        assert!(matches!(err, PreviewError::Store(_)), "{err}");
    }
}
