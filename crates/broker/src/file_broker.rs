use std::{
    collections::HashMap,
    path::{
        Path,
        PathBuf,
    },
    sync::Arc,
};

use anyhow::Context;
use async_trait::async_trait;
use errors::ErrorMetadata;
use parking_lot::Mutex;
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    Broker,
    BrokerTarget,
};

/// One line of a target's on-disk log: `{"key":"...","value":"..."}\n`.
#[derive(Serialize, Deserialize)]
struct Entry {
    key: String,
    value: String,
}

struct TargetState {
    path: PathBuf,
    // Insertion-ordered, duplicates permitted; `get`/`pop` use the first
    // match.
    entries: Vec<(String, String)>,
}

impl TargetState {
    fn load(path: PathBuf) -> Self {
        let mut entries = Vec::new();
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                for (line_no, line) in contents.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Entry>(line) {
                        Ok(entry) => entries.push((entry.key, entry.value)),
                        Err(e) => {
                            // A corrupted line is logged and skipped, never fatal.
                            tracing::warn!(
                                "broker: skipping corrupt line {line_no} in {}: {e}",
                                path.display()
                            );
                        },
                    }
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Missing target file is created lazily on first write.
            },
            Err(e) => {
                tracing::warn!("broker: failed to read {}: {e}", path.display());
            },
        }
        Self { path, entries }
    }

    fn persist(&self) -> anyhow::Result<()> {
        let mut contents = String::new();
        for (key, value) in &self.entries {
            let line = serde_json::to_string(&Entry {
                key: key.clone(),
                value: value.clone(),
            })?;
            contents.push_str(&line);
            contents.push('\n');
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("creating broker directory {}", parent.display())
            })?;
        }
        // Write to a temp file and rename so a crash mid-write never leaves a
        // half-written target on disk.
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, contents)
            .with_context(|| format!("writing {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("renaming into {}", self.path.display()))?;
        Ok(())
    }
}

/// Append-oriented, file-backed `Broker`. Each target is a JSON-lines file
/// under `base_dir`; an in-memory mirror guarded by a per-target lock makes
/// reads cheap and every mutation atomic with respect to other operations on
/// the same target. Cross-target atomicity is not promised.
pub struct FileBroker {
    targets: HashMap<BrokerTarget, Arc<Mutex<TargetState>>>,
}

impl FileBroker {
    /// Eagerly loads all four targets from `base_dir`. Intended to be called
    /// once at process startup.
    pub fn open(base_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let base_dir = base_dir.as_ref();
        let mut targets = HashMap::new();
        for target in BrokerTarget::ALL {
            let path = base_dir.join(target.file_name());
            targets.insert(target, Arc::new(Mutex::new(TargetState::load(path))));
        }
        Ok(Self { targets })
    }

    fn state(&self, target: BrokerTarget) -> &Arc<Mutex<TargetState>> {
        self.targets
            .get(&target)
            .expect("BrokerTarget::ALL covers every variant")
    }
}

#[async_trait]
impl Broker for FileBroker {
    async fn add(&self, target: BrokerTarget, key: &str, value: &str) -> anyhow::Result<()> {
        let state = self.state(target).clone();
        let key = key.to_string();
        let value = value.to_string();
        tokio::task::spawn_blocking(move || {
            let mut state = state.lock();
            state.entries.push((key, value));
            state.persist()
        })
        .await
        .context("broker add task panicked")??;
        Ok(())
    }

    async fn remove(&self, target: BrokerTarget, key: &str) -> anyhow::Result<()> {
        let state = self.state(target).clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let mut state = state.lock();
            if let Some(pos) = state.entries.iter().position(|(k, _)| k == &key) {
                state.entries.remove(pos);
                state.persist()?;
            }
            anyhow::Ok(())
        })
        .await
        .context("broker remove task panicked")??;
        Ok(())
    }

    async fn update(&self, target: BrokerTarget, key: &str, value: &str) -> anyhow::Result<()> {
        let state = self.state(target).clone();
        let key = key.to_string();
        let value = value.to_string();
        tokio::task::spawn_blocking(move || {
            let mut state = state.lock();
            if let Some(entry) = state.entries.iter_mut().find(|(k, _)| k == &key) {
                entry.1 = value;
                state.persist()?;
            }
            anyhow::Ok(())
        })
        .await
        .context("broker update task panicked")??;
        Ok(())
    }

    async fn get(&self, target: BrokerTarget, key: &str) -> anyhow::Result<Option<String>> {
        let state = self.state(target).lock();
        Ok(state
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone()))
    }

    async fn get_keys(&self, target: BrokerTarget) -> anyhow::Result<Vec<String>> {
        let state = self.state(target).lock();
        Ok(state.entries.iter().map(|(k, _)| k.clone()).collect())
    }

    async fn get_all_items(&self, target: BrokerTarget) -> anyhow::Result<Vec<(String, String)>> {
        let state = self.state(target).lock();
        Ok(state.entries.clone())
    }

    async fn pop(&self, target: BrokerTarget) -> anyhow::Result<Option<String>> {
        let state = self.state(target).clone();
        let popped = tokio::task::spawn_blocking(move || {
            let mut state = state.lock();
            if state.entries.is_empty() {
                return anyhow::Ok(None);
            }
            let (_, value) = state.entries.remove(0);
            state.persist()?;
            anyhow::Ok(Some(value))
        })
        .await
        .context("broker pop task panicked")??;
        Ok(popped)
    }

    async fn is_item(&self, target: BrokerTarget, key: &str) -> anyhow::Result<bool> {
        let state = self.state(target).lock();
        Ok(state.entries.iter().any(|(k, _)| k == key))
    }
}

/// Raised when a caller expects a fingerprint to be present in a target and
/// it is not (e.g. draining a job the controller never recorded).
pub fn missing_entry(target: BrokerTarget, key: &str) -> ErrorMetadata {
    ErrorMetadata::not_found(
        "BrokerEntryMissing",
        format!("no entry for key {key} in target {target}"),
    )
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn add_then_get_roundtrips() {
        let dir = tempdir().unwrap();
        let broker = FileBroker::open(dir.path()).unwrap();
        broker
            .add(BrokerTarget::Request, "abc", "payload")
            .await
            .unwrap();
        assert_eq!(
            broker.get(BrokerTarget::Request, "abc").await.unwrap(),
            Some("payload".to_string())
        );
        assert!(broker.is_item(BrokerTarget::Request, "abc").await.unwrap());
        assert!(!broker.is_item(BrokerTarget::Request, "xyz").await.unwrap());
    }

    #[tokio::test]
    async fn pop_observes_fifo_order() {
        let dir = tempdir().unwrap();
        let broker = FileBroker::open(dir.path()).unwrap();
        broker.add(BrokerTarget::Request, "a", "1").await.unwrap();
        broker.add(BrokerTarget::Request, "b", "2").await.unwrap();
        broker.add(BrokerTarget::Request, "c", "3").await.unwrap();

        assert_eq!(
            broker.pop(BrokerTarget::Request).await.unwrap(),
            Some("1".to_string())
        );
        assert_eq!(
            broker.pop(BrokerTarget::Request).await.unwrap(),
            Some("2".to_string())
        );
        assert_eq!(broker.get_keys(BrokerTarget::Request).await.unwrap(), vec![
            "c".to_string()
        ]);
    }

    #[tokio::test]
    async fn pop_on_empty_target_returns_none() {
        let dir = tempdir().unwrap();
        let broker = FileBroker::open(dir.path()).unwrap();
        assert_eq!(broker.pop(BrokerTarget::Response).await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_keys_first_match_wins() {
        let dir = tempdir().unwrap();
        let broker = FileBroker::open(dir.path()).unwrap();
        broker.add(BrokerTarget::Process, "k", "first").await.unwrap();
        broker.add(BrokerTarget::Process, "k", "second").await.unwrap();
        assert_eq!(
            broker.get(BrokerTarget::Process, "k").await.unwrap(),
            Some("first".to_string())
        );
        broker.remove(BrokerTarget::Process, "k").await.unwrap();
        assert_eq!(
            broker.get(BrokerTarget::Process, "k").await.unwrap(),
            Some("second".to_string())
        );
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let broker = FileBroker::open(dir.path()).unwrap();
            broker
                .add(BrokerTarget::Cache, "fp", "{\"result\":1}")
                .await
                .unwrap();
        }
        let broker = FileBroker::open(dir.path()).unwrap();
        assert_eq!(
            broker.get(BrokerTarget::Cache, "fp").await.unwrap(),
            Some("{\"result\":1}".to_string())
        );
    }

    #[tokio::test]
    async fn corrupt_line_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(BrokerTarget::Request.file_name());
        std::fs::write(&path, "not json\n{\"key\":\"ok\",\"value\":\"v\"}\n").unwrap();
        let broker = FileBroker::open(dir.path()).unwrap();
        assert_eq!(
            broker.get_keys(BrokerTarget::Request).await.unwrap(),
            vec!["ok".to_string()]
        );
    }
}
