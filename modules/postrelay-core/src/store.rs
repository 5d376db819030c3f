// Key/value store shared by every component: the current Draft, page
// credentials, the group list, the panel-open flag, and the uploaded video
// override. Values are JSON; an optional file path makes them survive restarts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use postrelay_common::{Credentials, Draft, Group, UploadedVideo};

pub const DRAFT_KEY: &str = "draft";
pub const CREDENTIALS_KEY: &str = "credentials";
pub const GROUPS_KEY: &str = "groups";
pub const PANEL_OPEN_KEY: &str = "panel_open";
pub const UPLOADED_VIDEO_KEY: &str = "uploaded_video";

const CHANGE_CAPACITY: usize = 64;

/// One key's transition, published to subscribers after it is applied.
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub key: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    values: RwLock<HashMap<String, Value>>,
    changes: broadcast::Sender<StoreChange>,
    path: Option<PathBuf>,
}

impl Store {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::with_values(HashMap::new(), None)
    }

    /// Open a file-backed store, loading existing values if the file exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Corrupt store file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        info!(path = %path.display(), keys = values.len(), "Store opened");
        Ok(Self::with_values(values, Some(path)))
    }

    fn with_values(values: HashMap<String, Value>, path: Option<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                values: RwLock::new(values),
                changes,
                path,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.changes.subscribe()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let values = self.inner.values.read().await;
        match values.get(key) {
            Some(v) => Ok(Some(
                serde_json::from_value(v.clone())
                    .with_context(|| format!("Stored value for {key} has an unexpected shape"))?,
            )),
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let mut values = self.inner.values.write().await;
        let old = values.insert(key.to_string(), value.clone());
        self.persist(&values).await?;
        self.publish(key, old, Some(value));
        Ok(())
    }

    pub async fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut values = self.inner.values.write().await;
        let removed: Vec<(String, Value)> = keys
            .iter()
            .filter_map(|k| values.remove(*k).map(|old| (k.to_string(), old)))
            .collect();
        if removed.is_empty() {
            return Ok(());
        }
        self.persist(&values).await?;
        for (key, old) in removed {
            self.publish(&key, Some(old), None);
        }
        Ok(())
    }

    async fn persist(&self, values: &HashMap<String, Value>) -> Result<()> {
        let Some(ref path) = self.inner.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(values)?;
        tokio::fs::write(path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    fn publish(&self, key: &str, old: Option<Value>, new: Option<Value>) {
        debug!(key, "store: value changed");
        // No subscribers is fine.
        let _ = self.inner.changes.send(StoreChange {
            key: key.to_string(),
            old,
            new,
        });
    }

    // --- Draft ---

    pub async fn draft(&self) -> Result<Option<Draft>> {
        self.get(DRAFT_KEY).await
    }

    pub async fn set_draft(&self, draft: &Draft) -> Result<()> {
        self.set(DRAFT_KEY, draft).await
    }

    /// Apply `edit` to the stored Draft only if its identity equals `post_id`.
    /// Read, compare and write happen under one lock. Returns whether the
    /// Draft was changed.
    pub async fn update_draft_if<F>(&self, post_id: Option<&str>, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut Draft),
    {
        let mut values = self.inner.values.write().await;
        let Some(current) = values.get(DRAFT_KEY).cloned() else {
            return Ok(false);
        };
        let mut draft: Draft = serde_json::from_value(current.clone())?;
        if draft.post_id() != post_id {
            return Ok(false);
        }

        edit(&mut draft);
        let new = serde_json::to_value(&draft)?;
        values.insert(DRAFT_KEY.to_string(), new.clone());
        self.persist(&values).await?;
        self.publish(DRAFT_KEY, Some(current), Some(new));
        Ok(true)
    }

    // --- Settings ---

    pub async fn credentials(&self) -> Result<Option<Credentials>> {
        self.get(CREDENTIALS_KEY).await
    }

    pub async fn set_credentials(&self, credentials: &Credentials) -> Result<()> {
        self.set(CREDENTIALS_KEY, credentials).await
    }

    pub async fn groups(&self) -> Result<Vec<Group>> {
        Ok(self.get(GROUPS_KEY).await?.unwrap_or_default())
    }

    pub async fn set_groups(&self, groups: &[Group]) -> Result<()> {
        self.set(GROUPS_KEY, &groups).await
    }

    pub async fn panel_open(&self) -> Result<bool> {
        Ok(self.get(PANEL_OPEN_KEY).await?.unwrap_or(false))
    }

    pub async fn set_panel_open(&self, open: bool) -> Result<()> {
        self.set(PANEL_OPEN_KEY, &open).await
    }

    // --- Uploaded video override ---

    pub async fn uploaded_video(&self) -> Result<Option<UploadedVideo>> {
        self.get(UPLOADED_VIDEO_KEY).await
    }

    pub async fn set_uploaded_video(&self, video: &UploadedVideo) -> Result<()> {
        self.set(UPLOADED_VIDEO_KEY, video).await
    }

    pub async fn clear_uploaded_video(&self) -> Result<()> {
        self.remove(&[UPLOADED_VIDEO_KEY]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postrelay_common::PostRecord;

    fn draft(post_id: &str) -> Draft {
        Draft::new(PostRecord {
            text: format!("post {post_id}"),
            post_id: Some(post_id.to_string()),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn set_then_get_round_trips_typed_values() {
        let store = Store::in_memory();
        store.set_draft(&draft("1")).await.unwrap();
        let loaded = store.draft().await.unwrap().unwrap();
        assert_eq!(loaded.post_id(), Some("1"));
    }

    #[tokio::test]
    async fn missing_groups_default_to_empty() {
        let store = Store::in_memory();
        assert!(store.groups().await.unwrap().is_empty());
        assert!(!store.panel_open().await.unwrap());
    }

    #[tokio::test]
    async fn update_draft_if_skips_other_posts() {
        let store = Store::in_memory();
        store.set_draft(&draft("2")).await.unwrap();

        let changed = store
            .update_draft_if(Some("1"), |d| d.record.video = Some("v1".into()))
            .await
            .unwrap();

        assert!(!changed);
        assert!(store.draft().await.unwrap().unwrap().record.video.is_none());
    }

    #[tokio::test]
    async fn update_draft_if_edits_matching_post() {
        let store = Store::in_memory();
        store.set_draft(&draft("1")).await.unwrap();

        let changed = store
            .update_draft_if(Some("1"), |d| d.record.video = Some("v1".into()))
            .await
            .unwrap();

        assert!(changed);
        assert_eq!(
            store.draft().await.unwrap().unwrap().record.video.as_deref(),
            Some("v1")
        );
    }

    #[tokio::test]
    async fn update_draft_if_without_draft_is_noop() {
        let store = Store::in_memory();
        let changed = store.update_draft_if(None, |_| {}).await.unwrap();
        assert!(!changed);
    }

    #[tokio::test]
    async fn subscribers_see_old_and_new_values() {
        let store = Store::in_memory();
        let mut rx = store.subscribe();

        store.set_panel_open(true).await.unwrap();
        store.remove(&[PANEL_OPEN_KEY]).await.unwrap();

        let set = rx.recv().await.unwrap();
        assert_eq!(set.key, PANEL_OPEN_KEY);
        assert!(set.old.is_none());
        assert_eq!(set.new, Some(Value::Bool(true)));

        let removed = rx.recv().await.unwrap();
        assert_eq!(removed.old, Some(Value::Bool(true)));
        assert!(removed.new.is_none());
    }

    #[tokio::test]
    async fn removing_absent_keys_publishes_nothing() {
        let store = Store::in_memory();
        let mut rx = store.subscribe();
        store.remove(&[DRAFT_KEY]).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = Store::open(&path).await.unwrap();
        store
            .set_credentials(&Credentials {
                page_id: "123".into(),
                access_token: "tok".into(),
            })
            .await
            .unwrap();
        drop(store);

        let reopened = Store::open(&path).await.unwrap();
        let creds = reopened.credentials().await.unwrap().unwrap();
        assert_eq!(creds.page_id, "123");
    }
}
