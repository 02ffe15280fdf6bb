use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

pub const STATE_VERSION: u32 = 1;

/// The persisted record of the last successful sync. Keyed by relative
/// path; `BTreeMap` keeps the serialised key order stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub version: u32,
    pub space_key: String,
    pub root_page_id: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pages: BTreeMap<String, PageState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageState {
    pub confluence_id: String,
    pub content_hash: String,
    pub title: String,
    pub parent_id: Option<String>,
    pub version: u32,
}

impl SyncState {
    pub fn empty(space_key: &str, root_page_id: Option<&str>) -> Self {
        SyncState {
            version: STATE_VERSION,
            space_key: space_key.to_string(),
            root_page_id: root_page_id.map(str::to_string),
            last_sync: None,
            pages: BTreeMap::new(),
        }
    }

    pub fn page(&self, path: &str) -> Option<&PageState> {
        self.pages.get(path)
    }

    pub fn upsert(&mut self, path: &str, page: PageState) {
        self.pages.insert(path.to_string(), page);
    }

    pub fn remove(&mut self, path: &str) -> Option<PageState> {
        self.pages.remove(path)
    }
}

/// Maps the state document to a file on disk. Saves are atomic: the
/// document is written next to the target and renamed over it, so a reader
/// never observes a torn file.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StateStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unparsable files, and files recorded for a different
    /// space, all load as an empty state bound to the given arguments.
    pub fn load(&self, space_key: &str, root_page_id: Option<&str>) -> SyncState {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return SyncState::empty(space_key, root_page_id),
        };

        match serde_json::from_str::<SyncState>(&raw) {
            Ok(state) if state.space_key == space_key => state,
            _ => SyncState::empty(space_key, root_page_id),
        }
    }

    /// Accepts any state, including the partial maps the executor writes
    /// after a failure.
    pub fn save(&self, state: &SyncState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let serialized = serde_json::to_string_pretty(state)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serialized)?;
        fs::rename(&tmp, &self.path)?;

        Ok(())
    }

    pub fn reset(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> StateStore {
        StateStore::new(dir.path().join(".consync").join("state.json"))
    }

    fn sample_state() -> SyncState {
        let mut state = SyncState::empty("DOCS", Some("100"));
        state.upsert(
            "index.md",
            PageState {
                confluence_id: "200".into(),
                content_hash: "sha256:aa".into(),
                title: "Home".into(),
                parent_id: Some("100".into()),
                version: 3,
            },
        );
        state
    }

    #[test]
    fn load_of_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let state = store(&dir).load("DOCS", Some("100"));

        assert_eq!(state.space_key, "DOCS");
        assert_eq!(state.root_page_id.as_deref(), Some("100"));
        assert!(state.pages.is_empty());
        assert!(state.last_sync.is_none());
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let state = sample_state();

        store.save(&state).unwrap();
        let loaded = store.load("DOCS", None);

        assert_eq!(loaded, state);
    }

    #[test]
    fn space_key_mismatch_discards_the_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.save(&sample_state()).unwrap();
        let loaded = store.load("OTHER", None);

        assert_eq!(loaded.space_key, "OTHER");
        assert!(loaded.pages.is_empty());
    }

    #[test]
    fn garbage_on_disk_loads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{ not json").unwrap();

        let loaded = store.load("DOCS", None);
        assert!(loaded.pages.is_empty());
    }

    #[test]
    fn unknown_keys_are_tolerated() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(
            store.path(),
            r#"{
                "version": 1,
                "spaceKey": "DOCS",
                "rootPageId": null,
                "lastSync": null,
                "futureField": true,
                "pages": {
                    "a.md": {
                        "confluenceId": "1",
                        "contentHash": "sha256:bb",
                        "title": "A",
                        "parentId": null,
                        "version": 1,
                        "anotherFutureField": []
                    }
                }
            }"#,
        )
        .unwrap();

        let loaded = store.load("DOCS", None);
        assert_eq!(loaded.pages.len(), 1);
        assert_eq!(loaded.page("a.md").unwrap().confluence_id, "1");
    }

    #[test]
    fn serialised_layout_uses_camel_case_keys() {
        let serialized = serde_json::to_string(&sample_state()).unwrap();

        assert!(serialized.contains("\"spaceKey\":\"DOCS\""));
        assert!(serialized.contains("\"rootPageId\":\"100\""));
        assert!(serialized.contains("\"lastSync\":null"));
        assert!(serialized.contains("\"confluenceId\":\"200\""));
        assert!(serialized.contains("\"contentHash\":\"sha256:aa\""));
        assert!(serialized.contains("\"parentId\":\"100\""));
    }

    #[test]
    fn reset_deletes_the_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.save(&sample_state()).unwrap();
        assert!(store.path().exists());

        store.reset().unwrap();
        assert!(!store.path().exists());

        // Resetting again is not an error
        store.reset().unwrap();
    }
}
