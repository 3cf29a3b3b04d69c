//! In-process folder store
//!
//! Keeps folders and files in memory. Used to dry-run archive layouts
//! without credentials and as the store behind the service tests.

use async_trait::async_trait;
use chrono::Utc;
use odv_core::{ConflictPolicy, LinkPermission};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::api::{DriveApi, DriveItem, ParentRef};
use crate::error::{DriveError, Result};

#[derive(Debug, Clone)]
struct Entry {
    item: DriveItem,
    parent: Option<String>,
    content: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    entries: HashMap<String, Entry>,
    created: Vec<String>,
}

impl State {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("item-{:04}", self.next_id)
    }

    fn child(&self, parent: Option<&str>, name: &str, folder: bool) -> Option<&Entry> {
        self.entries.values().find(|entry| {
            entry.parent.as_deref() == parent
                && entry.item.is_folder() == folder
                && entry.item.name.eq_ignore_ascii_case(name)
        })
    }

    fn path_of(&self, id: &str) -> Option<String> {
        let mut segments = Vec::new();
        let mut current = self.entries.get(id)?;
        loop {
            segments.push(current.item.name.clone());
            match &current.parent {
                Some(parent) => current = self.entries.get(parent)?,
                None => break,
            }
        }
        segments.reverse();
        Some(segments.join("/"))
    }

    fn insert_folder(&mut self, parent: Option<String>, name: &str) -> DriveItem {
        let id = self.allocate_id();
        let item = DriveItem {
            id: id.clone(),
            name: name.to_string(),
            size: 0,
            web_url: Some(format!("https://drive.invalid/items/{id}")),
            created_at: Some(Utc::now()),
            folder: Some(serde_json::json!({ "childCount": 0 })),
        };
        self.entries.insert(
            id,
            Entry {
                item: item.clone(),
                parent,
                content: None,
            },
        );
        item
    }
}

/// [`DriveApi`] backed by process memory.
#[derive(Debug, Default)]
pub struct InMemoryDrive {
    state: Mutex<State>,
    failures: Mutex<VecDeque<DriveError>>,
    hide_lookup: AtomicBool,
    latency: Option<Duration>,
}

impl InMemoryDrive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, to widen race windows.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next call with `error`. Queued errors are consumed in order.
    pub fn fail_next(&self, error: DriveError) {
        self.failures.lock().push_back(error);
    }

    /// Make the next folder lookup report a miss.
    pub fn hide_next_lookup(&self) {
        self.hide_lookup.store(true, Ordering::SeqCst);
    }

    /// Create the folders of `path` directly, without counting them as
    /// created through the API. Returns the id of the last one.
    pub fn seed_folder(&self, path: &str) -> String {
        let mut state = self.state.lock();
        let mut parent: Option<String> = None;

        for segment in crate::folders::path_segments(path) {
            let existing = state.child(parent.as_deref(), segment, true).map(|e| e.item.id.clone());
            let id = match existing {
                Some(id) => id,
                None => state.insert_folder(parent.clone(), segment).id,
            };
            parent = Some(id);
        }

        parent.unwrap_or_default()
    }

    /// Paths of folders created through the API, in creation order.
    pub fn created_paths(&self) -> Vec<String> {
        self.state.lock().created.clone()
    }

    /// Id of the folder at `path`, if it exists.
    pub fn folder_id(&self, path: &str) -> Option<String> {
        let state = self.state.lock();
        let mut parent: Option<String> = None;

        for segment in crate::folders::path_segments(path) {
            parent = Some(state.child(parent.as_deref(), segment, true)?.item.id.clone());
        }
        parent
    }

    /// Content of the file `name` inside folder `folder_id`.
    pub fn file_content(&self, folder_id: &str, name: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .child(Some(folder_id), name, false)
            .and_then(|entry| entry.content.clone())
    }

    /// Path of an item, from the drive root.
    pub fn item_path(&self, id: &str) -> Option<String> {
        self.state.lock().path_of(id)
    }

    async fn enter(&self) -> Result<()> {
        match self.latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }

        match self.failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn parent_id(state: &State, parent: &ParentRef) -> Result<Option<String>> {
        match parent {
            ParentRef::Root => Ok(None),
            ParentRef::Item(id) if state.entries.get(id).is_some_and(|e| e.item.is_folder()) => Ok(Some(id.clone())),
            ParentRef::Item(id) => Err(not_found(id)),
        }
    }
}

fn not_found(id: &str) -> DriveError {
    DriveError::NotFound {
        code: Some("itemNotFound".to_string()),
        message: format!("item '{id}' not found"),
    }
}

#[async_trait]
impl DriveApi for InMemoryDrive {
    async fn find_child_folder(&self, parent: &ParentRef, name: &str) -> Result<Option<DriveItem>> {
        self.enter().await?;

        if self.hide_lookup.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }

        let state = self.state.lock();
        let parent = Self::parent_id(&state, parent)?;
        Ok(state.child(parent.as_deref(), name, true).map(|entry| entry.item.clone()))
    }

    async fn create_folder(&self, parent: &ParentRef, name: &str, policy: ConflictPolicy) -> Result<DriveItem> {
        self.enter().await?;

        let mut state = self.state.lock();
        let parent = Self::parent_id(&state, parent)?;
        let mut name = name.to_string();

        if let Some(existing) = state.child(parent.as_deref(), &name, true).map(|e| e.item.id.clone()) {
            match policy {
                ConflictPolicy::GetExisting | ConflictPolicy::Fail => {
                    return Err(DriveError::Conflict {
                        code: Some("nameAlreadyExists".to_string()),
                        message: format!("an item named '{name}' already exists"),
                    });
                }
                ConflictPolicy::Replace => {
                    state.entries.retain(|_, entry| entry.parent.as_deref() != Some(existing.as_str()));
                    state.entries.remove(&existing);
                }
                ConflictPolicy::Rename => {
                    let base = name.clone();
                    let mut n = 1;
                    while state.child(parent.as_deref(), &name, true).is_some() {
                        name = format!("{base} {n}");
                        n += 1;
                    }
                }
            }
        }

        let item = state.insert_folder(parent, &name);
        if let Some(path) = state.path_of(&item.id) {
            state.created.push(path);
        }
        Ok(item)
    }

    async fn upload_content(&self, folder_id: &str, name: &str, content: &[u8]) -> Result<DriveItem> {
        self.enter().await?;

        let mut state = self.state.lock();
        let parent = Self::parent_id(&state, &ParentRef::Item(folder_id.to_string()))?;

        // Uploading over an existing name replaces the content
        let existing = state.child(parent.as_deref(), name, false).map(|e| e.item.id.clone());
        let id = match existing {
            Some(id) => id,
            None => state.allocate_id(),
        };

        let item = DriveItem {
            id: id.clone(),
            name: name.to_string(),
            size: content.len() as u64,
            web_url: Some(format!("https://drive.invalid/items/{id}")),
            created_at: Some(Utc::now()),
            folder: None,
        };
        state.entries.insert(
            id,
            Entry {
                item: item.clone(),
                parent,
                content: Some(content.to_vec()),
            },
        );

        Ok(item)
    }

    async fn create_share_link(&self, item_id: &str, permission: LinkPermission) -> Result<String> {
        self.enter().await?;

        let state = self.state.lock();
        if !state.entries.contains_key(item_id) {
            return Err(not_found(item_id));
        }
        Ok(format!("https://drive.invalid/share/{item_id}?type={}", permission.as_str()))
    }

    async fn check_connection(&self) -> Result<()> {
        self.enter().await
    }
}
