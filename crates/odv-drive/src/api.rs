//! Remote folder store contract

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use odv_core::{ConflictPolicy, LinkPermission};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A file or folder in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "webUrl", default)]
    pub web_url: Option<String>,
    #[serde(rename = "createdDateTime", default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<serde_json::Value>,
}

impl DriveItem {
    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }
}

/// Parent of a folder lookup or creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParentRef {
    /// The drive root
    Root,
    /// A folder by item id
    Item(String),
}

impl ParentRef {
    pub fn item_id(&self) -> Option<&str> {
        match self {
            ParentRef::Root => None,
            ParentRef::Item(id) => Some(id),
        }
    }
}

impl std::fmt::Display for ParentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParentRef::Root => f.write_str("root"),
            ParentRef::Item(id) => f.write_str(id),
        }
    }
}

/// Operations the archive needs from the remote store. Single attempts:
/// retries are applied by the callers.
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// Child folder of `parent` named exactly `name`.
    async fn find_child_folder(&self, parent: &ParentRef, name: &str) -> Result<Option<DriveItem>>;

    /// Create a child folder, resolving name clashes per `policy`.
    async fn create_folder(&self, parent: &ParentRef, name: &str, policy: ConflictPolicy) -> Result<DriveItem>;

    /// Upload `content` as `name` inside folder `folder_id`.
    async fn upload_content(&self, folder_id: &str, name: &str, content: &[u8]) -> Result<DriveItem>;

    /// Organization-scoped sharing link for an item.
    async fn create_share_link(&self, item_id: &str, permission: LinkPermission) -> Result<String>;

    /// Acquire credentials and resolve the drive, without touching items.
    async fn check_connection(&self) -> Result<()>;
}
