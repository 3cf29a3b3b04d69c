use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// File types

/// Kind of document being archived. Decides the type folder of the
/// archive path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Audio,
    Transcript,
    Report,
    Document,
    /// Anything the archive does not know about; keeps the raw name.
    Other(String),
}

impl FileType {
    /// The four types that have a dedicated folder.
    pub const KNOWN: [FileType; 4] = [
        FileType::Audio,
        FileType::Transcript,
        FileType::Report,
        FileType::Document,
    ];

    /// Folder label used inside the archive tree.
    pub fn folder_label(&self) -> &'static str {
        match self {
            FileType::Audio => "Audio",
            FileType::Transcript => "Trascrizioni",
            FileType::Report => "Verbali",
            FileType::Document => "Documenti",
            FileType::Other(_) => "Altri",
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FileType::Audio => "audio",
            FileType::Transcript => "transcript",
            FileType::Report => "report",
            FileType::Document => "document",
            FileType::Other(raw) => raw,
        }
    }
}

impl FromStr for FileType {
    type Err = std::convert::Infallible;

    /// Accepts the English names as well as the Italian ones used by the
    /// upload forms. Unknown names map to [`FileType::Other`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.trim().to_lowercase().as_str() {
            "audio" => FileType::Audio,
            "transcript" | "trascrizione" => FileType::Transcript,
            "report" | "verbale" => FileType::Report,
            "document" | "documento" => FileType::Document,
            other => FileType::Other(other.to_string()),
        };
        Ok(parsed)
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Client info

/// Client a document belongs to. Built per request and only used to
/// compute the archive path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl ClientInfo {
    pub fn new(name: impl Into<String>, id: Option<i64>) -> Self {
        Self::at(name, id, Utc::now())
    }

    pub fn at(name: impl Into<String>, id: Option<i64>, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            id,
            timestamp,
        }
    }
}

// Remote store policies

/// What to do when a folder with the same name already exists under the
/// target parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Ask the store to fail on conflict, then look the existing folder up.
    #[default]
    GetExisting,
    /// Let the store replace the existing item.
    Replace,
    /// Let the store pick a new unique name.
    Rename,
    /// Surface the conflict as an error.
    Fail,
}

impl ConflictPolicy {
    /// Value of the `@microsoft.graph.conflictBehavior` annotation.
    pub fn wire_value(&self) -> &'static str {
        match self {
            ConflictPolicy::GetExisting | ConflictPolicy::Fail => "fail",
            ConflictPolicy::Replace => "replace",
            ConflictPolicy::Rename => "rename",
        }
    }
}

/// Permission granted by a shareable link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPermission {
    #[default]
    View,
    Edit,
}

impl LinkPermission {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkPermission::View => "view",
            LinkPermission::Edit => "edit",
        }
    }
}

/// Granularity at which template placeholders are replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubstitutionMode {
    /// Replace inside each formatted run; placeholders split across runs
    /// are left untouched.
    #[default]
    Run,
    /// Replace over the joined text of a paragraph.
    Paragraph,
}
