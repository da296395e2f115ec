//! File descriptors produced by directory listings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Whether a listing node is a file or a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Folder,
}

/// One file or folder node from a share's directory tree.
///
/// File nodes carry a deferred `parser_url` that re-enters the engine later
/// to resolve just that file; folder nodes never resolve to a download URL
/// and always report size zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub file_id: String,
    pub file_name: String,
    pub kind: FileKind,
    pub size: u64,
    pub size_human: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Deferred resolution URL; dereferencing it resolves this node alone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parser_url: Option<String>,
    /// Streaming/preview variant of `parser_url`, when the provider has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    /// Provider-specific replay tokens a deferred resolution will need.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub ext_parameters: Map<String, Value>,
}

impl FileDescriptor {
    /// Creates a file node.
    #[must_use]
    pub fn file(file_id: impl Into<String>, file_name: impl Into<String>, size: u64) -> Self {
        Self {
            file_id: file_id.into(),
            file_name: file_name.into(),
            kind: FileKind::File,
            size,
            size_human: human_size(size),
            create_time: None,
            update_time: None,
            created_by: None,
            download_count: None,
            icon: None,
            hash: None,
            parser_url: None,
            preview_url: None,
            ext_parameters: Map::new(),
        }
    }

    /// Creates a folder node. Folders always report size zero.
    #[must_use]
    pub fn folder(file_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            kind: FileKind::Folder,
            ..Self::file(file_id, file_name, 0)
        }
    }

    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.kind == FileKind::Folder
    }
}

/// Formats a byte count the way provider front-ends display it.
#[must_use]
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}B")
    } else {
        format!("{value:.2}{}", UNITS[unit])
    }
}
