use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminates the two kinds of remote objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Folder,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::File => f.write_str("file"),
            NodeKind::Folder => f.write_str("folder"),
        }
    }
}

/// A file or folder as reported by the remote store.
///
/// Nodes are transient: they are built from listing and metadata responses
/// and dropped after use. Only `(kind, id)` pairs outlive a call, inside the
/// path cache. `name` is a single path segment relative to the parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNode {
    pub kind: NodeKind,
    pub id: String,
    pub name: String,
    /// Size in bytes. Only meaningful for files.
    pub size: Option<u64>,
    pub modified_at: Option<DateTime<Utc>>,
    /// Only reported for files.
    pub mime_type: Option<String>,
    pub parent_id: Option<String>,
    pub shared_link: Option<String>,
}

impl RemoteNode {
    pub fn file(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(NodeKind::File, id, name)
    }

    pub fn folder(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(NodeKind::Folder, id, name)
    }

    fn new(kind: NodeKind, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            name: name.into(),
            size: None,
            modified_at: None,
            mime_type: None,
            parent_id: None,
            shared_link: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_modified_at(mut self, modified_at: DateTime<Utc>) -> Self {
        self.modified_at = Some(modified_at);
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }
}

/// Finds the first node of `kind` named exactly `name`.
pub fn find_child<'a>(nodes: &'a [RemoteNode], kind: NodeKind, name: &str) -> Option<&'a RemoteNode> {
    nodes.iter().find(|n| n.kind == kind && n.name == name)
}
