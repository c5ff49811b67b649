use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_core::Stream;
use serde::{Deserialize, Serialize};

use crate::node::{NodeKind, RemoteNode};

pub type StoreResult<T, E = StoreError> = std::result::Result<T, E>;

pub type ByteStream = Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send + Unpin + 'static>;

/// Failure kinds every `RemoteStore` maps its transport errors onto.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote side rejected a create, rename or move because the name is
    /// taken. `existing_id` and `existing_kind` describe the conflicting
    /// object when reported.
    #[error("conflict: {message}")]
    Conflict {
        message: String,
        existing_id: Option<String>,
        existing_kind: Option<NodeKind>,
    },

    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    #[error("transient failure: {0}")]
    TransientFailure(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The remote side refused the request as malformed or forbidden.
    #[error("request rejected: {0}")]
    InvalidRequest(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        StoreError::NotFound(what.into())
    }

    pub fn conflict(message: impl Into<String>, existing_id: Option<String>) -> Self {
        StoreError::Conflict {
            message: message.into(),
            existing_id,
            existing_kind: None,
        }
    }

    /// A conflict with an object of known kind.
    pub fn conflict_with(message: impl Into<String>, existing_id: impl Into<String>, kind: NodeKind) -> Self {
        StoreError::Conflict {
            message: message.into(),
            existing_id: Some(existing_id.into()),
            existing_kind: Some(kind),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, StoreError::AuthenticationFailure(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub kind: Option<NodeKind>,
    pub limit: u32,
    pub offset: u32,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            kind: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn kind(mut self, kind: NodeKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharedLinkAccess {
    #[default]
    Open,
    Company,
    Collaborators,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedLinkOptions {
    pub access: SharedLinkAccess,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unshared_at: Option<DateTime<Utc>>,
}

/// An ID-addressed object store.
///
/// Implementations perform exactly one remote operation per call and never
/// retry on their own behalf beyond what their transport does. Listings
/// return a single page.
#[async_trait]
pub trait RemoteStore: std::fmt::Debug + Send + Sync + 'static {
    async fn list_folder(&self, folder_id: &str) -> StoreResult<Vec<RemoteNode>>;

    async fn get_file_info(&self, file_id: &str) -> StoreResult<RemoteNode>;

    async fn get_folder_info(&self, folder_id: &str) -> StoreResult<RemoteNode>;

    async fn create_folder(&self, parent_id: &str, name: &str) -> StoreResult<RemoteNode>;

    /// Uploads a new file. Fails with `Conflict` if `name` is taken.
    async fn upload_file(&self, parent_id: &str, name: &str, bytes: Bytes) -> StoreResult<RemoteNode>;

    /// Replaces the content of an existing file.
    async fn upload_file_version(&self, file_id: &str, bytes: Bytes) -> StoreResult<RemoteNode>;

    async fn download_file(&self, file_id: &str) -> StoreResult<Bytes>;

    async fn open_download_stream(&self, file_id: &str) -> StoreResult<ByteStream>;

    async fn delete_file(&self, file_id: &str) -> StoreResult<()>;

    async fn delete_folder(&self, folder_id: &str, recursive: bool) -> StoreResult<()>;

    async fn move_file(&self, file_id: &str, new_parent_id: &str) -> StoreResult<RemoteNode>;

    async fn move_folder(&self, folder_id: &str, new_parent_id: &str) -> StoreResult<RemoteNode>;

    async fn rename_file(&self, file_id: &str, new_name: &str) -> StoreResult<RemoteNode>;

    async fn rename_folder(&self, folder_id: &str, new_name: &str) -> StoreResult<RemoteNode>;

    async fn copy_file(
        &self,
        file_id: &str,
        new_parent_id: &str,
        new_name: Option<&str>,
    ) -> StoreResult<RemoteNode>;

    async fn copy_folder(
        &self,
        folder_id: &str,
        new_parent_id: &str,
        new_name: Option<&str>,
    ) -> StoreResult<RemoteNode>;

    async fn search(&self, query: &SearchQuery) -> StoreResult<Vec<RemoteNode>>;

    async fn create_shared_link(
        &self,
        file_id: &str,
        options: &SharedLinkOptions,
    ) -> StoreResult<RemoteNode>;
}
