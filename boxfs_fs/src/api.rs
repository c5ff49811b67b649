//! The path-addressed façade applications use.

use boxfs_core::path::{self, ResolvedPath};
use boxfs_core::{
    ByteStream, CollisionStrategy, NodeKind, RemoteNode, RemoteStore, SearchQuery,
    SharedLinkOptions, StoreError,
};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collision::{CollisionResolver, Outcome, list_siblings};
use crate::resolver::{PathResolver, Resolution, cancellable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsConfig {
    #[serde(default = "default_root_folder_id")]
    pub root_folder_id: String,
    #[serde(default)]
    pub collision_strategy: CollisionStrategy,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            root_folder_id: default_root_folder_id(),
            collision_strategy: CollisionStrategy::default(),
        }
    }
}

fn default_root_folder_id() -> String {
    "0".to_owned()
}

/// Per-call write settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Overrides the configured collision strategy.
    pub collision: Option<CollisionStrategy>,
}

impl WriteOptions {
    pub fn collision(strategy: CollisionStrategy) -> Self {
        Self {
            collision: Some(strategy),
        }
    }
}

/// A failed filesystem operation with the path and remote ID involved.
#[derive(Debug, thiserror::Error)]
#[error("{op} '{path}'{}: {source}", .id.as_ref().map(|id| format!(" (id {id})")).unwrap_or_default())]
pub struct FsError {
    pub op: &'static str,
    pub path: String,
    pub id: Option<String>,
    #[source]
    pub source: StoreError,
}

impl FsError {
    pub fn new(op: &'static str, path: impl Into<String>, id: Option<String>, source: StoreError) -> Self {
        Self {
            op,
            path: path.into(),
            id,
            source,
        }
    }

    pub fn kind(&self) -> &StoreError {
        &self.source
    }

    pub fn is_not_found(&self) -> bool {
        self.source.is_not_found()
    }
}

pub type FsResult<T> = Result<T, FsError>;

/// One item of a folder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Normalized path relative to the filesystem root.
    pub path: String,
    pub node: RemoteNode,
}

/// Path-addressed filesystem over a [`RemoteStore`].
///
/// Clones share the path cache. Every remote call is raced against the
/// handle's cancellation token.
#[derive(Debug, Clone)]
pub struct BoxFs {
    resolver: Arc<PathResolver>,
    collisions: CollisionResolver,
    cancel: CancellationToken,
}

impl BoxFs {
    pub fn new(store: Arc<dyn RemoteStore>, config: FsConfig) -> Self {
        Self {
            resolver: Arc::new(PathResolver::new(store, config.root_folder_id)),
            collisions: CollisionResolver::new(config.collision_strategy),
            cancel: CancellationToken::new(),
        }
    }

    /// Returns a handle sharing this cache whose calls stop when `cancel`
    /// fires.
    pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
        Self {
            resolver: self.resolver.clone(),
            collisions: self.collisions,
            cancel,
        }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn collision_resolver(&self) -> &CollisionResolver {
        &self.collisions
    }

    fn store(&self) -> &dyn RemoteStore {
        self.resolver.store().as_ref()
    }

    /// Wraps `source`; a `NotFound` for a known ID means the cached path is
    /// stale, so it is dropped.
    fn fail(&self, op: &'static str, path: &str, id: Option<&str>, source: StoreError) -> FsError {
        if id.is_some() && source.is_not_found() {
            self.resolver.invalidate(path);
        }
        FsError::new(op, path::normalize(path), id.map(str::to_owned), source)
    }

    fn split(op: &'static str, p: &str) -> FsResult<ResolvedPath> {
        ResolvedPath::split(p).ok_or_else(|| {
            FsError::new(op, "", None, StoreError::InvalidRequest("the root cannot be the target".into()))
        })
    }

    pub async fn file_exists(&self, path: &str) -> FsResult<bool> {
        let found = self
            .resolver
            .lookup(path, NodeKind::File, &self.cancel)
            .await
            .map_err(|e| self.fail("file_exists", path, None, e))?;
        Ok(found.is_found())
    }

    pub async fn directory_exists(&self, path: &str) -> FsResult<bool> {
        let found = self
            .resolver
            .lookup(path, NodeKind::Folder, &self.cancel)
            .await
            .map_err(|e| self.fail("directory_exists", path, None, e))?;
        Ok(found.is_found())
    }

    pub async fn lookup(&self, path: &str, kind: NodeKind) -> FsResult<Resolution> {
        self.resolver
            .lookup(path, kind, &self.cancel)
            .await
            .map_err(|e| self.fail("lookup", path, None, e))
    }

    pub async fn file_id(&self, path: &str) -> FsResult<String> {
        self.resolver
            .resolve_file(path, &self.cancel)
            .await
            .map_err(|e| self.fail("file_id", path, None, e))
    }

    pub async fn folder_id(&self, path: &str) -> FsResult<String> {
        self.resolver
            .resolve_folder(path, &self.cancel)
            .await
            .map_err(|e| self.fail("folder_id", path, None, e))
    }

    pub async fn read(&self, path: &str) -> FsResult<Bytes> {
        let id = self.file_id(path).await?;
        cancellable(&self.cancel, self.store().download_file(&id))
            .await
            .map_err(|e| self.fail("read", path, Some(&id), e))
    }

    pub async fn read_stream(&self, path: &str) -> FsResult<ByteStream> {
        let id = self.file_id(path).await?;
        cancellable(&self.cancel, self.store().open_download_stream(&id))
            .await
            .map_err(|e| self.fail("read_stream", path, Some(&id), e))
    }

    /// Uploads `bytes` to `path`, creating missing parent folders.
    ///
    /// Returns the node actually written, which under `Rename` may carry a
    /// numbered name and under `Skip` is the untouched existing file.
    pub async fn write(&self, path: &str, bytes: Bytes, options: WriteOptions) -> FsResult<RemoteNode> {
        let target = Self::split("write", path)?;
        let parent_id = self
            .resolver
            .ensure_folder(&target.parent, &self.cancel)
            .await
            .map_err(|e| self.fail("write", path, None, e))?;
        let strategy = self.collisions.strategy_for(options.collision);
        let siblings = self
            .collisions
            .siblings_for(self.store(), &parent_id, strategy, &self.cancel)
            .await
            .map_err(|e| self.fail("write", path, Some(&parent_id), e))?;

        let name = match self
            .collisions
            .resolve(&target.base_name, NodeKind::File, strategy, &siblings)
        {
            Outcome::UseExisting(id) => {
                info!(path = %target.full_path(), %id, "file exists, skipping upload");
                let existing = siblings
                    .into_iter()
                    .find(|n| n.id == id)
                    .unwrap_or_else(|| RemoteNode::file(id, target.base_name.clone()));
                self.resolver.remember(&target.full_path(), &existing);
                return Ok(existing);
            }
            Outcome::UseName(name) => name,
        };

        let conflict = match cancellable(&self.cancel, self.store().upload_file(&parent_id, &name, bytes.clone())).await {
            Ok(written) => return Ok(self.remember_written(&target, written)),
            Err(e) => e,
        };
        let replaceable = match &conflict {
            StoreError::Conflict {
                existing_id: Some(existing_id),
                existing_kind,
                ..
            } if strategy == CollisionStrategy::Overwrite => match existing_kind {
                Some(NodeKind::File) => Some(existing_id.clone()),
                Some(NodeKind::Folder) => None,
                None => self
                    .conflicts_with_file(&parent_id, &name, existing_id, path)
                    .await?
                    .then(|| existing_id.clone()),
            },
            _ => None,
        };
        let Some(existing_id) = replaceable else {
            if matches!(conflict, StoreError::Conflict { .. }) {
                warn!(path = %target.full_path(), "upload conflicted");
            }
            return Err(self.fail("write", path, Some(&parent_id), conflict));
        };

        debug!(path = %target.full_path(), %existing_id, "replacing existing file content");
        let written = cancellable(&self.cancel, self.store().upload_file_version(&existing_id, bytes))
            .await
            .map_err(|e| self.fail("write", path, Some(&existing_id), e))?;
        Ok(self.remember_written(&target, written))
    }

    fn remember_written(&self, target: &ResolvedPath, written: RemoteNode) -> RemoteNode {
        let written_path = path::join(&target.parent, &written.name);
        info!(path = %written_path, id = %written.id, "wrote file");
        self.resolver.remember(&written_path, &written);
        written
    }

    /// Whether the object an upload conflicted with is a file that can take a
    /// new version. Used when the remote did not report its kind.
    async fn conflicts_with_file(
        &self,
        parent_id: &str,
        name: &str,
        existing_id: &str,
        path: &str,
    ) -> FsResult<bool> {
        let siblings = list_siblings(self.store(), parent_id, &self.cancel)
            .await
            .map_err(|e| self.fail("write", path, Some(parent_id), e))?;
        Ok(siblings
            .iter()
            .any(|n| n.id == existing_id && n.kind == NodeKind::File && n.name == name))
    }

    /// Buffers `stream` and writes it like [`BoxFs::write`].
    pub async fn write_stream(
        &self,
        path: &str,
        stream: ByteStream,
        options: WriteOptions,
    ) -> FsResult<RemoteNode> {
        let buffer = stream
            .try_fold(BytesMut::new(), |mut buffer, chunk| async move {
                buffer.extend_from_slice(&chunk);
                Ok(buffer)
            })
            .await
            .map_err(|e| {
                FsError::new(
                    "write_stream",
                    path::normalize(path),
                    None,
                    StoreError::InvalidRequest(format!("failed to read source stream: {e}")),
                )
            })?;
        self.write(path, buffer.freeze(), options).await
    }

    pub async fn delete(&self, path: &str) -> FsResult<()> {
        let id = self.file_id(path).await?;
        cancellable(&self.cancel, self.store().delete_file(&id))
            .await
            .map_err(|e| self.fail("delete", path, Some(&id), e))?;
        self.resolver.invalidate(path);
        Ok(())
    }

    /// Deletes a folder and everything in it. The root is refused.
    pub async fn delete_directory(&self, path: &str) -> FsResult<()> {
        let target = Self::split("delete_directory", path)?;
        let full = target.full_path();
        let id = self.folder_id(&full).await?;
        cancellable(&self.cancel, self.store().delete_folder(&id, true))
            .await
            .map_err(|e| self.fail("delete_directory", &full, Some(&id), e))?;
        self.resolver.invalidate(&full);
        Ok(())
    }

    /// Creates `path` and any missing parents; existing folders are reused.
    pub async fn create_directory(&self, path: &str) -> FsResult<String> {
        self.resolver
            .ensure_folder(path, &self.cancel)
            .await
            .map_err(|e| self.fail("create_directory", path, None, e))
    }

    /// Lazily lists `path`; with `deep`, subfolders are listed depth-first
    /// right after their own entry. Each folder costs one listing call, made
    /// only when the stream reaches it. Errors end the stream.
    pub fn list_contents(&self, path: &str, deep: bool) -> BoxStream<'static, FsResult<Entry>> {
        let state = Listing {
            fs: self.clone(),
            root: path::normalize(path),
            deep,
            started: false,
            descend: None,
            frames: Vec::new(),
        };
        futures::stream::unfold(state, Listing::next).boxed()
    }

    /// Metadata of a file or folder.
    pub async fn metadata(&self, path: &str) -> FsResult<RemoteNode> {
        let (kind, id) = self
            .resolver
            .resolve_node(path, &self.cancel)
            .await
            .map_err(|e| self.fail("metadata", path, None, e))?;
        let info = match kind {
            NodeKind::File => cancellable(&self.cancel, self.store().get_file_info(&id)).await,
            NodeKind::Folder => cancellable(&self.cancel, self.store().get_folder_info(&id)).await,
        };
        info.map_err(|e| self.fail("metadata", path, Some(&id), e))
    }

    async fn file_info(&self, op: &'static str, path: &str) -> FsResult<RemoteNode> {
        let id = self.file_id(path).await?;
        cancellable(&self.cancel, self.store().get_file_info(&id))
            .await
            .map_err(|e| self.fail(op, path, Some(&id), e))
    }

    pub async fn file_size(&self, path: &str) -> FsResult<Option<u64>> {
        Ok(self.file_info("file_size", path).await?.size)
    }

    pub async fn last_modified(&self, path: &str) -> FsResult<Option<DateTime<Utc>>> {
        Ok(self.file_info("last_modified", path).await?.modified_at)
    }

    pub async fn mime_type(&self, path: &str) -> FsResult<Option<String>> {
        Ok(self.file_info("mime_type", path).await?.mime_type)
    }

    /// Moves a file, creating the destination's parent folders. The file is
    /// renamed when the destination base name differs.
    pub async fn move_file(&self, source: &str, destination: &str) -> FsResult<RemoteNode> {
        let from = Self::split("move", source)?;
        let to = Self::split("move", destination)?;
        let id = self.file_id(source).await?;
        let dest_parent = self
            .resolver
            .ensure_folder(&to.parent, &self.cancel)
            .await
            .map_err(|e| self.fail("move", destination, None, e))?;

        let mut node = None;
        if from.parent != to.parent {
            node = Some(
                cancellable(&self.cancel, self.store().move_file(&id, &dest_parent))
                    .await
                    .map_err(|e| self.fail("move", source, Some(&id), e))?,
            );
        }
        if from.base_name != to.base_name {
            let renamed = cancellable(&self.cancel, self.store().rename_file(&id, &to.base_name)).await;
            match renamed {
                Ok(renamed) => node = Some(renamed),
                Err(e) => {
                    self.resolver.invalidate(&from.full_path());
                    return Err(self.fail("move", destination, Some(&id), e));
                }
            }
        }
        self.resolver.invalidate(&from.full_path());
        self.resolver.invalidate(&to.full_path());

        let node = match node {
            Some(node) => node,
            None => cancellable(&self.cancel, self.store().get_file_info(&id))
                .await
                .map_err(|e| self.fail("move", destination, Some(&id), e))?,
        };
        info!(from = %from.full_path(), to = %to.full_path(), %id, "moved file");
        Ok(node)
    }

    /// Copies a file, creating the destination's parent folders.
    pub async fn copy_file(&self, source: &str, destination: &str) -> FsResult<RemoteNode> {
        let to = Self::split("copy", destination)?;
        let id = self.file_id(source).await?;
        let dest_parent = self
            .resolver
            .ensure_folder(&to.parent, &self.cancel)
            .await
            .map_err(|e| self.fail("copy", destination, None, e))?;
        let copy = cancellable(
            &self.cancel,
            self.store().copy_file(&id, &dest_parent, Some(&to.base_name)),
        )
        .await
        .map_err(|e| self.fail("copy", source, Some(&id), e))?;
        self.resolver.remember(&to.full_path(), &copy);
        info!(to = %to.full_path(), id = %copy.id, "copied file");
        Ok(copy)
    }

    pub async fn search(&self, query: &SearchQuery) -> FsResult<Vec<RemoteNode>> {
        cancellable(&self.cancel, self.store().search(query))
            .await
            .map_err(|e| FsError::new("search", query.query.clone(), None, e))
    }

    /// Creates (or updates) a shared link for a file and returns its URL.
    pub async fn share_link(&self, path: &str, options: &SharedLinkOptions) -> FsResult<String> {
        let id = self.file_id(path).await?;
        let node = cancellable(&self.cancel, self.store().create_shared_link(&id, options))
            .await
            .map_err(|e| self.fail("share_link", path, Some(&id), e))?;
        node.shared_link.ok_or_else(|| {
            self.fail(
                "share_link",
                path,
                Some(&id),
                StoreError::InvalidRequest("response carried no shared link".into()),
            )
        })
    }

    pub async fn set_visibility(&self, path: &str, _visibility: &str) -> FsResult<()> {
        Err(FsError::new(
            "set_visibility",
            path::normalize(path),
            None,
            StoreError::Unsupported("Box does not support visibility settings".into()),
        ))
    }

    pub async fn visibility(&self, path: &str) -> FsResult<String> {
        Err(FsError::new(
            "visibility",
            path::normalize(path),
            None,
            StoreError::Unsupported("Box does not support visibility settings".into()),
        ))
    }
}

struct Listing {
    fs: BoxFs,
    root: String,
    deep: bool,
    started: bool,
    /// Folder to list before yielding anything else.
    descend: Option<(String, String)>,
    frames: Vec<std::vec::IntoIter<Entry>>,
}

impl Listing {
    async fn next(mut self) -> Option<(FsResult<Entry>, Self)> {
        if !self.started {
            self.started = true;
            match self.fs.resolver.resolve_folder(&self.root, &self.fs.cancel).await {
                Ok(id) => self.descend = Some((self.root.clone(), id)),
                Err(e) => {
                    let err = self.fs.fail("list_contents", &self.root, None, e);
                    return Some((Err(err), self.finish()));
                }
            }
        }
        loop {
            if let Some((folder_path, folder_id)) = self.descend.take() {
                let listed = cancellable(&self.fs.cancel, self.fs.store().list_folder(&folder_id)).await;
                match listed {
                    Ok(nodes) => {
                        let entries: Vec<Entry> = nodes
                            .into_iter()
                            .map(|node| Entry {
                                path: path::join(&folder_path, &node.name),
                                node,
                            })
                            .collect();
                        self.frames.push(entries.into_iter());
                    }
                    Err(e) => {
                        let err = self.fs.fail("list_contents", &folder_path, Some(&folder_id), e);
                        return Some((Err(err), self.finish()));
                    }
                }
            }
            let frame = self.frames.last_mut()?;
            match frame.next() {
                Some(entry) => {
                    if self.deep && entry.node.is_folder() {
                        self.descend = Some((entry.path.clone(), entry.node.id.clone()));
                    }
                    return Some((Ok(entry), self));
                }
                None => {
                    self.frames.pop();
                }
            }
        }
    }

    /// Leaves a state that yields nothing more.
    fn finish(mut self) -> Self {
        self.started = true;
        self.descend = None;
        self.frames.clear();
        self
    }
}
