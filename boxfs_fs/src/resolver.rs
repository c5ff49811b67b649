use boxfs_core::node::find_child;
use boxfs_core::path::{self, ResolvedPath};
use boxfs_core::{CollisionStrategy, NodeKind, RemoteNode, RemoteStore, StoreError, StoreResult};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::PathCache;
use crate::collision::{Outcome, resolve_create_name};

/// Result of an existence lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(String),
    NotFound,
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Resolution::Found(id) => Some(id),
            Resolution::NotFound => None,
        }
    }
}

/// Races `fut` against `cancel`.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = StoreResult<T>>,
) -> StoreResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StoreError::Cancelled),
        result = fut => result,
    }
}

fn check(cancel: &CancellationToken) -> StoreResult<()> {
    if cancel.is_cancelled() {
        Err(StoreError::Cancelled)
    } else {
        Ok(())
    }
}

/// Last segment of a normalized, non-root path.
fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Maps paths to remote IDs by walking folder listings, memoizing every
/// resolved segment in a [`PathCache`].
#[derive(Debug)]
pub struct PathResolver {
    store: Arc<dyn RemoteStore>,
    root_id: String,
    cache: PathCache,
}

impl PathResolver {
    pub fn new(store: Arc<dyn RemoteStore>, root_id: impl Into<String>) -> Self {
        Self {
            store,
            root_id: root_id.into(),
            cache: PathCache::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn cache(&self) -> &PathCache {
        &self.cache
    }

    /// Resolves a folder path. The root answers without a remote call.
    pub async fn resolve_folder(&self, path: &str, cancel: &CancellationToken) -> StoreResult<String> {
        let norm = path::normalize(path);
        let mut current_id = self.root_id.clone();
        for prefix in path::prefixes(&norm) {
            check(cancel)?;
            if let Some(id) = self.cache.get(prefix, NodeKind::Folder) {
                debug!(path = prefix, "path cache hit");
                current_id = id;
                continue;
            }
            debug!(path = prefix, parent_id = %current_id, "path cache miss");
            let listing = cancellable(cancel, self.store.list_folder(&current_id)).await?;
            let Some(folder) = find_child(&listing, NodeKind::Folder, base_name(prefix)) else {
                return Err(StoreError::not_found(format!("folder '{prefix}'")));
            };
            self.cache.insert(prefix, NodeKind::Folder, folder.id.clone());
            current_id = folder.id.clone();
        }
        Ok(current_id)
    }

    /// Resolves a file path. A cached file entry answers without a remote
    /// call; otherwise the parent is resolved and listed.
    pub async fn resolve_file(&self, path: &str, cancel: &CancellationToken) -> StoreResult<String> {
        let target = ResolvedPath::split(path)
            .ok_or_else(|| StoreError::not_found("the root is not a file"))?;
        let full = target.full_path();
        check(cancel)?;
        if let Some(id) = self.cache.get(&full, NodeKind::File) {
            debug!(path = %full, "path cache hit");
            return Ok(id);
        }
        let parent_id = self.resolve_folder(&target.parent, cancel).await?;
        check(cancel)?;
        debug!(path = %full, %parent_id, "path cache miss");
        let listing = cancellable(cancel, self.store.list_folder(&parent_id)).await?;
        let file = find_child(&listing, NodeKind::File, &target.base_name)
            .ok_or_else(|| StoreError::not_found(format!("file '{full}'")))?;
        self.cache.insert(&full, NodeKind::File, file.id.clone());
        Ok(file.id.clone())
    }

    /// Resolves a path to whichever kind of object lives there.
    pub async fn resolve_node(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<(NodeKind, String)> {
        let Some(target) = ResolvedPath::split(path) else {
            return Ok((NodeKind::Folder, self.root_id.clone()));
        };
        let full = target.full_path();
        if let Some(entry) = self.cache.get_entry(&full) {
            debug!(path = %full, "path cache hit");
            return Ok((entry.kind, entry.id));
        }
        let parent_id = self.resolve_folder(&target.parent, cancel).await?;
        check(cancel)?;
        let listing = cancellable(cancel, self.store.list_folder(&parent_id)).await?;
        let node = listing
            .iter()
            .find(|n| n.name == target.base_name)
            .ok_or_else(|| StoreError::not_found(format!("'{full}'")))?;
        self.cache.insert(&full, node.kind, node.id.clone());
        Ok((node.kind, node.id.clone()))
    }

    /// `NotFound` becomes `Resolution::NotFound`; other failures propagate.
    pub async fn lookup(
        &self,
        path: &str,
        kind: NodeKind,
        cancel: &CancellationToken,
    ) -> StoreResult<Resolution> {
        let result = match kind {
            NodeKind::File => self.resolve_file(path, cancel).await,
            NodeKind::Folder => self.resolve_folder(path, cancel).await,
        };
        match result {
            Ok(id) => Ok(Resolution::Found(id)),
            Err(StoreError::NotFound(_)) => Ok(Resolution::NotFound),
            Err(e) => Err(e),
        }
    }

    /// Resolves `path`, creating every missing folder along the way.
    ///
    /// Existing folders are adopted, never duplicated. A segment created here
    /// is known to be empty, so deeper segments are created without listing.
    /// Not atomic: on failure the folders created so far stay in place and a
    /// retry adopts them.
    pub async fn ensure_folder(&self, path: &str, cancel: &CancellationToken) -> StoreResult<String> {
        let norm = path::normalize(path);
        let mut current_id = self.root_id.clone();
        let mut parent_is_new = false;
        for prefix in path::prefixes(&norm) {
            check(cancel)?;
            if let Some(id) = self.cache.get(prefix, NodeKind::Folder) {
                debug!(path = prefix, "path cache hit");
                current_id = id;
                parent_is_new = false;
                continue;
            }
            let name = base_name(prefix);
            let siblings = if parent_is_new {
                Vec::new()
            } else {
                cancellable(cancel, self.store.list_folder(&current_id)).await?
            };
            let id = match resolve_create_name(name, NodeKind::Folder, CollisionStrategy::Skip, &siblings) {
                Outcome::UseExisting(id) => {
                    parent_is_new = false;
                    id
                }
                Outcome::UseName(name) => {
                    let id = self.create_or_adopt(&current_id, &name, prefix, cancel).await?;
                    parent_is_new = true;
                    id
                }
            };
            self.cache.insert(prefix, NodeKind::Folder, id.clone());
            current_id = id;
        }
        Ok(current_id)
    }

    async fn create_or_adopt(
        &self,
        parent_id: &str,
        name: &str,
        path: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<String> {
        match cancellable(cancel, self.store.create_folder(parent_id, name)).await {
            Ok(folder) => {
                info!(path, id = %folder.id, "created folder");
                Ok(folder.id)
            }
            Err(conflict @ StoreError::Conflict { .. }) => {
                warn!(path, error = %conflict, "folder appeared concurrently, adopting it");
                let listing = cancellable(cancel, self.store.list_folder(parent_id)).await?;
                match find_child(&listing, NodeKind::Folder, name) {
                    Some(folder) => Ok(folder.id.clone()),
                    None => Err(conflict),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Records a freshly created or discovered object.
    pub fn remember(&self, path: &str, node: &RemoteNode) {
        self.cache.insert(path, node.kind, node.id.clone());
    }

    /// Forgets `path`, its ancestors and everything below it.
    pub fn invalidate(&self, path: &str) {
        let removed = self.cache.invalidate(path);
        if removed > 0 {
            debug!(path, removed, "invalidated path cache entries");
        }
    }
}
