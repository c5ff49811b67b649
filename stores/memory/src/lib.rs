use boxfs_core::{
    node::{NodeKind, RemoteNode},
    store::{
        ByteStream, RemoteStore, SearchQuery, SharedLinkAccess, SharedLinkOptions, StoreError,
        StoreResult,
    },
};
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use futures::stream;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The remote operations a `MemoryStore` counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListFolder,
    GetFileInfo,
    GetFolderInfo,
    CreateFolder,
    UploadFile,
    UploadFileVersion,
    DownloadFile,
    DeleteFile,
    DeleteFolder,
    MoveFile,
    MoveFolder,
    RenameFile,
    RenameFolder,
    CopyFile,
    CopyFolder,
    Search,
    CreateSharedLink,
}

type Hook = Box<dyn FnOnce(&MemoryStore) + Send>;

/// An ID-addressed tree held in memory, with the same name-collision rules
/// as the Box API: a folder cannot hold two children with the same name,
/// whatever their kinds.
///
/// Every trait call is counted per [`StoreOp`]. Tests can also make the next
/// call of an operation fail, or run a hook right before it.
pub struct MemoryStore {
    root_id: String,
    nodes: DashMap<String, RemoteNode>,
    contents: DashMap<String, Bytes>,
    next_id: AtomicU64,
    namespace: Mutex<()>,
    calls: DashMap<StoreOp, usize>,
    failures: DashMap<StoreOp, StoreError>,
    hooks: Mutex<HashMap<StoreOp, Hook>>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("root_id", &self.root_id)
            .field("nodes", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Creates an empty store whose root folder has ID `"0"`.
    pub fn new() -> Self {
        Self::with_root_id("0")
    }

    pub fn with_root_id(root_id: impl Into<String>) -> Self {
        let root_id = root_id.into();
        let nodes = DashMap::new();
        nodes.insert(root_id.clone(), RemoteNode::folder(root_id.clone(), "All Files"));
        Self {
            root_id,
            nodes,
            contents: DashMap::new(),
            next_id: AtomicU64::new(100),
            namespace: Mutex::new(()),
            calls: DashMap::new(),
            failures: DashMap::new(),
            hooks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Number of calls made to `op` so far.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls.get(&op).map(|c| *c).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|c| *c.value()).sum()
    }

    pub fn reset_calls(&self) {
        self.calls.clear();
    }

    /// Makes the next call to `op` fail with `err`.
    pub fn fail_next(&self, op: StoreOp, err: StoreError) {
        self.failures.insert(op, err);
    }

    /// Runs `hook` at the start of the next call to `op`, before the call
    /// looks at any state.
    pub fn before_next(&self, op: StoreOp, hook: impl FnOnce(&MemoryStore) + Send + 'static) {
        lock(&self.hooks).insert(op, Box::new(hook));
    }

    /// Creates a folder without counting it as a remote call.
    pub fn seed_folder(&self, parent_id: &str, name: &str) -> StoreResult<RemoteNode> {
        let _ns = lock(&self.namespace);
        self.insert_folder(parent_id, name)
    }

    /// Creates a file without counting it as a remote call.
    pub fn seed_file(&self, parent_id: &str, name: &str, bytes: Bytes) -> StoreResult<RemoteNode> {
        let _ns = lock(&self.namespace);
        self.insert_file(parent_id, name, bytes)
    }

    /// Removes a node and its subtree without counting it as a remote call,
    /// as an external actor would.
    pub fn remove_silently(&self, id: &str) {
        let _ns = lock(&self.namespace);
        self.remove_subtree(id);
    }

    fn enter(&self, op: StoreOp) -> StoreResult<()> {
        *self.calls.entry(op).or_insert(0) += 1;
        let hook = lock(&self.hooks).remove(&op);
        if let Some(hook) = hook {
            hook(self);
        }
        if let Some((_, err)) = self.failures.remove(&op) {
            tracing::debug!("memory store: injected failure for {op:?}: {err}");
            return Err(err);
        }
        Ok(())
    }

    fn alloc_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn node_of_kind(&self, id: &str, kind: NodeKind) -> StoreResult<RemoteNode> {
        match self.nodes.get(id) {
            Some(node) if node.kind == kind => Ok(node.clone()),
            _ => Err(StoreError::not_found(format!("{kind} {id}"))),
        }
    }

    fn children(&self, parent_id: &str) -> Vec<RemoteNode> {
        let mut children: Vec<RemoteNode> = self
            .nodes
            .iter()
            .filter(|n| n.parent_id.as_deref() == Some(parent_id))
            .map(|n| n.value().clone())
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        children
    }

    fn ensure_name_free(&self, parent_id: &str, name: &str, except: Option<&str>) -> StoreResult<()> {
        let clash = self
            .nodes
            .iter()
            .find(|n| {
                n.parent_id.as_deref() == Some(parent_id)
                    && n.name == name
                    && Some(n.id.as_str()) != except
            })
            .map(|n| (n.id.clone(), n.kind));
        match clash {
            Some((existing, kind)) => Err(StoreError::conflict_with(
                format!("item with the name '{name}' already exists"),
                existing,
                kind,
            )),
            None => Ok(()),
        }
    }

    fn insert_folder(&self, parent_id: &str, name: &str) -> StoreResult<RemoteNode> {
        self.node_of_kind(parent_id, NodeKind::Folder)?;
        self.ensure_name_free(parent_id, name, None)?;
        let node = RemoteNode::folder(self.alloc_id(), name)
            .with_parent(parent_id)
            .with_modified_at(Utc::now());
        self.nodes.insert(node.id.clone(), node.clone());
        Ok(node)
    }

    fn insert_file(&self, parent_id: &str, name: &str, bytes: Bytes) -> StoreResult<RemoteNode> {
        self.node_of_kind(parent_id, NodeKind::Folder)?;
        self.ensure_name_free(parent_id, name, None)?;
        let mut node = RemoteNode::file(self.alloc_id(), name)
            .with_parent(parent_id)
            .with_size(bytes.len() as u64)
            .with_modified_at(Utc::now());
        node.mime_type = guess_mime_type(name).map(str::to_owned);
        self.nodes.insert(node.id.clone(), node.clone());
        self.contents.insert(node.id.clone(), bytes);
        Ok(node)
    }

    fn remove_subtree(&self, id: &str) {
        let mut pending = vec![id.to_owned()];
        while let Some(current) = pending.pop() {
            pending.extend(self.children(&current).into_iter().map(|c| c.id));
            self.nodes.remove(&current);
            self.contents.remove(&current);
        }
    }

    /// Rejects moving a folder underneath itself.
    fn ensure_not_within(&self, folder_id: &str, target_id: &str) -> StoreResult<()> {
        let mut current = Some(target_id.to_owned());
        while let Some(id) = current {
            if id == folder_id {
                return Err(StoreError::InvalidRequest(
                    "cannot move a folder into itself".to_owned(),
                ));
            }
            current = self.nodes.get(&id).and_then(|n| n.parent_id.clone());
        }
        Ok(())
    }

    fn update<F>(&self, id: &str, kind: NodeKind, f: F) -> StoreResult<RemoteNode>
    where
        F: FnOnce(&mut RemoteNode),
    {
        let mut node = self
            .nodes
            .get_mut(id)
            .filter(|n| n.kind == kind)
            .ok_or_else(|| StoreError::not_found(format!("{kind} {id}")))?;
        f(&mut node);
        node.modified_at = Some(Utc::now());
        Ok(node.clone())
    }

    fn copy_tree(&self, folder: &RemoteNode, parent_id: &str, name: &str) -> StoreResult<RemoteNode> {
        let root_copy = self.insert_folder(parent_id, name)?;
        let mut pending = vec![(folder.id.clone(), root_copy.id.clone())];
        while let Some((source_id, target_id)) = pending.pop() {
            for child in self.children(&source_id) {
                match child.kind {
                    NodeKind::Folder => {
                        let copy = self.insert_folder(&target_id, &child.name)?;
                        pending.push((child.id, copy.id));
                    }
                    NodeKind::File => {
                        let bytes = self
                            .contents
                            .get(&child.id)
                            .map(|b| b.clone())
                            .unwrap_or_default();
                        self.insert_file(&target_id, &child.name, bytes)?;
                    }
                }
            }
        }
        Ok(root_copy)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn guess_mime_type(name: &str) -> Option<&'static str> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    Some(match ext.as_str() {
        "txt" | "md" => "text/plain",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    })
}

#[async_trait::async_trait]
impl RemoteStore for MemoryStore {
    async fn list_folder(&self, folder_id: &str) -> StoreResult<Vec<RemoteNode>> {
        self.enter(StoreOp::ListFolder)?;
        self.node_of_kind(folder_id, NodeKind::Folder)?;
        Ok(self.children(folder_id))
    }

    async fn get_file_info(&self, file_id: &str) -> StoreResult<RemoteNode> {
        self.enter(StoreOp::GetFileInfo)?;
        self.node_of_kind(file_id, NodeKind::File)
    }

    async fn get_folder_info(&self, folder_id: &str) -> StoreResult<RemoteNode> {
        self.enter(StoreOp::GetFolderInfo)?;
        self.node_of_kind(folder_id, NodeKind::Folder)
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> StoreResult<RemoteNode> {
        self.enter(StoreOp::CreateFolder)?;
        let _ns = lock(&self.namespace);
        self.insert_folder(parent_id, name)
    }

    async fn upload_file(&self, parent_id: &str, name: &str, bytes: Bytes) -> StoreResult<RemoteNode> {
        self.enter(StoreOp::UploadFile)?;
        let _ns = lock(&self.namespace);
        self.insert_file(parent_id, name, bytes)
    }

    async fn upload_file_version(&self, file_id: &str, bytes: Bytes) -> StoreResult<RemoteNode> {
        self.enter(StoreOp::UploadFileVersion)?;
        let len = bytes.len() as u64;
        let node = self.update(file_id, NodeKind::File, |n| n.size = Some(len))?;
        self.contents.insert(file_id.to_owned(), bytes);
        Ok(node)
    }

    async fn download_file(&self, file_id: &str) -> StoreResult<Bytes> {
        self.enter(StoreOp::DownloadFile)?;
        self.node_of_kind(file_id, NodeKind::File)?;
        Ok(self
            .contents
            .get(file_id)
            .map(|b| b.clone())
            .unwrap_or_default())
    }

    async fn open_download_stream(&self, file_id: &str) -> StoreResult<ByteStream> {
        let bytes = self.download_file(file_id).await?;
        let future = Box::pin(async { Ok(bytes) });
        Ok(Box::new(stream::once(future)))
    }

    async fn delete_file(&self, file_id: &str) -> StoreResult<()> {
        self.enter(StoreOp::DeleteFile)?;
        let _ns = lock(&self.namespace);
        self.node_of_kind(file_id, NodeKind::File)?;
        self.remove_subtree(file_id);
        Ok(())
    }

    async fn delete_folder(&self, folder_id: &str, recursive: bool) -> StoreResult<()> {
        self.enter(StoreOp::DeleteFolder)?;
        let _ns = lock(&self.namespace);
        self.node_of_kind(folder_id, NodeKind::Folder)?;
        if folder_id == self.root_id {
            return Err(StoreError::InvalidRequest(
                "the root folder cannot be deleted".to_owned(),
            ));
        }
        if !recursive && !self.children(folder_id).is_empty() {
            return Err(StoreError::InvalidRequest(format!(
                "folder {folder_id} is not empty"
            )));
        }
        self.remove_subtree(folder_id);
        Ok(())
    }

    async fn move_file(&self, file_id: &str, new_parent_id: &str) -> StoreResult<RemoteNode> {
        self.enter(StoreOp::MoveFile)?;
        let _ns = lock(&self.namespace);
        let file = self.node_of_kind(file_id, NodeKind::File)?;
        self.node_of_kind(new_parent_id, NodeKind::Folder)?;
        self.ensure_name_free(new_parent_id, &file.name, Some(file_id))?;
        self.update(file_id, NodeKind::File, |n| n.parent_id = Some(new_parent_id.to_owned()))
    }

    async fn move_folder(&self, folder_id: &str, new_parent_id: &str) -> StoreResult<RemoteNode> {
        self.enter(StoreOp::MoveFolder)?;
        let _ns = lock(&self.namespace);
        let folder = self.node_of_kind(folder_id, NodeKind::Folder)?;
        self.node_of_kind(new_parent_id, NodeKind::Folder)?;
        self.ensure_not_within(folder_id, new_parent_id)?;
        self.ensure_name_free(new_parent_id, &folder.name, Some(folder_id))?;
        self.update(folder_id, NodeKind::Folder, |n| {
            n.parent_id = Some(new_parent_id.to_owned())
        })
    }

    async fn rename_file(&self, file_id: &str, new_name: &str) -> StoreResult<RemoteNode> {
        self.enter(StoreOp::RenameFile)?;
        let _ns = lock(&self.namespace);
        let file = self.node_of_kind(file_id, NodeKind::File)?;
        if let Some(parent) = file.parent_id.as_deref() {
            self.ensure_name_free(parent, new_name, Some(file_id))?;
        }
        self.update(file_id, NodeKind::File, |n| {
            n.name = new_name.to_owned();
            n.mime_type = guess_mime_type(new_name).map(str::to_owned);
        })
    }

    async fn rename_folder(&self, folder_id: &str, new_name: &str) -> StoreResult<RemoteNode> {
        self.enter(StoreOp::RenameFolder)?;
        let _ns = lock(&self.namespace);
        let folder = self.node_of_kind(folder_id, NodeKind::Folder)?;
        if let Some(parent) = folder.parent_id.as_deref() {
            self.ensure_name_free(parent, new_name, Some(folder_id))?;
        }
        self.update(folder_id, NodeKind::Folder, |n| n.name = new_name.to_owned())
    }

    async fn copy_file(
        &self,
        file_id: &str,
        new_parent_id: &str,
        new_name: Option<&str>,
    ) -> StoreResult<RemoteNode> {
        self.enter(StoreOp::CopyFile)?;
        let _ns = lock(&self.namespace);
        let source = self.node_of_kind(file_id, NodeKind::File)?;
        let bytes = self
            .contents
            .get(file_id)
            .map(|b| b.clone())
            .unwrap_or_default();
        self.insert_file(new_parent_id, new_name.unwrap_or(&source.name), bytes)
    }

    async fn copy_folder(
        &self,
        folder_id: &str,
        new_parent_id: &str,
        new_name: Option<&str>,
    ) -> StoreResult<RemoteNode> {
        self.enter(StoreOp::CopyFolder)?;
        let _ns = lock(&self.namespace);
        let source = self.node_of_kind(folder_id, NodeKind::Folder)?;
        self.ensure_not_within(folder_id, new_parent_id)?;
        self.copy_tree(&source, new_parent_id, new_name.unwrap_or(&source.name))
    }

    async fn search(&self, query: &SearchQuery) -> StoreResult<Vec<RemoteNode>> {
        self.enter(StoreOp::Search)?;
        let needle = query.query.to_lowercase();
        let mut hits: Vec<RemoteNode> = self
            .nodes
            .iter()
            .filter(|n| n.id != self.root_id)
            .filter(|n| query.kind.is_none_or(|k| n.kind == k))
            .filter(|n| n.name.to_lowercase().contains(&needle))
            .map(|n| n.value().clone())
            .collect();
        hits.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(hits
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }

    async fn create_shared_link(
        &self,
        file_id: &str,
        options: &SharedLinkOptions,
    ) -> StoreResult<RemoteNode> {
        self.enter(StoreOp::CreateSharedLink)?;
        let access = match options.access {
            SharedLinkAccess::Open => "open",
            SharedLinkAccess::Company => "company",
            SharedLinkAccess::Collaborators => "collaborators",
        };
        self.update(file_id, NodeKind::File, |n| {
            n.shared_link = Some(format!("memory://shared/{access}/{file_id}"));
        })
    }
}
