//! Conformance suite for `RemoteStore` implementations.
//!
//! # Usage
//!
//! In your store crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! boxfs_core = { workspace = true, features = ["testutil"] }
//! ```
//!
//! In your test file:
//!
//! ```ignore
//! use boxfs_core::testutil::RemoteStoreTests;
//!
//! #[tokio::test]
//! async fn test_my_store() {
//!     let store = MyStore::new(...);
//!     RemoteStoreTests::new(&store, "0").run_all().await.unwrap();
//! }
//! ```

use crate::node::{NodeKind, RemoteNode, find_child};
use crate::store::{RemoteStore, StoreError, StoreResult};
use bytes::Bytes;
use futures::StreamExt;

/// Runs every check inside a fresh scratch folder under `root_id` so the
/// suite can share a store with other data.
pub struct RemoteStoreTests<'a, S> {
    store: &'a S,
    root_id: String,
    scratch_name: String,
}

impl<'a, S: RemoteStore> RemoteStoreTests<'a, S> {
    pub fn new(store: &'a S, root_id: impl Into<String>) -> Self {
        Self {
            store,
            root_id: root_id.into(),
            scratch_name: format!("_test_{}", uuid::Uuid::new_v4().simple()),
        }
    }

    /// Run all tests, then remove the scratch folder.
    pub async fn run_all(&self) -> StoreResult<()> {
        let scratch = self.store.create_folder(&self.root_id, &self.scratch_name).await?;

        self.test_create_and_list(&scratch.id).await?;
        self.test_upload_download(&scratch.id).await?;
        self.test_download_stream(&scratch.id).await?;
        self.test_upload_conflict(&scratch.id).await?;
        self.test_upload_version(&scratch.id).await?;
        self.test_rename(&scratch.id).await?;
        self.test_move(&scratch.id).await?;
        self.test_copy(&scratch.id).await?;
        self.test_delete(&scratch.id).await?;
        self.test_not_found().await?;

        self.store.delete_folder(&scratch.id, true).await?;
        Ok(())
    }

    pub async fn test_create_and_list(&self, parent: &str) -> StoreResult<()> {
        let folder = self.store.create_folder(parent, "listing").await?;
        assert_eq!(folder.kind, NodeKind::Folder);
        assert_eq!(folder.name, "listing");

        self.store
            .upload_file(&folder.id, "a.txt", Bytes::from_static(b"a"))
            .await?;
        self.store.create_folder(&folder.id, "sub").await?;

        let entries = self.store.list_folder(&folder.id).await?;
        assert_eq!(entries.len(), 2, "listing should contain both children");
        assert!(find_child(&entries, NodeKind::File, "a.txt").is_some());
        assert!(find_child(&entries, NodeKind::Folder, "sub").is_some());

        let info = self.store.get_folder_info(&folder.id).await?;
        assert_eq!(info.name, "listing");
        Ok(())
    }

    pub async fn test_upload_download(&self, parent: &str) -> StoreResult<()> {
        let data = Bytes::from_static(b"hello, box!");
        let file = self.store.upload_file(parent, "hello.txt", data.clone()).await?;
        assert_eq!(file.kind, NodeKind::File);
        assert_eq!(file.size, Some(data.len() as u64));

        let retrieved = self.store.download_file(&file.id).await?;
        assert_eq!(retrieved, data, "downloaded bytes should match upload");

        let info = self.store.get_file_info(&file.id).await?;
        assert_eq!(info.name, "hello.txt");
        assert_eq!(info.size, Some(data.len() as u64));
        Ok(())
    }

    pub async fn test_download_stream(&self, parent: &str) -> StoreResult<()> {
        let data = Bytes::from(vec![7u8; 4096]);
        let file = self.store.upload_file(parent, "stream.bin", data.clone()).await?;

        let mut stream = self.store.open_download_stream(&file.id).await?;
        let mut retrieved = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StoreError::TransientFailure(e.to_string()))?;
            retrieved.extend_from_slice(&chunk);
        }
        assert_eq!(retrieved, data.as_ref());
        Ok(())
    }

    pub async fn test_upload_conflict(&self, parent: &str) -> StoreResult<()> {
        let first = self
            .store
            .upload_file(parent, "dup.txt", Bytes::from_static(b"1"))
            .await?;
        let err = self
            .store
            .upload_file(parent, "dup.txt", Bytes::from_static(b"2"))
            .await
            .expect_err("second upload with the same name should conflict");
        match err {
            StoreError::Conflict { existing_id, .. } => {
                assert_eq!(existing_id.as_deref(), Some(first.id.as_str()));
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
        Ok(())
    }

    pub async fn test_upload_version(&self, parent: &str) -> StoreResult<()> {
        let file = self
            .store
            .upload_file(parent, "versioned.txt", Bytes::from_static(b"v1"))
            .await?;
        let updated = self
            .store
            .upload_file_version(&file.id, Bytes::from_static(b"version two"))
            .await?;
        assert_eq!(updated.id, file.id, "a new version keeps the file id");
        assert_eq!(
            self.store.download_file(&file.id).await?,
            Bytes::from_static(b"version two")
        );
        Ok(())
    }

    pub async fn test_rename(&self, parent: &str) -> StoreResult<()> {
        let file = self
            .store
            .upload_file(parent, "before.txt", Bytes::from_static(b"r"))
            .await?;
        let renamed = self.store.rename_file(&file.id, "after.txt").await?;
        assert_eq!(renamed.id, file.id);
        assert_eq!(renamed.name, "after.txt");

        let folder = self.store.create_folder(parent, "old-name").await?;
        let renamed = self.store.rename_folder(&folder.id, "new-name").await?;
        assert_eq!(renamed.name, "new-name");

        let entries = self.store.list_folder(parent).await?;
        assert!(find_child(&entries, NodeKind::File, "before.txt").is_none());
        assert!(find_child(&entries, NodeKind::File, "after.txt").is_some());
        assert!(find_child(&entries, NodeKind::Folder, "new-name").is_some());
        Ok(())
    }

    pub async fn test_move(&self, parent: &str) -> StoreResult<()> {
        let target = self.store.create_folder(parent, "move-target").await?;
        let file = self
            .store
            .upload_file(parent, "moving.txt", Bytes::from_static(b"m"))
            .await?;
        self.store.move_file(&file.id, &target.id).await?;

        let inner = self.store.list_folder(&target.id).await?;
        assert!(find_child(&inner, NodeKind::File, "moving.txt").is_some());
        let outer = self.store.list_folder(parent).await?;
        assert!(find_child(&outer, NodeKind::File, "moving.txt").is_none());

        let folder = self.store.create_folder(parent, "moving-dir").await?;
        self.store.move_folder(&folder.id, &target.id).await?;
        let inner = self.store.list_folder(&target.id).await?;
        assert!(find_child(&inner, NodeKind::Folder, "moving-dir").is_some());
        Ok(())
    }

    pub async fn test_copy(&self, parent: &str) -> StoreResult<()> {
        let source = self
            .store
            .upload_file(parent, "original.txt", Bytes::from_static(b"copy me"))
            .await?;
        let copy = self
            .store
            .copy_file(&source.id, parent, Some("copy.txt"))
            .await?;
        assert_ne!(copy.id, source.id);
        assert_eq!(copy.name, "copy.txt");
        assert_eq!(
            self.store.download_file(&copy.id).await?,
            Bytes::from_static(b"copy me")
        );

        let folder = self.store.create_folder(parent, "tree").await?;
        self.store
            .upload_file(&folder.id, "leaf.txt", Bytes::from_static(b"leaf"))
            .await?;
        let folder_copy = self
            .store
            .copy_folder(&folder.id, parent, Some("tree-copy"))
            .await?;
        let inner = self.store.list_folder(&folder_copy.id).await?;
        assert!(find_child(&inner, NodeKind::File, "leaf.txt").is_some());
        Ok(())
    }

    pub async fn test_delete(&self, parent: &str) -> StoreResult<()> {
        let file = self
            .store
            .upload_file(parent, "doomed.txt", Bytes::from_static(b"x"))
            .await?;
        self.store.delete_file(&file.id).await?;
        let err = self
            .store
            .get_file_info(&file.id)
            .await
            .expect_err("deleted file should be gone");
        assert!(err.is_not_found());

        let folder = self.store.create_folder(parent, "full").await?;
        self.store
            .upload_file(&folder.id, "child.txt", Bytes::from_static(b"c"))
            .await?;
        let err = self
            .store
            .delete_folder(&folder.id, false)
            .await
            .expect_err("non-recursive delete of a non-empty folder should fail");
        assert!(!err.is_not_found());
        self.store.delete_folder(&folder.id, true).await?;

        let entries = self.store.list_folder(parent).await?;
        assert!(find_child(&entries, NodeKind::Folder, "full").is_none());
        Ok(())
    }

    pub async fn test_not_found(&self) -> StoreResult<()> {
        let missing = "does-not-exist-0000";
        assert!(self.store.get_file_info(missing).await.unwrap_err().is_not_found());
        assert!(self.store.list_folder(missing).await.unwrap_err().is_not_found());
        assert!(self.store.download_file(missing).await.unwrap_err().is_not_found());
        Ok(())
    }
}

/// Convenience for building expected listings in tests.
pub fn names(nodes: &[RemoteNode]) -> Vec<&str> {
    let mut names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
    names.sort_unstable();
    names
}
