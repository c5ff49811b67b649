use boxfs_core::{ByteStream, CollisionStrategy, NodeKind, SearchQuery, SharedLinkOptions, StoreError};
use boxfs_fs::debug::render_tree;
use boxfs_fs::{BoxFs, Entry, FsConfig, WriteOptions};
use boxfs_store_memory::{MemoryStore, StoreOp};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn setup() -> (Arc<MemoryStore>, BoxFs) {
    let store = Arc::new(MemoryStore::new());
    let fs = BoxFs::new(store.clone(), FsConfig::default());
    (store, fs)
}

fn paths(entries: &[Entry]) -> Vec<&str> {
    entries.iter().map(|e| e.path.as_str()).collect()
}

#[tokio::test]
async fn write_then_read_round_trips() {
    let (store, fs) = setup();

    let node = fs
        .write("docs/2024/report.pdf", Bytes::from_static(b"%PDF-1.7"), WriteOptions::default())
        .await
        .unwrap();

    assert_eq!(node.name, "report.pdf");
    assert_eq!(store.calls(StoreOp::CreateFolder), 2);
    assert!(fs.resolver().cache().contains("docs/2024/report.pdf"));

    store.reset_calls();
    assert_eq!(fs.read("docs/2024/report.pdf").await.unwrap(), "%PDF-1.7");
    assert_eq!(store.calls(StoreOp::ListFolder), 0);
    assert_eq!(store.calls(StoreOp::DownloadFile), 1);
}

#[tokio::test]
async fn rename_strategy_writes_numbered_sibling() {
    let (store, fs) = setup();
    let docs = store.seed_folder("0", "docs").unwrap();
    store
        .seed_file(&docs.id, "report.pdf", Bytes::from_static(b"v1"))
        .unwrap();

    let node = fs
        .write("docs/report.pdf", Bytes::from_static(b"v2"), WriteOptions::default())
        .await
        .unwrap();

    assert_eq!(node.name, "report (1).pdf");
    assert!(fs.resolver().cache().contains("docs/report (1).pdf"));
    assert_eq!(fs.read("docs/report.pdf").await.unwrap(), "v1");
    assert_eq!(fs.read("docs/report (1).pdf").await.unwrap(), "v2");
}

#[tokio::test]
async fn skip_strategy_keeps_existing_file() {
    let (store, fs) = setup();
    let docs = store.seed_folder("0", "docs").unwrap();
    let existing = store
        .seed_file(&docs.id, "report.pdf", Bytes::from_static(b"v1"))
        .unwrap();

    let node = fs
        .write(
            "docs/report.pdf",
            Bytes::from_static(b"v2"),
            WriteOptions::collision(CollisionStrategy::Skip),
        )
        .await
        .unwrap();

    assert_eq!(node.id, existing.id);
    assert_eq!(store.calls(StoreOp::UploadFile), 0);
    assert_eq!(fs.read("docs/report.pdf").await.unwrap(), "v1");
}

#[tokio::test]
async fn overwrite_strategy_uploads_new_version() {
    let (store, fs) = setup();
    let docs = store.seed_folder("0", "docs").unwrap();
    let existing = store
        .seed_file(&docs.id, "report.pdf", Bytes::from_static(b"v1"))
        .unwrap();

    let node = fs
        .write(
            "docs/report.pdf",
            Bytes::from_static(b"version two"),
            WriteOptions::collision(CollisionStrategy::Overwrite),
        )
        .await
        .unwrap();

    assert_eq!(node.id, existing.id);
    assert_eq!(node.size, Some(11));
    assert_eq!(store.calls(StoreOp::UploadFile), 1);
    assert_eq!(store.calls(StoreOp::UploadFileVersion), 1);
    // Only the walk to `docs` lists; overwrite needs no sibling listing.
    assert_eq!(store.calls(StoreOp::ListFolder), 1);
    assert_eq!(fs.read("docs/report.pdf").await.unwrap(), "version two");
}

#[tokio::test]
async fn overwrite_refuses_to_replace_a_folder() {
    let (store, fs) = setup();
    let docs = store.seed_folder("0", "docs").unwrap();
    assert!(fs.directory_exists("docs").await.unwrap());

    let err = fs
        .write(
            "docs",
            Bytes::from_static(b"not a folder"),
            WriteOptions::collision(CollisionStrategy::Overwrite),
        )
        .await
        .unwrap_err();

    assert!(
        matches!(&err.source, StoreError::Conflict { existing_id: Some(id), .. } if *id == docs.id),
        "got {:?}",
        err.source
    );
    assert_eq!(store.calls(StoreOp::UploadFileVersion), 0);
    assert!(fs.resolver().cache().contains("docs"));
    assert!(fs.directory_exists("docs").await.unwrap());
}

#[tokio::test]
async fn overwrite_checks_the_listing_when_conflict_kind_is_unknown() {
    let (store, fs) = setup();
    let docs = store.seed_folder("0", "docs").unwrap();
    let existing = store
        .seed_file(&docs.id, "report.pdf", Bytes::from_static(b"v1"))
        .unwrap();
    let sub = store.seed_folder(&docs.id, "archive").unwrap();
    let overwrite = || WriteOptions::collision(CollisionStrategy::Overwrite);

    store.fail_next(
        StoreOp::UploadFile,
        StoreError::conflict("name in use", Some(existing.id.clone())),
    );
    let node = fs
        .write("docs/report.pdf", Bytes::from_static(b"v2"), overwrite())
        .await
        .unwrap();
    assert_eq!(node.id, existing.id);
    assert_eq!(store.calls(StoreOp::UploadFileVersion), 1);
    // The walk to `docs`, then the sibling check.
    assert_eq!(store.calls(StoreOp::ListFolder), 2);

    store.fail_next(
        StoreOp::UploadFile,
        StoreError::conflict("name in use", Some(sub.id.clone())),
    );
    let err = fs
        .write("docs/archive", Bytes::from_static(b"x"), overwrite())
        .await
        .unwrap_err();
    assert!(matches!(err.source, StoreError::Conflict { .. }));
    assert_eq!(store.calls(StoreOp::UploadFileVersion), 1);
}

#[tokio::test]
async fn configured_default_strategy_applies() {
    let store = Arc::new(MemoryStore::new());
    let fs = BoxFs::new(
        store.clone(),
        FsConfig {
            collision_strategy: CollisionStrategy::Skip,
            ..FsConfig::default()
        },
    );
    fs.write("a.txt", Bytes::from_static(b"one"), WriteOptions::default())
        .await
        .unwrap();
    fs.write("a.txt", Bytes::from_static(b"two"), WriteOptions::default())
        .await
        .unwrap();

    assert_eq!(store.calls(StoreOp::UploadFile), 1);
    assert_eq!(fs.read("a.txt").await.unwrap(), "one");
}

#[tokio::test]
async fn write_stream_buffers_chunks() {
    let (_, fs) = setup();
    let chunks: Vec<Result<Bytes, std::io::Error>> =
        vec![Ok(Bytes::from_static(b"hello ")), Ok(Bytes::from_static(b"world"))];
    let stream: ByteStream = Box::new(futures::stream::iter(chunks));

    fs.write_stream("greeting.txt", stream, WriteOptions::default())
        .await
        .unwrap();

    let read: Vec<Bytes> = fs
        .read_stream("greeting.txt")
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(read.concat(), b"hello world");
}

#[tokio::test]
async fn writing_to_root_is_rejected() {
    let (store, fs) = setup();
    let err = fs
        .write("/", Bytes::from_static(b"x"), WriteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), StoreError::InvalidRequest(_)));
    assert_eq!(store.total_calls(), 0);
}

#[tokio::test]
async fn existence_checks() {
    let (store, fs) = setup();
    let docs = store.seed_folder("0", "docs").unwrap();
    store
        .seed_file(&docs.id, "notes.txt", Bytes::from_static(b"n"))
        .unwrap();

    assert!(fs.directory_exists("docs").await.unwrap());
    assert!(fs.directory_exists("/").await.unwrap());
    assert!(fs.file_exists("docs/notes.txt").await.unwrap());
    assert!(!fs.file_exists("docs").await.unwrap());
    assert!(!fs.directory_exists("docs/notes.txt").await.unwrap());
    assert!(!fs.file_exists("missing/deeper/file.txt").await.unwrap());
}

#[tokio::test]
async fn existence_check_propagates_remote_failures() {
    let (store, fs) = setup();
    store.fail_next(
        StoreOp::ListFolder,
        StoreError::AuthenticationFailure("token rejected".into()),
    );

    let err = fs.file_exists("docs/notes.txt").await.unwrap_err();
    assert!(err.kind().is_auth_failure());
}

#[tokio::test]
async fn stale_cache_entry_is_dropped_on_not_found() {
    let (store, fs) = setup();
    let docs = store.seed_folder("0", "docs").unwrap();
    let file = store
        .seed_file(&docs.id, "notes.txt", Bytes::from_static(b"n"))
        .unwrap();
    fs.file_id("docs/notes.txt").await.unwrap();

    store.remove_silently(&file.id);
    let err = fs.read("docs/notes.txt").await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.op, "read");
    assert_eq!(err.id.as_deref(), Some(file.id.as_str()));
    assert!(err.to_string().starts_with(&format!("read 'docs/notes.txt' (id {})", file.id)));
    assert!(fs.resolver().cache().is_empty());
    assert!(!fs.file_exists("docs/notes.txt").await.unwrap());
}

#[tokio::test]
async fn delete_invalidates_path() {
    let (store, fs) = setup();
    fs.write("a/b.txt", Bytes::from_static(b"b"), WriteOptions::default())
        .await
        .unwrap();

    fs.delete("a/b.txt").await.unwrap();

    assert!(!fs.resolver().cache().contains("a/b.txt"));
    assert!(!fs.file_exists("a/b.txt").await.unwrap());
    assert_eq!(store.calls(StoreOp::DeleteFile), 1);
}

#[tokio::test]
async fn delete_directory_removes_subtree_and_cache() {
    let (_, fs) = setup();
    fs.write("a/b/c.txt", Bytes::from_static(b"c"), WriteOptions::default())
        .await
        .unwrap();
    fs.write("keep.txt", Bytes::from_static(b"k"), WriteOptions::default())
        .await
        .unwrap();

    fs.delete_directory("a").await.unwrap();

    assert_eq!(fs.resolver().cache().paths(), vec!["keep.txt"]);
    assert!(!fs.directory_exists("a").await.unwrap());
    assert!(fs.file_exists("keep.txt").await.unwrap());
}

#[tokio::test]
async fn deleting_root_is_refused() {
    let (store, fs) = setup();
    let err = fs.delete_directory("/").await.unwrap_err();
    assert!(matches!(err.kind(), StoreError::InvalidRequest(_)));
    assert_eq!(store.calls(StoreOp::DeleteFolder), 0);
}

#[tokio::test]
async fn create_directory_reuses_existing_folders() {
    let (store, fs) = setup();
    let first = fs.create_directory("x/y").await.unwrap();
    let second = fs.create_directory("/x/y/").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(store.calls(StoreOp::CreateFolder), 2);
}

/// `a/`, `a/sub/`, `a/sub/y.txt`, `a/x.txt`, `b.txt`
fn seed_tree(store: &MemoryStore) -> [String; 5] {
    let a = store.seed_folder("0", "a").unwrap();
    let sub = store.seed_folder(&a.id, "sub").unwrap();
    let y = store.seed_file(&sub.id, "y.txt", Bytes::from_static(b"y")).unwrap();
    let x = store.seed_file(&a.id, "x.txt", Bytes::from_static(b"x")).unwrap();
    let b = store.seed_file("0", "b.txt", Bytes::from_static(b"b")).unwrap();
    [a.id, sub.id, y.id, x.id, b.id]
}

#[tokio::test]
async fn shallow_listing() {
    let (store, fs) = setup();
    seed_tree(&store);

    let entries: Vec<Entry> = fs.list_contents("", false).try_collect().await.unwrap();
    assert_eq!(paths(&entries), vec!["a", "b.txt"]);
    assert_eq!(entries[0].node.kind, NodeKind::Folder);
}

#[tokio::test]
async fn deep_listing_is_depth_first() {
    let (store, fs) = setup();
    seed_tree(&store);

    let entries: Vec<Entry> = fs.list_contents("/", true).try_collect().await.unwrap();
    assert_eq!(
        paths(&entries),
        vec!["a", "a/sub", "a/sub/y.txt", "a/x.txt", "b.txt"]
    );
    assert_eq!(store.calls(StoreOp::ListFolder), 3);
}

#[tokio::test]
async fn deep_listing_is_lazy() {
    let (store, fs) = setup();
    seed_tree(&store);

    let mut stream = fs.list_contents("", true);
    let first = stream.next().await.unwrap().unwrap();

    assert_eq!(first.path, "a");
    assert_eq!(store.calls(StoreOp::ListFolder), 1);
}

#[tokio::test]
async fn listing_a_missing_folder_yields_one_error() {
    let (_, fs) = setup();
    let results: Vec<_> = fs.list_contents("nope", true).collect().await;
    assert_eq!(results.len(), 1);
    assert!(results[0].as_ref().unwrap_err().is_not_found());
}

#[tokio::test]
async fn metadata_queries() {
    let (store, fs) = setup();
    seed_tree(&store);
    fs.write("docs/report.pdf", Bytes::from_static(b"12345"), WriteOptions::default())
        .await
        .unwrap();

    assert_eq!(fs.metadata("a/sub").await.unwrap().kind, NodeKind::Folder);
    assert_eq!(fs.file_size("docs/report.pdf").await.unwrap(), Some(5));
    assert_eq!(
        fs.mime_type("docs/report.pdf").await.unwrap().as_deref(),
        Some("application/pdf")
    );
    assert!(fs.last_modified("a/x.txt").await.unwrap().is_some());
    assert!(fs.file_size("a/sub").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn move_with_rename_across_folders() {
    let (store, fs) = setup();
    fs.write("a/x.txt", Bytes::from_static(b"payload"), WriteOptions::default())
        .await
        .unwrap();

    let moved = fs.move_file("a/x.txt", "b/c/y.txt").await.unwrap();

    assert_eq!(moved.name, "y.txt");
    assert_eq!(store.calls(StoreOp::MoveFile), 1);
    assert_eq!(store.calls(StoreOp::RenameFile), 1);
    assert!(!fs.file_exists("a/x.txt").await.unwrap());
    assert_eq!(fs.read("b/c/y.txt").await.unwrap(), "payload");
}

#[tokio::test]
async fn move_within_folder_only_renames() {
    let (store, fs) = setup();
    fs.write("a/x.txt", Bytes::from_static(b"x"), WriteOptions::default())
        .await
        .unwrap();

    fs.move_file("a/x.txt", "a/z.txt").await.unwrap();

    assert_eq!(store.calls(StoreOp::MoveFile), 0);
    assert_eq!(store.calls(StoreOp::RenameFile), 1);
    assert!(fs.file_exists("a/z.txt").await.unwrap());
}

#[tokio::test]
async fn copy_keeps_source() {
    let (_, fs) = setup();
    fs.write("a/x.txt", Bytes::from_static(b"x"), WriteOptions::default())
        .await
        .unwrap();

    let copy = fs.copy_file("a/x.txt", "backup/x-copy.txt").await.unwrap();

    assert_eq!(copy.name, "x-copy.txt");
    assert!(fs.resolver().cache().contains("backup/x-copy.txt"));
    assert_eq!(fs.read("a/x.txt").await.unwrap(), "x");
    assert_eq!(fs.read("backup/x-copy.txt").await.unwrap(), "x");
}

#[tokio::test]
async fn search_and_share() {
    let (store, fs) = setup();
    let [.., x_id, _] = seed_tree(&store);

    let hits = fs
        .search(&SearchQuery::new("X.TXT").kind(NodeKind::File))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, x_id);

    let url = fs
        .share_link("a/x.txt", &SharedLinkOptions::default())
        .await
        .unwrap();
    assert_eq!(url, format!("memory://shared/open/{x_id}"));
}

#[tokio::test]
async fn visibility_is_unsupported() {
    let (store, fs) = setup();
    let err = fs.set_visibility("a.txt", "public").await.unwrap_err();
    assert!(matches!(err.kind(), StoreError::Unsupported(_)));
    let err = fs.visibility("a.txt").await.unwrap_err();
    assert!(matches!(err.kind(), StoreError::Unsupported(_)));
    assert_eq!(store.total_calls(), 0);
}

#[tokio::test]
async fn cancelled_handle_makes_no_calls() {
    let (store, fs) = setup();
    let cancel = CancellationToken::new();
    let handle = fs.with_cancellation(cancel.clone());
    cancel.cancel();

    let err = handle.read("docs/report.pdf").await.unwrap_err();
    assert_eq!(err.kind(), &StoreError::Cancelled);
    assert_eq!(store.total_calls(), 0);

    // The original handle is unaffected.
    assert!(!fs.file_exists("docs/report.pdf").await.unwrap());
}

#[tokio::test]
async fn cancelled_handles_share_the_cache() {
    let (store, fs) = setup();
    fs.write("a/x.txt", Bytes::from_static(b"x"), WriteOptions::default())
        .await
        .unwrap();
    let handle = fs.with_cancellation(CancellationToken::new());
    store.reset_calls();

    handle.file_id("a/x.txt").await.unwrap();
    assert_eq!(store.total_calls(), 0);
}

#[tokio::test]
async fn tree_rendering() {
    let (store, fs) = setup();
    let [a, sub, y, x, b] = seed_tree(&store);

    let tree = render_tree(&fs, "").await.unwrap();
    let expected = format!(
        ". [folder id=0]\n\
         ├── a/ [folder id={a}]\n\
         │   ├── sub/ [folder id={sub}]\n\
         │   │   └── y.txt [file id={y} size=1]\n\
         │   └── x.txt [file id={x} size=1]\n\
         └── b.txt [file id={b} size=1]\n"
    );
    assert_eq!(tree, expected);
}

#[tokio::test]
async fn tree_marks_broken_subtrees() {
    let (store, fs) = setup();
    let [a, sub, _, x, b] = seed_tree(&store);
    // Listings of the root and `a` succeed; the listing of `a/sub` fails.
    store.before_next(StoreOp::ListFolder, |s| {
        s.before_next(StoreOp::ListFolder, |s| {
            s.before_next(StoreOp::ListFolder, |s| {
                s.fail_next(StoreOp::ListFolder, StoreError::TransientFailure("boom".into()));
            });
        });
    });

    let tree = render_tree(&fs, "/").await.unwrap();
    let expected = format!(
        ". [folder id=0]\n\
         ├── a/ [folder id={a}]\n\
         │   ├── sub/ [folder id={sub}]\n\
         │   │   [BROKEN SUBTREE at a/sub: transient failure: boom]\n\
         │   └── x.txt [file id={x} size=1]\n\
         └── b.txt [file id={b} size=1]\n"
    );
    assert_eq!(tree, expected);
}
