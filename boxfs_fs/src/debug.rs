use crate::{BoxFs, FsError, FsResult};
use boxfs_core::path;
use boxfs_core::{NodeKind, RemoteNode};

use crate::resolver::cancellable;

/// Print a debug tree of the remote folder at `path` ("" or "/" for root).
pub async fn print_tree(fs: &BoxFs, path: &str) -> FsResult<()> {
    print!("{}", render_tree(fs, path).await?);
    Ok(())
}

/// Same as [`print_tree`] but returns the text.
///
/// Folders that fail to list are marked inline instead of aborting the
/// whole tree.
pub async fn render_tree(fs: &BoxFs, path: &str) -> FsResult<String> {
    let norm = path::normalize(path);
    let root_id = fs.folder_id(&norm).await?;
    let label = if norm.is_empty() {
        ".".to_string()
    } else {
        format!("./{}", norm)
    };

    let mut out = format!("{} [folder id={}]\n", label, root_id);
    let entries = list(fs, &norm, &root_id).await?;

    let mut stack: Vec<Frame> = vec![Frame {
        path: norm,
        prefix: String::new(),
        entries,
        index: 0,
    }];

    while let Some(frame) = stack.last_mut() {
        if frame.index >= frame.entries.len() {
            stack.pop();
            continue;
        }

        let node = frame.entries[frame.index].clone();
        let is_last = frame.index + 1 == frame.entries.len();
        frame.index += 1;

        let (branch, child_piece) = if is_last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        let child_prefix = format!("{}{}", frame.prefix, child_piece);
        out.push_str(&frame.prefix);
        out.push_str(branch);

        match node.kind {
            NodeKind::File => {
                let size = node
                    .size
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "?".to_string());
                out.push_str(&format!("{} [file id={} size={}]\n", node.name, node.id, size));
            }
            NodeKind::Folder => {
                out.push_str(&format!("{}/ [folder id={}]\n", node.name, node.id));
                let next_path = path::join(&frame.path, &node.name);
                match list(fs, &next_path, &node.id).await {
                    Ok(entries) => stack.push(Frame {
                        path: next_path,
                        prefix: child_prefix,
                        entries,
                        index: 0,
                    }),
                    Err(err) => {
                        out.push_str(&format!(
                            "{}[BROKEN SUBTREE at {}: {}]\n",
                            child_prefix, err.path, err.source
                        ));
                    }
                }
            }
        }
    }

    Ok(out)
}

struct Frame {
    path: String,
    prefix: String,
    entries: Vec<RemoteNode>,
    index: usize,
}

async fn list(fs: &BoxFs, label: &str, folder_id: &str) -> FsResult<Vec<RemoteNode>> {
    cancellable(
        fs.cancellation(),
        fs.resolver().store().list_folder(folder_id),
    )
    .await
    .map_err(|e| FsError::new("tree", label, Some(folder_id.to_owned()), e))
}
