use anyhow::{Context, Result};
use boxfs_auth::CredentialManager;
use boxfs_core::{NodeKind, RemoteNode};
use boxfs_fs::BoxFs;
use boxfs_store_box::BoxStore;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::config::CliConfig;

/// Builds the credential manager, the Box store and the filesystem for a
/// profile. Relative key paths resolve against the config file's folder.
pub fn open_fs(config: CliConfig, config_file: &Path) -> Result<BoxFs> {
    let config_dir = config_file.parent();
    let tokens = CredentialManager::new(&config.auth, config_dir)
        .context("failed to set up Box credentials")?;
    let store = BoxStore::new(config.api, Arc::new(tokens)).context("failed to set up Box client")?;
    debug!(root = %config.fs.root_folder_id, "opening box filesystem");
    Ok(BoxFs::new(Arc::new(store), config.fs))
}

/// Cancels every in-flight call of `fs` on Ctrl-C.
pub fn cancel_on_ctrl_c(fs: &BoxFs) {
    let cancel = fs.cancellation().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
}

/// `kind  size  modified  path`, one line per entry.
pub fn format_entry(path: &str, node: &RemoteNode) -> String {
    let size = match node.kind {
        NodeKind::Folder => "-".to_owned(),
        NodeKind::File => node.size.map(|s| s.to_string()).unwrap_or_else(|| "?".to_owned()),
    };
    let modified = node
        .modified_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_owned());
    let suffix = if node.is_folder() { "/" } else { "" };
    format!("{:<6} {:>12} {:<16} {path}{suffix}", node.kind.to_string(), size, modified)
}
