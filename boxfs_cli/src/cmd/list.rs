use anyhow::Result;
use boxfs_fs::BoxFs;
use futures::StreamExt;

use crate::helpers::format_entry;

pub async fn run_ls(fs: &BoxFs, path: &str, deep: bool) -> Result<()> {
    let mut entries = fs.list_contents(path, deep);
    let mut count = 0usize;
    while let Some(entry) = entries.next().await {
        let entry = entry?;
        println!("{}", format_entry(&entry.path, &entry.node));
        count += 1;
    }
    tracing::debug!(path, count, "listed entries");
    Ok(())
}
