use anyhow::Result;
use boxfs_fs::BoxFs;

pub async fn run_tree(fs: &BoxFs, path: &str) -> Result<()> {
    boxfs_fs::debug::print_tree(fs, path).await?;
    Ok(())
}
