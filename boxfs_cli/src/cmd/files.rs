use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use boxfs_core::{CollisionStrategy, ResolvedPath};
use boxfs_fs::{BoxFs, WriteOptions};
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::info;

pub async fn run_stat(fs: &BoxFs, path: &str) -> Result<()> {
    let node = fs.metadata(path).await?;
    println!("kind:     {}", node.kind);
    println!("id:       {}", node.id);
    println!("name:     {}", node.name);
    if let Some(parent) = &node.parent_id {
        println!("parent:   {parent}");
    }
    if let Some(size) = node.size {
        println!("size:     {size}");
    }
    if let Some(modified) = node.modified_at {
        println!("modified: {}", modified.to_rfc3339());
    }
    if let Some(mime) = &node.mime_type {
        println!("mime:     {mime}");
    }
    if let Some(link) = &node.shared_link {
        println!("shared:   {link}");
    }
    Ok(())
}

pub async fn run_cat(fs: &BoxFs, path: &str) -> Result<()> {
    let mut stream = fs.read_stream(path).await?;
    let mut stdout = tokio::io::stdout();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("download interrupted")?;
        stdout.write_all(&chunk).await?;
    }
    stdout.flush().await?;
    Ok(())
}

pub async fn run_get(fs: &BoxFs, path: &str, out: Option<PathBuf>) -> Result<()> {
    let out = match out {
        Some(out) => out,
        None => {
            let target = ResolvedPath::split(path).context("the root folder is not a file")?;
            PathBuf::from(target.base_name)
        }
    };
    let mut stream = fs.read_stream(path).await?;
    let mut file = tokio::fs::File::create(&out)
        .await
        .with_context(|| format!("failed to create {}", out.display()))?;
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("download interrupted")?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.sync_all().await?;
    println!("downloaded {written} bytes to {}", out.display());
    Ok(())
}

pub async fn run_put(
    fs: &BoxFs,
    local: &Path,
    remote: &str,
    collision: Option<CollisionStrategy>,
) -> Result<()> {
    let bytes = tokio::fs::read(local)
        .await
        .with_context(|| format!("failed to read {}", local.display()))?;
    let len = bytes.len();
    let options = WriteOptions { collision };
    let node = fs.write(remote, Bytes::from(bytes), options).await?;
    info!(id = %node.id, name = %node.name, "upload finished");
    println!("uploaded {len} bytes as '{}' (id {})", node.name, node.id);
    Ok(())
}

pub async fn run_mkdir(fs: &BoxFs, path: &str) -> Result<()> {
    let id = fs.create_directory(path).await?;
    println!("{id}");
    Ok(())
}

pub async fn run_rm(fs: &BoxFs, path: &str, dir: bool) -> Result<()> {
    if dir {
        fs.delete_directory(path).await?;
    } else {
        fs.delete(path).await?;
    }
    println!("deleted {path}");
    Ok(())
}

pub async fn run_mv(fs: &BoxFs, from: &str, to: &str) -> Result<()> {
    let node = fs.move_file(from, to).await?;
    println!("moved {from} -> {to} (id {})", node.id);
    Ok(())
}

pub async fn run_cp(fs: &BoxFs, from: &str, to: &str) -> Result<()> {
    let node = fs.copy_file(from, to).await?;
    println!("copied {from} -> {to} (id {})", node.id);
    Ok(())
}
