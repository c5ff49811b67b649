use anyhow::Result;
use boxfs_core::{NodeKind, SearchQuery, SharedLinkAccess, SharedLinkOptions};
use boxfs_fs::BoxFs;

use crate::helpers::format_entry;
use crate::{AccessArg, KindArg};

pub async fn run_search(fs: &BoxFs, query: String, kind: Option<KindArg>, limit: u32) -> Result<()> {
    let mut search = SearchQuery::new(query);
    search.limit = limit;
    if let Some(kind) = kind {
        search = search.kind(match kind {
            KindArg::File => NodeKind::File,
            KindArg::Folder => NodeKind::Folder,
        });
    }
    let hits = fs.search(&search).await?;
    if hits.is_empty() {
        println!("no matches for '{}'", search.query);
    }
    for node in &hits {
        println!("{}  id={}", format_entry(&node.name, node), node.id);
    }
    Ok(())
}

pub async fn run_share(fs: &BoxFs, path: &str, access: AccessArg) -> Result<()> {
    let options = SharedLinkOptions {
        access: match access {
            AccessArg::Open => SharedLinkAccess::Open,
            AccessArg::Company => SharedLinkAccess::Company,
            AccessArg::Collaborators => SharedLinkAccess::Collaborators,
        },
        ..Default::default()
    };
    let url = fs.share_link(path, &options).await?;
    println!("{url}");
    Ok(())
}
