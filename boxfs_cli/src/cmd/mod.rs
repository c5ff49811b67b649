use std::path::PathBuf;

use anyhow::Result;

use crate::Commands;
use crate::config::CliConfig;
use crate::helpers::{cancel_on_ctrl_c, open_fs};

mod files;
mod list;
mod share;
mod tree;

pub use files::{run_cat, run_cp, run_get, run_mkdir, run_mv, run_put, run_rm, run_stat};
pub use list::run_ls;
pub use share::{run_search, run_share};
pub use tree::run_tree;

pub async fn run_command(config_file: PathBuf, cmd: Commands) -> Result<()> {
    if let Commands::Config { cmd } = cmd {
        return cmd.run(config_file);
    }

    let config = CliConfig::load(&config_file)?;
    let fs = open_fs(config, &config_file)?;
    cancel_on_ctrl_c(&fs);

    match cmd {
        Commands::Ls { path, deep } => run_ls(&fs, &path, deep).await,
        Commands::Tree { path } => run_tree(&fs, &path).await,
        Commands::Stat { path } => run_stat(&fs, &path).await,
        Commands::Cat { path } => run_cat(&fs, &path).await,
        Commands::Get { path, out } => run_get(&fs, &path, out).await,
        Commands::Put {
            local,
            remote,
            collision,
        } => run_put(&fs, &local, &remote, collision).await,
        Commands::Mkdir { path } => run_mkdir(&fs, &path).await,
        Commands::Rm { path, dir } => run_rm(&fs, &path, dir).await,
        Commands::Mv { from, to } => run_mv(&fs, &from, &to).await,
        Commands::Cp { from, to } => run_cp(&fs, &from, &to).await,
        Commands::Search { query, kind, limit } => run_search(&fs, query, kind, limit).await,
        Commands::Share { path, access } => run_share(&fs, &path, access).await,
        Commands::Config { .. } => unreachable!("handled above"),
    }
}
