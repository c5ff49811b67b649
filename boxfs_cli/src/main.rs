use crate::init_config::CmdConfig;
use anyhow::Context;
use boxfs_core::CollisionStrategy;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::InfoLevel;
use directories::ProjectDirs;
use std::path::PathBuf;

mod cmd;
mod config;
mod helpers;
mod init_config;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// which configured Box account this command should run against
    #[arg(short, long, value_name = "NAME", default_value = "default")]
    profile: String,

    /// Use this config file instead of the profile's file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<InfoLevel>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Modify the profile's config
    Config {
        #[command(subcommand)]
        cmd: CmdConfig,
    },
    /// List a folder
    Ls {
        /// Folder path; defaults to the configured root
        #[arg(default_value = "")]
        path: String,
        /// Include everything below subfolders, depth first
        #[arg(short, long, action = ArgAction::SetTrue)]
        deep: bool,
    },
    /// Print a tree of a folder for debugging
    Tree {
        #[arg(default_value = "")]
        path: String,
    },
    /// Show metadata of a file or folder
    Stat { path: String },
    /// Write a file's content to stdout
    Cat { path: String },
    /// Download a file
    Get {
        path: String,
        /// Local output file; defaults to the remote base name
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Upload a local file, creating missing parent folders
    Put {
        local: PathBuf,
        remote: String,
        /// rename, overwrite or skip; defaults to the configured strategy
        #[arg(long, value_name = "STRATEGY")]
        collision: Option<CollisionStrategy>,
    },
    /// Create a folder and any missing parents
    Mkdir { path: String },
    /// Delete a file, or with --dir a folder and everything in it
    Rm {
        path: String,
        #[arg(long, action = ArgAction::SetTrue)]
        dir: bool,
    },
    /// Move or rename a file
    Mv { from: String, to: String },
    /// Copy a file
    Cp { from: String, to: String },
    /// Search the account by name
    Search {
        query: String,
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
    /// Create a shared link for a file and print its URL
    Share {
        path: String,
        #[arg(long, value_enum, default_value_t = AccessArg::Open)]
        access: AccessArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    File,
    Folder,
}

#[derive(Clone, Copy, ValueEnum)]
enum AccessArg {
    Open,
    Company,
    Collaborators,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    // Configs live under ~/.config/boxfs/:
    // - Default profile: ~/.config/boxfs/default.toml
    // - Other profiles:  ~/.config/boxfs/profiles/<name>.toml
    let config_file = match cli.config {
        Some(path) => path,
        None => {
            let dirs = ProjectDirs::from("", "", "boxfs")
                .context("failed to determine config directory path")?;
            let config_root = dirs.config_dir();
            if cli.profile == "default" {
                config_root.join("default.toml")
            } else {
                config_root
                    .join("profiles")
                    .join(&cli.profile)
                    .with_extension("toml")
            }
        }
    };

    cmd::run_command(config_file, cli.cmd).await
}
