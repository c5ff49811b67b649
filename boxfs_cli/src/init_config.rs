use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use boxfs_store_box::{DEFAULT_API_URL, DEFAULT_UPLOAD_URL};
use clap::Subcommand;
use toml_edit::{DocumentMut, Item, Table, value};
use tracing::info;

#[derive(Subcommand)]
pub enum CmdConfig {
    /// Creates the profile's config file if it doesn't exist and fills in
    /// every missing setting with a placeholder or default
    Init,
    /// Prints the path of the profile's config file
    Path,
}

impl CmdConfig {
    pub fn run(self, config_file: PathBuf) -> Result<()> {
        match self {
            Self::Path => {
                println!("{}", config_file.display());
                Ok(())
            }
            Self::Init => {
                let existing = if config_file.exists() {
                    fs::read_to_string(&config_file)?
                } else {
                    if let Some(parent) = config_file.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    String::new()
                };
                let key_file = config_file.with_extension("pem");
                let key_file = key_file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .context("config file name is not valid UTF-8")?;
                let doc = init_document(&existing, key_file)?;

                info!("writing to config file {config_file:?}");
                write_atomically(&config_file, &doc.to_string())
            }
        }
    }
}

/// Adds every setting `existing` lacks; values already present are kept.
pub fn init_document(existing: &str, key_file: &str) -> Result<DocumentMut> {
    let mut doc = existing
        .parse::<DocumentMut>()
        .context("could not parse config file")?;

    let auth = table_mut(&mut doc, "auth")?;
    for key in ["client_id", "client_secret", "subject_id", "key_id"] {
        auth.entry(key).or_insert(value(""));
    }
    auth.entry("subject_type").or_insert(value("enterprise"));
    if !auth.contains_key("private_key") {
        auth.entry("private_key_file").or_insert(value(key_file));
    }

    let api = table_mut(&mut doc, "api")?;
    api.entry("api_url").or_insert(value(DEFAULT_API_URL));
    api.entry("upload_url").or_insert(value(DEFAULT_UPLOAD_URL));

    let fs = table_mut(&mut doc, "fs")?;
    fs.entry("root_folder_id").or_insert(value("0"));
    fs.entry("collision_strategy").or_insert(value("rename"));

    Ok(doc)
}

fn table_mut<'a>(doc: &'a mut DocumentMut, key: &str) -> Result<&'a mut Table> {
    doc.entry(key)
        .or_insert(Item::Table(Table::new()))
        .as_table_mut()
        .with_context(|| format!("'{key}' in config file is not a table"))
}

fn write_atomically(path: &Path, content: &str) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    let mut tmp = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;
    tmp.write_all(content.as_bytes())?;
    tmp.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
