//! Local database commands (`boardroom init-db`, `boardroom pictures`).

use std::path::Path;

use anyhow::{Context, Result, bail};
use boardroom::config::BoardroomConfig;
use boardroom::store::{BoardDb, DbHandle};

use super::super::PicturesCommands;

fn open_local(path: &Path) -> Result<BoardDb> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
    }
    BoardDb::new(path).with_context(|| format!("Failed to open database at {}", path.display()))
}

pub fn cmd_init_db(config: &BoardroomConfig, db_path: Option<&Path>) -> Result<()> {
    let path = db_path.unwrap_or(&config.storage.db_path);
    open_local(path)?;
    println!("Database initialized at {}", path.display());
    Ok(())
}

pub async fn cmd_pictures(config: &BoardroomConfig, command: PicturesCommands) -> Result<()> {
    let db = DbHandle::new(open_local(&config.storage.db_path)?);

    match command {
        PicturesCommands::Add { url } => {
            let url = url.trim().to_string();
            if url.is_empty() {
                bail!("Picture URL must not be empty");
            }
            let picture = db.call(move |db| db.insert_picture(&url)).await?;
            tracing::info!(picture_id = %picture.id, "Picture added");
            println!("Added picture {}: {}", picture.id, picture.url);
        }
        PicturesCommands::List => {
            let pictures = db.call(|db| db.list_pictures()).await?;
            if pictures.is_empty() {
                println!("No pictures found.");
            }
            for picture in pictures {
                println!("{}  {}", picture.id, picture.url);
            }
        }
    }
    Ok(())
}
