//! Database bootstrap command (`freelancie init-db`).

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use freelancie::config::AppConfig;
use freelancie::market::db::MarketDb;

pub fn cmd_init_db(config_path: Option<&Path>, db_path: Option<PathBuf>) -> Result<()> {
    let db_path = match db_path {
        Some(path) => path,
        None => AppConfig::resolve(config_path)?.database.path,
    };

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    MarketDb::new(&db_path)?;
    println!("Database initialized at {}", db_path.display());
    Ok(())
}
