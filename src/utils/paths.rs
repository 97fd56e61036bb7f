//! Cross-Platform Path Utilities
//!
//! Functions for resolving the SiteWatch state directory (~/.sitewatch/).

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the SiteWatch directory (~/.sitewatch/)
pub fn sitewatch_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".sitewatch"))
}

/// Get the config file path (~/.sitewatch/config.json)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(sitewatch_dir()?.join("config.json"))
}

/// Get the database file path (~/.sitewatch/data.db)
pub fn database_path() -> AppResult<PathBuf> {
    Ok(sitewatch_dir()?.join("data.db"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
