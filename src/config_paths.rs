use std::path::{Path, PathBuf};

use crate::error::{ManagerError, Result};

pub fn home_dir() -> Result<PathBuf> {
    let home = if cfg!(target_os = "windows") {
        std::env::var("USERPROFILE")
            .or_else(|_| std::env::var("HOME"))
            .map_err(|_| ManagerError::InvalidInput("Unable to resolve USERPROFILE/HOME".into()))?
    } else {
        std::env::var("HOME")
            .map_err(|_| ManagerError::InvalidInput("Unable to resolve HOME".into()))?
    };
    Ok(PathBuf::from(home))
}

pub fn s3manager_config_dir() -> Result<PathBuf> {
    let mut path = home_dir()?;
    if cfg!(target_os = "macos") {
        path.push("Library");
        path.push("Application Support");
        path.push("s3manager");
    } else {
        path.push(".config");
        path.push("s3manager");
    }
    Ok(path)
}

pub fn settings_path() -> Result<PathBuf> {
    Ok(s3manager_config_dir()?.join("settings.json"))
}

pub fn first_run_marker_path() -> Result<PathBuf> {
    Ok(s3manager_config_dir()?.join("first_run"))
}

pub fn aws_credentials_path() -> Result<PathBuf> {
    Ok(home_dir()?.join(".aws").join("credentials"))
}

pub fn downloads_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join("Downloads"))
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| ManagerError::local_io(parent, err))?;
    }
    Ok(())
}

pub fn expand_user_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Marker semantics: onboarding is due when the marker is missing or no
/// credentials could be loaded. Showing it creates the marker.
pub fn onboarding_due(marker: &Path, has_credentials: bool) -> bool {
    !marker.exists() || !has_credentials
}

pub fn touch_marker(marker: &Path) -> Result<()> {
    ensure_parent_dir(marker)?;
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(marker)
        .map_err(|err| ManagerError::local_io(marker, err))?;
    Ok(())
}
