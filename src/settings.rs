//! Where bills live and who is issuing them.

use std::fs;
use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;

pub const DEFAULT_DATA_ROOT: &str = "~/Documents/GST Bills";

const DEFAULT_BUSINESS_TEMPLATE: &str = include_str!("../business.toml");

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppSettings {
    pub data_root: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            data_root: DEFAULT_DATA_ROOT.to_string(),
        }
    }
}

impl AppSettings {
    /// `data_root` with a leading `~` expanded.
    pub fn root(&self) -> PathBuf {
        PathBuf::from(expand_home_dir(&self.data_root))
    }
}

/// Seller header printed on every bill.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BusinessProfile {
    pub name: String,
    #[serde(default)]
    pub tagline: String,
    pub address: String,
    pub gstin: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub state_code: String,
}

pub fn get_config_path() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("com", "gst-bill", "app") {
        let config_dir = proj_dirs.config_dir();
        if !config_dir.exists() {
            fs::create_dir_all(config_dir).ok();
        }
        return config_dir.join("settings.toml");
    }
    PathBuf::from("settings.toml")
}

/// `Ok(None)` when no settings were saved yet.
pub fn load_settings(path: &Path) -> Result<Option<AppSettings>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(toml::from_str(&content)?))
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(settings)?;
    fs::write(path, toml_str)?;
    info!(path = %path.display(), "settings saved");
    Ok(())
}

/// Reads `business.toml` from the data root, writing the bundled default
/// the first time.
pub fn load_business_profile(root: &Path) -> Result<BusinessProfile> {
    let path = root.join("business.toml");
    if path.exists() {
        let content = fs::read_to_string(&path)?;
        return Ok(toml::from_str(&content)?);
    }
    debug!(path = %path.display(), "writing default business profile");
    fs::create_dir_all(root)?;
    fs::write(&path, DEFAULT_BUSINESS_TEMPLATE)?;
    Ok(toml::from_str(DEFAULT_BUSINESS_TEMPLATE)?)
}

pub fn expand_home_dir(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(base_dirs) = BaseDirs::new() {
            let home = base_dirs.home_dir().to_string_lossy();
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}
