use crate::{AppConfig, DeepCompareError};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "deepcompare.toml";

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: PathBuf,
    pub exists: bool,
    pub portable: bool,
}

pub fn load_config(prefer_portable: bool) -> Result<LoadedConfig, DeepCompareError> {
    let (path, portable) = resolve_config_path(prefer_portable)?;
    let mut loaded = load_config_from(&path)?;
    loaded.portable = portable;
    loaded.config.portable_mode = portable;
    Ok(loaded)
}

/// Read a config file at an explicit location, falling back to defaults when absent
pub fn load_config_from(path: &Path) -> Result<LoadedConfig, DeepCompareError> {
    let exists = path.exists();

    let config = if exists {
        let data = fs::read_to_string(path)?;
        toml::from_str(&data)
            .map_err(|e| DeepCompareError::Config(format!("{}: {}", path.display(), e)))?
    } else {
        AppConfig::default()
    };

    Ok(LoadedConfig {
        config,
        path: path.to_path_buf(),
        exists,
        portable: false,
    })
}

/// Read a config file the user named explicitly. Unlike the default
/// location, a missing file here is an error.
pub fn load_explicit_config(path: &Path) -> Result<LoadedConfig, DeepCompareError> {
    if !path.is_file() {
        return Err(DeepCompareError::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }
    load_config_from(path)
}

pub fn ensure_config(prefer_portable: bool) -> Result<LoadedConfig, DeepCompareError> {
    let loaded = load_config(prefer_portable)?;
    if !loaded.exists {
        save_config(&loaded.path, &loaded.config)?;
    }
    Ok(loaded)
}

pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), DeepCompareError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let data = toml::to_string_pretty(config)
        .map_err(|e| DeepCompareError::Serialization(e.to_string()))?;
    fs::write(path, data)?;
    Ok(())
}

fn resolve_config_path(prefer_portable: bool) -> Result<(PathBuf, bool), DeepCompareError> {
    if let Some(portable_path) = portable_config_path() {
        if prefer_portable || portable_path.exists() {
            return Ok((portable_path, true));
        }
    }

    let dirs = ProjectDirs::from("", "deepcompare", "deepcompare")
        .ok_or_else(|| DeepCompareError::Config("Unable to determine config directory".to_string()))?;
    Ok((dirs.config_dir().join(CONFIG_FILE_NAME), false))
}

fn portable_config_path() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.join(CONFIG_FILE_NAME)))
}
