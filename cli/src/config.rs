use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use tracing::info;

use glucopeak_core::PipelineConfig;

pub const LOCAL_CONFIG: &str = "glucopeak.toml";

/// Where the active configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Explicit(PathBuf),
    Local(PathBuf),
    User(PathBuf),
    Defaults,
}

impl ConfigSource {
    pub fn describe(&self) -> String {
        match self {
            ConfigSource::Explicit(p) | ConfigSource::Local(p) | ConfigSource::User(p) => {
                p.display().to_string()
            }
            ConfigSource::Defaults => "built-in defaults".to_string(),
        }
    }
}

/// Per-user config file, e.g. `~/.config/glucopeak/config.toml`.
pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "glucopeak").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Resolve the configuration: `--config`, then `./glucopeak.toml`, then the
/// per-user file, then defaults. An explicit path must exist.
pub fn load(explicit: Option<&Path>) -> Result<(PipelineConfig, ConfigSource)> {
    if let Some(path) = explicit {
        let config = read(path)?;
        return Ok((config, ConfigSource::Explicit(path.to_path_buf())));
    }

    let local = PathBuf::from(LOCAL_CONFIG);
    if local.exists() {
        return Ok((read(&local)?, ConfigSource::Local(local)));
    }

    if let Some(user) = user_config_path().filter(|p| p.exists()) {
        return Ok((read(&user)?, ConfigSource::User(user)));
    }

    Ok((PipelineConfig::default(), ConfigSource::Defaults))
}

fn read(path: &Path) -> Result<PipelineConfig> {
    info!("Loading config from {}", path.display());
    PipelineConfig::load(path)
        .with_context(|| format!("Failed to load config file: {}", path.display()))
}

/// Write the commented default configuration to `path`.
pub fn write_default(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite it.",
            path.display()
        );
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, PipelineConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_config_is_loaded() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("custom.toml");
        std::fs::write(&path, "[matching]\nwindow_minutes = 90\n").unwrap();

        let (config, source) = load(Some(&path)).unwrap();
        assert_eq!(config.matching.window_minutes, 90);
        assert_eq!(source, ConfigSource::Explicit(path));
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = load(Some(&tmp.path().join("nope.toml"))).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to load config file"));
    }

    #[test]
    fn test_write_default_refuses_overwrite() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("glucopeak.toml");

        write_default(&path, false).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[output]"));

        assert!(write_default(&path, false).is_err());
        assert!(write_default(&path, true).is_ok());
    }

    #[test]
    fn test_describe_defaults() {
        assert_eq!(ConfigSource::Defaults.describe(), "built-in defaults");
    }
}
