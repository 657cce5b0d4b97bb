//! User configuration
//!
//! Read from `~/.config/converge/config.toml` unless `--config` or
//! `CONVERGE_CONFIG` points elsewhere. A missing file yields defaults.

use crate::cli::OutputFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default marker for values only known after the remote write
pub const DEFAULT_UNRESOLVED_MARKER: &str = "<computed>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Parallel workers when planning several documents
    pub jobs: usize,
    pub format: OutputFormat,
    /// String that marks a declared value as unresolved
    pub unresolved_marker: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            jobs: 4,
            format: OutputFormat::Text,
            unresolved_marker: DEFAULT_UNRESOLVED_MARKER.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `explicit` or the default location
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => expand(path),
            None => match default_path() {
                Some(path) => path,
                None => {
                    log::debug!("No home directory, using default settings");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            if explicit.is_some() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))?;
        settings.validate()?;

        log::debug!("Loaded config from {}", path.display());
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            anyhow::bail!("jobs must be at least 1");
        }
        if self.unresolved_marker.is_empty() {
            anyhow::bail!("unresolved_marker cannot be empty");
        }
        Ok(())
    }
}

/// `~/.config/converge/config.toml`
pub fn default_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("converge").join("config.toml"))
}

/// Expand a leading `~` in a user-supplied path
pub fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).as_ref())
}

// ============================================================================
// Tests
// ============================================================================
