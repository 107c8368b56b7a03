use crate::CoreError;
use declxc_runtime::guest::{DEFAULT_CHROOT, DEFAULT_SHELL};
use declxc_runtime::{ContainerLayout, NetworkStrategy, DEFAULT_LXC_PATH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Engine settings, read from an optional TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub lxc_path: PathBuf,
    pub chroot: String,
    pub default_shell: String,
    pub network_strategy: NetworkStrategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lxc_path: PathBuf::from(DEFAULT_LXC_PATH),
            chroot: DEFAULT_CHROOT.to_owned(),
            default_shell: DEFAULT_SHELL.to_owned(),
            network_strategy: NetworkStrategy::default(),
        }
    }
}

impl EngineConfig {
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        toml::from_str(input).map_err(|e| CoreError::Config(format!("invalid config: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Load `~/.config/declxc/config.toml` if it exists, defaults otherwise.
    pub fn load_default() -> Result<Self, CoreError> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    #[must_use]
    pub fn with_lxc_path(mut self, lxc_path: impl Into<PathBuf>) -> Self {
        self.lxc_path = lxc_path.into();
        self
    }

    pub fn layout(&self) -> ContainerLayout {
        ContainerLayout::new(&self.lxc_path)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(xdg).join("declxc/config.toml"));
    }
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config/declxc/config.toml"))
}
