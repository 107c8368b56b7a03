use crate::exec::CommandExecutor;
use crate::layout::ContainerLayout;
use crate::RuntimeError;
use std::sync::Arc;
use tracing::debug;

/// Answers existence queries against the container manager.
///
/// Implementations must not cache: every call reflects live state.
pub trait Registry: Send + Sync {
    fn list(&self) -> Result<Vec<String>, RuntimeError>;

    fn exists(&self, name: &str) -> Result<bool, RuntimeError> {
        Ok(self.list()?.iter().any(|c| c == name))
    }
}

/// Registry backed by `lxc-ls -1`.
pub struct LxcRegistry {
    executor: Arc<dyn CommandExecutor>,
    layout: ContainerLayout,
}

impl LxcRegistry {
    pub fn new(executor: Arc<dyn CommandExecutor>, layout: ContainerLayout) -> Self {
        Self { executor, layout }
    }
}

impl Registry for LxcRegistry {
    fn list(&self) -> Result<Vec<String>, RuntimeError> {
        let output = self
            .executor
            .capture(&self.layout.list_command())
            .map_err(|e| RuntimeError::RegistryUnavailable(e.to_string()))?;
        let names = parse_container_list(&output);
        debug!("registry lists {} containers", names.len());
        Ok(names)
    }
}

pub fn parse_container_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect()
}
