//! Execution layer for declxc.
//!
//! This crate talks to the outside world: it spawns lifecycle and guest
//! commands (`CommandExecutor`), queries the container registry
//! (`Registry`), patches each container's LXC configuration with a managed
//! network block (`netconf`), and provisions packages, users, sudo grants
//! and SSH keys inside a container's rootfs (`GuestProvisioner`).

pub mod exec;
pub mod guest;
pub mod layout;
pub mod mock;
pub mod netconf;
pub mod packages;
pub mod prereq;
pub mod registry;
pub mod report;

pub use exec::{CommandExecutor, CommandLine, SystemExecutor};
pub use guest::GuestProvisioner;
pub use layout::{ContainerLayout, DEFAULT_LXC_PATH};
pub use netconf::{apply_network_config, NetworkStrategy};
pub use prereq::{check_prereqs, format_missing, running_as_root, MissingPrereq};
pub use registry::{LxcRegistry, Registry};
pub use report::{StepKind, StepReport, StepStatus};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{command}' failed with {status}")]
    CommandFailed { command: String, status: String },
    #[error("failed to list containers: {0}")]
    RegistryUnavailable(String),
    #[error("container rootfs does not exist: {}", .0.display())]
    RootfsMissing(PathBuf),
    #[error("container config does not exist: {}", .0.display())]
    ConfigMissing(PathBuf),
    #[error("no supported package manager found in {}", .0.display())]
    NoPackageManager(PathBuf),
    #[error("failed to {action}: {source}")]
    Step {
        action: &'static str,
        #[source]
        source: Box<RuntimeError>,
    },
}

impl RuntimeError {
    /// Wrap this error with the name of the action that was attempted.
    #[must_use]
    pub fn context(self, action: &'static str) -> Self {
        Self::Step {
            action,
            source: Box::new(self),
        }
    }
}
