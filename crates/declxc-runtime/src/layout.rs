use crate::exec::CommandLine;
use declxc_schema::ContainerSpec;
use std::path::{Path, PathBuf};

pub const DEFAULT_LXC_PATH: &str = "/var/lib/lxc";

/// On-disk layout of containers under an LXC path, and the lifecycle
/// command lines that operate on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLayout {
    lxc_path: PathBuf,
}

impl Default for ContainerLayout {
    fn default() -> Self {
        Self::new(DEFAULT_LXC_PATH)
    }
}

impl ContainerLayout {
    pub fn new(lxc_path: impl Into<PathBuf>) -> Self {
        Self {
            lxc_path: lxc_path.into(),
        }
    }

    pub fn lxc_path(&self) -> &Path {
        &self.lxc_path
    }

    pub fn container_dir(&self, name: &str) -> PathBuf {
        self.lxc_path.join(name)
    }

    pub fn config_file(&self, name: &str) -> PathBuf {
        self.container_dir(name).join("config")
    }

    /// Side file holding the managed network block.
    pub fn network_file(&self, name: &str) -> PathBuf {
        self.container_dir(name).join("config-network")
    }

    pub fn rootfs(&self, name: &str) -> PathBuf {
        self.container_dir(name).join("rootfs")
    }

    fn lxc_command(&self, program: &str, name: &str) -> CommandLine {
        CommandLine::new(program)
            .args(["-n", name, "-P"])
            .arg(self.lxc_path.to_string_lossy())
    }

    pub fn list_command(&self) -> CommandLine {
        CommandLine::new("lxc-ls")
            .arg("-P")
            .arg(self.lxc_path.to_string_lossy())
            .arg("-1")
    }

    pub fn create_command(&self, spec: &ContainerSpec) -> CommandLine {
        self.lxc_command("lxc-create", &spec.name)
            .args(["-t", spec.template.as_str(), "--"])
            .args(["-r", spec.release.as_str(), "-a", spec.arch.as_str()])
    }

    pub fn start_command(&self, name: &str) -> CommandLine {
        self.lxc_command("lxc-start", name)
    }

    pub fn stop_command(&self, name: &str) -> CommandLine {
        self.lxc_command("lxc-stop", name)
    }

    pub fn destroy_command(&self, name: &str) -> CommandLine {
        self.lxc_command("lxc-destroy", name).arg("-f")
    }
}
