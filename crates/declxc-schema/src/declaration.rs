use crate::types::{ContainerName, Username};
use crate::validate::validate_containers;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeclarationError {
    #[error("declaration file {0} does not exist")]
    NotFound(PathBuf),
    #[error("failed to read declaration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse declaration: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("no container definitions found")]
    NoContainers,
    #[error("container {field} is required (container #{index})")]
    MissingContainerField { index: usize, field: &'static str },
    #[error("invalid container name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
    #[error("duplicate container name: {0}")]
    DuplicateContainer(String),
    #[error("network {field} is required for network {index} in container {container}")]
    MissingNetworkField {
        container: String,
        index: usize,
        field: &'static str,
    },
    #[error(
        "invalid IPv4 address format for network {index} in container {container}: '{value}', should include CIDR notation (e.g. 192.168.2.10/24)"
    )]
    InvalidAddress {
        container: String,
        index: usize,
        value: String,
    },
    #[error("invalid IPv4 gateway for network {index} in container {container}: '{value}'")]
    InvalidGateway {
        container: String,
        index: usize,
        value: String,
    },
    #[error("empty package name at position {index} in container {container}")]
    EmptyPackage { container: String, index: usize },
    #[error("user {field} is required for user {index} in container {container}")]
    MissingUserField {
        container: String,
        index: usize,
        field: &'static str,
    },
    #[error("invalid username '{username}' in container {container}: {reason}")]
    InvalidUsername {
        container: String,
        username: String,
        reason: String,
    },
    #[error("password for user {username} in container {container} must be a single line")]
    InvalidPassword { container: String, username: String },
    #[error("duplicate user {username} in container {container}")]
    DuplicateUser { container: String, username: String },
    #[error("shell for user {username} in container {container} must be an absolute path, got '{shell}'")]
    RelativeShell {
        container: String,
        username: String,
        shell: String,
    },
}

/// Top-level document of a declaration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Declaration {
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ContainerSpec {
    #[serde(default)]
    pub name: ContainerName,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<NetworkSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<UserSpec>,
}

impl ContainerSpec {
    pub fn new(
        name: impl Into<ContainerName>,
        template: &str,
        release: &str,
        arch: &str,
    ) -> Self {
        Self {
            name: name.into(),
            template: template.to_owned(),
            release: release.to_owned(),
            arch: arch.to_owned(),
            ..Self::default()
        }
    }
}

/// One network interface. Its position in `ContainerSpec::networks` is the
/// interface index in the rendered configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NetworkSpec {
    #[serde(rename = "type", default)]
    pub link_type: String,
    #[serde(default)]
    pub interface: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_gateway: Option<String>,
}

impl NetworkSpec {
    pub fn new(link_type: &str, interface: &str) -> Self {
        Self {
            link_type: link_type.to_owned(),
            interface: interface.to_owned(),
            ipv4_address: None,
            ipv4_gateway: None,
        }
    }
}

#[derive(Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct UserSpec {
    #[serde(default)]
    pub username: Username,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    #[serde(default)]
    pub sudo: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh_key_files: Vec<PathBuf>,
}

impl UserSpec {
    pub fn new(username: impl Into<Username>, password: &str) -> Self {
        Self {
            username: username.into(),
            password: password.to_owned(),
            ..Self::default()
        }
    }

    /// The declared login shell, or `default` when none was declared.
    pub fn shell_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.shell.as_deref().filter(|s| !s.is_empty()).unwrap_or(default)
    }
}

impl fmt::Debug for UserSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSpec")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("shell", &self.shell)
            .field("sudo", &self.sudo)
            .field("ssh_key_files", &self.ssh_key_files)
            .finish()
    }
}

pub fn parse_declaration_str(input: &str) -> Result<Declaration, DeclarationError> {
    Ok(serde_yaml::from_str(input)?)
}

/// Load, validate and resolve a declaration file.
///
/// Relative SSH key paths are resolved against the directory holding the
/// declaration file, so the returned specs carry absolute key paths.
pub fn load_declaration(path: &Path) -> Result<Vec<ContainerSpec>, DeclarationError> {
    if !path.exists() {
        return Err(DeclarationError::NotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;
    let declaration = parse_declaration_str(&content)?;
    validate_containers(&declaration.containers)?;

    let absolute = std::path::absolute(path)?;
    let base_dir = absolute.parent().unwrap_or(Path::new("/"));
    let mut containers = declaration.containers;
    resolve_key_paths(&mut containers, base_dir);
    Ok(containers)
}

pub fn resolve_key_paths(containers: &mut [ContainerSpec], base_dir: &Path) {
    for key in containers
        .iter_mut()
        .flat_map(|c| c.users.iter_mut())
        .flat_map(|u| u.ssh_key_files.iter_mut())
    {
        if key.is_relative() {
            *key = base_dir.join(&*key);
        }
    }
}
