//! Lifecycle controller for declxc.
//!
//! This crate ties together declaration parsing and the runtime layer into
//! the `Engine`: it creates, starts, stops and destroys the declared
//! containers, and on creation converges network, package and user
//! configuration whether or not the container already existed.

pub mod config;
pub mod engine;
pub mod outcome;

pub use config::{default_config_path, EngineConfig};
pub use engine::Engine;
pub use outcome::{ContainerOutcome, Operation};

use declxc_schema::ContainerSpec;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("container {0} does not exist")]
    NotFound(String),
    #[error("failed to {action}: {source}")]
    Step {
        action: &'static str,
        #[source]
        source: declxc_runtime::RuntimeError,
    },
    #[error("config error: {0}")]
    Config(String),
    #[error("declaration error: {0}")]
    Declaration(#[from] declxc_schema::DeclarationError),
}

/// Load and validate the container declarations in `path`.
pub fn load_specs(path: &Path) -> Result<Vec<ContainerSpec>, CoreError> {
    Ok(declxc_schema::load_declaration(path)?)
}
