//! Container declarations for declxc.
//!
//! This crate defines the schema layer: the YAML declaration document
//! (`Declaration`), the per-container model handed to the engine
//! (`ContainerSpec`, `NetworkSpec`, `UserSpec`), structural validation, and
//! resolution of SSH key paths relative to the declaration file.

pub mod declaration;
pub mod types;
pub mod validate;

pub use declaration::{
    load_declaration, parse_declaration_str, resolve_key_paths, ContainerSpec, Declaration,
    DeclarationError, NetworkSpec, UserSpec,
};
pub use types::{ContainerName, Username};
pub use validate::{is_ipv4_cidr, validate_container_name, validate_containers};
