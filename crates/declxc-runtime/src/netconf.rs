//! Managed network block in a container's LXC configuration.
//!
//! Rendering and merging are pure text functions; [`apply_network_config`]
//! is the only part that touches the filesystem.

use crate::layout::ContainerLayout;
use crate::RuntimeError;
use declxc_schema::NetworkSpec;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::{debug, info};

pub const MANAGED_HEADER: &str = "# Network configuration added by declxc";
const INCLUDE_COMMENT: &str = "# Network configuration include";
const NETWORK_PREFIXES: &[&str] = &["lxc.net.", "lxc.network.", MANAGED_HEADER];
const CONFIG_MODE: u32 = 0o644;

/// How the managed block is attached to the main configuration file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkStrategy {
    /// Write the block to `config-network` and include it once from `config`.
    #[default]
    Include,
    /// Drop existing network directives from `config` and append the block.
    InPlace,
}

/// Render directives for every interface; the list position is the index.
pub fn render_network_block(networks: &[NetworkSpec]) -> String {
    let mut out = String::from(MANAGED_HEADER);
    out.push('\n');
    for (i, net) in networks.iter().enumerate() {
        let _ = write!(
            out,
            "\nlxc.net.{i}.type = {}\nlxc.net.{i}.link = {}\nlxc.net.{i}.flags = up\n",
            net.link_type, net.interface
        );
        if let Some(address) = net.ipv4_address.as_deref() {
            let _ = writeln!(out, "lxc.net.{i}.ipv4.address = {address}");
        }
        if let Some(gateway) = net.ipv4_gateway.as_deref() {
            let _ = writeln!(out, "lxc.net.{i}.ipv4.gateway = {gateway}");
        }
    }
    out
}

pub fn include_directive(side_file: &Path) -> String {
    format!("lxc.include = {}", side_file.display())
}

/// Append `directive` to `main` unless a line already equals it.
/// Returns `None` when `main` needs no change.
pub fn merge_include(main: &str, directive: &str) -> Option<String> {
    if main.lines().any(|line| line.trim() == directive) {
        return None;
    }
    Some(format!("{main}\n{INCLUDE_COMMENT}\n{directive}\n"))
}

/// Drop every line group that starts with a network directive (or the
/// managed header) up to and including the next blank line, then append
/// `block`.
pub fn replace_network_block(main: &str, block: &str) -> String {
    let mut kept = Vec::new();
    let mut in_block = false;
    for line in main.lines() {
        if in_block {
            if line.trim().is_empty() {
                in_block = false;
            }
            continue;
        }
        let trimmed = line.trim_start();
        if NETWORK_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
            in_block = true;
            continue;
        }
        kept.push(line);
    }

    let head = kept.join("\n");
    let head = head.trim_end();
    if head.is_empty() {
        block.to_owned()
    } else {
        format!("{head}\n\n{block}")
    }
}

fn write_config(path: &Path, content: &str) -> Result<(), RuntimeError> {
    fs::write(path, content)?;
    fs::set_permissions(path, fs::Permissions::from_mode(CONFIG_MODE))?;
    Ok(())
}

/// Converge the network configuration of container `name` on `networks`.
///
/// The main configuration file must already exist.
pub fn apply_network_config(
    layout: &ContainerLayout,
    name: &str,
    networks: &[NetworkSpec],
    strategy: NetworkStrategy,
) -> Result<(), RuntimeError> {
    let config_path = layout.config_file(name);
    let main = match fs::read_to_string(&config_path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(RuntimeError::ConfigMissing(config_path));
        }
        Err(e) => return Err(e.into()),
    };

    let block = render_network_block(networks);
    match strategy {
        NetworkStrategy::Include => {
            let side_file = layout.network_file(name);
            write_config(&side_file, &block)?;
            match merge_include(&main, &include_directive(&side_file)) {
                Some(updated) => write_config(&config_path, &updated)?,
                None => debug!("{} already includes network config", config_path.display()),
            }
        }
        NetworkStrategy::InPlace => {
            let updated = replace_network_block(&main, &block);
            if updated != main {
                write_config(&config_path, &updated)?;
            }
        }
    }

    info!(
        "configured {} network interface(s) for {name}",
        networks.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn veth(link: &str, address: Option<&str>, gateway: Option<&str>) -> NetworkSpec {
        NetworkSpec {
            link_type: "veth".to_owned(),
            interface: link.to_owned(),
            ipv4_address: address.map(str::to_owned),
            ipv4_gateway: gateway.map(str::to_owned),
        }
    }

    const BASE_CONFIG: &str = "\
lxc.include = /usr/share/lxc/config/common.conf
lxc.arch = linux64

# Container specific configuration
lxc.rootfs.path = dir:/var/lib/lxc/web1/rootfs
lxc.uts.name = web1

# Network configuration
lxc.net.0.type = veth
lxc.net.0.link = lxcbr0
lxc.net.0.flags = up
lxc.net.0.hwaddr = 00:16:3e:aa:bb:cc
";

    #[test]
    fn renders_address_without_gateway() {
        let block = render_network_block(&[veth("lxcbr0", Some("192.168.2.10/24"), None)]);
        assert!(block.contains("lxc.net.0.type = veth\n"));
        assert!(block.contains("lxc.net.0.link = lxcbr0\n"));
        assert!(block.contains("lxc.net.0.flags = up\n"));
        assert!(block.contains("lxc.net.0.ipv4.address = 192.168.2.10/24\n"));
        assert!(!block.contains("gateway"));
    }

    #[test]
    fn renders_indices_in_declaration_order() {
        let block = render_network_block(&[
            veth("lxcbr0", None, None),
            veth("br-lan", Some("10.0.0.5/8"), Some("10.0.0.1")),
            veth("br-dmz", None, None),
        ]);
        let pos = |needle: &str| block.find(needle).unwrap();
        assert!(pos("lxc.net.0.link = lxcbr0") < pos("lxc.net.1.link = br-lan"));
        assert!(pos("lxc.net.1.link = br-lan") < pos("lxc.net.2.link = br-dmz"));
        assert!(block.contains("lxc.net.1.ipv4.gateway = 10.0.0.1"));
        assert!(!block.contains("lxc.net.0.ipv4"));
        assert!(!block.contains("lxc.net.2.ipv4"));
        assert!(!block.contains("lxc.net.3."));
        assert_eq!(block.matches(".flags = up").count(), 3);
    }

    #[test]
    fn merge_include_is_idempotent() {
        let directive = "lxc.include = /var/lib/lxc/web1/config-network";
        let once = merge_include(BASE_CONFIG, directive).unwrap();
        assert!(once.starts_with(BASE_CONFIG));
        assert!(once.ends_with(&format!("{directive}\n")));
        assert!(merge_include(&once, directive).is_none());
        assert_eq!(once.matches(directive).count(), 1);
    }

    #[test]
    fn merge_include_ignores_prefix_matches() {
        let main = "lxc.include = /var/lib/lxc/web1/config-network2\n";
        let directive = "lxc.include = /var/lib/lxc/web1/config-network";
        assert!(merge_include(main, directive).is_some());
    }

    #[test]
    fn replace_drops_old_network_group() {
        let block = render_network_block(&[veth("br-lan", None, None)]);
        let updated = replace_network_block(BASE_CONFIG, &block);
        assert!(!updated.contains("hwaddr"));
        assert!(!updated.contains("lxcbr0"));
        assert!(updated.contains("lxc.uts.name = web1"));
        assert!(updated.contains("# Network configuration\n"));
        assert!(updated.ends_with("lxc.net.0.flags = up\n"));
    }

    #[test]
    fn replace_is_idempotent_with_many_interfaces() {
        let block = render_network_block(&[
            veth("lxcbr0", Some("192.168.2.10/24"), Some("192.168.2.1")),
            veth("br-lan", None, None),
        ]);
        let once = replace_network_block(BASE_CONFIG, &block);
        let twice = replace_network_block(&once, &block);
        assert_eq!(once, twice);
        assert_eq!(twice.matches(MANAGED_HEADER).count(), 1);
        assert_eq!(twice.matches("lxc.net.0.type").count(), 1);
        assert_eq!(twice.matches("lxc.net.1.type").count(), 1);
    }

    #[test]
    fn replace_on_config_without_network() {
        let block = render_network_block(&[veth("lxcbr0", None, None)]);
        let updated = replace_network_block("lxc.arch = linux64\n", &block);
        assert_eq!(updated, format!("lxc.arch = linux64\n\n{block}"));
    }

    fn container_with_config(content: &str) -> (tempfile::TempDir, ContainerLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = ContainerLayout::new(dir.path());
        fs::create_dir_all(layout.container_dir("web1")).unwrap();
        fs::write(layout.config_file("web1"), content).unwrap();
        (dir, layout)
    }

    #[test]
    fn include_strategy_writes_side_file_and_single_include() {
        let (_dir, layout) = container_with_config(BASE_CONFIG);
        let nets = [veth("lxcbr0", Some("192.168.2.10/24"), None)];

        apply_network_config(&layout, "web1", &nets, NetworkStrategy::Include).unwrap();
        apply_network_config(&layout, "web1", &nets, NetworkStrategy::Include).unwrap();

        let side = fs::read_to_string(layout.network_file("web1")).unwrap();
        assert_eq!(side, render_network_block(&nets));

        let main = fs::read_to_string(layout.config_file("web1")).unwrap();
        let directive = include_directive(&layout.network_file("web1"));
        assert_eq!(main.matches(&directive).count(), 1);

        let mode = fs::metadata(layout.config_file("web1"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn include_strategy_rewrites_side_file_on_change() {
        let (_dir, layout) = container_with_config(BASE_CONFIG);
        apply_network_config(
            &layout,
            "web1",
            &[veth("lxcbr0", None, None)],
            NetworkStrategy::Include,
        )
        .unwrap();
        apply_network_config(
            &layout,
            "web1",
            &[veth("br-lan", None, None)],
            NetworkStrategy::Include,
        )
        .unwrap();

        let side = fs::read_to_string(layout.network_file("web1")).unwrap();
        assert!(side.contains("lxc.net.0.link = br-lan"));
        assert!(!side.contains("lxcbr0"));
    }

    #[test]
    fn in_place_strategy_converges() {
        let (_dir, layout) = container_with_config(BASE_CONFIG);
        let nets = [veth("lxcbr0", Some("192.168.2.10/24"), None)];

        apply_network_config(&layout, "web1", &nets, NetworkStrategy::InPlace).unwrap();
        let first = fs::read_to_string(layout.config_file("web1")).unwrap();
        apply_network_config(&layout, "web1", &nets, NetworkStrategy::InPlace).unwrap();
        let second = fs::read_to_string(layout.config_file("web1")).unwrap();

        assert_eq!(first, second);
        assert!(!layout.network_file("web1").exists());
        assert_eq!(second.matches("lxc.net.0.type").count(), 1);
    }

    #[test]
    fn missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ContainerLayout::new(dir.path());
        let err = apply_network_config(
            &layout,
            "ghost",
            &[veth("lxcbr0", None, None)],
            NetworkStrategy::Include,
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::ConfigMissing(_)));
    }

    #[test]
    fn strategy_deserializes_kebab_case() {
        let s: NetworkStrategy = serde_json::from_str("\"in-place\"").unwrap();
        assert_eq!(s, NetworkStrategy::InPlace);
        assert_eq!(NetworkStrategy::default(), NetworkStrategy::Include);
    }
}
