//! Structural validation of container declarations.
//!
//! Names double as path components on the host (`<lxc_path>/<name>`) and in
//! the guest (`/home/<user>`, `/etc/sudoers.d/<user>`), so both are
//! restricted to characters that cannot escape their directory.

use crate::declaration::{ContainerSpec, DeclarationError, NetworkSpec, UserSpec};
use std::collections::HashSet;
use std::net::Ipv4Addr;

const MAX_NAME_LEN: usize = 64;
const MAX_USERNAME_LEN: usize = 32;

pub fn validate_containers(containers: &[ContainerSpec]) -> Result<(), DeclarationError> {
    if containers.is_empty() {
        return Err(DeclarationError::NoContainers);
    }

    let mut names = HashSet::new();
    for (index, container) in containers.iter().enumerate() {
        require_fields(index, container)?;
        validate_container_name(&container.name)?;
        if !names.insert(container.name.as_str()) {
            return Err(DeclarationError::DuplicateContainer(
                container.name.to_string(),
            ));
        }

        for (i, network) in container.networks.iter().enumerate() {
            validate_network(&container.name, i, network)?;
        }

        for (i, package) in container.packages.iter().enumerate() {
            if package.trim().is_empty() {
                return Err(DeclarationError::EmptyPackage {
                    container: container.name.to_string(),
                    index: i,
                });
            }
        }

        let mut usernames = HashSet::new();
        for (i, user) in container.users.iter().enumerate() {
            validate_user(&container.name, i, user)?;
            if !usernames.insert(user.username.as_str()) {
                return Err(DeclarationError::DuplicateUser {
                    container: container.name.to_string(),
                    username: user.username.to_string(),
                });
            }
        }
    }

    Ok(())
}

fn require_fields(index: usize, container: &ContainerSpec) -> Result<(), DeclarationError> {
    let fields = [
        ("name", container.name.as_str()),
        ("template", container.template.as_str()),
        ("release", container.release.as_str()),
        ("architecture", container.arch.as_str()),
    ];
    for (field, value) in fields {
        if value.trim().is_empty() {
            return Err(DeclarationError::MissingContainerField { index, field });
        }
    }
    Ok(())
}

pub fn validate_container_name(name: &str) -> Result<(), DeclarationError> {
    let invalid = |reason: &str| DeclarationError::InvalidName {
        name: name.to_owned(),
        reason: reason.to_owned(),
    };

    if name.len() > MAX_NAME_LEN {
        return Err(invalid("exceeds maximum length of 64 characters"));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(invalid("must start with a letter or number"));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '_' | '-' | '.'))
    {
        return Err(invalid(&format!("invalid character '{ch}'")));
    }
    if name.contains("..") {
        return Err(invalid("contains path traversal sequence"));
    }
    Ok(())
}

fn validate_network(
    container: &str,
    index: usize,
    network: &NetworkSpec,
) -> Result<(), DeclarationError> {
    let missing = |field| DeclarationError::MissingNetworkField {
        container: container.to_owned(),
        index,
        field,
    };
    if network.link_type.trim().is_empty() {
        return Err(missing("type"));
    }
    if network.interface.trim().is_empty() {
        return Err(missing("interface"));
    }

    if let Some(address) = network.ipv4_address.as_deref() {
        if !is_ipv4_cidr(address) {
            return Err(DeclarationError::InvalidAddress {
                container: container.to_owned(),
                index,
                value: address.to_owned(),
            });
        }
    }
    if let Some(gateway) = network.ipv4_gateway.as_deref() {
        if gateway.parse::<Ipv4Addr>().is_err() {
            return Err(DeclarationError::InvalidGateway {
                container: container.to_owned(),
                index,
                value: gateway.to_owned(),
            });
        }
    }
    Ok(())
}

/// `a.b.c.d/prefix` with a prefix length of at most 32.
pub fn is_ipv4_cidr(value: &str) -> bool {
    let Some((addr, prefix)) = value.split_once('/') else {
        return false;
    };
    !prefix.is_empty()
        && prefix.bytes().all(|b| b.is_ascii_digit())
        && addr.parse::<Ipv4Addr>().is_ok()
        && prefix.parse::<u8>().is_ok_and(|p| p <= 32)
}

fn validate_user(container: &str, index: usize, user: &UserSpec) -> Result<(), DeclarationError> {
    let missing = |field| DeclarationError::MissingUserField {
        container: container.to_owned(),
        index,
        field,
    };
    if user.username.is_empty() {
        return Err(missing("username"));
    }
    if user.password.is_empty() {
        return Err(missing("password"));
    }
    if user.password.contains(['\n', '\r']) {
        return Err(DeclarationError::InvalidPassword {
            container: container.to_owned(),
            username: user.username.to_string(),
        });
    }

    let invalid = |reason: &str| DeclarationError::InvalidUsername {
        container: container.to_owned(),
        username: user.username.to_string(),
        reason: reason.to_owned(),
    };
    if user.username.len() > MAX_USERNAME_LEN {
        return Err(invalid("exceeds maximum length of 32 characters"));
    }
    if !user
        .username
        .starts_with(|c: char| c.is_ascii_lowercase() || c == '_')
    {
        return Err(invalid("must start with a lowercase letter or underscore"));
    }
    if !user
        .username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-'))
    {
        return Err(invalid(
            "only lowercase letters, digits, '_' and '-' are allowed",
        ));
    }

    if let Some(shell) = user.shell.as_deref() {
        if !shell.is_empty() && !shell.starts_with('/') {
            return Err(DeclarationError::RelativeShell {
                container: container.to_owned(),
                username: user.username.to_string(),
                shell: shell.to_owned(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web1() -> ContainerSpec {
        ContainerSpec::new("web1", "download", "jammy", "amd64")
    }

    #[test]
    fn accepts_minimal_container() {
        assert!(validate_containers(&[web1()]).is_ok());
    }

    #[test]
    fn rejects_empty_list() {
        assert!(matches!(
            validate_containers(&[]),
            Err(DeclarationError::NoContainers)
        ));
    }

    #[test]
    fn rejects_missing_release() {
        let mut c = web1();
        c.release = String::new();
        let err = validate_containers(&[c]).unwrap_err();
        assert!(matches!(
            err,
            DeclarationError::MissingContainerField {
                field: "release",
                ..
            }
        ));
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = validate_containers(&[web1(), web1()]).unwrap_err();
        assert!(matches!(err, DeclarationError::DuplicateContainer(n) if n == "web1"));
    }

    #[test]
    fn rejects_path_like_names() {
        assert!(validate_container_name("../etc").is_err());
        assert!(validate_container_name("a/b").is_err());
        assert!(validate_container_name("-lead").is_err());
        assert!(validate_container_name("web..1").is_err());
        assert!(validate_container_name(&"a".repeat(65)).is_err());
        assert!(validate_container_name("web-1.prod_a").is_ok());
    }

    #[test]
    fn network_requires_type_and_interface() {
        let mut c = web1();
        c.networks.push(NetworkSpec::new("veth", ""));
        let err = validate_containers(&[c]).unwrap_err();
        assert!(err.to_string().contains("network interface is required"));
    }

    #[test]
    fn address_must_carry_prefix() {
        let mut c = web1();
        let mut net = NetworkSpec::new("veth", "lxcbr0");
        net.ipv4_address = Some("192.168.2.10".to_owned());
        c.networks.push(net);
        let err = validate_containers(&[c]).unwrap_err();
        assert!(matches!(err, DeclarationError::InvalidAddress { index: 0, .. }));
    }

    #[test]
    fn cidr_shapes() {
        assert!(is_ipv4_cidr("192.168.2.10/24"));
        assert!(is_ipv4_cidr("10.0.0.1/32"));
        assert!(!is_ipv4_cidr("10.0.0.1/33"));
        assert!(!is_ipv4_cidr("10.0.0/24"));
        assert!(!is_ipv4_cidr("10.0.0.1/"));
        assert!(!is_ipv4_cidr("10.0.0.1/+24"));
        assert!(!is_ipv4_cidr("10.0.0.1/ 24"));
    }

    #[test]
    fn gateway_must_be_ipv4() {
        let mut c = web1();
        let mut net = NetworkSpec::new("veth", "lxcbr0");
        net.ipv4_gateway = Some("gateway.local".to_owned());
        c.networks.push(net);
        assert!(matches!(
            validate_containers(&[c]),
            Err(DeclarationError::InvalidGateway { .. })
        ));
    }

    #[test]
    fn rejects_empty_package() {
        let mut c = web1();
        c.packages = vec!["curl".to_owned(), " ".to_owned()];
        assert!(matches!(
            validate_containers(&[c]),
            Err(DeclarationError::EmptyPackage { index: 1, .. })
        ));
    }

    #[test]
    fn user_requires_password() {
        let mut c = web1();
        c.users.push(UserSpec::new("deploy", ""));
        let err = validate_containers(&[c]).unwrap_err();
        assert!(err.to_string().contains("user password is required"));
    }

    #[test]
    fn rejects_multiline_password() {
        let mut c = web1();
        c.users.push(UserSpec::new("deploy", "secret\nroot:owned"));
        assert!(matches!(
            validate_containers(&[c]),
            Err(DeclarationError::InvalidPassword { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_users_within_container() {
        let mut c = web1();
        c.users.push(UserSpec::new("deploy", "a"));
        c.users.push(UserSpec::new("deploy", "b"));
        assert!(matches!(
            validate_containers(&[c]),
            Err(DeclarationError::DuplicateUser { .. })
        ));
    }

    #[test]
    fn same_username_in_different_containers_is_fine() {
        let mut a = web1();
        a.users.push(UserSpec::new("deploy", "a"));
        let mut b = ContainerSpec::new("web2", "download", "jammy", "amd64");
        b.users.push(UserSpec::new("deploy", "b"));
        assert!(validate_containers(&[a, b]).is_ok());
    }

    #[test]
    fn rejects_unsafe_usernames() {
        for bad in ["Deploy", "../root", "a b", "9lives"] {
            let mut c = web1();
            c.users.push(UserSpec::new(bad, "pw"));
            assert!(
                validate_containers(&[c]).is_err(),
                "username {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_relative_shell() {
        let mut c = web1();
        let mut user = UserSpec::new("deploy", "pw");
        user.shell = Some("bash".to_owned());
        c.users.push(user);
        assert!(matches!(
            validate_containers(&[c]),
            Err(DeclarationError::RelativeShell { .. })
        ));
    }
}
