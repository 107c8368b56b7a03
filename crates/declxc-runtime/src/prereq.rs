use std::fmt;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: String,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

const LXC_HINT: &str = "apt install lxc | dnf install lxc | zypper install lxc | pacman -S lxc";

const LXC_TOOLS: &[(&str, &str)] = &[
    ("lxc-create", "creating containers"),
    ("lxc-ls", "listing existing containers"),
    ("lxc-start", "starting containers"),
    ("lxc-stop", "stopping containers"),
    ("lxc-destroy", "destroying containers"),
];

fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check host tools needed to manage containers and enter their rootfs.
/// Empty list means all prerequisites are met.
pub fn check_prereqs(chroot: &str) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    for &(tool, purpose) in LXC_TOOLS {
        if !command_exists(tool) {
            missing.push(MissingPrereq {
                name: tool.to_owned(),
                purpose,
                install_hint: LXC_HINT,
            });
        }
    }

    if !command_exists(chroot) {
        missing.push(MissingPrereq {
            name: chroot.to_owned(),
            purpose: "running commands inside container root filesystems",
            install_hint: "part of coreutils (usually pre-installed)",
        });
    }

    missing
}

#[allow(unsafe_code)]
pub fn running_as_root() -> bool {
    // SAFETY: geteuid() takes no arguments and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\ndeclxc requires these tools to provision LXC containers.");
    msg
}
