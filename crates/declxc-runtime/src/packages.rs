use std::path::Path;

/// Package managers recognised inside a guest rootfs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Zypper,
    Pacman,
}

impl PackageManager {
    pub fn detect(rootfs: &Path) -> Option<Self> {
        if rootfs.join("usr/bin/apt-get").exists() || rootfs.join("usr/bin/apt").exists() {
            Some(Self::Apt)
        } else if rootfs.join("usr/bin/dnf").exists() || rootfs.join("usr/bin/dnf5").exists() {
            Some(Self::Dnf)
        } else if rootfs.join("usr/bin/zypper").exists() {
            Some(Self::Zypper)
        } else if rootfs.join("usr/bin/pacman").exists() {
            Some(Self::Pacman)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Apt => "apt",
            Self::Dnf => "dnf",
            Self::Zypper => "zypper",
            Self::Pacman => "pacman",
        }
    }

    pub fn refresh_command(self) -> Vec<String> {
        let argv: &[&str] = match self {
            Self::Apt => &["apt-get", "update"],
            Self::Dnf => &["dnf", "makecache", "-y"],
            Self::Zypper => &["zypper", "--non-interactive", "refresh"],
            Self::Pacman => &["pacman", "-Sy", "--noconfirm"],
        };
        argv.iter().map(|s| (*s).to_owned()).collect()
    }

    pub fn install_command(self, packages: &[String]) -> Vec<String> {
        if packages.is_empty() {
            return Vec::new();
        }
        let argv: &[&str] = match self {
            Self::Apt => &["apt-get", "install", "-y"],
            Self::Dnf => &["dnf", "install", "-y"],
            Self::Zypper => &["zypper", "--non-interactive", "install"],
            Self::Pacman => &["pacman", "-S", "--noconfirm", "--needed"],
        };
        let mut cmd: Vec<String> = argv.iter().map(|s| (*s).to_owned()).collect();
        cmd.extend(packages.iter().cloned());
        cmd
    }

    /// Environment that keeps the package manager from prompting.
    pub fn environment(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Apt => &[("DEBIAN_FRONTEND", "noninteractive")],
            Self::Dnf | Self::Zypper | Self::Pacman => &[],
        }
    }
}
