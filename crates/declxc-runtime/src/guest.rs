//! Provisioning inside a container's root filesystem.
//!
//! Every guest-side action runs as `<chroot> <rootfs> <command...>` through
//! the injected [`CommandExecutor`]. Per-user failures are recorded as
//! [`StepReport`]s and never abort sibling users.

use crate::exec::{shell_quote, CommandExecutor, CommandLine};
use crate::packages::PackageManager;
use crate::report::{StepKind, StepReport};
use crate::RuntimeError;
use declxc_schema::UserSpec;
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub const DEFAULT_CHROOT: &str = "chroot";
pub const DEFAULT_SHELL: &str = "/bin/bash";
const SUDO_PACKAGE: &str = "sudo";

pub struct GuestProvisioner<'a> {
    executor: &'a dyn CommandExecutor,
    chroot: &'a str,
    rootfs: PathBuf,
    default_shell: &'a str,
}

impl<'a> GuestProvisioner<'a> {
    pub fn new(executor: &'a dyn CommandExecutor, rootfs: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            chroot: DEFAULT_CHROOT,
            rootfs: rootfs.into(),
            default_shell: DEFAULT_SHELL,
        }
    }

    #[must_use]
    pub fn with_chroot(mut self, chroot: &'a str) -> Self {
        self.chroot = chroot;
        self
    }

    #[must_use]
    pub fn with_default_shell(mut self, shell: &'a str) -> Self {
        self.default_shell = shell;
        self
    }

    fn guest<I, S>(&self, argv: I) -> CommandLine
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandLine::new(self.chroot)
            .arg(self.rootfs.to_string_lossy())
            .args(argv)
    }

    fn ensure_rootfs(&self) -> Result<(), RuntimeError> {
        if self.rootfs.is_dir() {
            Ok(())
        } else {
            Err(RuntimeError::RootfsMissing(self.rootfs.clone()))
        }
    }

    /// Write `content` to `path` inside the guest through a shell redirect.
    fn write_guest_file(&self, path: &str, content: &[u8]) -> Result<(), RuntimeError> {
        let redirect = format!("cat > {}", shell_quote(path));
        self.executor
            .run(&self.guest(["sh", "-c", redirect.as_str()]).stdin(content))
    }

    fn chmod(&self, mode: &str, path: &str) -> Result<(), RuntimeError> {
        self.executor.run(&self.guest(["chmod", mode, path]))
    }

    /// Refresh the package index, then install `packages` in one invocation.
    pub fn install_packages(&self, packages: &[String]) -> Result<(), RuntimeError> {
        self.ensure_rootfs()?;
        if packages.is_empty() {
            return Ok(());
        }
        let manager = PackageManager::detect(&self.rootfs)
            .ok_or_else(|| RuntimeError::NoPackageManager(self.rootfs.clone()))?;

        let with_env = |cmd: CommandLine| {
            manager
                .environment()
                .iter()
                .fold(cmd, |cmd, (key, value)| cmd.env(key, value))
        };

        info!("refreshing {} package index", manager.name());
        self.executor
            .run(&with_env(self.guest(manager.refresh_command())))
            .map_err(|e| e.context("update package index"))?;

        info!("installing {} package(s): {}", packages.len(), packages.join(" "));
        self.executor
            .run(&with_env(self.guest(manager.install_command(packages))))
            .map_err(|e| e.context("install packages"))?;
        Ok(())
    }

    /// Create every declared user that does not already exist in the guest.
    ///
    /// Only a missing rootfs is an error; everything else is reported.
    pub fn provision_users(
        &self,
        users: &[UserSpec],
        declared_packages: &[String],
    ) -> Result<Vec<StepReport>, RuntimeError> {
        self.ensure_rootfs()?;
        let mut reports = Vec::new();

        if users.iter().any(|u| u.sudo) {
            reports.push(self.ensure_sudo_package(declared_packages));
        }

        for user in users {
            self.provision_user(user, &mut reports);
        }
        Ok(reports)
    }

    fn ensure_sudo_package(&self, declared_packages: &[String]) -> StepReport {
        if declared_packages.iter().any(|p| p == SUDO_PACKAGE) {
            return StepReport::skipped(StepKind::SudoPackage, "installed with declared packages");
        }
        if self.rootfs.join("usr/bin/sudo").exists() {
            return StepReport::skipped(StepKind::SudoPackage, "already present");
        }
        match self.install_packages(&[SUDO_PACKAGE.to_owned()]) {
            Ok(()) => StepReport::done(StepKind::SudoPackage),
            Err(e) => {
                warn!("failed to install sudo: {e}");
                StepReport::failed(StepKind::SudoPackage, e.to_string())
            }
        }
    }

    fn provision_user(&self, user: &UserSpec, reports: &mut Vec<StepReport>) {
        let name = user.username.as_str();
        info!("creating user {name}");

        match self.executor.probe(&self.guest(["id", name])) {
            Ok(true) => {
                info!("user {name} already exists, skipping");
                reports.push(StepReport::skipped(StepKind::User, "already exists").for_user(name));
                return;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("failed to query user {name}: {e}");
                reports.push(StepReport::failed(StepKind::User, e.to_string()).for_user(name));
                return;
            }
        }

        let shell = user.shell_or(self.default_shell);
        if let Err(e) = self
            .executor
            .run(&self.guest(["useradd", "-m", "-s", shell, name]))
        {
            warn!("failed to create user {name}: {e}");
            reports.push(StepReport::failed(StepKind::User, e.to_string()).for_user(name));
            return;
        }
        reports.push(StepReport::done(StepKind::User).for_user(name));

        let credentials = format!("{name}:{}\n", user.password);
        if let Err(e) = self
            .executor
            .run(&self.guest(["chpasswd"]).stdin(credentials))
        {
            warn!("failed to set password for user {name}: {e}");
            reports.push(StepReport::failed(StepKind::Password, e.to_string()).for_user(name));
            return;
        }
        reports.push(StepReport::done(StepKind::Password).for_user(name));

        if user.sudo {
            let report = match self.grant_sudo(name) {
                Ok(()) => StepReport::done(StepKind::Sudo),
                Err(e) => {
                    warn!("failed to grant sudo to {name}: {e}");
                    StepReport::failed(StepKind::Sudo, e.to_string())
                }
            };
            reports.push(report.for_user(name));
        }

        if !user.ssh_key_files.is_empty() {
            reports.push(self.install_ssh_keys(name, &user.ssh_key_files).for_user(name));
        }
    }

    fn grant_sudo(&self, name: &str) -> Result<(), RuntimeError> {
        let path = format!("/etc/sudoers.d/{name}");
        let rule = format!("{name} ALL=(ALL:ALL) NOPASSWD:ALL\n");
        self.write_guest_file(&path, rule.as_bytes())?;
        self.chmod("440", &path)
    }

    /// Home directory recorded in the guest's passwd database, or the
    /// `useradd -m` default when it cannot be looked up.
    fn home_of(&self, name: &str) -> String {
        match self.executor.capture(&self.guest(["getent", "passwd", name])) {
            Ok(output) => match passwd_home(&output) {
                Some(home) => home.to_owned(),
                None => {
                    debug!("no passwd entry for {name}, assuming default home");
                    guest_home(name)
                }
            },
            Err(e) => {
                warn!("failed to look up home of {name}: {e}");
                guest_home(name)
            }
        }
    }

    fn install_ssh_keys(&self, name: &str, key_files: &[PathBuf]) -> StepReport {
        let ssh_dir = format!("{}/.ssh", self.home_of(name));
        let authorized_keys = format!("{ssh_dir}/authorized_keys");

        if let Err(e) = self.executor.run(&self.guest(["mkdir", ssh_dir.as_str()])) {
            warn!("failed to create {ssh_dir} for {name}: {e}");
            return StepReport::failed(StepKind::SshKeys, e.to_string());
        }

        let (keys, unreadable) = read_keys(key_files);
        if keys.is_empty() {
            warn!("no readable SSH keys for {name}; authorized_keys not written");
            return StepReport::warning(StepKind::SshKeys, "no readable SSH keys");
        }

        let mut content = keys.join("\n");
        content.push('\n');
        let owner = format!("{name}:");
        let result = self
            .write_guest_file(&authorized_keys, content.as_bytes())
            .and_then(|()| self.chmod("700", &ssh_dir))
            .and_then(|()| self.chmod("600", &authorized_keys))
            .and_then(|()| {
                self.executor
                    .run(&self.guest(["chown", "-R", owner.as_str(), ssh_dir.as_str()]))
            });
        if let Err(e) = result {
            warn!("failed to install SSH keys for {name}: {e}");
            return StepReport::failed(StepKind::SshKeys, e.to_string());
        }

        info!("installed {} SSH key(s) for {name}", keys.len());
        let detail = format!("{} of {} key(s) installed", keys.len(), key_files.len());
        if unreadable == 0 {
            StepReport::done(StepKind::SshKeys).with_detail(detail)
        } else {
            StepReport::warning(StepKind::SshKeys, detail)
        }
    }
}

/// Home directory `useradd -m` creates for `name`.
pub fn guest_home(name: &str) -> String {
    format!("/home/{name}")
}

/// Home field of the first `passwd` line in `output`.
fn passwd_home(output: &str) -> Option<&str> {
    output
        .lines()
        .next()?
        .split(':')
        .nth(5)
        .filter(|home| home.starts_with('/'))
}

/// Read key files from the host, skipping unreadable or empty ones.
/// Returns the trimmed keys and the number skipped.
fn read_keys(key_files: &[PathBuf]) -> (Vec<String>, usize) {
    let mut keys = Vec::new();
    let mut skipped = 0;
    for path in key_files {
        match std::fs::read_to_string(path) {
            Ok(content) if !content.trim().is_empty() => {
                keys.push(content.trim().to_owned());
            }
            Ok(_) => {
                warn!("SSH key file {} is empty, skipping", path.display());
                skipped += 1;
            }
            Err(e) => {
                warn!("failed to read SSH key file {}: {e}", path.display());
                skipped += 1;
            }
        }
    }
    (keys, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockExecutor;
    use crate::report::StepStatus;
    use std::fs;

    struct Guest {
        dir: tempfile::TempDir,
        exec: MockExecutor,
    }

    impl Guest {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::create_dir_all(dir.path().join("rootfs/usr/bin")).unwrap();
            fs::write(dir.path().join("rootfs/usr/bin/apt-get"), "").unwrap();
            Self {
                dir,
                exec: MockExecutor::new(),
            }
        }

        fn rootfs(&self) -> PathBuf {
            self.dir.path().join("rootfs")
        }

        fn provisioner(&self) -> GuestProvisioner<'_> {
            GuestProvisioner::new(&self.exec, self.rootfs())
        }

        fn key(&self, name: &str, content: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::write(&path, content).unwrap();
            path
        }
    }

    fn status_of(reports: &[StepReport], kind: StepKind) -> Option<StepStatus> {
        reports.iter().find(|r| r.kind == kind).map(|r| r.status)
    }

    #[test]
    fn missing_rootfs_fails_fast() {
        let exec = MockExecutor::new();
        let guest = GuestProvisioner::new(&exec, "/nonexistent/declxc/rootfs");
        let err = guest
            .provision_users(&[UserSpec::new("deploy", "pw")], &[])
            .unwrap_err();
        assert!(matches!(err, RuntimeError::RootfsMissing(_)));
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn creates_user_with_default_shell_and_password() {
        let g = Guest::new();
        let reports = g
            .provisioner()
            .provision_users(&[UserSpec::new("deploy", "s3cret")], &[])
            .unwrap();

        assert_eq!(status_of(&reports, StepKind::User), Some(StepStatus::Done));
        assert_eq!(status_of(&reports, StepKind::Password), Some(StepStatus::Done));

        let rootfs = g.rootfs().display().to_string();
        let rendered = g.exec.rendered();
        assert_eq!(rendered[0], format!("chroot {rootfs} id deploy"));
        assert_eq!(
            rendered[1],
            format!("chroot {rootfs} useradd -m -s /bin/bash deploy")
        );
        assert_eq!(rendered[2], format!("chroot {rootfs} chpasswd"));

        let chpasswd = &g.exec.calls()[2];
        assert_eq!(chpasswd.stdin.as_deref(), Some(&b"deploy:s3cret\n"[..]));
    }

    #[test]
    fn existing_user_is_not_mutated() {
        let g = Guest::new();
        g.exec.probe_true(" id deploy");
        let mut user = UserSpec::new("deploy", "pw");
        user.sudo = true;
        user.ssh_key_files = vec![g.key("deploy.pub", "ssh-ed25519 AAAA deploy")];

        let reports = g.provisioner().provision_users(&[user], &["sudo".to_owned()]).unwrap();

        assert_eq!(status_of(&reports, StepKind::User), Some(StepStatus::Skipped));
        assert_eq!(g.exec.count_matching("useradd"), 0);
        assert_eq!(g.exec.count_matching("chpasswd"), 0);
        assert_eq!(g.exec.count_matching("sudoers"), 0);
        assert_eq!(g.exec.count_matching("mkdir"), 0);
    }

    #[test]
    fn useradd_failure_continues_with_next_user() {
        let g = Guest::new();
        g.exec.fail_on("useradd -m -s /bin/bash alice");
        let users = [UserSpec::new("alice", "a"), UserSpec::new("bob", "b")];

        let reports = g.provisioner().provision_users(&users, &[]).unwrap();

        let alice: Vec<_> = reports
            .iter()
            .filter(|r| r.subject.as_deref() == Some("alice"))
            .collect();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].status, StepStatus::Failed);
        assert_eq!(g.exec.count_matching("useradd -m -s /bin/bash bob"), 1);
        assert_eq!(g.exec.count_matching("chpasswd"), 1);
    }

    #[test]
    fn password_failure_skips_remaining_steps_for_that_user() {
        let g = Guest::new();
        g.exec.fail_on("chpasswd");
        let mut user = UserSpec::new("deploy", "pw");
        user.sudo = true;

        let reports = g.provisioner().provision_users(&[user], &["sudo".to_owned()]).unwrap();
        assert_eq!(status_of(&reports, StepKind::Password), Some(StepStatus::Failed));
        assert_eq!(status_of(&reports, StepKind::Sudo), None);
    }

    #[test]
    fn sudo_grant_writes_fragment_and_restricts_mode() {
        let g = Guest::new();
        let mut user = UserSpec::new("deploy", "pw");
        user.sudo = true;

        let reports = g.provisioner().provision_users(&[user], &[]).unwrap();

        assert_eq!(reports[0].kind, StepKind::SudoPackage);
        assert_eq!(reports[0].status, StepStatus::Done);
        assert_eq!(status_of(&reports, StepKind::Sudo), Some(StepStatus::Done));

        let rendered = g.exec.rendered();
        let install = rendered
            .iter()
            .position(|c| c.ends_with("apt-get install -y sudo"))
            .unwrap();
        let fragment = rendered
            .iter()
            .position(|c| c.contains("cat > '/etc/sudoers.d/deploy'"))
            .unwrap();
        assert!(install < fragment);
        assert!(rendered[fragment + 1].ends_with("chmod 440 /etc/sudoers.d/deploy"));

        let write = &g.exec.calls()[fragment];
        assert_eq!(
            write.stdin.as_deref(),
            Some(&b"deploy ALL=(ALL:ALL) NOPASSWD:ALL\n"[..])
        );
    }

    #[test]
    fn sudo_package_skipped_when_present_in_rootfs() {
        let g = Guest::new();
        fs::write(g.rootfs().join("usr/bin/sudo"), "").unwrap();
        let mut user = UserSpec::new("deploy", "pw");
        user.sudo = true;

        let reports = g.provisioner().provision_users(&[user], &[]).unwrap();
        assert_eq!(reports[0].status, StepStatus::Skipped);
        assert_eq!(g.exec.count_matching("apt-get"), 0);
    }

    #[test]
    fn sudo_grant_failure_is_not_fatal() {
        let g = Guest::new();
        g.exec.fail_on("chmod 440");
        let mut alice = UserSpec::new("alice", "a");
        alice.sudo = true;
        let bob = UserSpec::new("bob", "b");

        let reports = g
            .provisioner()
            .provision_users(&[alice, bob], &["sudo".to_owned()])
            .unwrap();
        assert_eq!(status_of(&reports, StepKind::Sudo), Some(StepStatus::Failed));
        assert_eq!(g.exec.count_matching("useradd -m -s /bin/bash bob"), 1);
    }

    #[test]
    fn ssh_keys_installed_with_modes_and_owner() {
        let g = Guest::new();
        let mut user = UserSpec::new("deploy", "pw");
        user.shell = Some("/bin/zsh".to_owned());
        user.ssh_key_files = vec![
            g.key("a.pub", "ssh-ed25519 AAAA a@host\n"),
            g.key("b.pub", "ssh-rsa BBBB b@host"),
        ];

        let reports = g.provisioner().provision_users(&[user], &[]).unwrap();
        assert_eq!(status_of(&reports, StepKind::SshKeys), Some(StepStatus::Done));

        let rendered = g.exec.rendered();
        assert!(rendered[1].ends_with("useradd -m -s /bin/zsh deploy"));
        let rootfs = g.rootfs().display().to_string();
        assert_eq!(rendered[3], format!("chroot {rootfs} getent passwd deploy"));
        let expected = vec![
            format!("chroot {rootfs} mkdir /home/deploy/.ssh"),
            format!("chroot {rootfs} sh -c cat > '/home/deploy/.ssh/authorized_keys'"),
            format!("chroot {rootfs} chmod 700 /home/deploy/.ssh"),
            format!("chroot {rootfs} chmod 600 /home/deploy/.ssh/authorized_keys"),
            format!("chroot {rootfs} chown -R deploy: /home/deploy/.ssh"),
        ];
        assert_eq!(rendered[4..].to_vec(), expected);

        let write = &g.exec.calls()[5];
        assert_eq!(
            write.stdin.as_deref(),
            Some(&b"ssh-ed25519 AAAA a@host\nssh-rsa BBBB b@host\n"[..])
        );
    }

    #[test]
    fn ssh_keys_follow_home_from_passwd() {
        let g = Guest::new();
        g.exec
            .respond("getent passwd deploy", "deploy:x:1000:1000::/srv/deploy:/bin/bash\n");
        let mut user = UserSpec::new("deploy", "pw");
        user.ssh_key_files = vec![g.key("a.pub", "ssh-ed25519 AAAA a@host")];

        let reports = g.provisioner().provision_users(&[user], &[]).unwrap();
        assert_eq!(status_of(&reports, StepKind::SshKeys), Some(StepStatus::Done));
        assert_eq!(g.exec.count_matching("mkdir /srv/deploy/.ssh"), 1);
        assert_eq!(g.exec.count_matching("chown -R deploy: /srv/deploy/.ssh"), 1);
        assert_eq!(g.exec.count_matching("/home/deploy"), 0);
    }

    #[test]
    fn passwd_home_field() {
        assert_eq!(
            passwd_home("deploy:x:1000:1000:Deploy:/home/deploy:/bin/sh\n"),
            Some("/home/deploy")
        );
        assert_eq!(passwd_home(""), None);
        assert_eq!(passwd_home("broken:x"), None);
    }

    #[test]
    fn unreadable_key_is_skipped_with_warning() {
        let g = Guest::new();
        let mut user = UserSpec::new("deploy", "pw");
        user.ssh_key_files = vec![
            g.key("a.pub", "ssh-ed25519 AAAA a@host"),
            g.dir.path().join("missing.pub"),
        ];

        let reports = g.provisioner().provision_users(&[user], &[]).unwrap();
        let ssh = reports.iter().find(|r| r.kind == StepKind::SshKeys).unwrap();
        assert_eq!(ssh.status, StepStatus::Warning);
        assert_eq!(ssh.detail.as_deref(), Some("1 of 2 key(s) installed"));
        assert_eq!(g.exec.count_matching("authorized_keys"), 2);
    }

    #[test]
    fn no_readable_keys_creates_dir_but_writes_nothing() {
        let g = Guest::new();
        let mut user = UserSpec::new("deploy", "pw");
        user.ssh_key_files = vec![g.dir.path().join("gone.pub"), g.key("empty.pub", "\n")];

        let reports = g.provisioner().provision_users(&[user], &[]).unwrap();

        assert_eq!(status_of(&reports, StepKind::User), Some(StepStatus::Done));
        assert_eq!(
            status_of(&reports, StepKind::SshKeys),
            Some(StepStatus::Warning)
        );
        assert_eq!(g.exec.count_matching("mkdir /home/deploy/.ssh"), 1);
        assert_eq!(g.exec.count_matching("authorized_keys"), 0);
        assert_eq!(g.exec.count_matching("chown"), 0);
    }

    #[test]
    fn ssh_dir_creation_failure_is_reported() {
        let g = Guest::new();
        g.exec.fail_on("mkdir");
        let mut user = UserSpec::new("deploy", "pw");
        user.ssh_key_files = vec![g.key("a.pub", "ssh-ed25519 AAAA")];

        let reports = g.provisioner().provision_users(&[user], &[]).unwrap();
        assert_eq!(
            status_of(&reports, StepKind::SshKeys),
            Some(StepStatus::Failed)
        );
        assert_eq!(g.exec.count_matching("authorized_keys"), 0);
    }

    #[test]
    fn install_packages_refreshes_then_installs_non_interactively() {
        let g = Guest::new();
        let pkgs = vec!["nginx".to_owned(), "curl".to_owned()];
        g.provisioner().install_packages(&pkgs).unwrap();

        let calls = g.exec.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].to_string().ends_with("apt-get update"));
        assert!(calls[1].to_string().ends_with("apt-get install -y nginx curl"));
        for call in &calls {
            assert!(call
                .env
                .contains(&("DEBIAN_FRONTEND".to_owned(), "noninteractive".to_owned())));
        }
    }

    #[test]
    fn failed_refresh_aborts_install() {
        let g = Guest::new();
        g.exec.fail_on("apt-get update");
        let err = g
            .provisioner()
            .install_packages(&["nginx".to_owned()])
            .unwrap_err();
        assert!(err.to_string().starts_with("failed to update package index"));
        assert_eq!(g.exec.count_matching("install"), 0);
    }

    #[test]
    fn install_requires_known_package_manager() {
        let dir = tempfile::tempdir().unwrap();
        let exec = MockExecutor::new();
        let guest = GuestProvisioner::new(&exec, dir.path());
        let err = guest.install_packages(&["vim".to_owned()]).unwrap_err();
        assert!(matches!(err, RuntimeError::NoPackageManager(_)));
    }

    #[test]
    fn custom_chroot_wrapper_is_used() {
        let g = Guest::new();
        let guest = g.provisioner().with_chroot("lxc-chroot");
        guest
            .provision_users(&[UserSpec::new("deploy", "pw")], &[])
            .unwrap();
        assert!(g.exec.rendered().iter().all(|c| c.starts_with("lxc-chroot ")));
    }
}
