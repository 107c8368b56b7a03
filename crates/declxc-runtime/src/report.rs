use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    Create,
    Start,
    Stop,
    Destroy,
    Network,
    Packages,
    SudoPackage,
    User,
    Password,
    Sudo,
    SshKeys,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepKind::Create => "create",
            StepKind::Start => "start",
            StepKind::Stop => "stop",
            StepKind::Destroy => "destroy",
            StepKind::Network => "network",
            StepKind::Packages => "packages",
            StepKind::SudoPackage => "sudo-package",
            StepKind::User => "user",
            StepKind::Password => "password",
            StepKind::Sudo => "sudo",
            StepKind::SshKeys => "ssh-keys",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Done,
    Skipped,
    Warning,
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Done => "done",
            StepStatus::Skipped => "skipped",
            StepStatus::Warning => "warning",
            StepStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of one provisioning step, optionally scoped to a guest user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub kind: StepKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StepReport {
    fn new(kind: StepKind, status: StepStatus, detail: Option<String>) -> Self {
        Self {
            kind,
            subject: None,
            status,
            detail,
        }
    }

    pub fn done(kind: StepKind) -> Self {
        Self::new(kind, StepStatus::Done, None)
    }

    pub fn skipped(kind: StepKind, detail: impl Into<String>) -> Self {
        Self::new(kind, StepStatus::Skipped, Some(detail.into()))
    }

    pub fn warning(kind: StepKind, detail: impl Into<String>) -> Self {
        Self::new(kind, StepStatus::Warning, Some(detail.into()))
    }

    pub fn failed(kind: StepKind, detail: impl Into<String>) -> Self {
        Self::new(kind, StepStatus::Failed, Some(detail.into()))
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn for_user(mut self, username: &str) -> Self {
        self.subject = Some(username.to_owned());
        self
    }
}

impl fmt::Display for StepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(subject) = &self.subject {
            write!(f, " [{subject}]")?;
        }
        write!(f, ": {}", self.status)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}
