use declxc_runtime::{StepReport, StepStatus};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Start,
    Stop,
    Destroy,
}

impl Operation {
    pub fn past_tense(self) -> &'static str {
        match self {
            Operation::Create => "created",
            Operation::Start => "started",
            Operation::Stop => "stopped",
            Operation::Destroy => "destroyed",
        }
    }

    pub fn progressive(self) -> &'static str {
        match self {
            Operation::Create => "Creating",
            Operation::Start => "Starting",
            Operation::Stop => "Stopping",
            Operation::Destroy => "Destroying",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Create => "create",
            Operation::Start => "start",
            Operation::Stop => "stop",
            Operation::Destroy => "destroy",
        };
        f.write_str(s)
    }
}

/// Result of applying one operation to one container.
///
/// `error` is set only when the container's processing was aborted; failed
/// per-user steps show up in `steps` without failing the container.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerOutcome {
    pub name: String,
    pub operation: Operation,
    pub steps: Vec<StepReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContainerOutcome {
    pub fn new(name: &str, operation: Operation) -> Self {
        Self {
            name: name.to_owned(),
            operation,
            steps: Vec::new(),
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Steps that completed with a warning or failure.
    pub fn problems(&self) -> impl Iterator<Item = &StepReport> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Warning | StepStatus::Failed))
    }
}
