//! In-memory collaborators for tests: a recording executor and a registry
//! with a fixed container set.

use crate::exec::{CommandExecutor, CommandLine};
use crate::registry::Registry;
use crate::RuntimeError;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records every command line and answers by substring rules.
///
/// By default `run` succeeds, `capture` returns empty output, and `probe`
/// reports failure (e.g. "user does not exist").
#[derive(Default)]
pub struct MockExecutor {
    calls: Mutex<Vec<CommandLine>>,
    failures: Mutex<Vec<String>>,
    probes: Mutex<Vec<String>>,
    outputs: Mutex<Vec<(String, String)>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands whose rendered form contains `needle` exit non-zero.
    pub fn fail_on(&self, needle: &str) {
        lock(&self.failures).push(needle.to_owned());
    }

    /// Probes whose rendered form contains `needle` succeed.
    pub fn probe_true(&self, needle: &str) {
        lock(&self.probes).push(needle.to_owned());
    }

    /// Captures whose rendered form contains `needle` print `stdout`.
    pub fn respond(&self, needle: &str, stdout: &str) {
        lock(&self.outputs).push((needle.to_owned(), stdout.to_owned()));
    }

    pub fn calls(&self) -> Vec<CommandLine> {
        lock(&self.calls).clone()
    }

    pub fn rendered(&self) -> Vec<String> {
        lock(&self.calls).iter().map(ToString::to_string).collect()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.rendered().iter().filter(|c| c.contains(needle)).count()
    }

    fn record(&self, command: &CommandLine) -> Result<String, RuntimeError> {
        lock(&self.calls).push(command.clone());
        let rendered = command.to_string();
        if lock(&self.failures).iter().any(|n| rendered.contains(n.as_str())) {
            return Err(RuntimeError::CommandFailed {
                command: rendered,
                status: "exit status: 1".to_owned(),
            });
        }
        Ok(rendered)
    }
}

impl CommandExecutor for MockExecutor {
    fn run(&self, command: &CommandLine) -> Result<(), RuntimeError> {
        self.record(command).map(|_| ())
    }

    fn capture(&self, command: &CommandLine) -> Result<String, RuntimeError> {
        let rendered = self.record(command)?;
        Ok(lock(&self.outputs)
            .iter()
            .find(|(needle, _)| rendered.contains(needle.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default())
    }

    fn probe(&self, command: &CommandLine) -> Result<bool, RuntimeError> {
        lock(&self.calls).push(command.clone());
        let rendered = command.to_string();
        Ok(lock(&self.probes)
            .iter()
            .any(|n| rendered.contains(n.as_str())))
    }
}

/// Registry over a fixed set of names; can be switched to fail queries.
#[derive(Default)]
pub struct MockRegistry {
    containers: Mutex<BTreeSet<String>>,
    unavailable: AtomicBool,
    queries: AtomicUsize,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_containers(names: &[&str]) -> Self {
        let registry = Self::new();
        for name in names {
            registry.insert(name);
        }
        registry
    }

    pub fn insert(&self, name: &str) {
        lock(&self.containers).insert(name.to_owned());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `list` calls served so far.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl Registry for MockRegistry {
    fn list(&self) -> Result<Vec<String>, RuntimeError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RuntimeError::RegistryUnavailable(
                "mock registry unavailable".to_owned(),
            ));
        }
        Ok(lock(&self.containers).iter().cloned().collect())
    }
}
