use crate::config::EngineConfig;
use crate::outcome::{ContainerOutcome, Operation};
use crate::CoreError;
use declxc_runtime::{
    apply_network_config, CommandExecutor, ContainerLayout, GuestProvisioner, LxcRegistry,
    Registry, RuntimeError, StepKind, StepReport, SystemExecutor,
};
use declxc_schema::ContainerSpec;
use std::sync::Arc;
use tracing::{error, info};

/// Lifecycle controller: converges declared containers onto live state.
///
/// The registry is queried afresh for every existence check; nothing about
/// live containers is cached between calls.
pub struct Engine {
    config: EngineConfig,
    layout: ContainerLayout,
    executor: Arc<dyn CommandExecutor>,
    registry: Arc<dyn Registry>,
}

impl Engine {
    /// Engine that runs real commands and queries `lxc-ls`.
    pub fn new(config: EngineConfig) -> Self {
        let executor: Arc<dyn CommandExecutor> = Arc::new(SystemExecutor::new());
        let registry = Arc::new(LxcRegistry::new(executor.clone(), config.layout()));
        Self::with_collaborators(config, executor, registry)
    }

    pub fn with_collaborators(
        config: EngineConfig,
        executor: Arc<dyn CommandExecutor>,
        registry: Arc<dyn Registry>,
    ) -> Self {
        let layout = config.layout();
        Self {
            config,
            layout,
            executor,
            registry,
        }
    }

    fn exists(&self, name: &str) -> Result<bool, CoreError> {
        self.registry
            .exists(name)
            .map_err(|e| step_error("check if container exists", e))
    }

    fn guest(&self, name: &str) -> GuestProvisioner<'_> {
        GuestProvisioner::new(self.executor.as_ref(), self.layout.rootfs(name))
            .with_chroot(&self.config.chroot)
            .with_default_shell(&self.config.default_shell)
    }

    /// Create the container if absent, then apply network, package and user
    /// configuration whether or not it was just created.
    pub fn create(&self, spec: &ContainerSpec) -> ContainerOutcome {
        let mut outcome = ContainerOutcome::new(&spec.name, Operation::Create);
        if let Err(e) = self.provision(spec, &mut outcome.steps) {
            outcome.error = Some(e.to_string());
        }
        outcome
    }

    fn provision(&self, spec: &ContainerSpec, steps: &mut Vec<StepReport>) -> Result<(), CoreError> {
        let name = spec.name.as_str();

        if self.exists(name)? {
            info!("container {name} already exists, skipping creation");
            steps.push(StepReport::skipped(StepKind::Create, "already exists"));
        } else {
            let result = self.executor.run(&self.layout.create_command(spec));
            record(steps, StepKind::Create, &result);
            result.map_err(|e| step_error("create container", e))?;
            info!("container {name} created successfully");
        }

        if !spec.networks.is_empty() {
            let result = apply_network_config(
                &self.layout,
                name,
                &spec.networks,
                self.config.network_strategy,
            );
            record(steps, StepKind::Network, &result);
            result.map_err(|e| step_error("configure network", e))?;
        }

        if !spec.packages.is_empty() {
            let result = self.guest(name).install_packages(&spec.packages);
            record(steps, StepKind::Packages, &result);
            result.map_err(|e| step_error("install packages", e))?;
        }

        if !spec.users.is_empty() {
            match self.guest(name).provision_users(&spec.users, &spec.packages) {
                Ok(reports) => steps.extend(reports),
                Err(e) => {
                    steps.push(StepReport::failed(StepKind::User, e.to_string()));
                    return Err(step_error("configure users", e));
                }
            }
        }

        Ok(())
    }

    pub fn start(&self, name: &str) -> Result<(), CoreError> {
        self.require_existing(name)?;
        self.executor
            .run(&self.layout.start_command(name))
            .map_err(|e| step_error("start container", e))?;
        info!("container {name} started");
        Ok(())
    }

    pub fn stop(&self, name: &str) -> Result<(), CoreError> {
        self.require_existing(name)?;
        self.executor
            .run(&self.layout.stop_command(name))
            .map_err(|e| step_error("stop container", e))?;
        info!("container {name} stopped");
        Ok(())
    }

    /// Force-destroy without an existence check; a missing container fails
    /// with whatever the destroy command reports.
    pub fn destroy(&self, name: &str) -> Result<(), CoreError> {
        self.executor
            .run(&self.layout.destroy_command(name))
            .map_err(|e| step_error("destroy container", e))?;
        info!("container {name} destroyed");
        Ok(())
    }

    fn require_existing(&self, name: &str) -> Result<(), CoreError> {
        if self.exists(name)? {
            Ok(())
        } else {
            Err(CoreError::NotFound(name.to_owned()))
        }
    }

    /// Run `operation` on one container and capture the result as an outcome.
    pub fn run_one(&self, operation: Operation, spec: &ContainerSpec) -> ContainerOutcome {
        let name = spec.name.as_str();
        let (kind, result) = match operation {
            Operation::Create => return self.create(spec),
            Operation::Start => (StepKind::Start, self.start(name)),
            Operation::Stop => (StepKind::Stop, self.stop(name)),
            Operation::Destroy => (StepKind::Destroy, self.destroy(name)),
        };

        let mut outcome = ContainerOutcome::new(name, operation);
        match result {
            Ok(()) => outcome.steps.push(StepReport::done(kind)),
            Err(e) => {
                outcome.steps.push(StepReport::failed(kind, e.to_string()));
                outcome.error = Some(e.to_string());
            }
        }
        outcome
    }

    /// Apply `operation` to every container in declaration order. A failing
    /// container never stops the batch.
    pub fn apply(&self, operation: Operation, specs: &[ContainerSpec]) -> Vec<ContainerOutcome> {
        self.apply_with(operation, specs, |_| {})
    }

    /// Like [`Engine::apply`], calling `on_outcome` as each container finishes.
    pub fn apply_with(
        &self,
        operation: Operation,
        specs: &[ContainerSpec],
        mut on_outcome: impl FnMut(&ContainerOutcome),
    ) -> Vec<ContainerOutcome> {
        let mut outcomes = Vec::with_capacity(specs.len());
        for spec in specs {
            info!("{} container {}", operation.progressive(), spec.name);
            let outcome = self.run_one(operation, spec);
            if let Some(e) = &outcome.error {
                error!("failed to {operation} container {}: {e}", spec.name);
            }
            on_outcome(&outcome);
            outcomes.push(outcome);
        }
        outcomes
    }
}

fn step_error(action: &'static str, source: RuntimeError) -> CoreError {
    CoreError::Step { action, source }
}

fn record(steps: &mut Vec<StepReport>, kind: StepKind, result: &Result<(), RuntimeError>) {
    steps.push(match result {
        Ok(()) => StepReport::done(kind),
        Err(e) => StepReport::failed(kind, e.to_string()),
    });
}
