use super::{colorize_status, json_pretty, EXIT_FAILURE, EXIT_SUCCESS};
use declxc_core::{ContainerOutcome, Engine, EngineConfig, Operation};
use declxc_runtime::StepReport;
use declxc_schema::ContainerSpec;
use std::path::Path;

pub fn run(
    config: EngineConfig,
    operation: Operation,
    file: &Path,
    specs: &[ContainerSpec],
    json_output: bool,
) -> Result<u8, String> {
    if !declxc_runtime::running_as_root() {
        tracing::warn!("not running as root; LXC commands may fail");
    }

    let engine = Engine::new(config);
    let outcomes = if json_output {
        let outcomes = engine.apply(operation, specs);
        println!("{}", json_pretty(&outcomes)?);
        outcomes
    } else {
        println!("{} containers from {}", operation.progressive(), file.display());
        engine.apply_with(operation, specs, print_outcome)
    };

    let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
    if failed == 0 {
        Ok(EXIT_SUCCESS)
    } else {
        eprintln!(
            "error: {failed} of {} container(s) failed to {operation}",
            outcomes.len()
        );
        Ok(EXIT_FAILURE)
    }
}

fn print_outcome(outcome: &ContainerOutcome) {
    for step in &outcome.steps {
        println!("  {}", step_line(step));
    }
    match &outcome.error {
        None => println!(
            "Container {} {} successfully",
            outcome.name,
            outcome.operation.past_tense()
        ),
        Some(e) => println!("Error {} container {}: {e}", gerund(outcome.operation), outcome.name),
    }
}

fn step_line(step: &StepReport) -> String {
    let mut line = step.kind.to_string();
    if let Some(subject) = &step.subject {
        line.push_str(&format!(" [{subject}]"));
    }
    line.push_str(&format!(": {}", colorize_status(step.status)));
    if let Some(detail) = &step.detail {
        line.push_str(&format!(" ({detail})"));
    }
    line
}

fn gerund(operation: Operation) -> String {
    operation.progressive().to_lowercase()
}
