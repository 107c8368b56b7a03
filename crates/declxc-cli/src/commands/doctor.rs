use super::{EXIT_FAILURE, EXIT_SUCCESS};
use declxc_core::EngineConfig;
use std::path::Path;

pub fn run(
    config: &EngineConfig,
    config_path: Option<&Path>,
    json_output: bool,
) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    check_prereqs(config, &mut checks, &mut all_pass);

    if declxc_runtime::running_as_root() {
        checks.push(Check::pass("privileges", "Running as root"));
    } else {
        checks.push(Check::warn(
            "privileges",
            "Not running as root (privileged containers need root)",
        ));
    }

    if config.lxc_path.is_dir() {
        checks.push(Check::pass(
            "lxc_path",
            &format!("Container directory {} exists", config.lxc_path.display()),
        ));
    } else {
        checks.push(Check::warn(
            "lxc_path",
            &format!(
                "Container directory {} does not exist",
                config.lxc_path.display()
            ),
        ));
    }

    checks.push(config_check(config_path));
    checks.push(Check::info(
        "network_strategy",
        &format!("Network strategy: {:?}", config.network_strategy),
    ));

    print_results(&checks, all_pass, json_output)
}

fn config_check(config_path: Option<&Path>) -> Check {
    match config_path {
        Some(path) => Check::info("config", &format!("Config file {}", path.display())),
        None => Check::info("config", "No config file (using defaults)"),
    }
}

fn check_prereqs(config: &EngineConfig, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let missing = declxc_runtime::check_prereqs(&config.chroot);
    if missing.is_empty() {
        checks.push(Check::pass("host_prereqs", "Host prerequisites satisfied"));
    } else {
        *all_pass = false;
        checks.push(Check::fail(
            "host_prereqs",
            &declxc_runtime::format_missing(&missing),
        ));
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("declxc doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &'static str, status: &'static str, message: &str) -> Self {
        Self {
            name,
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &'static str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &'static str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &'static str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
