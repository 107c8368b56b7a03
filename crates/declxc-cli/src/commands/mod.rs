pub mod apply;
pub mod completions;
pub mod doctor;
pub mod man_pages;

use declxc_runtime::StepStatus;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_DECLARATION_ERROR: u8 = 2;
pub const EXIT_CONFIG_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn colorize_status(status: StepStatus) -> String {
    use console::Style;
    let label = status.to_string();
    match status {
        StepStatus::Done => Style::new().green().apply_to(label).to_string(),
        StepStatus::Skipped => Style::new().dim().apply_to(label).to_string(),
        StepStatus::Warning => Style::new().yellow().apply_to(label).to_string(),
        StepStatus::Failed => Style::new().red().bold().apply_to(label).to_string(),
    }
}
