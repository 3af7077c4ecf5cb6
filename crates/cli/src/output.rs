//! Output formatting for CLI responses
//!
//! Human-readable output goes to stdout with light colouring; `--json`
//! switches stdout to machine-readable payloads while logs stay on
//! stderr.

use anyhow::Error;
use colored::Colorize;
use serde_json::json;
use shellyota_service::DeviceStatus;

/// Print an error as a JSON object.
pub fn print_error_json(error: &Error) {
    let error_json = json!({
        "success": false,
        "error": { "message": error.to_string() }
    });
    match serde_json::to_string_pretty(&error_json) {
        Ok(body) => println!("{body}"),
        Err(err) => eprintln!("Failed to format error as JSON: {err}"),
    }
}

/// Print an error with its cause chain.
pub fn print_error_human(error: &Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);

    let mut source = error.source();
    while let Some(err) = source {
        eprintln!("  {} {}", "Caused by:".yellow(), err);
        source = err.source();
    }
}

/// Print the device status list as pretty JSON on stdout.
pub fn print_status_json(statuses: &[DeviceStatus]) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(statuses)?);
    Ok(())
}

/// Print the device status list as a table.
pub fn print_status_table(statuses: &[DeviceStatus]) {
    if statuses.is_empty() {
        println!("No devices found.");
        return;
    }

    println!(
        "{:<40} {:<14} {:<20} {:<20} {}",
        "DEVICE", "MODEL", "CURRENT", "TARGET", "NOTE"
    );
    println!(
        "{:<40} {:<14} {:<20} {:<20} {}",
        "------", "-----", "-------", "------", "----"
    );

    for status in statuses {
        let target = if status.up_to_date {
            "(up to date)".to_string()
        } else {
            status.target_version.clone()
        };

        let note = if status.manual_upgrade_required {
            "manual upgrade required"
        } else if status.stepping_stone {
            "stepping-stone"
        } else {
            ""
        };

        println!(
            "{:<40} {:<14} {:<20} {:<20} {}",
            status.name, status.model, status.current_version, target, note
        );
    }
}
