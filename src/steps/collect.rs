use std::fs;
use std::path::Path;

use dialoguer::{Confirm, Input, Select};
use tracing::debug;

use grub_rescue::config::{Distro, DEFAULT_ISSUE};
use grub_rescue::validate;
use grub_rescue::{RawConfig, RescueError};

use crate::{ui, Cli};

// ── Layering ──────────────────────────────────────────────────────────────────

/// Defaults, then the `--config` file, then command-line flags.
pub fn layered(cli: &Cli) -> Result<RawConfig, RescueError> {
    let mut raw = match &cli.config {
        Some(path) => load_file(path)?,
        None => RawConfig::default(),
    };

    if let Some(ref v) = cli.disk {
        raw.disk_designator = v.clone();
    }
    if let Some(ref v) = cli.distro {
        raw.distro = v.clone();
    }
    if let Some(ref v) = cli.issue {
        raw.issue_description = v.clone();
    }
    if let Some(ref v) = cli.arch {
        raw.architecture = v.clone();
    }
    if cli.optimize {
        raw.include_optimizations = true;
    }

    debug!(?raw, "layered configuration");
    Ok(raw)
}

fn load_file(path: &Path) -> Result<RawConfig, RescueError> {
    let text = fs::read_to_string(path)?;
    let raw: RawConfig = serde_json::from_str(&text)?;
    ui::print_info(&format!("Loaded settings from {}", path.display()));
    Ok(raw)
}

// ── Wizard ────────────────────────────────────────────────────────────────────

/// Layers the inputs and, when someone is at the terminal, lets them review
/// every field with the layered value as the default.
pub fn run(cli: &Cli, interactive: bool) -> Result<RawConfig, RescueError> {
    let raw = layered(cli)?;

    if !interactive {
        ui::print_info("Non-interactive run: using defaults, config file and flags.");
        return Ok(raw);
    }

    prompt(raw)
}

fn prompt(mut raw: RawConfig) -> Result<RawConfig, RescueError> {
    println!();
    ui::print_info("Plug the stick into the Mac and run `diskutil list external` to find it.");

    raw.disk_designator = Input::new()
        .with_prompt("USB disk identifier on the Mac (e.g. disk4)")
        .default(raw.disk_designator)
        .validate_with(|s: &String| -> Result<(), String> {
            validate::normalize_disk(s)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .interact_text()?;

    let names: Vec<&str> = Distro::ALL.iter().map(|d| d.display_name()).collect();
    let current = raw
        .distro
        .parse::<Distro>()
        .ok()
        .and_then(|d| Distro::ALL.iter().position(|x| *x == d))
        .unwrap_or(0);
    let idx = Select::new()
        .with_prompt("Distribution installed on the broken machine")
        .items(&names)
        .default(current)
        .interact()?;
    raw.distro = names[idx].to_string();

    let issue_default = if raw.issue_description.trim().is_empty() {
        DEFAULT_ISSUE.to_string()
    } else {
        raw.issue_description
    };
    raw.issue_description = Input::new()
        .with_prompt("Describe the problem")
        .default(issue_default)
        .allow_empty(true)
        .interact_text()?;

    raw.include_optimizations = Confirm::new()
        .with_prompt("Also lower swappiness and cache pressure (helps older machines)?")
        .default(raw.include_optimizations)
        .interact()?;

    ui::print_info(&format!(
        "Architecture: {}",
        if raw.architecture.trim().is_empty() {
            "x86_64"
        } else {
            raw.architecture.as_str()
        }
    ));

    Ok(raw)
}
