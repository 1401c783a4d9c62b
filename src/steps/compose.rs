use grub_rescue::bundle;
use grub_rescue::validate;
use grub_rescue::{RawConfig, RescueBundle, RescueError};

use crate::ui;

/// Validates the parameters, shows what will be generated, then composes.
pub fn run(raw: &RawConfig) -> Result<RescueBundle, RescueError> {
    let (config, warnings) = validate::validate(raw)?;

    for w in &warnings {
        ui::print_warning(&w.to_string());
    }

    println!();
    ui::print_kv_box(
        "Rescue Bundle",
        &[
            ("Target disk", config.disk.as_str()),
            ("Distro", config.distro.display_name()),
            ("Arch", config.architecture.as_str()),
            ("GRUB update", config.distro.grub_update_command()),
            (
                "VM tuning",
                if config.include_optimizations { "on" } else { "off" },
            ),
        ],
    );
    println!();

    let bundle = bundle::assemble(&config, warnings)?;
    ui::print_success(&format!(
        "Scripts composed ({} + {} bytes).",
        bundle.host_script.len(),
        bundle.repair_script.len()
    ));
    Ok(bundle)
}
