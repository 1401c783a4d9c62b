use std::path::{Path, PathBuf};

use dialoguer::Confirm;

use grub_rescue::compose::host::HOST_SCRIPT_NAME;
use grub_rescue::compose::repair::SCRIPT_NAME;
use grub_rescue::output::{self, EXPLANATION_NAME};
use grub_rescue::{RescueBundle, RescueError};

use crate::{is_dry_run, ui};

/// Writes the bundle into `dir`, asking before replacing earlier files.
pub fn run(dir: &Path, bundle: &RescueBundle, interactive: bool) -> Result<(), RescueError> {
    let existing: Vec<PathBuf> = output::bundle_paths(dir)
        .into_iter()
        .filter(|p| p.exists())
        .collect();

    if !existing.is_empty() {
        for p in &existing {
            ui::print_warning(&format!("{} already exists.", p.display()));
        }
        if interactive {
            if !Confirm::new()
                .with_prompt("Overwrite the existing files?")
                .default(false)
                .interact()?
            {
                return Err(RescueError::Cancelled);
            }
        } else {
            ui::print_info("Non-interactive run: replacing them.");
        }
    }

    if is_dry_run() {
        for p in output::bundle_paths(dir) {
            ui::print_info(&format!("[dry-run] would write {}", p.display()));
        }
        return Ok(());
    }

    let pb = ui::spinner(format!("Writing bundle to {}…", dir.display()));
    let written = match output::write_bundle(dir, bundle) {
        Ok(w) => w,
        Err(e) => {
            pb.finish_and_clear();
            return Err(e);
        }
    };
    ui::done_spinner(pb, &format!("{} files written to {}.", written.len(), dir.display()));

    let linux = format!("sudo bash {SCRIPT_NAME}");
    println!();
    ui::print_kv_box(
        "Next steps",
        &[
            ("1. Mac", HOST_SCRIPT_NAME),
            ("2. Linux", linux.as_str()),
            ("Details", EXPLANATION_NAME),
        ],
    );
    Ok(())
}
