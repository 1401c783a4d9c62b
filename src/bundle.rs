//! Top-level generation: validate, compose both scripts, explain them.

use serde::Serialize;
use tracing::info;

use crate::compose::edits::{GRUB_DEFAULTS, SYSCTL_CONF, VM_TUNING};
use crate::compose::host::{self, HOST_SCRIPT_NAME, VOLUME_LABEL};
use crate::compose::repair::{self, SCRIPT_NAME};
use crate::config::{Configuration, RawConfig, Warning};
use crate::error::RescueError;
use crate::safety::{CONFIRM_TOKEN, FORCE_TOKEN};
use crate::validate;

/// Everything one generation call produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RescueBundle {
    pub host_script: String,
    pub repair_script: String,
    /// Markdown instructions for the operator.
    pub explanation: String,
    pub warnings: Vec<Warning>,
}

/// Runs the whole pipeline. Either returns a complete bundle or fails before
/// producing anything.
pub fn generate(raw: &RawConfig) -> Result<RescueBundle, RescueError> {
    let (config, warnings) = validate::validate(raw)?;
    assemble(&config, warnings)
}

/// Composes a bundle from an already validated configuration and the
/// warnings its validation produced.
pub fn assemble(config: &Configuration, warnings: Vec<Warning>) -> Result<RescueBundle, RescueError> {
    let repair_script = repair::compose(config)?;
    let host_script = host::compose(config, &repair_script, &warnings)?;
    let explanation = explain(config, &warnings);

    info!(
        disk = %config.disk,
        distro = %config.distro,
        optimizations = config.include_optimizations,
        warnings = warnings.len(),
        "rescue bundle generated"
    );

    Ok(RescueBundle {
        host_script,
        repair_script,
        explanation,
        warnings,
    })
}

/// Operator instructions. Deterministic for a given configuration.
pub fn explain(config: &Configuration, warnings: &[Warning]) -> String {
    let distro = config.distro.display_name();
    let live = config.distro.live_session();
    let mut out: Vec<String> = Vec::new();

    out.push(format!(
        "# Rescue USB for {} ({})",
        distro,
        config.architecture.as_str()
    ));
    out.push(String::new());

    if !config.issue_description.trim().is_empty() {
        out.push("**Reported issue:**".to_string());
        out.push(String::new());
        out.extend(config.issue_description.lines().map(|l| format!("> {l}")));
        out.push(String::new());
    }

    out.push("## You need TWO USB drives".to_string());
    out.push(String::new());
    out.push(format!(
        "1. **USB 1 (installer):** the {distro} installer you boot the broken machine from, using {live}."
    ));
    out.push(format!(
        "2. **USB 2 ({VOLUME_LABEL}):** the stick `{HOST_SCRIPT_NAME}` erases and fills with `{SCRIPT_NAME}`."
    ));
    out.push(String::new());

    if !warnings.is_empty() {
        out.push("## Disk identifier notices".to_string());
        out.push(String::new());
        out.extend(warnings.iter().map(|w| format!("- {w}")));
        out.push(String::new());
    }

    out.push(format!("## Step 1: prepare the {VOLUME_LABEL} stick on the Mac"));
    out.push(String::new());
    out.push(format!(
        "- Double-click `{HOST_SCRIPT_NAME}`. It asks for your Mac password once, then lists the external disks."
    ));
    out.push(format!(
        "- Confirm the target disk (default `{}`) or type another identifier. Partition identifiers such as `{}s1` are reduced to the whole disk.",
        config.disk, config.disk
    ));
    out.push(
        "- If macOS refuses to open the file, run `chmod +x ~/Downloads/create_fix_usb*.command` in Terminal and try again."
            .to_string(),
    );
    out.push(format!(
        "- If the script says the disk looks INTERNAL but you are sure it is your USB stick, type `{FORCE_TOKEN}`. Then type `{CONFIRM_TOKEN}` to erase it. Any other answer stops without changes."
    ));
    out.push(format!(
        "- The stick stays mounted at `/Volumes/{VOLUME_LABEL}`. Eject it from Finder once the script says it is done."
    ));
    out.push(String::new());

    out.push("## Step 2: repair the installed system".to_string());
    out.push(String::new());
    out.push(format!(
        "- Boot the broken machine from USB 1 into {live}, then plug in {VOLUME_LABEL}."
    ));
    out.push(format!(
        "- Open a terminal in the folder where {VOLUME_LABEL} is mounted and run:"
    ));
    out.push(String::new());
    out.push(format!("      sudo bash {SCRIPT_NAME}"));
    out.push(String::new());
    out.push(format!(
        "  Do **not** run `./{SCRIPT_NAME}`: FAT32 sticks are usually mounted without execute permission, so direct execution fails with \"Permission denied\" or \"command not found\". Invoking it through `sudo bash` always works."
    ));
    out.push(
        "- When asked, type the root partition of the installed system (for example `/dev/sda2`). The script never guesses it."
            .to_string(),
    );
    out.push(format!(
        "- It backs up `{GRUB_DEFAULTS}` to `{GRUB_DEFAULTS}.bak`, adds `nomodeset`, removes `splash`, and runs `{}`.",
        config.distro.grub_update_command()
    ));
    out.push(String::new());

    if config.include_optimizations {
        out.push("## Performance optimizations".to_string());
        out.push(String::new());
        out.push(format!(
            "- {} are added to `{SYSCTL_CONF}` unless already present. Older machines with little RAM swap less and keep more filesystem cache.",
            VM_TUNING
                .lines
                .iter()
                .map(|l| format!("`{l}`"))
                .collect::<Vec<_>>()
                .join(" and ")
        ));
        out.push(String::new());
    }

    out.push("## Troubleshooting".to_string());
    out.push(String::new());
    out.push(format!("### Linux does not show the {VOLUME_LABEL} stick"));
    out.push(String::new());
    out.push("- List drives and labels: `lsblk -o NAME,LABEL,SIZE,MOUNTPOINT`".to_string());
    out.push(format!(
        "- Mount it by label: `sudo mkdir -p /media/rescue && sudo mount -L {VOLUME_LABEL} /media/rescue`"
    ));
    out.push(format!(
        "- Find the script anywhere: `find / -name {SCRIPT_NAME} 2>/dev/null`"
    ));
    out.push(String::new());
    out.push("### \"Input/output error\"".to_string());
    out.push(String::new());
    out.push(
        "- A chroot `Input/output error` usually means the live USB you booted from is failing or lost contact."
            .to_string(),
    );
    out.push("- Plug the live USB into a different port and run the script again.".to_string());
    out.push("- If it persists, write a fresh installer USB.".to_string());
    out.push(
        "- It can also mean the internal disk is damaged: check the root partition with `fsck -y /dev/sda2` (use your partition) while it is unmounted."
            .to_string(),
    );
    out.push(String::new());
    out.push("### Undo".to_string());
    out.push(String::new());
    out.push(format!(
        "- Restore `{GRUB_DEFAULTS}.bak` over `{GRUB_DEFAULTS}` and regenerate the GRUB menu."
    ));
    out.push(String::new());
    out.push("When the script reports success, reboot without the USBs.".to_string());

    let mut text = out.join("\n");
    text.push('\n');
    text
}
