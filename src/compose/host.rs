//! `create_fix_usb.command`: runs on the Mac, erases the USB stick and writes
//! the repair script onto it.

use tracing::debug;

use crate::compose::repair::SCRIPT_NAME;
use crate::compose::shell::{comment_lines, single_quote};
use crate::compose::template::{Slots, Template};
use crate::config::{Configuration, Warning};
use crate::error::RescueError;
use crate::safety::DiskSafetyPolicy;
use crate::validate::is_whole_disk;

/// File name the presentation layer should give the host script.
pub const HOST_SCRIPT_NAME: &str = "create_fix_usb.command";
/// Label of the freshly formatted stick; macOS mounts it at `/Volumes/<label>`.
pub const VOLUME_LABEL: &str = "RESCUE";
/// Filesystem and partition scheme every live environment's bootloader can read.
pub const FILESYSTEM: &str = "FAT32";
pub const PARTITION_SCHEME: &str = "MBRFormat";
/// Marker argument carried across the single `sudo` re-exec.
pub const ELEVATION_MARKER: &str = "--rescue-elevated";

const DISK_VAR: &str = "TARGET_DISK";
const ABORT_FN: &str = "pause_and_exit";
const PAYLOAD_DELIMITER: &str = "RESCUE_REPAIR_EOF";

const SKELETON: Template = Template::new(
    "create_fix_usb.command",
    r##"#!/bin/bash
#
# create_fix_usb.command
# Prepares the {{volume}} USB stick that carries {{script_name}} for a broken
# {{distro}} ({{arch}}) installation. Double-click it in Finder, or run:
#
#     bash create_fix_usb.command
#
# Reported issue:
{{issue_comments}}
#
set -u

RED=$'\033[1;31m'
YELLOW=$'\033[1;33m'
GREEN=$'\033[1;32m'
RESET=$'\033[0m'

pause_and_exit() {
  echo ""
  IFS= read -r -p "Press [Enter] to exit..." _ || true
  exit "${1:-0}"
}

{{elevation}}

DEFAULT_DISK="{{default_disk}}"
VOLUME_NAME="{{volume}}"
VOLUME_PATH="/Volumes/{{volume}}"
SCRIPT_PATH="$VOLUME_PATH/{{script_name}}"
{{notices}}
echo "==> External disks attached to this Mac:"
diskutil list external
echo ""

TARGET_DISK=""
read -r -p "Target USB disk identifier [$DEFAULT_DISK]: " TARGET_DISK
TARGET_DISK="${TARGET_DISK:-$DEFAULT_DISK}"
{{normalize}}
{{volume_guard}}

{{safety_gate}}

echo "==> Waiting for $VOLUME_PATH to mount"
for _ in 1 2 3 4 5 6 7 8 9 10; do
  [ -d "$VOLUME_PATH" ] && break
  sleep 1
done
if [ ! -d "$VOLUME_PATH" ]; then
  echo "${RED}ERROR: $VOLUME_PATH did not appear after formatting.${RESET}"
  pause_and_exit 1
fi

echo "==> Writing $SCRIPT_PATH"
cat > "$SCRIPT_PATH" <<'{{delimiter}}'
{{repair_script}}{{delimiter}}
chmod +x "$SCRIPT_PATH"

echo "==> Contents of $VOLUME_PATH:"
ls -l "$VOLUME_PATH"
if [ ! -s "$SCRIPT_PATH" ]; then
  echo "${RED}ERROR: {{script_name}} is missing or empty on the stick.${RESET}"
  pause_and_exit 1
fi

echo ""
echo "${GREEN}Script created. Please eject '$VOLUME_NAME' manually when ready.${RESET}"
echo "On the broken machine: boot the live USB, plug in $VOLUME_NAME, then run"
echo "    sudo bash {{script_name}}"
pause_and_exit 0
"##,
);

/// Builds the host script embedding `repair_script` byte for byte.
pub fn compose(
    config: &Configuration,
    repair_script: &str,
    warnings: &[Warning],
) -> Result<String, RescueError> {
    if !is_whole_disk(&config.disk) {
        return Err(RescueError::invalid(
            "disk designator",
            format!("'{}' is not a whole-disk identifier", config.disk),
        ));
    }
    if !repair_script.ends_with('\n') {
        return Err(RescueError::Template(
            "repair script must end with a newline to be embedded".to_string(),
        ));
    }

    let delimiter = choose_delimiter(repair_script);
    let issue = comment_lines(&config.issue_description).join("\n");
    let elevation = elevation_lines().join("\n");
    let normalize = normalize_lines(DISK_VAR).join("\n");
    let notices = notice_lines(warnings).join("\n");
    let volume_guard = volume_guard_lines().join("\n");
    let gate = DiskSafetyPolicy { abort_fn: ABORT_FN }
        .render(DISK_VAR, &erase_lines(DISK_VAR))
        .join("\n");

    let slots: Slots = [
        ("volume", VOLUME_LABEL),
        ("script_name", SCRIPT_NAME),
        ("distro", config.distro.display_name()),
        ("arch", config.architecture.as_str()),
        ("issue_comments", issue.as_str()),
        ("elevation", elevation.as_str()),
        ("default_disk", config.disk.as_str()),
        ("notices", notices.as_str()),
        ("normalize", normalize.as_str()),
        ("volume_guard", volume_guard.as_str()),
        ("safety_gate", gate.as_str()),
        ("delimiter", delimiter.as_str()),
        ("repair_script", repair_script),
    ]
    .into_iter()
    .collect();

    let script = SKELETON.render(&slots)?;
    debug!(bytes = script.len(), disk = %config.disk, %delimiter, "host script composed");
    Ok(script)
}

/// Re-runs the script through `sudo` once; a second unprivileged pass gives up.
pub fn elevation_lines() -> Vec<String> {
    vec![
        format!("ELEVATION_MARKER=\"{ELEVATION_MARKER}\""),
        "if [ \"$(id -u)\" -ne 0 ]; then".to_string(),
        "  if [ \"${1:-}\" = \"$ELEVATION_MARKER\" ]; then".to_string(),
        "    echo \"${RED}ERROR: still not running as root after sudo; giving up.${RESET}\"".to_string(),
        format!("    {ABORT_FN} 1"),
        "  fi".to_string(),
        "  echo \"Administrator rights are needed to format the USB stick.\"".to_string(),
        "  echo \"macOS will now ask for your password.\"".to_string(),
        "  exec sudo /bin/bash \"$0\" \"$ELEVATION_MARKER\" ${1+\"$@\"}".to_string(),
        "  echo \"${RED}ERROR: could not re-run this script through sudo.${RESET}\"".to_string(),
        format!("  {ABORT_FN} 1"),
        "fi".to_string(),
        "if [ \"${1:-}\" = \"$ELEVATION_MARKER\" ]; then".to_string(),
        "  shift".to_string(),
        "fi".to_string(),
    ]
}

/// Applies the same whole-disk reduction as `validate::normalize_disk` to the
/// operator's typed answer, announcing every change.
pub fn normalize_lines(var: &str) -> Vec<String> {
    vec![
        format!("case \"${var}\" in"),
        format!("  /dev/*) {var}=\"${{{var}#/dev/}}\" ;;"),
        "esac".to_string(),
        format!("case \"${var}\" in"),
        format!("  rdisk*) {var}=\"${{{var}#r}}\" ;;"),
        "esac".to_string(),
        format!("if [[ \"${var}\" =~ ^(disk[0-9]+)s[0-9]+$ ]]; then"),
        format!(
            "  echo \"${{YELLOW}}WARNING: '${var}' is a partition; using the whole disk '${{BASH_REMATCH[1]}}' instead.${{RESET}}\""
        ),
        format!("  {var}=\"${{BASH_REMATCH[1]}}\""),
        "fi".to_string(),
        format!("if ! [[ \"${var}\" =~ ^disk[0-9]+$ ]]; then"),
        format!(
            "  echo \"${{RED}}ERROR: '${var}' is not a whole-disk identifier such as disk4.${{RESET}}\""
        ),
        format!("  {ABORT_FN} 1"),
        "fi".to_string(),
        format!("echo \"Target: /dev/${var}\""),
    ]
}

/// Stops before the erase while a volume already sits at `$VOLUME_PATH`, so
/// the wait loop can only ever see the freshly formatted stick.
pub fn volume_guard_lines() -> Vec<String> {
    vec![
        "if [ -e \"$VOLUME_PATH\" ]; then".to_string(),
        "  echo \"${RED}ERROR: $VOLUME_PATH is already mounted.${RESET}\"".to_string(),
        "  echo \"Eject that volume in Finder, then run this script again.\"".to_string(),
        format!("  {ABORT_FN} 1"),
        "fi".to_string(),
    ]
}

/// The destructive step. Only ever emitted through `DiskSafetyPolicy::render`.
fn erase_lines(var: &str) -> Vec<String> {
    vec![
        format!("echo \"==> Erasing /dev/${var} as {FILESYSTEM} ({PARTITION_SCHEME}) named {VOLUME_LABEL}\""),
        format!("if ! diskutil eraseDisk {FILESYSTEM} {VOLUME_LABEL} {PARTITION_SCHEME} \"/dev/${var}\"; then"),
        "  echo \"${RED}ERROR: erasing the disk failed.${RESET}\"".to_string(),
        format!("  {ABORT_FN} 1"),
        "fi".to_string(),
    ]
}

fn notice_lines(warnings: &[Warning]) -> Vec<String> {
    warnings
        .iter()
        .map(|w| {
            format!(
                "printf '%sNOTE: %s%s\\n' \"$YELLOW\" {} \"$RESET\"",
                single_quote(&w.to_string())
            )
        })
        .collect()
}

/// Heredoc delimiter that no line of `payload` equals.
pub fn choose_delimiter(payload: &str) -> String {
    let taken = |d: &str| payload.lines().any(|l| l == d);
    if !taken(PAYLOAD_DELIMITER) {
        return PAYLOAD_DELIMITER.to_string();
    }
    (1..)
        .map(|n| format!("{PAYLOAD_DELIMITER}_{n}"))
        .find(|d| !taken(d))
        .unwrap_or_else(|| PAYLOAD_DELIMITER.to_string())
}

/// Recovers the embedded payload from a composed host script.
pub fn extract_payload(host_script: &str) -> Option<&str> {
    let marker = "cat > \"$SCRIPT_PATH\" <<'";
    let start = host_script.find(marker)? + marker.len();
    let rest = &host_script[start..];
    let delim_end = rest.find("'\n")?;
    let delimiter = &rest[..delim_end];
    let body = &rest[delim_end + 2..];

    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        if line.trim_end_matches('\n') == delimiter {
            return Some(&body[..offset]);
        }
        offset += line.len();
    }
    None
}
