//! `repair_boot.sh`: runs from a live session and fixes the installed system via chroot.

use tracing::debug;

use crate::compose::edits::{GRAPHICS_SAFE_CMDLINE, GRUB_DEFAULTS, SYSCTL_CONF, VM_TUNING};
use crate::compose::shell::{comment_lines, ShellFile};
use crate::compose::template::{Slots, Template};
use crate::config::Configuration;
use crate::error::RescueError;

pub const SCRIPT_NAME: &str = "repair_boot.sh";
/// Where the installed root partition is mounted.
pub const MOUNT_POINT: &str = "/mnt";
/// Pseudo-filesystems bound into the chroot, in mount order.
pub const BIND_MOUNTS: [&str; 4] = ["dev", "proc", "sys", "run"];

const CHROOT_DELIMITER: &str = "CHROOT_EOF";

const SKELETON: Template = Template::new(
    "repair_boot.sh",
    r##"#!/bin/bash
#
# repair_boot.sh
# Repairs the boot configuration of an existing {{distro}} installation ({{arch}}).
# Run it from a live session, never from the installed system itself:
#
#     sudo bash repair_boot.sh
#
# Reported issue:
{{issue_comments}}
#
set -u

MOUNT_POINT="{{mount_point}}"
RED=$'\033[1;31m'
GREEN=$'\033[1;32m'
YELLOW=$'\033[1;33m'
RESET=$'\033[0m'

if [ "$(id -u)" -ne 0 ]; then
  echo "${RED}This script needs root. Run it as:  sudo bash repair_boot.sh${RESET}"
  exit 1
fi

cleanup() {
  echo "==> Unmounting"
  for fs in {{bind_mounts_reversed}}; do
    if mountpoint -q "$MOUNT_POINT/$fs"; then
      umount "$MOUNT_POINT/$fs" || umount -l "$MOUNT_POINT/$fs" || echo "${YELLOW}WARNING: could not unmount $MOUNT_POINT/$fs${RESET}"
    fi
  done
  if mountpoint -q "$MOUNT_POINT"; then
    umount "$MOUNT_POINT" || echo "${YELLOW}WARNING: could not unmount $MOUNT_POINT${RESET}"
  fi
}

report_chroot_failure() {
  local err_file="$1"
  local stage="$2"
  if grep -qi 'input/output error' "$err_file"; then
    echo ""
    echo "${RED}################################################################${RESET}"
    echo "${RED}  CRITICAL ERROR: Failed to enter system (Input/output error).${RESET}"
    echo "${RED}  The machine lost contact with a storage device. Likely causes:${RESET}"
    echo "${RED}   - the live USB you booted from is loose or failing${RESET}"
    echo "${RED}     (re-seat it, try another port, or write a fresh installer USB)${RESET}"
    echo "${RED}   - the RESCUE stick was pulled or is failing${RESET}"
    echo "${RED}   - the internal disk holding $ROOT_PART is failing${RESET}"
    echo "${RED}     (after unmounting, check it with: fsck -y $ROOT_PART)${RESET}"
    echo "${RED}################################################################${RESET}"
  else
    echo "${RED}ERROR: the chroot failed while trying to $stage:${RESET}"
    cat "$err_file"
  fi
  rm -f "$err_file"
}

echo "==> Partitions on this machine:"
lsblk -o NAME,SIZE,FSTYPE,LABEL,MOUNTPOINT
echo ""
echo "Enter the ROOT partition of the installed {{distro}} system (for example /dev/sda2)."
echo "Do not choose the live USB or the RESCUE stick."
ROOT_PART=""
read -r -p "Root partition: " ROOT_PART
if [ -z "$ROOT_PART" ]; then
  echo "${RED}No partition given. Nothing was changed.${RESET}"
  exit 1
fi
case "$ROOT_PART" in
  /dev/*) ;;
  *) ROOT_PART="/dev/$ROOT_PART" ;;
esac
if [ ! -b "$ROOT_PART" ]; then
  echo "${RED}ERROR: $ROOT_PART is not a block device. Nothing was changed.${RESET}"
  exit 1
fi

echo "==> Mounting $ROOT_PART at $MOUNT_POINT"
mkdir -p "$MOUNT_POINT"
if ! mount "$ROOT_PART" "$MOUNT_POINT"; then
  echo "${RED}ERROR: could not mount $ROOT_PART.${RESET}"
  exit 1
fi
if [ ! -f "$MOUNT_POINT{{grub_file}}" ]; then
  echo "${RED}ERROR: $ROOT_PART has no {{grub_file}}; it is not the installed system.${RESET}"
  cleanup
  exit 1
fi

for fs in {{bind_mounts}}; do
  if ! mount --bind "/$fs" "$MOUNT_POINT/$fs"; then
    echo "${RED}ERROR: could not bind-mount /$fs.${RESET}"
    cleanup
    exit 1
  fi
done

CHROOT_ERR="$(mktemp)"
echo "==> Entering the installed system"
if ! chroot "$MOUNT_POINT" /bin/true 2>"$CHROOT_ERR"; then
  report_chroot_failure "$CHROOT_ERR" "enter the installed system"
  cleanup
  exit 1
fi

chroot "$MOUNT_POINT" /bin/bash -s 2>"$CHROOT_ERR" <<'{{chroot_delimiter}}'
{{chroot_payload}}
{{chroot_delimiter}}
CHROOT_STATUS=$?
if [ "$CHROOT_STATUS" -ne 0 ]; then
  report_chroot_failure "$CHROOT_ERR" "repair the boot configuration"
  cleanup
  exit 1
fi
cat "$CHROOT_ERR" >&2
rm -f "$CHROOT_ERR"

cleanup
echo ""
echo "${GREEN}Success. Reboot without the USBs.${RESET}"
"##,
);

/// Builds the complete repair script for `config`.
pub fn compose(config: &Configuration) -> Result<String, RescueError> {
    let payload = chroot_payload(config)?;
    let payload = payload.trim_end_matches('\n');
    let issue = comment_lines(&config.issue_description).join("\n");
    let binds = BIND_MOUNTS.join(" ");
    let binds_reversed = BIND_MOUNTS.iter().rev().copied().collect::<Vec<_>>().join(" ");

    let slots: Slots = [
        ("distro", config.distro.display_name()),
        ("arch", config.architecture.as_str()),
        ("issue_comments", issue.as_str()),
        ("mount_point", MOUNT_POINT),
        ("grub_file", GRUB_DEFAULTS),
        ("bind_mounts", binds.as_str()),
        ("bind_mounts_reversed", binds_reversed.as_str()),
        ("chroot_delimiter", CHROOT_DELIMITER),
        ("chroot_payload", payload),
    ]
    .into_iter()
    .collect();

    let script = SKELETON.render(&slots)?;
    debug!(bytes = script.len(), distro = %config.distro, "repair script composed");
    Ok(script)
}

/// Commands run by `bash -s` inside the chroot.
pub fn chroot_payload(config: &Configuration) -> Result<String, RescueError> {
    let mut sf = ShellFile::new();
    sf.push("set -e")
        .push(format!("GRUB_FILE=\"{GRUB_DEFAULTS}\""))
        .push("if [ -f \"$GRUB_FILE.bak\" ]; then")
        .push("  echo \"Keeping the existing backup $GRUB_FILE.bak\"")
        .push("else")
        .push("  cp -a \"$GRUB_FILE\" \"$GRUB_FILE.bak\"")
        .push("  echo \"Backed up $GRUB_FILE to $GRUB_FILE.bak\"")
        .push("fi")
        .extend(GRAPHICS_SAFE_CMDLINE.shell_lines("\"$GRUB_FILE\""))
        .push("echo \"Kernel command line is now:\"")
        .push("grep '^GRUB_CMDLINE_LINUX_DEFAULT=' \"$GRUB_FILE\"")
        .extend(GRAPHICS_SAFE_CMDLINE.verify_lines("\"$GRUB_FILE\""))
        .push("echo \"Regenerating the GRUB menu...\"")
        .push(config.distro.grub_update_command());

    if config.include_optimizations {
        sf.push(format!("SYSCTL_FILE=\"{SYSCTL_CONF}\""))
            .extend(VM_TUNING.shell_lines("\"$SYSCTL_FILE\""))
            .push(format!(
                "echo \"Applied performance optimizations: {}.\"",
                VM_TUNING.lines.join(", ")
            ));
    }

    sf.build()
}
