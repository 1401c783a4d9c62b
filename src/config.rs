use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RescueError;

/// Issue text pre-filled by the wizard when the operator has nothing better.
pub const DEFAULT_ISSUE: &str =
    "Graphics issues during login on old MacBook Pro (suspected Grub/GPU driver issue).";

/// USB identifier suggested on a Mac with one internal disk and one stick.
pub const DEFAULT_DISK: &str = "disk4";

// ── Raw input ─────────────────────────────────────────────────────────────────

/// Un-validated generation request, exactly as the operator (or a JSON file) gave it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    #[serde(alias = "diskDesignator", alias = "diskIdentifier")]
    pub disk_designator: String,
    #[serde(alias = "linuxDistro")]
    pub distro: String,
    #[serde(alias = "issueDescription")]
    pub issue_description: String,
    #[serde(alias = "targetArchitecture")]
    pub architecture: String,
    #[serde(alias = "includeOptimizations")]
    pub include_optimizations: bool,
}

impl Default for RawConfig {
    fn default() -> Self {
        RawConfig {
            disk_designator: DEFAULT_DISK.to_string(),
            distro: Distro::Ubuntu.display_name().to_string(),
            issue_description: DEFAULT_ISSUE.to_string(),
            architecture: Architecture::X86_64.as_str().to_string(),
            include_optimizations: false,
        }
    }
}

// ── Validated configuration ───────────────────────────────────────────────────

/// Validated, normalized parameters. Only `validate::validate` builds one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    /// Whole-disk designator, e.g. `disk4`.
    pub disk: String,
    pub distro: Distro,
    pub issue_description: String,
    pub architecture: Architecture,
    pub include_optimizations: bool,
}

// ── Distro ────────────────────────────────────────────────────────────────────

/// Distribution installed on the broken machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Distro {
    Ubuntu,
    Debian,
    Fedora,
    LinuxMint,
    ArchLinux,
}

impl Distro {
    pub const ALL: [Distro; 5] = [
        Distro::Ubuntu,
        Distro::Debian,
        Distro::Fedora,
        Distro::LinuxMint,
        Distro::ArchLinux,
    ];

    /// Human-readable label shown to the operator.
    pub fn display_name(self) -> &'static str {
        match self {
            Distro::Ubuntu => "Ubuntu",
            Distro::Debian => "Debian",
            Distro::Fedora => "Fedora",
            Distro::LinuxMint => "Linux Mint",
            Distro::ArchLinux => "Arch Linux",
        }
    }

    /// Command that regenerates the GRUB menu from `/etc/default/grub`.
    pub fn grub_update_command(self) -> &'static str {
        match self {
            Distro::Ubuntu | Distro::Debian | Distro::LinuxMint => "update-grub",
            Distro::Fedora => "grub2-mkconfig -o /boot/grub2/grub.cfg",
            Distro::ArchLinux => "grub-mkconfig -o /boot/grub/grub.cfg",
        }
    }

    /// How the distro's installer media calls its live session.
    pub fn live_session(self) -> &'static str {
        match self {
            Distro::Ubuntu => "\"Try Ubuntu\"",
            Distro::Debian => "the Debian live session",
            Distro::Fedora => "\"Try Fedora\"",
            Distro::LinuxMint => "the Linux Mint live desktop",
            Distro::ArchLinux => "the Arch Linux live ISO shell",
        }
    }
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Distro {
    type Err = RescueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();

        match key.as_str() {
            "ubuntu" => Ok(Distro::Ubuntu),
            "debian" => Ok(Distro::Debian),
            "fedora" => Ok(Distro::Fedora),
            "linuxmint" | "mint" => Ok(Distro::LinuxMint),
            "archlinux" | "arch" => Ok(Distro::ArchLinux),
            _ => Err(RescueError::invalid(
                "distro",
                format!(
                    "'{}' is not supported (expected one of: Ubuntu, Debian, Fedora, Linux Mint, Arch Linux)",
                    s.trim()
                ),
            )),
        }
    }
}

// ── Architecture ──────────────────────────────────────────────────────────────

/// Target CPU architecture. Only one variant today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Architecture {
    X86_64,
}

impl Architecture {
    pub fn as_str(self) -> &'static str {
        match self {
            Architecture::X86_64 => "x86_64",
        }
    }
}

impl FromStr for Architecture {
    type Err = RescueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "x86_64" => Ok(Architecture::X86_64),
            other => Err(RescueError::invalid(
                "architecture",
                format!("'{}' is not supported (only x86_64)", other),
            )),
        }
    }
}

// ── Warnings ──────────────────────────────────────────────────────────────────

/// Non-fatal notice produced while normalizing input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A partition identifier (`disk4s1`) was reduced to its whole disk (`disk4`).
    PartitionSuffixStripped { original: String, normalized: String },
    /// A device path (`/dev/disk4`, `/dev/rdisk4`) was reduced to its bare identifier.
    DevicePathStripped { original: String, normalized: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::PartitionSuffixStripped {
                original,
                normalized,
            } => write!(
                f,
                "'{}' names a partition; the whole disk '{}' will be erased instead.",
                original, normalized
            ),
            Warning::DevicePathStripped {
                original,
                normalized,
            } => write!(
                f,
                "'{}' was given as a device path; using the identifier '{}'.",
                original, normalized
            ),
        }
    }
}
