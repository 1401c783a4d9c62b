//! Input normalization and validation.
//!
//! Pure: no I/O, no global state. Every rewrite of the disk designator is
//! recorded as a [`Warning`] so the operator-facing text can disclose it.

use tracing::debug;

use crate::config::{Architecture, Configuration, Distro, RawConfig, Warning};
use crate::error::RescueError;

/// Validates `raw` and returns the normalized configuration plus any notices.
pub fn validate(raw: &RawConfig) -> Result<(Configuration, Vec<Warning>), RescueError> {
    let (disk, warnings) = normalize_disk(&raw.disk_designator)?;
    let distro: Distro = raw.distro.parse()?;
    let architecture: Architecture = raw.architecture.parse()?;

    debug!(%disk, %distro, warnings = warnings.len(), "configuration validated");

    Ok((
        Configuration {
            disk,
            distro,
            issue_description: raw.issue_description.clone(),
            architecture,
            include_optimizations: raw.include_optimizations,
        },
        warnings,
    ))
}

/// Reduces a macOS disk designator to its whole-disk form (`disk<N>`).
///
/// Accepts `disk4`, `disk4s1`, `/dev/disk4`, `/dev/rdisk4s2`.
pub fn normalize_disk(input: &str) -> Result<(String, Vec<Warning>), RescueError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(RescueError::invalid("disk designator", "must not be empty"));
    }

    let mut warnings = Vec::new();
    let mut current = trimmed.to_string();

    if let Some(rest) = current.strip_prefix("/dev/") {
        let bare = match rest.strip_prefix('r') {
            Some(raw) if raw.starts_with("disk") => raw,
            _ => rest,
        };
        let bare = bare.to_string();
        warnings.push(Warning::DevicePathStripped {
            original: current.clone(),
            normalized: bare.clone(),
        });
        current = bare;
    }

    let Some((base, partition)) = split_designator(&current) else {
        return Err(RescueError::invalid(
            "disk designator",
            format!("'{}' is not a disk identifier like disk4 or disk4s1", trimmed),
        ));
    };

    if partition.is_some() {
        let base = base.to_string();
        debug!(original = %current, normalized = %base, "partition suffix stripped");
        warnings.push(Warning::PartitionSuffixStripped {
            original: current.clone(),
            normalized: base.clone(),
        });
        current = base;
    }

    Ok((current, warnings))
}

/// Returns `true` for a bare whole-disk identifier such as `disk4`.
pub fn is_whole_disk(designator: &str) -> bool {
    matches!(split_designator(designator), Some((_, None)))
}

/// Splits `disk<N>[s<M>]` into (`disk<N>`, `Some("s<M>")`).
fn split_designator(s: &str) -> Option<(&str, Option<&str>)> {
    let digits = s.strip_prefix("disk")?;
    let unit_len = digits.bytes().take_while(u8::is_ascii_digit).count();
    if unit_len == 0 {
        return None;
    }

    let base = &s[.."disk".len() + unit_len];
    let suffix = &digits[unit_len..];
    if suffix.is_empty() {
        return Some((base, None));
    }

    let part = suffix.strip_prefix('s')?;
    if !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()) {
        Some((base, Some(suffix)))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(disk: &str) -> RawConfig {
        RawConfig {
            disk_designator: disk.to_string(),
            ..RawConfig::default()
        }
    }

    #[test]
    fn whole_disk_passes_unchanged_without_warning() {
        for disk in ["disk0", "disk4", "disk12"] {
            let (normalized, warnings) = normalize_disk(disk).unwrap();
            assert_eq!(normalized, disk);
            assert!(warnings.is_empty());
        }
    }

    #[test]
    fn partition_suffix_is_stripped_and_recorded() {
        for (input, base) in [("disk4s1", "disk4"), ("disk2s10", "disk2"), ("disk13s2", "disk13")] {
            let (normalized, warnings) = normalize_disk(input).unwrap();
            assert_eq!(normalized, base);
            assert_eq!(
                warnings,
                vec![Warning::PartitionSuffixStripped {
                    original: input.to_string(),
                    normalized: base.to_string(),
                }]
            );
        }
    }

    #[test]
    fn device_paths_are_reduced_with_notice() {
        let (normalized, warnings) = normalize_disk("/dev/rdisk3s1").unwrap();
        assert_eq!(normalized, "disk3");
        assert_eq!(warnings.len(), 2);
        assert!(matches!(warnings[0], Warning::DevicePathStripped { .. }));
        assert!(matches!(warnings[1], Warning::PartitionSuffixStripped { .. }));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let (normalized, warnings) = normalize_disk("  disk4\n").unwrap();
        assert_eq!(normalized, "disk4");
        assert!(warnings.is_empty());
    }

    #[test]
    fn empty_or_malformed_designators_are_rejected() {
        for bad in ["", "   ", "disk", "sda", "disk4s", "disk4p1", "disk4; rm -rf /", "$(reboot)"] {
            let err = normalize_disk(bad).unwrap_err();
            assert!(
                matches!(err, RescueError::InvalidConfig { .. }),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn validate_rejects_unknown_distro() {
        let mut r = raw("disk4");
        r.distro = "Slackware".to_string();
        assert!(matches!(
            validate(&r),
            Err(RescueError::InvalidConfig { field: "distro", .. })
        ));
    }

    #[test]
    fn validate_passes_flags_through() {
        let mut r = raw("disk5s2");
        r.include_optimizations = true;
        r.distro = "Linux Mint".to_string();
        let (cfg, warnings) = validate(&r).unwrap();
        assert_eq!(cfg.disk, "disk5");
        assert_eq!(cfg.distro, Distro::LinuxMint);
        assert!(cfg.include_optimizations);
        assert_eq!(warnings.len(), 1);
        assert!(is_whole_disk(&cfg.disk));
    }
}
