//! Version gate.
//!
//! Classifies a remote version against the active bundle's version by
//! comparing parsed major components.

use ota_types::UpdateClass;

/// Classify `remote` against `current`.
///
/// With `breaking_gate` enabled, a differing major component yields
/// [`UpdateClass::Major`]; unparseable versions fall through to a plain
/// string comparison.
pub fn classify(remote: &str, current: &str, breaking_gate: bool) -> UpdateClass {
    let remote = remote.trim();
    let current = current.trim();
    if remote == current {
        return UpdateClass::Ignore;
    }

    if breaking_gate {
        if let (Some(r), Some(c)) = (parse_major(remote), parse_major(current)) {
            if r != c {
                return UpdateClass::Major;
            }
        }
    }
    UpdateClass::Normal
}

/// Major component of a version string.
///
/// Strict semver first, then the leading integer of the first dotted
/// component (`v2`, `3.1`, `4.0.0-beta+7`).
pub fn parse_major(version: &str) -> Option<u64> {
    let trimmed = version.trim();
    let stripped = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    if let Ok(parsed) = semver::Version::parse(stripped) {
        return Some(parsed.major);
    }

    let head = stripped.split('.').next()?;
    let digits: String = head.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
