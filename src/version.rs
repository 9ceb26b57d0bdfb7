//! Lenient version parsing and comparison for mod and game versions.
//!
//! Mod authors write versions like `1.2`, `v1.19.03` or `2.0.0-rc.1`. Everything is
//! normalized to strict SemVer before comparison so ordering follows SemVer precedence.

use semver::Version;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid version '{input}': {reason}")]
pub struct VersionError {
    pub input: String,
    pub reason: String,
}

/// A normalized semantic version. Build metadata is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModVersion(Version);

impl ModVersion {
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let normalized = normalize(raw).ok_or_else(|| VersionError {
            input: raw.to_string(),
            reason: "empty version".to_string(),
        })?;
        Version::parse(&normalized)
            .map(ModVersion)
            .map_err(|e| VersionError {
                input: raw.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn is_prerelease(&self) -> bool {
        !self.0.pre.is_empty()
    }
}

impl Ord for ModVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for ModVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ModVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ModVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Strip leading zeros from an all-digit identifier (`03` -> `3`, `00` -> `0`).
fn strip_leading_zeros(part: &str) -> String {
    if !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()) {
        let trimmed = part.trim_start_matches('0');
        if trimmed.is_empty() {
            "0".to_string()
        } else {
            trimmed.to_string()
        }
    } else {
        part.to_string()
    }
}

/// Rewrite a loosely formatted version into strict SemVer text. Returns None for blank input.
fn normalize(raw: &str) -> Option<String> {
    let s = raw.trim();
    let s = s
        .strip_prefix('v')
        .or_else(|| s.strip_prefix('V'))
        .unwrap_or(s);
    let s = s.split('+').next().unwrap_or(s).trim();
    if s.is_empty() {
        return None;
    }
    let (core, pre) = match s.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (s, None),
    };
    let mut parts: Vec<String> = core.split('.').map(strip_leading_zeros).collect();
    while parts.len() < 3 {
        parts.push("0".to_string());
    }
    let mut out = parts.join(".");
    if let Some(pre) = pre {
        let pre: Vec<String> = pre.split('.').map(strip_leading_zeros).collect();
        out.push('-');
        out.push_str(&pre.join("."));
    }
    Some(out)
}

/// Game version from a release tag such as `v1.19.3`. None when the tag is not a version.
pub fn game_version_from_tag(tag: &str) -> Option<ModVersion> {
    ModVersion::parse(tag).ok()
}

/// Lowest game version a release is tagged for.
pub fn min_game_version<S: AsRef<str>>(tags: &[S]) -> Option<ModVersion> {
    tags.iter()
        .filter_map(|t| game_version_from_tag(t.as_ref()))
        .min()
}

/// True when the release's lowest game version does not exceed the configured limit.
/// Releases without game version tags are always allowed.
pub fn within_game_limit(required: Option<&ModVersion>, limit: &ModVersion) -> bool {
    required.map_or(true, |r| r <= limit)
}

/// Compare an installed version with the repository's.
pub fn compare_local_online(local: &str, online: &str) -> Result<Ordering, VersionError> {
    let local = ModVersion::parse(local)?;
    let online = ModVersion::parse(online)?;
    Ok(local.cmp(&online))
}
