//! Semantic version parsing and ordering.
//!
//! Versions are exactly three dot-separated non-negative integers
//! (`MAJOR.MINOR.PATCH`). Anything else, including a leading `v`, is
//! rejected with [`InvalidVersionFormat`].

pub mod marker;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid version format: {0:?} (expected X.Y.Z)")]
pub struct InvalidVersionFormat(pub String);

/// A `MAJOR.MINOR.PATCH` version. Ordering is lexicographic on the three
/// components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemanticVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }

    /// Parse a version string such as `"1.0.8"`.
    pub fn parse(text: &str) -> Result<Self, InvalidVersionFormat> {
        let invalid = || InvalidVersionFormat(text.to_string());

        let parts: Vec<&str> = text.split('.').collect();
        if parts.len() != 3 {
            return Err(invalid());
        }

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            // u64::from_str accepts a leading '+', so check digits first
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            *slot = part.parse().map_err(|_| invalid())?;
        }

        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }

    /// Returns true if `self` is strictly newer than `current`.
    pub fn is_newer_than(&self, current: &SemanticVersion) -> bool {
        compare(self, current) == Ordering::Greater
    }

    /// Bump the patch component. Never rolls over into minor; `None` when
    /// the patch number is already at its maximum.
    pub fn increment_patch(&self) -> Option<Self> {
        let patch = self.patch.checked_add(1)?;
        Some(Self::new(self.major, self.minor, patch))
    }
}

/// Compare two versions component-wise.
pub fn compare(a: &SemanticVersion, b: &SemanticVersion) -> Ordering {
    a.cmp(b)
}

/// Returns true if `candidate` is strictly newer than `current`.
/// Equal versions are not newer.
pub fn is_newer(candidate: &SemanticVersion, current: &SemanticVersion) -> bool {
    candidate.is_newer_than(current)
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemanticVersion {
    type Err = InvalidVersionFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SemanticVersion {
    type Error = InvalidVersionFormat;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SemanticVersion> for String {
    fn from(value: SemanticVersion) -> Self {
        value.to_string()
    }
}
