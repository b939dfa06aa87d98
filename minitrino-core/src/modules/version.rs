//! Engine distributions, versions and module version ranges.

use crate::error::{MinitrinoError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Sentinel used in metadata to mean "no upper bound".
pub const UNBOUNDED_VERSION: u32 = 9999;

/// Engine distribution a cluster runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    #[default]
    Trino,
    Starburst,
}

impl Distribution {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trino => "trino",
            Self::Starburst => "starburst",
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Distribution {
    type Err = MinitrinoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trino" => Ok(Self::Trino),
            "starburst" => Ok(Self::Starburst),
            other => Err(MinitrinoError::InvalidInput {
                reason: format!("unknown distribution '{}', expected trino or starburst", other),
            }),
        }
    }
}

/// A concrete engine version, e.g. `476` (Trino) or `443-e.9` (Starburst).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EngineVersion {
    /// Numeric release, compared against module ranges.
    pub release: u32,
    /// Starburst patch level (`-e.<patch>`), zero otherwise.
    pub patch: u32,
    raw: String,
}

impl EngineVersion {
    /// Parse a version for the given distribution.
    pub fn parse(raw: &str, dist: Distribution) -> Result<Self> {
        let raw = raw.trim();
        let invalid = |why: &str| MinitrinoError::InvalidInput {
            reason: format!("invalid {} version '{}': {}", dist, raw, why),
        };

        let (release, suffix) = match raw.split_once('-') {
            Some((release, suffix)) => (release, Some(suffix)),
            None => (raw, None),
        };
        let release: u32 = release.parse().map_err(|_| invalid("release must be numeric"))?;

        let patch = match (dist, suffix) {
            (Distribution::Trino, None) => 0,
            (Distribution::Trino, Some(_)) => return Err(invalid("unexpected suffix")),
            (Distribution::Starburst, None) => return Err(invalid("expected NNN-e[.P]")),
            (Distribution::Starburst, Some(suffix)) => match suffix.strip_prefix('e') {
                Some("") => 0,
                Some(rest) => rest
                    .strip_prefix('.')
                    .and_then(|p| p.parse().ok())
                    .ok_or_else(|| invalid("patch must be numeric"))?,
                None => return Err(invalid("expected NNN-e[.P]")),
            },
        };

        Ok(Self { release, patch, raw: raw.to_string() })
    }

    /// The version as written by the operator.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialOrd for EngineVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EngineVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.release, self.patch).cmp(&(other.release, other.patch))
    }
}

/// Inclusive release range a module supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRange {
    pub min: u32,
    /// `None` when unbounded.
    pub max: Option<u32>,
}

impl VersionRange {
    /// Build a range from the metadata `versions` list.
    ///
    /// Returns `Ok(None)` for an empty list (unconstrained).
    pub fn from_bounds(bounds: &[String]) -> std::result::Result<Option<Self>, String> {
        let parse = |s: &String| {
            s.trim().parse::<u32>().map_err(|_| format!("'{}' is not a numeric release", s))
        };

        match bounds {
            [] => Ok(None),
            [min] => Ok(Some(Self { min: parse(min)?, max: None })),
            [min, max] => {
                let min = parse(min)?;
                let max = parse(max)?;
                if max < min {
                    return Err(format!("max {} is below min {}", max, min));
                }
                let max = (max < UNBOUNDED_VERSION).then_some(max);
                Ok(Some(Self { min, max }))
            }
            _ => Err(format!("expected at most 2 entries, found {}", bounds.len())),
        }
    }

    /// Whether the version's release falls inside the range.
    pub fn contains(&self, version: &EngineVersion) -> bool {
        self.min <= version.release && self.max.map_or(true, |max| version.release <= max)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "[{}, {}]", self.min, max),
            None => write!(f, "[{}, latest]", self.min),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_trino_version() {
        let v = EngineVersion::parse("476", Distribution::Trino).unwrap();
        assert_eq!(v.release, 476);
        assert_eq!(v.patch, 0);
        assert!(EngineVersion::parse("476-e", Distribution::Trino).is_err());
        assert!(EngineVersion::parse("latest", Distribution::Trino).is_err());
    }

    #[test]
    fn test_parse_starburst_version() {
        let v = EngineVersion::parse("443-e.9", Distribution::Starburst).unwrap();
        assert_eq!((v.release, v.patch), (443, 9));
        let v = EngineVersion::parse("443-e", Distribution::Starburst).unwrap();
        assert_eq!((v.release, v.patch), (443, 0));
        assert!(EngineVersion::parse("443", Distribution::Starburst).is_err());
        assert!(EngineVersion::parse("443-x.1", Distribution::Starburst).is_err());
    }

    #[test]
    fn test_version_ordering() {
        let a = EngineVersion::parse("443-e.1", Distribution::Starburst).unwrap();
        let b = EngineVersion::parse("443-e.9", Distribution::Starburst).unwrap();
        let c = EngineVersion::parse("453-e", Distribution::Starburst).unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_range_from_bounds() {
        assert_eq!(VersionRange::from_bounds(&[]).unwrap(), None);
        assert_eq!(
            VersionRange::from_bounds(&bounds(&["413"])).unwrap(),
            Some(VersionRange { min: 413, max: None })
        );
        assert_eq!(
            VersionRange::from_bounds(&bounds(&["413", "9999"])).unwrap(),
            Some(VersionRange { min: 413, max: None })
        );
        assert_eq!(
            VersionRange::from_bounds(&bounds(&["413", "450"])).unwrap(),
            Some(VersionRange { min: 413, max: Some(450) })
        );
        assert!(VersionRange::from_bounds(&bounds(&["450", "413"])).is_err());
        assert!(VersionRange::from_bounds(&bounds(&["1", "2", "3"])).is_err());
        assert!(VersionRange::from_bounds(&bounds(&["abc"])).is_err());
    }

    #[test]
    fn test_range_contains_boundaries() {
        let range = VersionRange { min: 413, max: Some(450) };
        let at = |r: &str| EngineVersion::parse(r, Distribution::Trino).unwrap();
        assert!(!range.contains(&at("412")));
        assert!(range.contains(&at("413")));
        assert!(range.contains(&at("450")));
        assert!(!range.contains(&at("451")));

        let open = VersionRange { min: 413, max: None };
        assert!(open.contains(&at("9000")));
    }
}
