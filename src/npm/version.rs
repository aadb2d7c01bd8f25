use std::cmp::Ordering;
use std::fmt;

/// Magnitude of an available update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateType {
    Major,
    Minor,
    Patch,
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UpdateType::Major => "major",
            UpdateType::Minor => "minor",
            UpdateType::Patch => "patch",
        };
        f.write_str(label)
    }
}

/// Risk tiers, declared from most to least urgent so the derived `Ord`
/// sorts critical updates first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskLevel {
    Critical,
    Breaking,
    Moderate,
    Safe,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Critical => "critical",
            RiskLevel::Breaking => "breaking",
            RiskLevel::Moderate => "moderate",
            RiskLevel::Safe => "safe",
        };
        f.write_str(label)
    }
}

/// Result of comparing a declared version with the latest published one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionDiff {
    pub needs_update: bool,
    pub update_type: Option<UpdateType>,
}

impl VersionDiff {
    const NONE: VersionDiff = VersionDiff {
        needs_update: false,
        update_type: None,
    };
}

/// A parsed `major.minor.patch[-pre][+build]` version.
///
/// Build metadata is kept for display but never takes part in ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionTriple {
    inner: semver::Version,
}

impl VersionTriple {
    /// Parses a version, accepting a single leading `v`.
    pub fn parse(version: &str) -> Option<Self> {
        let trimmed = version.strip_prefix('v').unwrap_or(version);
        semver::Version::parse(trimmed)
            .ok()
            .map(|inner| Self { inner })
    }

    pub fn major(&self) -> u64 {
        self.inner.major
    }

    pub fn minor(&self) -> u64 {
        self.inner.minor
    }

    pub fn patch(&self) -> u64 {
        self.inner.patch
    }

    pub fn prerelease(&self) -> Option<&str> {
        (!self.inner.pre.is_empty()).then(|| self.inner.pre.as_str())
    }

    pub fn build_metadata(&self) -> Option<&str> {
        (!self.inner.build.is_empty()).then(|| self.inner.build.as_str())
    }

    /// Precedence ordering: numeric triple, then prerelease. A prerelease sorts
    /// below the same triple without one (semver's `Prerelease` ordering).
    pub fn precedence(&self, other: &Self) -> Ordering {
        (self.major(), self.minor(), self.patch())
            .cmp(&(other.major(), other.minor(), other.patch()))
            .then_with(|| self.inner.pre.cmp(&other.inner.pre))
    }
}

pub struct VersionComparator;

impl VersionComparator {
    /// Compares a current version against the latest one. Malformed input on
    /// either side yields "no update".
    pub fn compare(current: &str, latest: &str) -> VersionDiff {
        let (Some(current), Some(latest)) =
            (VersionTriple::parse(current), VersionTriple::parse(latest))
        else {
            return VersionDiff::NONE;
        };

        if current.precedence(&latest) != Ordering::Less {
            return VersionDiff::NONE;
        }

        let update_type = if current.major() != latest.major() {
            UpdateType::Major
        } else if current.minor() != latest.minor() {
            UpdateType::Minor
        } else {
            UpdateType::Patch
        };

        VersionDiff {
            needs_update: true,
            update_type: Some(update_type),
        }
    }

    /// Maps an update magnitude plus the audit flag to a risk tier.
    pub fn risk_level(update_type: Option<UpdateType>, has_security_issue: bool) -> RiskLevel {
        if has_security_issue {
            return RiskLevel::Critical;
        }

        match update_type {
            Some(UpdateType::Major) => RiskLevel::Breaking,
            Some(UpdateType::Minor) => RiskLevel::Moderate,
            Some(UpdateType::Patch) | None => RiskLevel::Safe,
        }
    }
}

const RANGE_OPERATORS: &[char] = &['^', '~', '>', '<', '='];

/// Splits a declared range such as `^1.2.3` into its operator prefix and the
/// version that follows it.
pub fn split_range_operator(range: &str) -> (&str, &str) {
    let version_start = range
        .find(|c: char| !RANGE_OPERATORS.contains(&c))
        .unwrap_or(range.len());
    range.split_at(version_start)
}

/// Removes any leading range operator from a declared range.
pub fn strip_range_operator(range: &str) -> &str {
    split_range_operator(range).1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff(update_type: UpdateType) -> VersionDiff {
        VersionDiff {
            needs_update: true,
            update_type: Some(update_type),
        }
    }

    #[test]
    fn detects_update_magnitude() {
        assert_eq!(
            VersionComparator::compare("1.0.0", "1.0.1"),
            diff(UpdateType::Patch)
        );
        assert_eq!(
            VersionComparator::compare("1.0.0", "1.1.0"),
            diff(UpdateType::Minor)
        );
        assert_eq!(
            VersionComparator::compare("1.0.0", "2.0.0"),
            diff(UpdateType::Major)
        );
        assert_eq!(
            VersionComparator::compare("1.9.0", "1.10.0"),
            diff(UpdateType::Minor)
        );
        assert_eq!(
            VersionComparator::compare("0.9.0", "1.0.0"),
            diff(UpdateType::Major)
        );
    }

    #[test]
    fn newer_or_equal_current_needs_no_update() {
        assert_eq!(VersionComparator::compare("2.0.0", "1.5.0"), VersionDiff::NONE);
        for version in ["0.0.0", "1.2.3", "1.0.0-rc.1", "v4.5.6", "1.0.0+sha.1"] {
            assert_eq!(
                VersionComparator::compare(version, version),
                VersionDiff::NONE,
                "{version}"
            );
        }
    }

    #[test]
    fn build_metadata_is_ignored() {
        assert_eq!(
            VersionComparator::compare("1.0.0+build.1", "1.0.0+build.2"),
            VersionDiff::NONE
        );
        assert_eq!(
            VersionComparator::compare("1.0.0+build.9", "1.0.0+build.2"),
            VersionDiff::NONE
        );
    }

    #[test]
    fn prerelease_handling() {
        assert_eq!(
            VersionComparator::compare("1.0.0-alpha.1", "1.0.0-alpha.2"),
            diff(UpdateType::Patch)
        );
        assert_eq!(
            VersionComparator::compare("1.0.0-beta", "1.0.0"),
            diff(UpdateType::Patch)
        );
        assert_eq!(
            VersionComparator::compare("1.0.0", "1.1.0-beta.1"),
            diff(UpdateType::Minor)
        );
        assert_eq!(
            VersionComparator::compare("1.0.0", "1.0.0-rc.1"),
            VersionDiff::NONE
        );
    }

    #[test]
    fn malformed_input_never_updates() {
        assert_eq!(VersionComparator::compare("invalid", "1.0.0"), VersionDiff::NONE);
        assert_eq!(VersionComparator::compare("", "1.0.0"), VersionDiff::NONE);
        assert_eq!(VersionComparator::compare("1.0.0", "latest"), VersionDiff::NONE);
        assert_eq!(VersionComparator::compare("1.0", "1.1.0"), VersionDiff::NONE);
        assert_eq!(VersionComparator::compare("vv1.0.0", "2.0.0"), VersionDiff::NONE);
    }

    #[test]
    fn accepts_single_v_prefix() {
        let parsed = VersionTriple::parse("v1.2.3-beta.2+exp").unwrap();
        assert_eq!((parsed.major(), parsed.minor(), parsed.patch()), (1, 2, 3));
        assert_eq!(parsed.prerelease(), Some("beta.2"));
        assert_eq!(parsed.build_metadata(), Some("exp"));
        assert_eq!(
            VersionComparator::compare("v1.0.0", "1.0.1"),
            diff(UpdateType::Patch)
        );
    }

    #[test]
    fn security_dominates_risk() {
        for update_type in [
            Some(UpdateType::Major),
            Some(UpdateType::Minor),
            Some(UpdateType::Patch),
            None,
        ] {
            assert_eq!(
                VersionComparator::risk_level(update_type, true),
                RiskLevel::Critical
            );
        }
        assert_eq!(
            VersionComparator::risk_level(Some(UpdateType::Major), false),
            RiskLevel::Breaking
        );
        assert_eq!(
            VersionComparator::risk_level(Some(UpdateType::Minor), false),
            RiskLevel::Moderate
        );
        assert_eq!(
            VersionComparator::risk_level(Some(UpdateType::Patch), false),
            RiskLevel::Safe
        );
        assert_eq!(VersionComparator::risk_level(None, false), RiskLevel::Safe);
    }

    #[test]
    fn risk_levels_sort_most_urgent_first() {
        let mut levels = vec![
            RiskLevel::Safe,
            RiskLevel::Critical,
            RiskLevel::Moderate,
            RiskLevel::Breaking,
        ];
        levels.sort();
        assert_eq!(
            levels,
            vec![
                RiskLevel::Critical,
                RiskLevel::Breaking,
                RiskLevel::Moderate,
                RiskLevel::Safe
            ]
        );
    }

    #[test]
    fn splits_range_operators() {
        assert_eq!(split_range_operator("^1.0.0"), ("^", "1.0.0"));
        assert_eq!(split_range_operator(">=2.1.0"), (">=", "2.1.0"));
        assert_eq!(split_range_operator("1.0.0"), ("", "1.0.0"));
        assert_eq!(strip_range_operator("~0.3.1"), "0.3.1");
        assert_eq!(strip_range_operator("^"), "");
    }
}
