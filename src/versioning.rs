//! Release versioning policy for the weft package family.
//!
//! The family ships several independently versioned packages: the core package
//! (stable primitives, `0.1.x`), the main package (`0.1.x`), community
//! integrations (`0.0.x`), and partner packages that version on their own
//! schedules. All follow semver with a pre-1.0 reading: breaking changes land
//! as minor bumps, everything else as patches.
//!
//! The policy differs per package on one point: which interfaces are covered
//! by the breaking-change rule. The core package covers every public
//! interface, beta-marked ones included. The main package exempts beta-marked
//! interfaces, so breaking a beta interface there is only a patch. Community
//! integrations bump the patch segment for any change at all, and partner
//! packages are versioned by their owners, outside this table.

use serde::{Deserialize, Serialize};

/// An independently versioned package within the family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageLine {
    Core,
    Main,
    Community,
    Partner,
}

impl PackageLine {
    /// Current version line, or `None` for independently versioned packages.
    pub fn version_line(&self) -> Option<&'static str> {
        match self {
            PackageLine::Core => Some("0.1.x"),
            PackageLine::Main => Some("0.1.x"),
            PackageLine::Community => Some("0.0.x"),
            PackageLine::Partner => None,
        }
    }
}

impl std::fmt::Display for PackageLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageLine::Core => write!(f, "core"),
            PackageLine::Main => write!(f, "main"),
            PackageLine::Community => write!(f, "community"),
            PackageLine::Partner => write!(f, "partner"),
        }
    }
}

/// Category of a change in a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCategory {
    /// Breaking change to a stable public interface.
    BreakingPublic,
    /// Breaking change to a beta-marked public interface.
    BreakingBeta,
    BugFix,
    NewFeature,
    /// Change confined to private interfaces.
    PrivateChange,
    /// Non-breaking change to a beta-marked feature.
    BetaChange,
}

impl std::fmt::Display for ChangeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeCategory::BreakingPublic => write!(f, "breaking change (stable interface)"),
            ChangeCategory::BreakingBeta => write!(f, "breaking change (beta interface)"),
            ChangeCategory::BugFix => write!(f, "bug fix"),
            ChangeCategory::NewFeature => write!(f, "new feature"),
            ChangeCategory::PrivateChange => write!(f, "private-interface change"),
            ChangeCategory::BetaChange => write!(f, "beta-feature change"),
        }
    }
}

/// Which version segment a change increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentBump {
    Minor,
    Patch,
    /// Versioned outside this policy (partner packages).
    External,
}

impl std::fmt::Display for SegmentBump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentBump::Minor => write!(f, "minor"),
            SegmentBump::Patch => write!(f, "patch"),
            SegmentBump::External => write!(f, "external"),
        }
    }
}

/// All packages, in table order.
pub const ALL_PACKAGES: [PackageLine; 4] = [
    PackageLine::Core,
    PackageLine::Main,
    PackageLine::Community,
    PackageLine::Partner,
];

/// All change categories, in table order.
pub const ALL_CHANGES: [ChangeCategory; 6] = [
    ChangeCategory::BreakingPublic,
    ChangeCategory::BreakingBeta,
    ChangeCategory::BugFix,
    ChangeCategory::NewFeature,
    ChangeCategory::PrivateChange,
    ChangeCategory::BetaChange,
];

/// Version segment incremented when `change` lands in `package`.
pub fn bump_for(package: PackageLine, change: ChangeCategory) -> SegmentBump {
    match package {
        PackageLine::Core => match change {
            ChangeCategory::BreakingPublic | ChangeCategory::BreakingBeta => SegmentBump::Minor,
            _ => SegmentBump::Patch,
        },
        PackageLine::Main => match change {
            ChangeCategory::BreakingPublic => SegmentBump::Minor,
            _ => SegmentBump::Patch,
        },
        PackageLine::Community => SegmentBump::Patch,
        PackageLine::Partner => SegmentBump::External,
    }
}
