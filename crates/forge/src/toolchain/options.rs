//! Toolchain-neutral build options
//!
//! Every toolchain translates this vocabulary into its own flag syntax.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Optimization level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptLevel {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "1")]
    O1,
    #[serde(rename = "2")]
    O2,
    #[serde(rename = "3")]
    O3,
    #[serde(rename = "size")]
    Size,
    #[serde(rename = "fast")]
    Fast,
}

impl std::fmt::Display for OptLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptLevel::None => write!(f, "none"),
            OptLevel::O1 => write!(f, "1"),
            OptLevel::O2 => write!(f, "2"),
            OptLevel::O3 => write!(f, "3"),
            OptLevel::Size => write!(f, "size"),
            OptLevel::Fast => write!(f, "fast"),
        }
    }
}

/// Warning level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    /// Suppress all warnings
    None,
    /// Compiler default
    Default,
    /// Common warnings
    All,
    /// Common and extra warnings
    Extra,
    /// Extra warnings, treated as errors
    Error,
}

impl std::fmt::Display for WarningLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarningLevel::None => write!(f, "none"),
            WarningLevel::Default => write!(f, "default"),
            WarningLevel::All => write!(f, "all"),
            WarningLevel::Extra => write!(f, "extra"),
            WarningLevel::Error => write!(f, "error"),
        }
    }
}

/// Options shared by every toolchain.
///
/// Appears as `[options]` (project defaults) and `[targets.options]`
/// (per-target overrides).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildOptions {
    /// Optimization level
    pub optimization: Option<OptLevel>,

    /// Warning level
    pub warnings: Option<WarningLevel>,

    /// Language standard, e.g. "c++17" or "c11"
    pub standard: Option<String>,

    /// Emit debug information
    pub debug_info: Option<bool>,

    /// Include search directories, relative to the project root
    pub include_dirs: Vec<Utf8PathBuf>,

    /// Preprocessor defines, `NAME` or `NAME=VALUE`
    pub defines: Vec<String>,

    /// System libraries to link, without prefix or extension
    pub libs: Vec<String>,

    /// Raw compiler flags, passed through unchanged
    pub extra_flags: Vec<String>,

    /// Raw linker flags, passed through unchanged
    pub link_flags: Vec<String>,
}

impl BuildOptions {
    /// Layer `overrides` on top of these options.
    ///
    /// Scalar settings in `overrides` replace ours; lists are appended,
    /// keeping the first occurrence of duplicates.
    pub fn merged_with(&self, overrides: &BuildOptions) -> BuildOptions {
        BuildOptions {
            optimization: overrides.optimization.or(self.optimization),
            warnings: overrides.warnings.or(self.warnings),
            standard: overrides.standard.clone().or_else(|| self.standard.clone()),
            debug_info: overrides.debug_info.or(self.debug_info),
            include_dirs: append_unique(&self.include_dirs, &overrides.include_dirs),
            defines: append_unique(&self.defines, &overrides.defines),
            libs: append_unique(&self.libs, &overrides.libs),
            extra_flags: [self.extra_flags.as_slice(), overrides.extra_flags.as_slice()].concat(),
            link_flags: [self.link_flags.as_slice(), overrides.link_flags.as_slice()].concat(),
        }
    }
}

fn append_unique<T: Clone + PartialEq>(base: &[T], extra: &[T]) -> Vec<T> {
    let mut merged = base.to_vec();
    for item in extra {
        if !merged.contains(item) {
            merged.push(item.clone());
        }
    }
    merged
}
