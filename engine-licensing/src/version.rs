//! Versioned artifact names of the form `prefix-N`.

use std::fmt;

/// Separator between a name prefix and its version number.
pub const VERSION_SEPARATOR: char = '-';

/// A versioned artifact name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionedName {
    pub prefix: String,
    pub version: u64,
}

impl VersionedName {
    #[must_use]
    pub fn new(prefix: impl Into<String>, version: u64) -> Self {
        Self {
            prefix: prefix.into(),
            version,
        }
    }
}

impl fmt::Display for VersionedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{VERSION_SEPARATOR}{}", self.prefix, self.version)
    }
}

/// Extracts the version of `name` under `prefix`.
///
/// The suffix after the separator is a signed decimal integer, as accepted by
/// `i64::from_str` (an optional `+` or `-`, then digits). Negative versions
/// never name a config and yield `None`; so do blanks and values beyond
/// `i64::MAX`.
#[must_use]
pub fn parse_version(name: &str, prefix: &str) -> Option<u64> {
    let suffix = name
        .strip_prefix(prefix)?
        .strip_prefix(VERSION_SEPARATOR)?;
    let version: i64 = suffix.parse().ok()?;
    u64::try_from(version).ok()
}

/// Returns the version that follows every conforming name in `names`.
///
/// Names that do not parse under `prefix` are skipped. With no conforming
/// names the first version is 0.
pub fn next_version<I, S>(names: I, prefix: &str) -> u64
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|name| parse_version(name.as_ref(), prefix))
        .max()
        .map_or(0, |latest| latest.saturating_add(1))
}
