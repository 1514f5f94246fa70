use std::cmp::Ordering;
use std::fmt;

use tracing::trace;

/// Resource version as stamped by the cluster.
///
/// Versions are opaque strings on the wire but must be ordered numerically:
/// "10" is newer than "9". A version which does not parse as an integer carries
/// no ordering information and is always treated as newer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceVersion {
    Numeric(u64),
    Opaque(String),
}

impl ResourceVersion {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<u64>() {
            Ok(value) => Self::Numeric(value),
            Err(err) => {
                trace!(version = raw, %err, "non numeric resource version, treating as opaque");
                Self::Opaque(raw.to_owned())
            }
        }
    }

    /// true if self should replace `cached`
    pub fn is_newer_than(&self, cached: &Self) -> bool {
        match (self, cached) {
            (Self::Numeric(incoming), Self::Numeric(cached)) => {
                incoming.cmp(cached) == Ordering::Greater
            }
            // fail open, a duplicate is better than a lost update
            _ => true,
        }
    }
}

impl From<&str> for ResourceVersion {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(value) => write!(f, "{value}"),
            Self::Opaque(raw) => write!(f, "{raw}"),
        }
    }
}
