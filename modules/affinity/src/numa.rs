use core::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use serde::Serialize;

use crate::error::Error;

/// Selects the set of candidate cores by NUMA locality.
///
/// Parsing accepts only `0`, `1` and `-1` (or `all`). `Node(n)` with any
/// other `n` can still be built in code, it selects the cores of node `n`
/// and is empty when there is no such node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NumaSelector {
    /// Cores of a single NUMA node.
    Node(u32),
    /// Cores of node 0 followed by cores of node 1.
    All,
}

impl NumaSelector {
    pub const NODE0: Self = Self::Node(0);
    pub const NODE1: Self = Self::Node(1);
}

impl TryFrom<i64> for NumaSelector {
    type Error = Error;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::NODE0),
            1 => Ok(Self::NODE1),
            -1 => Ok(Self::All),
            v => Err(Error::InvalidSelector(v.to_string())),
        }
    }
}

impl FromStr for NumaSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }

        let v: i64 = s.parse().map_err(|_| Error::InvalidSelector(s.to_owned()))?;
        Self::try_from(v)
    }
}

impl Display for NumaSelector {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        match self {
            Self::Node(node) => write!(f, "{node}"),
            Self::All => write!(f, "all"),
        }
    }
}
