use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! declare_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

declare_id!(
    /// Opaque handle of the authenticated caller that owns stored data.
    OwnerId
);
declare_id!(
    /// Identity of one ingestion or query event.
    SnapshotId
);
declare_id!(
    /// Identity of one persisted process descriptor.
    RecordId
);
declare_id!(
    /// Identity of one single-process lookup.
    QueryId
);

/// What produced a snapshot: a full enumeration or a single-pid lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    Iteration,
    Query,
}

impl SnapshotKind {
    pub const ALL: [SnapshotKind; 2] = [SnapshotKind::Iteration, SnapshotKind::Query];

    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotKind::Iteration => "iteration",
            SnapshotKind::Query => "query",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "iteration" => Ok(SnapshotKind::Iteration),
            "query" => Ok(SnapshotKind::Query),
            other => Err(format!(
                "unknown snapshot kind: {other}. expected one of: iteration, query"
            )),
        }
    }
}
