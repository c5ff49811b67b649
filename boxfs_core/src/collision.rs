use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// What to do when a create or upload targets a name that is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionStrategy {
    /// Pick a numbered variant such as `report (1).pdf`.
    #[default]
    Rename,
    /// Replace the existing object in place; no existence check is made.
    Overwrite,
    /// Keep the existing object and return it.
    Skip,
}

impl CollisionStrategy {
    /// Per-call override falling back to the configured default.
    pub fn or_default(call: Option<Self>, configured: Self) -> Self {
        call.unwrap_or(configured)
    }
}

impl fmt::Display for CollisionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CollisionStrategy::Rename => "rename",
            CollisionStrategy::Overwrite => "overwrite",
            CollisionStrategy::Skip => "skip",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown collision strategy '{0}', expected rename, overwrite or skip")]
pub struct UnknownStrategy(pub String);

impl FromStr for CollisionStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rename" => Ok(CollisionStrategy::Rename),
            "overwrite" => Ok(CollisionStrategy::Overwrite),
            "skip" => Ok(CollisionStrategy::Skip),
            _ => Err(UnknownStrategy(s.to_owned())),
        }
    }
}
