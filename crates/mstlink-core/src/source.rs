use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical identifiers for the two upstream systems queried per MST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    /// Enterprise registry: identity, contact, and registration metadata.
    Registry,
    /// Social insurance: employment, contribution, and claim records.
    Insurance,
}

impl SourceId {
    pub const ALL: [Self; 2] = [Self::Registry, Self::Insurance];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::Insurance => "insurance",
        }
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "registry" => Ok(Self::Registry),
            "insurance" => Ok(Self::Insurance),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}
