//! Per-source fetch outcomes and the expected output field catalog.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{SourceId, ValidationError};

/// Raw field map returned by one source for one identifier.
pub type FieldMap = BTreeMap<String, String>;

/// Terminal classification of one source client invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOutcome {
    /// The source returned a parseable record.
    Success,
    /// The source has no record for this identifier. Terminal, not retried.
    NotFound,
    /// Network, timeout, or parse failure that survived the retry budget.
    TransientFailure,
    /// The source's circuit breaker rejected the call without a network attempt.
    CircuitOpen,
    /// The identifier failed normalization. No network attempt was made.
    Invalid,
}

impl SourceOutcome {
    /// Whether this outcome carries data usable by the merge engine.
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Success)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NotFound => "not_found",
            Self::TransientFailure => "transient_failure",
            Self::CircuitOpen => "circuit_open",
            Self::Invalid => "invalid",
        }
    }
}

impl Display for SourceOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one `SourceClient::fetch` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceResult {
    pub source: SourceId,
    pub outcome: SourceOutcome,
    /// Raw field map keyed by canonical catalog names. Empty unless `Success`.
    pub fields: FieldMap,
    pub latency: Duration,
    pub attempts: u32,
    pub cache_hit: bool,
    /// Last error reason for `TransientFailure`, parse detail otherwise.
    pub error: Option<String>,
}

impl SourceResult {
    pub fn success(source: SourceId, fields: FieldMap, latency: Duration, attempts: u32) -> Self {
        Self {
            source,
            outcome: SourceOutcome::Success,
            fields,
            latency,
            attempts,
            cache_hit: false,
            error: None,
        }
    }

    pub fn not_found(source: SourceId, latency: Duration, attempts: u32) -> Self {
        Self {
            source,
            outcome: SourceOutcome::NotFound,
            fields: FieldMap::new(),
            latency,
            attempts,
            cache_hit: false,
            error: None,
        }
    }

    pub fn transient_failure(
        source: SourceId,
        reason: impl Into<String>,
        latency: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            source,
            outcome: SourceOutcome::TransientFailure,
            fields: FieldMap::new(),
            latency,
            attempts,
            cache_hit: false,
            error: Some(reason.into()),
        }
    }

    pub fn circuit_open(source: SourceId) -> Self {
        Self {
            source,
            outcome: SourceOutcome::CircuitOpen,
            fields: FieldMap::new(),
            latency: Duration::ZERO,
            attempts: 0,
            cache_hit: false,
            error: Some(String::from("circuit breaker open")),
        }
    }

    pub fn invalid(source: SourceId, reason: impl Into<String>) -> Self {
        Self {
            source,
            outcome: SourceOutcome::Invalid,
            fields: FieldMap::new(),
            latency: Duration::ZERO,
            attempts: 0,
            cache_hit: false,
            error: Some(reason.into()),
        }
    }

    pub fn into_cache_hit(mut self) -> Self {
        self.cache_hit = true;
        self
    }
}

/// Category a catalog field belongs to. Conflict resolution between the two
/// sources is decided per category, not globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    Identity,
    Contact,
    Employment,
    Contribution,
}

impl FieldCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Contact => "contact",
            Self::Employment => "employment",
            Self::Contribution => "contribution",
        }
    }
}

impl Display for FieldCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldCategory {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "identity" => Ok(Self::Identity),
            "contact" => Ok(Self::Contact),
            "employment" => Ok(Self::Employment),
            "contribution" => Ok(Self::Contribution),
            other => Err(ValidationError::InvalidFieldCategory {
                value: other.to_owned(),
            }),
        }
    }
}

/// One entry in the expected output field catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub category: FieldCategory,
    /// Missing required fields produce a warning finding (partial data is an
    /// accepted outcome, never a hard error).
    pub required: bool,
}

const fn field(name: &'static str, category: FieldCategory, required: bool) -> FieldSpec {
    FieldSpec {
        name,
        category,
        required,
    }
}

/// Expected fields of a merged record. Completeness is the populated share
/// of this catalog.
pub const EXPECTED_FIELDS: &[FieldSpec] = &[
    field("company_name", FieldCategory::Identity, true),
    field("business_type", FieldCategory::Identity, false),
    field("registration_date", FieldCategory::Identity, false),
    field("address", FieldCategory::Contact, true),
    field("phone", FieldCategory::Contact, false),
    field("email", FieldCategory::Contact, false),
    field("employee_count", FieldCategory::Employment, true),
    field("employment_start", FieldCategory::Employment, false),
    field("total_contribution", FieldCategory::Contribution, true),
    field("contribution_periods", FieldCategory::Contribution, false),
];

/// Look up the catalog entry for a canonical field name.
pub fn field_spec(name: &str) -> Option<&'static FieldSpec> {
    EXPECTED_FIELDS.iter().find(|spec| spec.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_unique_names() {
        for (index, spec) in EXPECTED_FIELDS.iter().enumerate() {
            assert!(
                !EXPECTED_FIELDS[index + 1..]
                    .iter()
                    .any(|other| other.name == spec.name),
                "duplicate catalog field '{}'",
                spec.name
            );
        }
    }

    #[test]
    fn usable_outcomes() {
        assert!(SourceOutcome::Success.is_usable());
        assert!(!SourceOutcome::NotFound.is_usable());
        assert!(!SourceOutcome::TransientFailure.is_usable());
        assert!(!SourceOutcome::CircuitOpen.is_usable());
        assert!(!SourceOutcome::Invalid.is_usable());
    }

    #[test]
    fn cache_hit_flag_round_trip() {
        let result = SourceResult::not_found(SourceId::Registry, Duration::ZERO, 1);
        assert!(!result.cache_hit);
        assert!(result.into_cache_hit().cache_hit);
    }
}
