//! Merge & validation engine: unify both source results for one identifier
//! into a single validated record with provenance and quality scores.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Iso8601;
use time::{Date, OffsetDateTime};

use crate::domain::{FieldCategory, Mst, SourceResult, EXPECTED_FIELDS};
use crate::SourceId;

/// Where a merged field's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Registry,
    Insurance,
    Derived,
    Missing,
}

impl Provenance {
    const fn from_source(source: SourceId) -> Self {
        match source {
            SourceId::Registry => Self::Registry,
            SourceId::Insurance => Self::Insurance,
        }
    }
}

/// One merged field: the value (if any) and its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldEntry {
    pub value: Option<String>,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// One validation finding attached to the merged record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub field: String,
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            severity: Severity::Error,
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Complete,
    Partial,
    Failed,
}

impl Display for RecordStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Condensed view of one source invocation, carried for metrics/reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub source: SourceId,
    pub outcome: crate::domain::SourceOutcome,
    pub attempts: u32,
    pub cache_hit: bool,
    pub latency_ms: u64,
}

impl SourceSummary {
    fn of(result: &SourceResult) -> Self {
        Self {
            source: result.source,
            outcome: result.outcome,
            attempts: result.attempts,
            cache_hit: result.cache_hit,
            latency_ms: result.latency.as_millis().min(u128::from(u64::MAX)) as u64,
        }
    }
}

/// Unified output for one identifier. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub mst: String,
    pub fields: BTreeMap<String, FieldEntry>,
    pub findings: Vec<Finding>,
    /// Share of expected catalog fields populated, 0-100.
    pub completeness: f64,
    /// Weighted trust estimate, 0-1.
    pub confidence: f64,
    pub status: RecordStatus,
    pub sources: Vec<SourceSummary>,
}

impl MergedRecord {
    pub fn error_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
            .count()
    }
}

/// Conflict-resolution and consistency-check knobs.
///
/// Priority is decided per field category rather than globally; the
/// defaults favor the registry for identity/contact data and the insurance
/// system for employment/contribution data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergePolicy {
    pub identity_priority: SourceId,
    pub contact_priority: SourceId,
    pub employment_priority: SourceId,
    pub contribution_priority: SourceId,
    /// Combined social-insurance contribution rate applied to salary.
    pub contribution_rate: f64,
    /// Relative tolerance band before a consistency warning is raised.
    pub contribution_tolerance: f64,
    /// Oldest plausible year for date fields.
    pub min_year: i32,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            identity_priority: SourceId::Registry,
            contact_priority: SourceId::Registry,
            employment_priority: SourceId::Insurance,
            contribution_priority: SourceId::Insurance,
            contribution_rate: 0.32,
            contribution_tolerance: 0.25,
            min_year: 1950,
        }
    }
}

impl MergePolicy {
    pub const fn priority_for(&self, category: FieldCategory) -> SourceId {
        match category {
            FieldCategory::Identity => self.identity_priority,
            FieldCategory::Contact => self.contact_priority,
            FieldCategory::Employment => self.employment_priority,
            FieldCategory::Contribution => self.contribution_priority,
        }
    }
}

const ERROR_PENALTY: f64 = 0.15;
const WARNING_PENALTY: f64 = 0.05;
const BASE_BOTH_SOURCES: f64 = 0.95;
const BASE_ONE_SOURCE: f64 = 0.60;

/// Merge both source results into one validated record.
pub fn merge(
    identifier: &str,
    registry: &SourceResult,
    insurance: &SourceResult,
    policy: &MergePolicy,
) -> MergedRecord {
    let normalized = Mst::parse(identifier);
    let mst_display = normalized
        .as_ref()
        .map(|m| m.as_str().to_owned())
        .unwrap_or_else(|_| identifier.to_owned());

    let mut fields = BTreeMap::new();
    for spec in EXPECTED_FIELDS {
        let preferred = policy.priority_for(spec.category);
        let secondary = other_source(preferred);
        let entry = lookup(registry, insurance, preferred, spec.name)
            .or_else(|| lookup(registry, insurance, secondary, spec.name))
            .unwrap_or(FieldEntry {
                value: None,
                provenance: Provenance::Missing,
            });
        fields.insert(spec.name.to_owned(), entry);
    }

    // Sources may report fields beyond the catalog (aggregates like
    // total_insurance_salary or claim_count). Carry them through with
    // provenance; they feed consistency checks but not completeness.
    for result in [registry, insurance] {
        for (name, value) in &result.fields {
            fields.entry(name.clone()).or_insert_with(|| FieldEntry {
                value: Some(value.clone()),
                provenance: Provenance::from_source(result.source),
            });
        }
    }

    derive_contribution_per_employee(&mut fields);

    let mut findings = Vec::new();
    if let Err(err) = &normalized {
        findings.push(Finding::error("mst", err.to_string()));
    }
    for result in [registry, insurance] {
        if !result.outcome.is_usable() {
            findings.push(Finding::warning(
                format!("source.{}", result.source),
                match &result.error {
                    Some(reason) => format!("{}: {reason}", result.outcome),
                    None => result.outcome.to_string(),
                },
            ));
        }
    }
    validate_fields(&fields, policy, &mut findings);

    let populated = EXPECTED_FIELDS
        .iter()
        .filter(|spec| {
            fields
                .get(spec.name)
                .map(|entry| entry.value.is_some())
                .unwrap_or(false)
        })
        .count();
    let completeness = populated as f64 / EXPECTED_FIELDS.len() as f64 * 100.0;

    let usable = [registry, insurance]
        .iter()
        .filter(|r| r.outcome.is_usable())
        .count();
    let base = match usable {
        2 => BASE_BOTH_SOURCES,
        1 => BASE_ONE_SOURCE,
        _ => 0.0,
    };
    let errors = findings
        .iter()
        .filter(|f| f.severity == Severity::Error)
        .count();
    let warnings = findings.len() - errors;
    let confidence = (base - errors as f64 * ERROR_PENALTY - warnings as f64 * WARNING_PENALTY)
        .clamp(0.0, 1.0);

    let status = if usable == 0 {
        RecordStatus::Failed
    } else if usable == 2 && errors == 0 {
        RecordStatus::Complete
    } else {
        RecordStatus::Partial
    };

    MergedRecord {
        mst: mst_display,
        fields,
        findings,
        completeness,
        confidence,
        status,
        sources: vec![SourceSummary::of(registry), SourceSummary::of(insurance)],
    }
}

const fn other_source(source: SourceId) -> SourceId {
    match source {
        SourceId::Registry => SourceId::Insurance,
        SourceId::Insurance => SourceId::Registry,
    }
}

fn lookup(
    registry: &SourceResult,
    insurance: &SourceResult,
    source: SourceId,
    name: &str,
) -> Option<FieldEntry> {
    let result = match source {
        SourceId::Registry => registry,
        SourceId::Insurance => insurance,
    };
    result.fields.get(name).map(|value| FieldEntry {
        value: Some(value.clone()),
        provenance: Provenance::from_source(source),
    })
}

fn derive_contribution_per_employee(fields: &mut BTreeMap<String, FieldEntry>) {
    let total = field_f64(fields, "total_contribution");
    let count = field_f64(fields, "employee_count");
    if let (Some(total), Some(count)) = (total, count) {
        if count > 0.0 {
            let per_employee = total / count;
            fields.insert(
                String::from("contribution_per_employee"),
                FieldEntry {
                    value: Some(format!("{per_employee:.0}")),
                    provenance: Provenance::Derived,
                },
            );
        }
    }
}

fn field_value<'a>(fields: &'a BTreeMap<String, FieldEntry>, name: &str) -> Option<&'a str> {
    fields.get(name).and_then(|entry| entry.value.as_deref())
}

fn field_f64(fields: &BTreeMap<String, FieldEntry>, name: &str) -> Option<f64> {
    field_value(fields, name).and_then(|v| v.parse().ok())
}

fn validate_fields(
    fields: &BTreeMap<String, FieldEntry>,
    policy: &MergePolicy,
    findings: &mut Vec<Finding>,
) {
    for spec in EXPECTED_FIELDS {
        if spec.required && field_value(fields, spec.name).is_none() {
            findings.push(Finding::warning(
                spec.name,
                "required field is missing from both sources",
            ));
        }
    }

    for name in ["total_contribution", "total_insurance_salary"] {
        if let Some(raw) = field_value(fields, name) {
            match raw.parse::<f64>() {
                Ok(amount) if amount < 0.0 => {
                    findings.push(Finding::error(name, "monetary amount is negative"));
                }
                Ok(_) => {}
                Err(_) => findings.push(Finding::error(name, "monetary amount is not numeric")),
            }
        }
    }

    if let Some(phone) = field_value(fields, "phone") {
        if !is_plausible_vn_phone(phone) {
            findings.push(Finding::warning(
                "phone",
                format!("'{phone}' does not match a recognized national pattern"),
            ));
        }
    }

    let registration = validate_date(fields, "registration_date", policy, findings);
    let employment = validate_date(fields, "employment_start", policy, findings);
    if let (Some(registration), Some(employment)) = (registration, employment) {
        if employment < registration {
            findings.push(Finding::warning(
                "employment_start",
                format!(
                    "employment start {employment} precedes registration date {registration}"
                ),
            ));
        }
    }

    check_contribution_consistency(fields, policy, findings);
}

fn validate_date(
    fields: &BTreeMap<String, FieldEntry>,
    name: &str,
    policy: &MergePolicy,
    findings: &mut Vec<Finding>,
) -> Option<Date> {
    let raw = field_value(fields, name)?;
    match Date::parse(raw, &Iso8601::DEFAULT) {
        Ok(date) => {
            let max_year = OffsetDateTime::now_utc().year() + 1;
            if date.year() < policy.min_year || date.year() > max_year {
                findings.push(Finding::warning(
                    name,
                    format!("date {raw} falls outside the plausible range"),
                ));
                None
            } else {
                Some(date)
            }
        }
        Err(_) => {
            findings.push(Finding::warning(
                name,
                format!("'{raw}' is not a parseable date"),
            ));
            None
        }
    }
}

/// Contributions should track salary at the configured rate. Upstream data
/// legitimately varies, so violations beyond the band are warnings only.
fn check_contribution_consistency(
    fields: &BTreeMap<String, FieldEntry>,
    policy: &MergePolicy,
    findings: &mut Vec<Finding>,
) {
    let (Some(total), Some(salary), Some(periods)) = (
        field_f64(fields, "total_contribution"),
        field_f64(fields, "total_insurance_salary"),
        field_f64(fields, "contribution_periods"),
    ) else {
        return;
    };
    if salary <= 0.0 || periods <= 0.0 {
        return;
    }

    let expected = salary * policy.contribution_rate * periods;
    if expected <= 0.0 {
        return;
    }
    let deviation = ((total - expected) / expected).abs();
    if deviation > policy.contribution_tolerance {
        findings.push(Finding::warning(
            "total_contribution",
            format!(
                "contribution {total:.0} deviates {:.0}% from the expected {expected:.0}",
                deviation * 100.0
            ),
        ));
    }
}

/// Vietnamese phone plausibility: `0` or `+84` prefix followed by 9-10
/// digits, separators ignored.
fn is_plausible_vn_phone(raw: &str) -> bool {
    let cleaned: String = raw
        .chars()
        .filter(|ch| !matches!(ch, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    let digits = if let Some(rest) = cleaned.strip_prefix("+84") {
        rest
    } else if let Some(rest) = cleaned.strip_prefix("84") {
        rest
    } else if let Some(rest) = cleaned.strip_prefix('0') {
        rest
    } else {
        return false;
    };

    (8..=10).contains(&digits.len()) && digits.chars().all(|ch| ch.is_ascii_digit())
}
