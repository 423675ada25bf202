//! Social-insurance client: employment, contribution, and claim records.
//!
//! The upstream answers with record lists; this client aggregates them into
//! the canonical field map so the merge engine only ever sees flat fields.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;

use crate::cache::ResponseCache;
use crate::clients::{SourceClient, SourceStack};
use crate::config::SourceConfig;
use crate::domain::{FieldMap, Mst, SourceResult};
use crate::http_client::HttpClient;
use crate::{SourceId, ValidationError};

#[derive(Debug, Deserialize)]
struct EmployeeRecord {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    insurance_salary: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ContributionRecord {
    #[serde(default)]
    period: Option<String>,
    #[serde(default)]
    total_contribution: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct InsuranceBody {
    #[serde(default)]
    employees: Vec<EmployeeRecord>,
    #[serde(default)]
    contributions: Vec<ContributionRecord>,
    #[serde(default)]
    claims: Vec<serde_json::Value>,
    /// Some responses carry a pre-computed total alongside the period list.
    #[serde(default)]
    total_contribution: Option<f64>,
}

pub struct InsuranceClient {
    stack: SourceStack,
}

impl InsuranceClient {
    pub fn new(
        config: &SourceConfig,
        http: Arc<dyn HttpClient>,
        cache: ResponseCache,
    ) -> Result<Self, ValidationError> {
        debug_assert_eq!(config.source, SourceId::Insurance);
        Ok(Self {
            stack: SourceStack::new(config, http, cache)?,
        })
    }

    pub fn stack(&self) -> &SourceStack {
        &self.stack
    }
}

fn build_url(base: &str, mst: &Mst) -> String {
    format!("{}/api/enterprise/{}", base.trim_end_matches('/'), mst)
}

fn format_amount(value: f64) -> String {
    if (value.fract()).abs() < f64::EPSILON {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Aggregate the record lists into flat catalog fields. An empty body (no
/// employees, contributions, or claims) yields an empty map, which the
/// stack reports as `NotFound`.
fn parse_body(body: &str) -> Result<FieldMap, String> {
    let parsed: InsuranceBody =
        serde_json::from_str(body).map_err(|e| format!("invalid JSON: {e}"))?;

    let mut fields = FieldMap::new();
    if parsed.employees.is_empty() && parsed.contributions.is_empty() && parsed.claims.is_empty() {
        return Ok(fields);
    }

    fields.insert(
        String::from("employee_count"),
        parsed.employees.len().to_string(),
    );

    let active = parsed
        .employees
        .iter()
        .filter(|e| {
            e.status
                .as_deref()
                .map(|s| s.eq_ignore_ascii_case("active"))
                .unwrap_or(true)
        })
        .count();
    fields.insert(String::from("active_employees"), active.to_string());

    if let Some(earliest) = parsed
        .employees
        .iter()
        .filter_map(|e| e.start_date.as_deref())
        .filter(|s| !s.trim().is_empty())
        .min()
    {
        fields.insert(String::from("employment_start"), earliest.trim().to_owned());
    }

    let salary_total: f64 = parsed
        .employees
        .iter()
        .filter_map(|e| e.insurance_salary)
        .sum();
    if salary_total > 0.0 {
        fields.insert(
            String::from("total_insurance_salary"),
            format_amount(salary_total),
        );
    }

    if !parsed.contributions.is_empty() {
        let periods: std::collections::BTreeSet<&str> = parsed
            .contributions
            .iter()
            .filter_map(|c| c.period.as_deref())
            .collect();
        let period_count = if periods.is_empty() {
            parsed.contributions.len()
        } else {
            periods.len()
        };
        fields.insert(
            String::from("contribution_periods"),
            period_count.to_string(),
        );
    }

    let contribution_total = parsed.total_contribution.unwrap_or_else(|| {
        parsed
            .contributions
            .iter()
            .filter_map(|c| c.total_contribution)
            .sum()
    });
    if contribution_total > 0.0 {
        fields.insert(
            String::from("total_contribution"),
            format_amount(contribution_total),
        );
    }

    if !parsed.claims.is_empty() {
        fields.insert(String::from("claim_count"), parsed.claims.len().to_string());
    }

    Ok(fields)
}

impl SourceClient for InsuranceClient {
    fn id(&self) -> SourceId {
        SourceId::Insurance
    }

    fn fetch<'a>(
        &'a self,
        raw: &'a str,
    ) -> Pin<Box<dyn Future<Output = SourceResult> + Send + 'a>> {
        Box::pin(async move { self.stack.fetch(raw, build_url, parse_body).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_enterprise_path() {
        let mst = Mst::parse("0110198560").expect("valid identifier");
        assert_eq!(
            build_url("http://vss.test:8088", &mst),
            "http://vss.test:8088/api/enterprise/0110198560"
        );
    }

    #[test]
    fn aggregates_employee_and_contribution_lists() {
        let fields = parse_body(
            r#"{
                "employees": [
                    {"status": "active", "start_date": "2016-01-15", "insurance_salary": 2000000},
                    {"status": "inactive", "start_date": "2017-03-01", "insurance_salary": 1750000}
                ],
                "contributions": [
                    {"period": "01/2024", "total_contribution": 600000},
                    {"period": "02/2024", "total_contribution": 600000}
                ],
                "claims": [{"claim_id": "C1"}]
            }"#,
        )
        .expect("valid body");

        assert_eq!(fields.get("employee_count").unwrap(), "2");
        assert_eq!(fields.get("active_employees").unwrap(), "1");
        assert_eq!(fields.get("employment_start").unwrap(), "2016-01-15");
        assert_eq!(fields.get("total_insurance_salary").unwrap(), "3750000");
        assert_eq!(fields.get("contribution_periods").unwrap(), "2");
        assert_eq!(fields.get("total_contribution").unwrap(), "1200000");
        assert_eq!(fields.get("claim_count").unwrap(), "1");
    }

    #[test]
    fn pre_computed_total_wins_over_summation() {
        let fields = parse_body(
            r#"{
                "employees": [{"insurance_salary": 1000000}],
                "contributions": [{"period": "01/2024", "total_contribution": 100}],
                "total_contribution": 999
            }"#,
        )
        .expect("valid body");

        assert_eq!(fields.get("total_contribution").unwrap(), "999");
    }

    #[test]
    fn empty_body_maps_to_no_record() {
        let fields = parse_body(r#"{"employees": [], "contributions": [], "claims": []}"#)
            .expect("valid body");
        assert!(fields.is_empty());
    }

    #[test]
    fn rejects_malformed_bodies() {
        assert!(parse_body("<html>proxy error</html>").is_err());
    }
}
