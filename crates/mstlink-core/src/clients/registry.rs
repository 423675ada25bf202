//! Enterprise-registry client: identity, contact, and registration metadata.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::clients::{SourceClient, SourceStack};
use crate::config::SourceConfig;
use crate::domain::{FieldMap, Mst, SourceResult};
use crate::http_client::HttpClient;
use crate::{SourceId, ValidationError};

/// Upstream key aliases mapped to canonical catalog names. The registry has
/// answered with Vietnamese snake_case keys and with PascalCase keys at
/// different times; both are accepted.
const REGISTRY_ALIASES: &[(&str, &str)] = &[
    ("company_name", "company_name"),
    ("ten_doanh_nghiep", "company_name"),
    ("Title", "company_name"),
    ("address", "address"),
    ("dia_chi", "address"),
    ("Address", "address"),
    ("phone", "phone"),
    ("so_dien_thoai", "phone"),
    ("Phone", "phone"),
    ("email", "email"),
    ("Email", "email"),
    ("business_type", "business_type"),
    ("loai_hinh_doanh_nghiep", "business_type"),
    ("registration_date", "registration_date"),
    ("ngay_cap_mst", "registration_date"),
    ("NgayCap", "registration_date"),
];

pub struct RegistryClient {
    stack: SourceStack,
}

impl std::fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClient").finish_non_exhaustive()
    }
}

impl RegistryClient {
    pub fn new(
        config: &SourceConfig,
        http: Arc<dyn HttpClient>,
        cache: ResponseCache,
    ) -> Result<Self, ValidationError> {
        debug_assert_eq!(config.source, SourceId::Registry);
        Ok(Self {
            stack: SourceStack::new(config, http, cache)?,
        })
    }

    pub fn stack(&self) -> &SourceStack {
        &self.stack
    }
}

fn build_url(base: &str, mst: &Mst) -> String {
    format!("{}/{}", base.trim_end_matches('/'), mst)
}

/// Map a registry response body onto the canonical field names, dropping
/// keys the catalog does not know about.
fn parse_body(body: &str) -> Result<FieldMap, String> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| format!("invalid JSON: {e}"))?;
    let object = value
        .as_object()
        .ok_or_else(|| String::from("expected a JSON object"))?;

    let mut fields = FieldMap::new();
    for (alias, canonical) in REGISTRY_ALIASES {
        if fields.contains_key(*canonical) {
            continue;
        }
        let Some(raw) = object.get(*alias) else {
            continue;
        };
        let rendered = match raw {
            serde_json::Value::String(s) if !s.trim().is_empty() => s.trim().to_owned(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => continue,
        };
        fields.insert((*canonical).to_owned(), rendered);
    }
    Ok(fields)
}

impl SourceClient for RegistryClient {
    fn id(&self) -> SourceId {
        SourceId::Registry
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
    fn builds_identifier_path() {
        let mst = Mst::parse("110198560").expect("valid identifier");
        assert_eq!(
            build_url("https://registry.test/api/company/", &mst),
            "https://registry.test/api/company/0110198560"
        );
    }

    #[test]
    fn parses_vietnamese_keys() {
        let fields = parse_body(
            r#"{
                "ten_doanh_nghiep": "Cong ty TNHH Acme",
                "dia_chi": "123 Le Loi, Ha Noi",
                "so_dien_thoai": "0912345678",
                "ngay_cap_mst": "2015-06-01"
            }"#,
        )
        .expect("valid body");

        assert_eq!(fields.get("company_name").unwrap(), "Cong ty TNHH Acme");
        assert_eq!(fields.get("address").unwrap(), "123 Le Loi, Ha Noi");
        assert_eq!(fields.get("phone").unwrap(), "0912345678");
        assert_eq!(fields.get("registration_date").unwrap(), "2015-06-01");
    }

    #[test]
    fn parses_pascal_case_keys_and_prefers_first_alias_hit() {
        let fields = parse_body(r#"{"Title": "Acme Co", "ten_doanh_nghiep": "Acme TNHH"}"#)
            .expect("valid body");
        // snake_case alias is listed first, so it wins over PascalCase.
        assert_eq!(fields.get("company_name").unwrap(), "Acme TNHH");
    }

    #[test]
    fn drops_unknown_and_empty_values() {
        let fields = parse_body(r#"{"unknown": "x", "email": "   ", "phone": null}"#)
            .expect("valid body");
        assert!(fields.is_empty());
    }

    #[test]
    fn rejects_non_object_bodies() {
        assert!(parse_body("[1,2,3]").is_err());
        assert!(parse_body("nonsense").is_err());
    }
}
