//! Duplicate detection
//!
//! Looks up existing CRM leads that share a check field value with a payload.

use super::mapper::LeadPayload;
use crate::config::MappingConfig;
use crate::integrations::{CrmClient, CrmLead};
use std::sync::Arc;
use tracing::{debug, warn};

/// Finds CRM leads matching a payload on the configured check fields
#[derive(Clone)]
pub struct DuplicateResolver {
    crm: Arc<dyn CrmClient>,
    mapping: Arc<MappingConfig>,
}

impl DuplicateResolver {
    pub fn new(crm: Arc<dyn CrmClient>, mapping: Arc<MappingConfig>) -> Self {
        Self { crm, mapping }
    }

    /// Search the CRM once per check field that resolves to a mapped field
    /// with a value in `payload`
    ///
    /// Candidates are returned in check-field order and are not de-duplicated.
    /// A failed search is logged and contributes no candidates.
    pub async fn find_duplicates(
        &self,
        payload: &LeadPayload,
        check_fields: &[String],
    ) -> Vec<CrmLead> {
        let mut candidates = Vec::new();

        for check_field in check_fields {
            let Some(target_field) = self.mapping.resolve_check_field(check_field) else {
                debug!(check_field = %check_field, "No mapping rule for check field");
                continue;
            };
            let Some(term) = payload.get(target_field).and_then(|v| v.search_term()) else {
                continue;
            };

            match self.crm.find_leads(target_field, &term).await {
                Ok(leads) => {
                    debug!(
                        field = %target_field,
                        matches = leads.len(),
                        "Duplicate search complete"
                    );
                    candidates.extend(leads);
                }
                Err(e) => {
                    warn!(
                        field = %target_field,
                        error = %e,
                        "Duplicate search failed, treating as no match"
                    );
                }
            }
        }

        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::memory::{CrmCall, MemoryCrm};
    use crate::sync::FieldValue;

    fn lead(email: &str, phone: &str) -> LeadPayload {
        let mut payload = LeadPayload::new("TITLE");
        payload.insert("EMAIL", FieldValue::Text(email.to_string()));
        payload.insert("PHONE", FieldValue::Text(phone.to_string()));
        payload
    }

    fn check_fields(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[tokio::test]
    async fn test_candidates_concatenate_in_check_field_order() {
        let crm = Arc::new(MemoryCrm::new());
        let by_phone = crm.insert_lead(lead("other@x.io", "555"));
        let by_both = crm.insert_lead(lead("a@x.io", "555"));
        let resolver = DuplicateResolver::new(crm.clone(), Arc::new(MappingConfig::default()));

        let candidates = resolver
            .find_duplicates(&lead("a@x.io", "555"), &check_fields(&["email", "phone"]))
            .await;

        // Not de-duplicated: the lead matching both fields appears twice
        let ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![by_both.as_str(), by_phone.as_str(), by_both.as_str()]);
    }

    #[tokio::test]
    async fn test_skips_empty_and_unmapped_fields() {
        let crm = Arc::new(MemoryCrm::new());
        let resolver = DuplicateResolver::new(crm.clone(), Arc::new(MappingConfig::default()));

        let candidates = resolver
            .find_duplicates(&lead("a@x.io", ""), &check_fields(&["fax", "phone", "email"]))
            .await;

        assert!(candidates.is_empty());
        assert_eq!(
            crm.calls(),
            vec![CrmCall::Find {
                field: "EMAIL".to_string(),
                value: "a@x.io".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_failed_search_yields_no_candidates() {
        let crm = Arc::new(MemoryCrm::new());
        let id = crm.insert_lead(lead("a@x.io", "555"));
        crm.fail_searches_on("EMAIL");
        let resolver = DuplicateResolver::new(crm.clone(), Arc::new(MappingConfig::default()));

        let candidates = resolver
            .find_duplicates(&lead("a@x.io", "555"), &check_fields(&["email", "phone"]))
            .await;

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, id);
    }
}
