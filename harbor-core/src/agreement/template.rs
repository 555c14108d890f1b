use std::collections::BTreeMap;

use rst_common::standard::serde_json::{json, Value};

use super::condition::{AgreementEvent, ServiceAgreementCondition};
use super::types::TemplateError;

/// Required discriminator value of a template document
const DOCUMENT_TYPE: &str = "Access";

/// `ServiceAgreementTemplate` is the reusable declarative definition of an
/// agreement's condition graph
///
/// Loaded once from a static definition and read-only thereafter. Accessors
/// materialize fresh values from the stored definition so that per-agreement
/// parameter substitution on a returned condition list never corrupts the
/// shared template
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceAgreementTemplate {
    template_id: String,
    name: String,
    creator: String,
    contract_name: String,
    definition: Value,
}

impl ServiceAgreementTemplate {
    /// `load` validates the document's `type` discriminator and the shape of
    /// every nested condition and event, failing fast on authoring errors
    pub fn load(document: &Value) -> Result<Self, TemplateError> {
        let object = document
            .as_object()
            .ok_or(TemplateError::MalformedValue("template must be an object".to_string()))?;

        let document_type = object
            .get("type")
            .and_then(|val| val.as_str())
            .unwrap_or_default();
        if document_type != DOCUMENT_TYPE {
            return Err(TemplateError::InvalidTemplateType(document_type.to_string()));
        }

        let template_id = object
            .get("templateId")
            .and_then(|val| val.as_str())
            .ok_or(TemplateError::MissingValue("templateId".to_string()))?;

        let definition = object
            .get("serviceAgreementTemplate")
            .ok_or(TemplateError::MissingValue("serviceAgreementTemplate".to_string()))?;
        let contract_name = definition
            .get("contractName")
            .and_then(|val| val.as_str())
            .ok_or(TemplateError::MissingValue("contractName".to_string()))?;

        let template = Self {
            template_id: template_id.to_string(),
            name: object
                .get("name")
                .and_then(|val| val.as_str())
                .unwrap_or_default()
                .to_string(),
            creator: object
                .get("creator")
                .and_then(|val| val.as_str())
                .unwrap_or_default()
                .to_string(),
            contract_name: contract_name.to_string(),
            definition: definition.clone(),
        };

        // surface nested authoring errors at load time, not mid-flight
        template.conditions()?;
        template.agreement_events()?;

        Ok(template)
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    /// `contract_name` names the on-chain agreement-template contract
    pub fn contract_name(&self) -> &str {
        &self.contract_name
    }

    /// `conditions` materializes fresh condition values on every access
    pub fn conditions(&self) -> Result<Vec<ServiceAgreementCondition>, TemplateError> {
        self.definition
            .get("conditions")
            .and_then(|val| val.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .map(ServiceAgreementCondition::from_record)
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    /// `agreement_events` are the template's top-level events, dispatched on
    /// the agreement contract itself
    pub fn agreement_events(&self) -> Result<Vec<AgreementEvent>, TemplateError> {
        self.definition
            .get("events")
            .and_then(|val| val.as_array())
            .map(|entries| entries.iter().map(AgreementEvent::from_record).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    pub fn fulfillment_order(&self) -> Vec<String> {
        self.definition
            .get("fulfillmentOrder")
            .and_then(|val| val.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|val| val.as_str())
                    .map(|val| val.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn condition_dependency(&self) -> BTreeMap<String, Vec<String>> {
        let mut dependency = BTreeMap::new();
        if let Some(object) = self
            .definition
            .get("conditionDependency")
            .and_then(|val| val.as_object())
        {
            for (name, deps) in object {
                let deps = deps
                    .as_array()
                    .map(|entries| {
                        entries
                            .iter()
                            .filter_map(|val| val.as_str())
                            .map(|val| val.to_string())
                            .collect()
                    })
                    .unwrap_or_default();
                dependency.insert(name.clone(), deps);
            }
        }

        dependency
    }

    pub fn as_dictionary(&self) -> Value {
        json!({
            "type": DOCUMENT_TYPE,
            "templateId": self.template_id,
            "name": self.name,
            "creator": self.creator,
            "serviceAgreementTemplate": self.definition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agreement::testutil::access_template_document;
    use rst_common::standard::serde_json::json;

    #[test]
    fn test_load() {
        let template = ServiceAgreementTemplate::load(&access_template_document()).unwrap();
        assert_eq!(
            template.template_id(),
            "0x044852b2a670ade5407e78fb2863c51de9fcb96542a07186fe3aeda6bb8a116d"
        );
        assert_eq!(template.contract_name(), "EscrowAccessSecretStoreTemplate");
        assert_eq!(template.conditions().unwrap().len(), 3);
        assert_eq!(template.agreement_events().unwrap().len(), 1);
        assert_eq!(template.fulfillment_order().len(), 3);
        assert_eq!(
            template.condition_dependency().get("escrowReward").unwrap(),
            &vec!["lockReward".to_string(), "accessSecretStore".to_string()]
        );
    }

    #[test]
    fn test_load_rejects_wrong_discriminator() {
        let mut document = access_template_document();
        document["type"] = json!("Compute");
        let result = ServiceAgreementTemplate::load(&document);
        assert_eq!(
            result.unwrap_err(),
            TemplateError::InvalidTemplateType("Compute".to_string())
        );
    }

    #[test]
    fn test_load_rejects_missing_template_id() {
        let mut document = access_template_document();
        document.as_object_mut().unwrap().remove("templateId");
        let result = ServiceAgreementTemplate::load(&document);
        assert_eq!(
            result.unwrap_err(),
            TemplateError::MissingValue("templateId".to_string())
        );
    }

    #[test]
    fn test_load_surfaces_nested_authoring_errors() {
        let mut document = access_template_document();
        document["serviceAgreementTemplate"]["conditions"][0]["events"][0]["actorType"] =
            json!("auditor");
        let result = ServiceAgreementTemplate::load(&document);
        assert!(matches!(
            result.unwrap_err(),
            TemplateError::MalformedValue(_)
        ));
    }

    #[test]
    fn test_conditions_materialize_fresh_values() {
        let template = ServiceAgreementTemplate::load(&access_template_document()).unwrap();
        let mut first = template.conditions().unwrap();
        first[0].parameters[0].value = "0xdead".to_string();

        let second = template.conditions().unwrap();
        assert_eq!(
            second[0].parameters[0].value,
            "0x00bd138abd70e2f00903268f3db08f2d25677c9e"
        );
    }

    #[test]
    fn test_dictionary_round_trip() {
        let template = ServiceAgreementTemplate::load(&access_template_document()).unwrap();
        let rebuilt = ServiceAgreementTemplate::load(&template.as_dictionary()).unwrap();
        assert_eq!(rebuilt, template);
    }
}
