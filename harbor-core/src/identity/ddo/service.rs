use std::collections::BTreeMap;

use rst_common::standard::serde_json::{json, Map, Value};

use super::types::ServiceError;

const KEY_SERVICE_ENDPOINT: &str = "serviceEndpoint";
const KEY_PURCHASE_ENDPOINT: &str = "purchaseEndpoint";
const RESERVED_KEYS: [&str; 4] = ["id", KEY_SERVICE_ENDPOINT, KEY_PURCHASE_ENDPOINT, "type"];

/// `ServiceType` is the capability a service record offers against a `DID`
///
/// Multiple services of the same type inside one document are legal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceType {
    Metadata,
    Authorization,
    AssetAccess,
    ComputeAccess,
    Custom(String),
}

impl ServiceType {
    pub fn as_str(&self) -> &str {
        match self {
            ServiceType::Metadata => "Metadata",
            ServiceType::Authorization => "Authorization",
            ServiceType::AssetAccess => "Access",
            ServiceType::ComputeAccess => "Compute",
            ServiceType::Custom(name) => name,
        }
    }

    pub fn from_str_tag(tag: &str) -> Self {
        match tag {
            "Metadata" => ServiceType::Metadata,
            "Authorization" => ServiceType::Authorization,
            "Access" => ServiceType::AssetAccess,
            "Compute" => ServiceType::ComputeAccess,
            other => ServiceType::Custom(other.to_string()),
        }
    }
}

/// `ServiceValue` is the closed set of value shapes a service record may
/// carry. Each variant serializes itself explicitly; there is no runtime
/// probing of nested objects
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceValue {
    Text(String),
    Number(u64),
    Document(Value),
}

impl ServiceValue {
    pub fn as_json(&self) -> Value {
        match self {
            ServiceValue::Text(text) => Value::String(text.clone()),
            ServiceValue::Number(num) => json!(num),
            ServiceValue::Document(doc) => doc.clone(),
        }
    }

    fn from_json(value: &Value) -> Self {
        match value {
            Value::String(text) => ServiceValue::Text(text.clone()),
            Value::Number(num) if num.is_u64() => {
                ServiceValue::Number(num.as_u64().unwrap_or_default())
            }
            other => ServiceValue::Document(other.clone()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ServiceValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// `Service` is one capability record inside a `DDO`
///
/// The purchase endpoint defaults to the service endpoint when only one of
/// the two is given. The owning `DID` back-reference is settable at most
/// once; a second attempt is a programming error surfaced as
/// [`ServiceError::DidAlreadySet`]
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    service_type: ServiceType,
    service_endpoint: String,
    purchase_endpoint: String,
    did: Option<String>,
    values: BTreeMap<String, ServiceValue>,
}

impl Service {
    pub fn new(
        service_type: ServiceType,
        service_endpoint: &str,
        values: BTreeMap<String, ServiceValue>,
    ) -> Self {
        let mut filtered = BTreeMap::new();
        for (name, value) in values {
            if !RESERVED_KEYS.contains(&name.as_str()) {
                filtered.insert(name, value);
            }
        }

        Self {
            service_type,
            service_endpoint: service_endpoint.to_string(),
            purchase_endpoint: service_endpoint.to_string(),
            did: None,
            values: filtered,
        }
    }

    pub fn with_purchase_endpoint(mut self, purchase_endpoint: &str) -> Self {
        self.purchase_endpoint = purchase_endpoint.to_string();
        self
    }

    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    pub fn did(&self) -> Option<&str> {
        self.did.as_deref()
    }

    /// `endpoints` returns the (service, purchase) endpoint pair
    pub fn endpoints(&self) -> (&str, &str) {
        (&self.service_endpoint, &self.purchase_endpoint)
    }

    pub fn service_endpoint(&self) -> &str {
        &self.service_endpoint
    }

    pub fn purchase_endpoint(&self) -> &str {
        &self.purchase_endpoint
    }

    pub fn values(&self) -> &BTreeMap<String, ServiceValue> {
        &self.values
    }

    pub fn value(&self, name: &str) -> Option<&ServiceValue> {
        self.values.get(name)
    }

    pub fn service_definition_id(&self) -> Option<&str> {
        self.values.get("serviceDefinitionId").and_then(|val| val.as_text())
    }

    /// `set_did` stamps the owning `DID`; may be called at most once
    pub fn set_did(&mut self, did: &str) -> Result<(), ServiceError> {
        if self.did.is_some() {
            return Err(ServiceError::DidAlreadySet);
        }

        self.did = Some(did.to_string());
        Ok(())
    }

    /// `update_value` sets a free-form value, refusing the reserved keys
    /// {id, serviceEndpoint, purchaseEndpoint, type}
    pub fn update_value(&mut self, name: &str, value: ServiceValue) -> Result<(), ServiceError> {
        if RESERVED_KEYS.contains(&name) {
            return Err(ServiceError::ReservedValue(name.to_string()));
        }

        self.values.insert(name.to_string(), value);
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        !self.service_endpoint.is_empty() && !self.service_type.as_str().is_empty()
    }

    pub fn as_dictionary(&self) -> Value {
        let mut record = Map::new();
        record.insert("type".to_string(), json!(self.service_type.as_str()));
        record.insert(
            KEY_SERVICE_ENDPOINT.to_string(),
            json!(self.service_endpoint),
        );
        record.insert(
            KEY_PURCHASE_ENDPOINT.to_string(),
            json!(self.purchase_endpoint),
        );
        for (name, value) in &self.values {
            record.insert(name.clone(), value.as_json());
        }

        Value::Object(record)
    }

    /// `from_record` rebuilds a service from its dictionary form
    ///
    /// Fails with [`ServiceError::MissingEndpoint`] when neither endpoint
    /// key is present and [`ServiceError::MissingType`] when `type` is
    /// absent. A single present endpoint is used for both
    pub fn from_record(record: &Value) -> Result<Self, ServiceError> {
        let object = record.as_object().ok_or(ServiceError::MissingType)?;

        let service_endpoint = object
            .get(KEY_SERVICE_ENDPOINT)
            .and_then(|val| val.as_str());
        let purchase_endpoint = object
            .get(KEY_PURCHASE_ENDPOINT)
            .and_then(|val| val.as_str());

        let (service_endpoint, purchase_endpoint) = match (service_endpoint, purchase_endpoint) {
            (Some(service), Some(purchase)) => (service, purchase),
            (Some(service), None) => (service, service),
            (None, Some(purchase)) => (purchase, purchase),
            (None, None) => return Err(ServiceError::MissingEndpoint),
        };

        let service_type = object
            .get("type")
            .and_then(|val| val.as_str())
            .ok_or(ServiceError::MissingType)?;

        let mut values = BTreeMap::new();
        for (name, value) in object {
            if !RESERVED_KEYS.contains(&name.as_str()) {
                values.insert(name.clone(), ServiceValue::from_json(value));
            }
        }

        let service = Service::new(ServiceType::from_str_tag(service_type), service_endpoint, values)
            .with_purchase_endpoint(purchase_endpoint);
        Ok(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rst_common::standard::serde_json::json;

    #[test]
    fn test_single_endpoint_fills_both() {
        let record = json!({"type": "Access", "serviceEndpoint": "http://localhost:8005"});
        let service = Service::from_record(&record).unwrap();
        assert_eq!(
            service.endpoints(),
            ("http://localhost:8005", "http://localhost:8005")
        );

        let record = json!({"type": "Access", "purchaseEndpoint": "http://localhost:8006"});
        let service = Service::from_record(&record).unwrap();
        assert_eq!(
            service.endpoints(),
            ("http://localhost:8006", "http://localhost:8006")
        );
    }

    #[test]
    fn test_from_record_missing_endpoint() {
        let record = json!({"type": "Access"});
        let result = Service::from_record(&record);
        assert_eq!(result.unwrap_err(), ServiceError::MissingEndpoint);
    }

    #[test]
    fn test_from_record_missing_type() {
        let record = json!({"serviceEndpoint": "http://localhost:8005"});
        let result = Service::from_record(&record);
        assert_eq!(result.unwrap_err(), ServiceError::MissingType);
    }

    #[test]
    fn test_update_value_refuses_reserved_keys() {
        let mut service = Service::new(ServiceType::AssetAccess, "endpoint", BTreeMap::new());
        for reserved in ["id", "serviceEndpoint", "purchaseEndpoint", "type"] {
            let result = service.update_value(reserved, ServiceValue::Text("x".to_string()));
            assert!(matches!(
                result.unwrap_err(),
                ServiceError::ReservedValue(_)
            ));
        }

        service
            .update_value("serviceDefinitionId", ServiceValue::Text("0".to_string()))
            .unwrap();
        assert_eq!(service.service_definition_id(), Some("0"));
    }

    #[test]
    fn test_set_did_at_most_once() {
        let mut service = Service::new(ServiceType::Metadata, "endpoint", BTreeMap::new());
        service.set_did("did:op:1234").unwrap();
        assert_eq!(service.did(), Some("did:op:1234"));

        let result = service.set_did("did:op:5678");
        assert_eq!(result.unwrap_err(), ServiceError::DidAlreadySet);
    }

    #[test]
    fn test_dictionary_round_trip_with_nested_values() {
        let metadata = json!({"base": {"name": "UK Weather information 2011", "price": 10}});
        let mut values = BTreeMap::new();
        values.insert(
            "metadata".to_string(),
            ServiceValue::Document(metadata.clone()),
        );
        values.insert("price".to_string(), ServiceValue::Number(10));

        let service = Service::new(ServiceType::Metadata, "http://myaquarius.org", values);
        let record = service.as_dictionary();
        assert_eq!(record["metadata"], metadata);
        assert_eq!(record["price"], json!(10));

        let rebuilt = Service::from_record(&record).unwrap();
        assert_eq!(rebuilt, service);
    }
}
