use rst_common::standard::serde_json::{json, Map, Value};

use super::keys::{self, ParameterType};
use super::types::{ActorType, ConditionError, TemplateError};

/// Suffix naming a condition's abort-path event
const TIMEOUT_EVENT_SUFFIX: &str = "Timeout";

/// `HandlerRef` names a handler function symbolically; the watcher resolves
/// it against the dispatch table at plan-build time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerRef {
    pub module: String,
    pub function: String,
    pub version: String,
}

impl HandlerRef {
    fn from_record(record: &Value) -> Result<Self, TemplateError> {
        let object = record
            .as_object()
            .ok_or(TemplateError::MalformedValue("handler must be an object".to_string()))?;

        Ok(Self {
            module: required_str(object, "moduleName")?,
            function: required_str(object, "functionName")?,
            version: required_str(object, "version")?,
        })
    }

    fn as_dictionary(&self) -> Value {
        json!({
            "moduleName": self.module,
            "functionName": self.function,
            "version": self.version,
        })
    }
}

/// `AgreementEvent` is one declared ledger event with the party that reacts
/// to it and the handler it dispatches to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgreementEvent {
    pub name: String,
    pub actor_type: ActorType,
    pub handler: HandlerRef,
}

impl AgreementEvent {
    pub fn from_record(record: &Value) -> Result<Self, TemplateError> {
        let object = record
            .as_object()
            .ok_or(TemplateError::MalformedValue("event must be an object".to_string()))?;

        let actor_tag = required_str(object, "actorType")?;
        let actor_type = ActorType::from_tag(&actor_tag).ok_or(TemplateError::MalformedValue(
            format!("unknown actorType: {}", actor_tag),
        ))?;

        let handler = object
            .get("handler")
            .ok_or(TemplateError::MissingValue("handler".to_string()))?;

        Ok(Self {
            name: required_str(object, "name")?,
            actor_type,
            handler: HandlerRef::from_record(handler)?,
        })
    }

    pub fn as_dictionary(&self) -> Value {
        json!({
            "name": self.name,
            "actorType": self.actor_type.as_str(),
            "handler": self.handler.as_dictionary(),
        })
    }

    /// `is_timeout` is true for the condition's abort-path event
    pub fn is_timeout(&self) -> bool {
        self.name.ends_with(TIMEOUT_EVENT_SUFFIX)
    }
}

/// `Parameter` is one typed name/value pair of a condition's fulfillment
/// function
///
/// `bytes32` values are normalized to 0x-prefixed form on load and
/// serialized un-prefixed, matching the ledger wire convention
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub param_type: ParameterType,
    pub value: String,
}

impl Parameter {
    pub fn from_record(record: &Value) -> Result<Self, TemplateError> {
        let object = record
            .as_object()
            .ok_or(TemplateError::MalformedValue("parameter must be an object".to_string()))?;

        let type_tag = required_str(object, "type")?;
        let param_type = ParameterType::from_tag(&type_tag)
            .map_err(|err| TemplateError::MalformedValue(err.to_string()))?;

        let mut value = required_str(object, "value")?;
        if param_type == ParameterType::Bytes32 && !value.starts_with("0x") {
            value = format!("0x{}", value);
        }

        Ok(Self {
            name: required_str(object, "name")?,
            param_type,
            value,
        })
    }

    pub fn as_dictionary(&self) -> Value {
        let value = if self.param_type == ParameterType::Bytes32 {
            self.value.strip_prefix("0x").unwrap_or(&self.value)
        } else {
            &self.value
        };

        json!({
            "name": self.name,
            "type": self.param_type.as_str(),
            "value": value,
        })
    }
}

/// `ServiceAgreementCondition` is one step of the agreement graph: its
/// fulfillment function, typed parameters, declared events, and the
/// prerequisite conditions it depends on
///
/// `timeout_flags` runs parallel to `dependencies`; a set flag means the
/// dependency's timeout must additionally be watched on this condition's
/// behalf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAgreementCondition {
    pub name: String,
    pub timelock: u64,
    pub timeout: u64,
    pub contract_name: String,
    pub function_name: String,
    pub parameters: Vec<Parameter>,
    pub events: Vec<AgreementEvent>,
    pub dependencies: Vec<String>,
    pub timeout_flags: Vec<u8>,
}

impl ServiceAgreementCondition {
    pub fn from_record(record: &Value) -> Result<Self, TemplateError> {
        let object = record
            .as_object()
            .ok_or(TemplateError::MalformedValue("condition must be an object".to_string()))?;

        let parameters = object
            .get("parameters")
            .and_then(|val| val.as_array())
            .map(|entries| entries.iter().map(Parameter::from_record).collect())
            .unwrap_or_else(|| Ok(Vec::new()))?;

        let events = object
            .get("events")
            .and_then(|val| val.as_array())
            .map(|entries| entries.iter().map(AgreementEvent::from_record).collect())
            .unwrap_or_else(|| Ok(Vec::new()))?;

        let dependencies: Vec<String> = object
            .get("dependencies")
            .and_then(|val| val.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|val| val.as_str())
                    .map(|val| val.to_string())
                    .collect()
            })
            .unwrap_or_default();

        let timeout_flags: Vec<u8> = object
            .get("dependencyTimeoutFlags")
            .and_then(|val| val.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .map(|val| val.as_u64().unwrap_or_default() as u8)
                    .collect()
            })
            .unwrap_or_default();

        if timeout_flags.len() != dependencies.len() {
            return Err(TemplateError::MalformedValue(
                "dependencyTimeoutFlags must run parallel to dependencies".to_string(),
            ));
        }

        Ok(Self {
            name: required_str(object, "name")?,
            timelock: object
                .get("timelock")
                .and_then(|val| val.as_u64())
                .unwrap_or_default(),
            timeout: object
                .get("timeout")
                .and_then(|val| val.as_u64())
                .unwrap_or_default(),
            contract_name: required_str(object, "contractName")?,
            function_name: required_str(object, "functionName")?,
            parameters,
            events,
            dependencies,
            timeout_flags,
        })
    }

    pub fn as_dictionary(&self) -> Value {
        json!({
            "name": self.name,
            "timelock": self.timelock,
            "timeout": self.timeout,
            "contractName": self.contract_name,
            "functionName": self.function_name,
            "parameters": self.parameters.iter().map(|p| p.as_dictionary()).collect::<Vec<_>>(),
            "events": self.events.iter().map(|e| e.as_dictionary()).collect::<Vec<_>>(),
            "dependencies": self.dependencies,
            "dependencyTimeoutFlags": self.timeout_flags,
        })
    }

    pub fn param_types(&self) -> Vec<ParameterType> {
        self.parameters.iter().map(|p| p.param_type).collect()
    }

    pub fn param_values(&self) -> Vec<&str> {
        self.parameters.iter().map(|p| p.value.as_str()).collect()
    }

    /// `values_hash` is the packed keccak-256 over the typed parameter list
    pub fn values_hash(&self) -> Result<[u8; 32], ConditionError> {
        keys::hash_multi_values(&self.param_types(), &self.param_values())
    }

    /// `timeout_event` picks the condition's abort-path event, when declared
    pub fn timeout_event(&self) -> Option<&AgreementEvent> {
        self.events.iter().find(|event| event.is_timeout())
    }
}

fn required_str(object: &Map<String, Value>, key: &str) -> Result<String, TemplateError> {
    object
        .get(key)
        .and_then(|val| val.as_str())
        .map(|val| val.to_string())
        .ok_or(TemplateError::MissingValue(key.to_string()))
}
