use rst_common::standard::serde_json::{json, Value};

use super::public_key::PublicKey;
use super::types::DdoError;

/// `Authentication` is one authentication record inside a `DDO`
///
/// A record either references a public key by id, or embeds the public key
/// directly so that no external lookup is needed. Exactly one of the two
/// forms is ever populated
#[derive(Debug, Clone, PartialEq)]
pub enum Authentication {
    Reference {
        public_key_id: String,
        auth_type: String,
    },
    Embedded(PublicKey),
}

impl Authentication {
    pub fn reference(public_key_id: &str, auth_type: &str) -> Self {
        Authentication::Reference {
            public_key_id: public_key_id.to_string(),
            auth_type: auth_type.to_string(),
        }
    }

    pub fn embedded(public_key: PublicKey) -> Self {
        Authentication::Embedded(public_key)
    }

    /// `is_public_key` is true only for the embedded form
    pub fn is_public_key(&self) -> bool {
        matches!(self, Authentication::Embedded(_))
    }

    pub fn public_key(&self) -> Option<&PublicKey> {
        match self {
            Authentication::Embedded(key) => Some(key),
            Authentication::Reference { .. } => None,
        }
    }

    /// `public_key_id` resolves to the referenced id, or the embedded key's
    /// own id
    pub fn public_key_id(&self) -> &str {
        match self {
            Authentication::Reference { public_key_id, .. } => public_key_id,
            Authentication::Embedded(key) => key.id(),
        }
    }

    pub fn auth_type(&self) -> Result<String, DdoError> {
        match self {
            Authentication::Reference { auth_type, .. } => Ok(auth_type.clone()),
            Authentication::Embedded(key) => key.authentication_type().map(|val| val.to_string()),
        }
    }

    pub fn is_key_id(&self, key_id: &str) -> bool {
        self.public_key_id() == key_id
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Authentication::Reference {
                public_key_id,
                auth_type,
            } => !public_key_id.is_empty() && !auth_type.is_empty(),
            Authentication::Embedded(key) => key.is_valid(),
        }
    }

    pub fn as_dictionary(&self) -> Value {
        match self {
            Authentication::Reference {
                public_key_id,
                auth_type,
            } => json!({
                "publicKey": public_key_id,
                "type": auth_type,
            }),
            Authentication::Embedded(key) => {
                let auth_type = key
                    .authentication_type()
                    .map(|val| val.to_string())
                    .unwrap_or_else(|_| key.key_type().to_string());
                json!({
                    "publicKey": key.as_dictionary(),
                    "type": auth_type,
                })
            }
        }
    }

    /// `from_record` rebuilds an authentication from its dictionary form,
    /// accepting both a nested public-key object and a bare key-id string
    pub fn from_record(record: &Value) -> Result<Self, DdoError> {
        let object = record
            .as_object()
            .ok_or(DdoError::ParseError("authentication record must be an object".to_string()))?;

        let key_value = object.get("publicKey").ok_or(DdoError::ParseError(
            "authentication record is missing the publicKey value".to_string(),
        ))?;

        match key_value {
            Value::Object(map) => Ok(Authentication::Embedded(PublicKey::from_record(map)?)),
            Value::String(key_id) => {
                let auth_type = object
                    .get("type")
                    .and_then(|val| val.as_str())
                    .unwrap_or_default();
                Ok(Authentication::reference(key_id, auth_type))
            }
            _ => Err(DdoError::ParseError(
                "authentication publicKey must be an object or an id string".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ddo::public_key::{
        PublicKeyStoreType, AUTHENTICATION_TYPE_RSA, PUBLIC_KEY_TYPE_RSA,
    };

    fn sample_key() -> PublicKey {
        let mut key = PublicKey::new("did:op:1234#keys=1", "did:op:1234", PUBLIC_KEY_TYPE_RSA);
        key.set_encoded_value(b"key-material", PublicKeyStoreType::Hex);
        key
    }

    #[test]
    fn test_reference_form() {
        let auth = Authentication::reference("did:op:1234#keys=1", AUTHENTICATION_TYPE_RSA);
        assert!(!auth.is_public_key());
        assert_eq!(auth.public_key_id(), "did:op:1234#keys=1");
        assert!(auth.public_key().is_none());
        assert!(auth.is_valid());
    }

    #[test]
    fn test_embedded_form() {
        let auth = Authentication::embedded(sample_key());
        assert!(auth.is_public_key());
        assert_eq!(auth.public_key_id(), "did:op:1234#keys=1");
        assert_eq!(auth.auth_type().unwrap(), AUTHENTICATION_TYPE_RSA);
    }

    #[test]
    fn test_dictionary_round_trip_reference() {
        let auth = Authentication::reference("did:op:1234#keys=1", AUTHENTICATION_TYPE_RSA);
        let rebuilt = Authentication::from_record(&auth.as_dictionary()).unwrap();
        assert_eq!(rebuilt, auth);
    }

    #[test]
    fn test_dictionary_round_trip_embedded() {
        let auth = Authentication::embedded(sample_key());
        let rebuilt = Authentication::from_record(&auth.as_dictionary()).unwrap();
        assert_eq!(rebuilt, auth);
    }

    #[test]
    fn test_from_record_missing_public_key() {
        let record = rst_common::standard::serde_json::json!({"type": AUTHENTICATION_TYPE_RSA});
        let result = Authentication::from_record(&record);
        assert!(matches!(result.unwrap_err(), DdoError::ParseError(_)));
    }
}
