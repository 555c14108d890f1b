use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use rst_common::standard::serde_json::{json, Map, Value};

use super::types::DdoError;

/// Public key type tag for RSA verification keys
pub const PUBLIC_KEY_TYPE_RSA: &str = "RsaVerificationKey2018";

/// Public key type tag for Ethereum ECDSA address keys
pub const PUBLIC_KEY_TYPE_ETHEREUM_ECDSA: &str = "EthereumECDSAKey";

/// Authentication type tag matching [`PUBLIC_KEY_TYPE_RSA`]
pub const AUTHENTICATION_TYPE_RSA: &str = "RsaSignatureAuthentication2018";

/// `PublicKeyStoreType` selects how the raw key material is encoded inside
/// the document. The variant doubles as the JSON key the value is stored
/// under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicKeyStoreType {
    Pem,
    Hex,
    Base64,
    Base85,
    EthereumAddress,
}

impl PublicKeyStoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicKeyStoreType::Pem => "publicKeyPem",
            PublicKeyStoreType::Hex => "publicKeyHex",
            PublicKeyStoreType::Base64 => "publicKeyBase64",
            PublicKeyStoreType::Base85 => "publicKeyBase85",
            PublicKeyStoreType::EthereumAddress => "address",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "publicKeyPem" => Some(PublicKeyStoreType::Pem),
            "publicKeyHex" => Some(PublicKeyStoreType::Hex),
            "publicKeyBase64" => Some(PublicKeyStoreType::Base64),
            "publicKeyBase85" => Some(PublicKeyStoreType::Base85),
            "address" => Some(PublicKeyStoreType::EthereumAddress),
            _ => None,
        }
    }
}

/// `PublicKey` is one key record inside a `DDO`
///
/// It is owned exclusively by the document that created it (or embedded in
/// one of its authentication records) and is never mutated after creation
#[derive(Debug, Clone, PartialEq)]
pub struct PublicKey {
    id: String,
    owner: String,
    key_type: String,
    store_type: PublicKeyStoreType,
    value: String,
}

impl PublicKey {
    pub fn new(id: &str, owner: &str, key_type: &str) -> Self {
        Self {
            id: id.to_string(),
            owner: owner.to_string(),
            key_type: key_type.to_string(),
            store_type: PublicKeyStoreType::Pem,
            value: String::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn key_type(&self) -> &str {
        &self.key_type
    }

    pub fn store_type(&self) -> PublicKeyStoreType {
        self.store_type
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// `set_encoded_value` encodes the raw key material under the given
    /// store type. For [`PublicKeyStoreType::Pem`] the raw material is
    /// expected to already be PEM text
    pub fn set_encoded_value(&mut self, raw: &[u8], store_type: PublicKeyStoreType) {
        self.store_type = store_type;
        self.value = match store_type {
            PublicKeyStoreType::Pem => String::from_utf8_lossy(raw).to_string(),
            PublicKeyStoreType::Hex | PublicKeyStoreType::EthereumAddress => hex::encode(raw),
            PublicKeyStoreType::Base64 => BASE64.encode(raw),
            PublicKeyStoreType::Base85 => base85::encode(raw),
        };
    }

    /// `decoded_value` reverses [`PublicKey::set_encoded_value`], returning
    /// the raw key material
    pub fn decoded_value(&self) -> Result<Vec<u8>, DdoError> {
        match self.store_type {
            PublicKeyStoreType::Pem => Ok(self.value.clone().into_bytes()),
            PublicKeyStoreType::Hex | PublicKeyStoreType::EthereumAddress => {
                let stripped = self.value.strip_prefix("0x").unwrap_or(&self.value);
                hex::decode(stripped).map_err(|err| DdoError::ParseError(err.to_string()))
            }
            PublicKeyStoreType::Base64 => BASE64
                .decode(self.value.as_bytes())
                .map_err(|err| DdoError::ParseError(err.to_string())),
            PublicKeyStoreType::Base85 => base85::decode(&self.value)
                .map_err(|err| DdoError::ParseError(err.to_string())),
        }
    }

    /// `authentication_type` maps the key type to the matching
    /// authentication type tag
    pub fn authentication_type(&self) -> Result<&'static str, DdoError> {
        if self.key_type == PUBLIC_KEY_TYPE_RSA {
            return Ok(AUTHENTICATION_TYPE_RSA);
        }

        Err(DdoError::InvalidArgument(format!(
            "no authentication type for public key type {}",
            self.key_type
        )))
    }

    pub fn is_valid(&self) -> bool {
        !self.id.is_empty() && !self.key_type.is_empty() && !self.value.is_empty()
    }

    pub fn as_dictionary(&self) -> Value {
        json!({
            "id": self.id,
            "type": self.key_type,
            "owner": self.owner,
            self.store_type.as_str(): self.value,
        })
    }

    /// `from_record` rebuilds a public key from its dictionary form,
    /// discovering the store type from whichever value key is present
    pub fn from_record(record: &Map<String, Value>) -> Result<Self, DdoError> {
        let id = record
            .get("id")
            .and_then(|val| val.as_str())
            .unwrap_or_default();
        let owner = record
            .get("owner")
            .and_then(|val| val.as_str())
            .unwrap_or_default();
        let key_type = record
            .get("type")
            .and_then(|val| val.as_str())
            .unwrap_or(PUBLIC_KEY_TYPE_RSA);

        let mut key = PublicKey::new(id, owner, key_type);
        for (name, value) in record {
            if let Some(store_type) = PublicKeyStoreType::from_key(name) {
                key.store_type = store_type;
                key.value = value.as_str().unwrap_or_default().to_string();
                return Ok(key);
            }
        }

        Err(DdoError::ParseError(
            "public key record carries no key value".to_string(),
        ))
    }
}
