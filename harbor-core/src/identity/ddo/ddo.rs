use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use sha3::Keccak256;

use rst_common::standard::chrono::Utc;
use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json::{self, json, Map, Value};
use rst_common::with_logging::log::debug;

use crate::identity::did::DID;

use super::authentication::Authentication;
use super::public_key::{PublicKey, PublicKeyStoreType, PUBLIC_KEY_TYPE_RSA};
use super::service::{Service, ServiceType, ServiceValue};
use super::types::DdoError;

/// JSON-LD context installed on every serialized document
pub const DDO_CONTEXT_URL: &str = "https://w3id.org/future-method/v1";

/// Modulus size for the keypairs generated by [`DDO::add_signature`]
const KEY_PAIR_MODULUS_BIT: usize = 2048;

/// `Proof` is the static integrity proof of a `DDO`
///
/// The `creator` names the public key (by id) the signature verifies
/// against; `signature_value` is the base64 encoded signature over the
/// document's canonical signature text
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(crate = "self::serde")]
pub struct Proof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub created: String,
    pub creator: String,
    #[serde(rename = "signatureValue")]
    pub signature_value: String,
}

/// `DDO` is the aggregate root of the `identity` domain
///
/// It is created empty against a `DID` and populated incrementally: public
/// keys first, then authentication records, then services, then the proof.
/// Insertion order is preserved everywhere since the canonical hash is
/// computed over the ordered fragment list
#[derive(Debug, Clone, PartialEq)]
pub struct DDO {
    did: String,
    created: Option<String>,
    public_keys: Vec<PublicKey>,
    authentications: Vec<Authentication>,
    services: Vec<Service>,
    proof: Option<Proof>,
}

impl DDO {
    pub fn new(did: &str) -> Self {
        Self {
            did: did.to_string(),
            created: Some(get_timestamp()),
            public_keys: Vec::new(),
            authentications: Vec::new(),
            services: Vec::new(),
            proof: None,
        }
    }

    /// `with_created` pins the creation timestamp, which is part of the
    /// canonical hash input
    pub fn with_created(did: &str, created: &str) -> Self {
        let mut ddo = Self::new(did);
        ddo.created = Some(created.to_string());
        ddo
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    pub fn created(&self) -> Option<&str> {
        self.created.as_deref()
    }

    /// `asset_id` derives the 0x-prefixed asset id from the document's `DID`
    pub fn asset_id(&self) -> Result<String, DdoError> {
        let parsed = DID::parse(&self.did).map_err(|err| DdoError::ParseError(err.to_string()))?;
        Ok(format!("0x{}", parsed.id()))
    }

    pub fn public_keys(&self) -> &[PublicKey] {
        &self.public_keys
    }

    pub fn authentications(&self) -> &[Authentication] {
        &self.authentications
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn proof(&self) -> Option<&Proof> {
        self.proof.as_ref()
    }

    pub fn is_proof_defined(&self) -> bool {
        self.proof.is_some()
    }

    pub fn add_public_key(&mut self, public_key: PublicKey) {
        debug!("adding public key {} to ddo {}", public_key.id(), self.did);
        self.public_keys.push(public_key);
    }

    /// `add_authentication` appends a referencing authentication record
    ///
    /// A bare key id needs an explicit authentication type; passing `None`
    /// fails with [`DdoError::InvalidArgument`]
    pub fn add_authentication(
        &mut self,
        key_id: &str,
        auth_type: Option<&str>,
    ) -> Result<(), DdoError> {
        let auth_type = auth_type.ok_or(DdoError::InvalidArgument(
            "an authentication referencing a key id needs an explicit type".to_string(),
        ))?;

        self.authentications
            .push(Authentication::reference(key_id, auth_type));
        Ok(())
    }

    /// `add_embedded_authentication` appends an authentication carrying the
    /// public key directly
    pub fn add_embedded_authentication(&mut self, public_key: PublicKey) {
        self.authentications
            .push(Authentication::embedded(public_key));
    }

    /// `add_signature` generates a fresh RSA keypair and installs the public
    /// half, either embedded into a new authentication record or appended to
    /// the public key list plus a referencing record
    ///
    /// Returns the PKCS#8 PEM of the private key; the document never stores
    /// it, persisting it is the caller's job
    pub fn add_signature(
        &mut self,
        store_type: PublicKeyStoreType,
        embedded: bool,
    ) -> Result<String, DdoError> {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, KEY_PAIR_MODULUS_BIT)
            .map_err(|err| DdoError::KeypairError(err.to_string()))?;
        let public_key = RsaPublicKey::from(&private_key);

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|err| DdoError::KeypairError(err.to_string()))?
            .to_string();

        let raw = match store_type {
            PublicKeyStoreType::Pem => public_key
                .to_public_key_pem(LineEnding::LF)
                .map_err(|err| DdoError::KeypairError(err.to_string()))?
                .into_bytes(),
            _ => public_key
                .to_public_key_der()
                .map_err(|err| DdoError::KeypairError(err.to_string()))?
                .as_bytes()
                .to_vec(),
        };

        let next_index = self.public_key_count() + 1;
        let key_id = format!("{}#keys={}", self.did, next_index);

        let mut record = PublicKey::new(&key_id, &key_id, PUBLIC_KEY_TYPE_RSA);
        record.set_encoded_value(&raw, store_type);

        if embedded {
            self.add_embedded_authentication(record);
        } else {
            let auth_type = record.authentication_type()?;
            self.add_public_key(record);
            self.add_authentication(&key_id, Some(auth_type))?;
        }

        debug!("added signature key {} to ddo {}", key_id, self.did);
        Ok(private_pem)
    }

    /// `add_service` appends a service record, stamping the owning `DID` and
    /// a positional `serviceDefinitionId` when absent
    pub fn add_service(&mut self, mut service: Service) -> Result<(), DdoError> {
        if service.did().is_none() {
            service
                .set_did(&self.did)
                .map_err(|err| DdoError::InvalidArgument(err.to_string()))?;
        }

        if service.service_definition_id().is_none() {
            let index = self.services.len().to_string();
            service
                .update_value("serviceDefinitionId", ServiceValue::Text(index))
                .map_err(|err| DdoError::InvalidArgument(err.to_string()))?;
        }

        debug!(
            "adding service type {} to ddo {}",
            service.service_type().as_str(),
            self.did
        );
        self.services.push(service);
        Ok(())
    }

    pub fn find_service_by_id(&self, service_definition_id: &str) -> Option<&Service> {
        self.services
            .iter()
            .find(|svc| svc.service_definition_id() == Some(service_definition_id))
    }

    pub fn find_service_by_type(&self, service_type: &ServiceType) -> Option<&Service> {
        self.services
            .iter()
            .find(|svc| svc.service_type() == service_type)
    }

    /// `metadata_service` is a convenience accessor for the metadata block
    /// carried by the document's Metadata service
    pub fn metadata_service(&self) -> Option<&ServiceValue> {
        self.find_service_by_type(&ServiceType::Metadata)
            .and_then(|svc| svc.value("metadata"))
    }

    /// `get_public_key` resolves a key id against the public key list and,
    /// when asked, the keys embedded inside authentication records
    pub fn get_public_key(&self, key_id: &str, search_embedded: bool) -> Option<&PublicKey> {
        let found = self.public_keys.iter().find(|key| key.id() == key_id);
        if found.is_some() || !search_embedded {
            return found;
        }

        self.authentications
            .iter()
            .filter(|auth| auth.is_key_id(key_id))
            .find_map(|auth| auth.public_key())
    }

    /// `public_key_count` counts listed plus embedded keys
    pub fn public_key_count(&self) -> usize {
        let embedded = self
            .authentications
            .iter()
            .filter(|auth| auth.is_public_key())
            .count();
        self.public_keys.len() + embedded
    }

    /// `hash_fragments` builds the canonical ordered list of hashable text
    /// fragments: the creation timestamp, every public key's type and value,
    /// every embedded authentication key's type and value, and every
    /// service's type and endpoints
    ///
    /// Fails with [`DdoError::EmptyDocument`] when there is nothing to hash
    pub fn hash_fragments(&self) -> Result<Vec<String>, DdoError> {
        let mut fragments = Vec::new();

        if let Some(created) = &self.created {
            fragments.push(created.clone());
        }

        for key in &self.public_keys {
            if !key.key_type().is_empty() {
                fragments.push(key.key_type().to_string());
            }
            if !key.value().is_empty() {
                fragments.push(key.value().to_string());
            }
        }

        for auth in &self.authentications {
            if let Some(key) = auth.public_key() {
                if !key.key_type().is_empty() {
                    fragments.push(key.key_type().to_string());
                }
                if !key.value().is_empty() {
                    fragments.push(key.value().to_string());
                }
            }
        }

        for service in &self.services {
            fragments.push(service.service_type().as_str().to_string());
            let (service_endpoint, purchase_endpoint) = service.endpoints();
            fragments.push(service_endpoint.to_string());
            fragments.push(purchase_endpoint.to_string());
        }

        if fragments.is_empty() {
            return Err(DdoError::EmptyDocument);
        }

        Ok(fragments)
    }

    /// `signature_text` is the canonical signable input: the concatenation
    /// of the hash fragments
    pub fn signature_text(&self) -> Result<String, DdoError> {
        Ok(self.hash_fragments()?.concat())
    }

    /// `calculate_hash` fingerprints the document: keccak-256 over the
    /// UTF-8 concatenation of the canonical fragment list
    pub fn calculate_hash(&self) -> Result<[u8; 32], DdoError> {
        let text = self.signature_text()?;
        Ok(Keccak256::digest(text.as_bytes()).into())
    }

    /// `install_proof` installs an imported proof record verbatim
    pub fn install_proof(&mut self, proof: Proof) {
        self.proof = Some(proof);
    }

    /// `add_proof` signs the document with the authentication at
    /// `auth_index` and installs the resulting proof
    ///
    /// The signing key is the authentication's embedded key or the public
    /// key it references; a missing authentication or unresolvable key fails
    /// with [`DdoError::KeyNotFound`]
    pub fn add_proof(
        &mut self,
        auth_index: usize,
        private_key_pem: &str,
        signature_text: Option<&str>,
    ) -> Result<(), DdoError> {
        let authentication = self
            .authentications
            .get(auth_index)
            .ok_or(DdoError::KeyNotFound(format!(
                "no authentication at index {}",
                auth_index
            )))?;

        let sign_key = match authentication.public_key() {
            Some(key) => key.clone(),
            None => {
                let key_id = authentication.public_key_id().to_string();
                self.get_public_key(&key_id, true)
                    .ok_or(DdoError::KeyNotFound(key_id))?
                    .clone()
            }
        };

        let text = match signature_text {
            Some(text) => text.to_string(),
            None => self.signature_text()?,
        };

        // the previous proof must not leak into a re-signed document
        self.proof = None;

        let signature = sign_text(&text, private_key_pem)?;
        self.proof = Some(Proof {
            proof_type: sign_key.key_type().to_string(),
            created: get_timestamp(),
            creator: sign_key.id().to_string(),
            signature_value: BASE64.encode(signature),
        });

        Ok(())
    }

    /// `validate_proof` verifies the installed proof against the document's
    /// canonical signature text
    ///
    /// By contract this never fails: a missing proof, an incomplete proof
    /// record, or any verification error all collapse to `false`
    pub fn validate_proof(&self, signature_text: Option<&str>) -> bool {
        let text = match signature_text {
            Some(text) => text.to_string(),
            None => match self.signature_text() {
                Ok(text) => text,
                Err(err) => {
                    debug!("proof validation failed building signature text: {}", err);
                    return false;
                }
            },
        };

        let proof = match &self.proof {
            Some(proof) => proof,
            None => return false,
        };

        if proof.creator.is_empty() || proof.signature_value.is_empty() {
            return false;
        }

        let signature = match BASE64.decode(proof.signature_value.as_bytes()) {
            Ok(signature) => signature,
            Err(err) => {
                debug!("proof signatureValue is not valid base64: {}", err);
                return false;
            }
        };

        self.validate_from_key(&proof.creator, &text, &signature)
    }

    /// `validate_from_key` verifies a signature against the named public
    /// key. Any resolution or verification failure is `false`
    pub fn validate_from_key(&self, key_id: &str, text: &str, signature: &[u8]) -> bool {
        let public_key = match self.get_public_key(key_id, true) {
            Some(key) => key,
            None => return false,
        };

        let authentication = self
            .authentications
            .iter()
            .find(|auth| auth.is_key_id(public_key.id()));
        if authentication.is_none() {
            return false;
        }

        let material = match public_key.decoded_value() {
            Ok(material) => material,
            Err(err) => {
                debug!("unable to decode public key {}: {}", key_id, err);
                return false;
            }
        };

        verify_signature(text, &material, public_key.store_type(), signature)
    }

    /// `validate` checks the structural consistency of the document: every
    /// authentication resolves to a discoverable, valid public key and every
    /// service carries a type and an endpoint
    pub fn validate(&self) -> bool {
        for authentication in &self.authentications {
            if !authentication.is_valid() {
                return false;
            }

            let resolved = match authentication.public_key() {
                Some(key) => Some(key),
                None => self.get_public_key(authentication.public_key_id(), true),
            };
            match resolved {
                Some(key) if key.is_valid() => {}
                _ => return false,
            }
        }

        self.services.iter().all(|svc| svc.is_valid())
    }

    /// `as_dictionary` produces the canonical nested structure
    pub fn as_dictionary(&self, include_proof: bool) -> Value {
        let mut record = Map::new();
        record.insert("@context".to_string(), json!(DDO_CONTEXT_URL));
        record.insert("id".to_string(), json!(self.did));
        if let Some(created) = &self.created {
            record.insert("created".to_string(), json!(created));
        }

        if !self.public_keys.is_empty() {
            let keys: Vec<Value> = self.public_keys.iter().map(|key| key.as_dictionary()).collect();
            record.insert("publicKey".to_string(), Value::Array(keys));
        }
        if !self.authentications.is_empty() {
            let auths: Vec<Value> = self
                .authentications
                .iter()
                .map(|auth| auth.as_dictionary())
                .collect();
            record.insert("authentication".to_string(), Value::Array(auths));
        }
        if !self.services.is_empty() {
            let services: Vec<Value> =
                self.services.iter().map(|svc| svc.as_dictionary()).collect();
            record.insert("service".to_string(), Value::Array(services));
        }
        if include_proof {
            if let Some(proof) = &self.proof {
                if let Ok(value) = serde_json::to_value(proof) {
                    record.insert("proof".to_string(), value);
                }
            }
        }

        Value::Object(record)
    }

    pub fn as_text(&self, include_proof: bool) -> Result<String, DdoError> {
        serde_json::to_string(&self.as_dictionary(include_proof))
            .map_err(|err| DdoError::SerializeError(err.to_string()))
    }

    /// `from_text` is the structural inverse of [`DDO::as_text`]
    pub fn from_text(text: &str) -> Result<Self, DdoError> {
        let value: Value =
            serde_json::from_str(text).map_err(|err| DdoError::ParseError(err.to_string()))?;
        Self::from_dictionary(&value)
    }

    /// `from_dictionary` imports the canonical structure, tolerating nested
    /// values that arrive as JSON-embedded strings (double-encoded) as well
    /// as plain objects
    pub fn from_dictionary(value: &Value) -> Result<Self, DdoError> {
        let object = value
            .as_object()
            .ok_or(DdoError::ParseError("document must be an object".to_string()))?;

        let did = object
            .get("id")
            .and_then(|val| val.as_str())
            .ok_or(DdoError::ParseError("document is missing the id value".to_string()))?;

        let mut ddo = DDO::new(did);
        ddo.created = object
            .get("created")
            .and_then(|val| val.as_str())
            .map(|val| val.to_string());

        if let Some(entries) = object.get("publicKey").and_then(|val| val.as_array()) {
            for entry in entries {
                let entry = unwrap_embedded_json(entry)?;
                let record = entry
                    .as_object()
                    .ok_or(DdoError::ParseError("publicKey entry must be an object".to_string()))?;
                ddo.public_keys.push(PublicKey::from_record(record)?);
            }
        }

        if let Some(entries) = object.get("authentication").and_then(|val| val.as_array()) {
            for entry in entries {
                let entry = unwrap_embedded_json(entry)?;
                ddo.authentications.push(Authentication::from_record(&entry)?);
            }
        }

        if let Some(entries) = object.get("service").and_then(|val| val.as_array()) {
            for entry in entries {
                let entry = unwrap_embedded_json(entry)?;
                let mut service = Service::from_record(&entry)
                    .map_err(|err| DdoError::ParseError(err.to_string()))?;
                service
                    .set_did(did)
                    .map_err(|err| DdoError::ParseError(err.to_string()))?;
                ddo.services.push(service);
            }
        }

        if let Some(proof) = object.get("proof") {
            let proof: Proof = serde_json::from_value(proof.clone())
                .map_err(|err| DdoError::ParseError(err.to_string()))?;
            ddo.proof = Some(proof);
        }

        Ok(ddo)
    }
}

/// Double-encoded tolerance: a nested entry may itself be a JSON string
fn unwrap_embedded_json(value: &Value) -> Result<Value, DdoError> {
    match value {
        Value::String(text) => {
            serde_json::from_str(text).map_err(|err| DdoError::ParseError(err.to_string()))
        }
        other => Ok(other.clone()),
    }
}

fn get_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn sign_text(text: &str, private_key_pem: &str) -> Result<Vec<u8>, DdoError> {
    let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
        .map_err(|err| DdoError::SignError(err.to_string()))?;

    let digest = Sha256::digest(text.as_bytes());
    private_key
        .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
        .map_err(|err| DdoError::SignError(err.to_string()))
}

fn verify_signature(
    text: &str,
    key_material: &[u8],
    store_type: PublicKeyStoreType,
    signature: &[u8],
) -> bool {
    let public_key = match store_type {
        PublicKeyStoreType::Pem => match std::str::from_utf8(key_material)
            .map_err(|err| err.to_string())
            .and_then(|pem| {
                RsaPublicKey::from_public_key_pem(pem).map_err(|err| err.to_string())
            }) {
            Ok(key) => key,
            Err(err) => {
                debug!("unable to parse pem public key: {}", err);
                return false;
            }
        },
        _ => match RsaPublicKey::from_public_key_der(key_material) {
            Ok(key) => key,
            Err(err) => {
                debug!("unable to parse der public key: {}", err);
                return false;
            }
        },
    };

    let digest = Sha256::digest(text.as_bytes());
    public_key
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
        .is_ok()
}
