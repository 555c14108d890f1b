use std::fmt;

use rst_common::standard::uuid::Uuid;

use super::types::DidError;

/// Default method name used when generating a new [`DID`]
pub const DEFAULT_METHOD: &str = "ocean";

/// `DID` is the parsed form of a decentralized identifier
///
/// The identifier is immutable once assigned to a `DDO`; this type is a
/// value object, every operation builds a new instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DID {
    method: String,
    id: String,
    path: Option<String>,
    fragment: Option<String>,
}

impl DID {
    /// `generate` builds a `DID` from its parts
    ///
    /// The `method` is case-folded and stripped down to `[a-z0-9]`, the `id`
    /// stripped down to `[a-zA-Z0-9\-.]`. The optional `path` and `fragment`
    /// are appended as `/<path>` and `#<fragment>`
    pub fn generate(id: &str, path: Option<&str>, fragment: Option<&str>, method: &str) -> Self {
        let method = method
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            .collect::<String>();

        let id = id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '.')
            .collect::<String>();

        Self {
            method,
            id,
            path: path.map(|val| val.to_string()),
            fragment: fragment.map(|val| val.to_string()),
        }
    }

    /// `random` generates a fresh `did:ocean:<64 hex chars>` identifier
    pub fn random() -> Self {
        let id = format!(
            "{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        );
        Self::generate(&id, None, None, DEFAULT_METHOD)
    }

    /// `parse` splits a `DID` string back into its parts
    ///
    /// Fails with [`DidError::MalformedDID`] when the input does not match
    /// `^did:[a-z0-9]+:[a-zA-Z0-9\-.]+`. The remainder after the `id` is
    /// split using standard URI path/fragment rules; an empty remainder
    /// yields no path and no fragment
    pub fn parse(did: &str) -> Result<Self, DidError> {
        let rest = did
            .strip_prefix("did:")
            .ok_or(DidError::MalformedDID(did.to_string()))?;

        let method: String = rest
            .chars()
            .take_while(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            .collect();

        let rest = rest
            .get(method.len()..)
            .and_then(|val| val.strip_prefix(':'))
            .ok_or(DidError::MalformedDID(did.to_string()))?;

        let id: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '.')
            .collect();

        if method.is_empty() || id.is_empty() {
            return Err(DidError::MalformedDID(did.to_string()));
        }

        let remainder = &rest[id.len()..];
        let (path, fragment) = Self::split_remainder(remainder);

        Ok(Self {
            method,
            id,
            path,
            fragment,
        })
    }

    fn split_remainder(remainder: &str) -> (Option<String>, Option<String>) {
        if remainder.is_empty() {
            return (None, None);
        }

        let (path_part, fragment) = match remainder.split_once('#') {
            Some((before, frag)) => (before, Some(frag.to_string())),
            None => (remainder, None),
        };

        let path = path_part
            .strip_prefix('/')
            .filter(|val| !val.is_empty())
            .map(|val| val.to_string());

        (path, fragment)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// `id_bytes` hex-decodes the `id` component into its raw 32 bytes
    ///
    /// Fails with [`DidError::InvalidDID`] when the component is not a hex
    /// string
    pub fn id_bytes(&self) -> Result<Vec<u8>, DidError> {
        let stripped = self.id.strip_prefix("0x").unwrap_or(&self.id);
        hex::decode(stripped).map_err(|err| DidError::InvalidDID(err.to_string()))
    }
}

impl fmt::Display for DID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "did:{}:{}", self.method, self.id)?;
        if let Some(path) = &self.path {
            write!(f, "/{}", path)?;
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{}", fragment)?;
        }
        Ok(())
    }
}

/// `did_to_id_bytes` converts a `DID` string to the raw bytes of its hex `id`
///
/// A bare hex string (with or without a `0x` prefix) is rejected with
/// [`DidError::InvalidDID`]: the caller passed an id where a `DID` was
/// expected
pub fn did_to_id_bytes(did: &str) -> Result<Vec<u8>, DidError> {
    let is_bare_hex = {
        let stripped = did.strip_prefix("0x").unwrap_or(did);
        !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_alphanumeric())
    };
    if is_bare_hex {
        return Err(DidError::InvalidDID(format!(
            "{} must be a DID not a hex string",
            did
        )));
    }

    let parsed = DID::parse(did)?;
    parsed.id_bytes()
}

/// `id_to_did` builds a `DID` string from a raw hex id
///
/// The leading `0x` is stripped; an empty byte value collapses to the id `"0"`
pub fn id_to_did(id: &str, method: &str) -> Result<String, DidError> {
    let stripped = id.strip_prefix("0x").unwrap_or(id);
    let bytes = hex::decode(stripped).map_err(|err| DidError::InvalidDID(err.to_string()))?;
    if bytes.is_empty() {
        return Ok(DID::generate("0", None, None, method).to_string());
    }

    Ok(DID::generate(&hex::encode(bytes), None, None, method).to_string())
}
