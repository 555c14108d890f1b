//! Deterministic derivation of condition keys and condition instance ids.
//!
//! Both agreement parties compute these independently and use them as lookup
//! keys on the ledger, so the packed encodings must be bit-exact: `address`
//! packs to 20 bytes, `bytes32` to 32, `bytes4` to 4, `uint256` to a 32-byte
//! big-endian integer parsed from its decimal string form, and `string` to
//! its raw UTF-8 bytes.

use sha3::{Digest, Keccak256};

use super::types::ConditionError;

/// `ParameterType` is the closed set of ledger value types a condition
/// parameter may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    Address,
    Bytes32,
    Bytes4,
    Uint256,
    Text,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::Address => "address",
            ParameterType::Bytes32 => "bytes32",
            ParameterType::Bytes4 => "bytes4",
            ParameterType::Uint256 => "uint256",
            ParameterType::Text => "string",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, ConditionError> {
        match tag {
            "address" => Ok(ParameterType::Address),
            "bytes32" => Ok(ParameterType::Bytes32),
            "bytes4" => Ok(ParameterType::Bytes4),
            "uint256" => Ok(ParameterType::Uint256),
            "string" => Ok(ParameterType::Text),
            other => Err(ConditionError::UnsupportedType(other.to_string())),
        }
    }
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// `pack_parameter` encodes one typed value into its canonical packed bytes
pub fn pack_parameter(
    param_type: ParameterType,
    value: &str,
) -> Result<Vec<u8>, ConditionError> {
    match param_type {
        ParameterType::Address => decode_hex_exact(value, 20),
        ParameterType::Bytes32 => decode_hex_exact(value, 32),
        ParameterType::Bytes4 => decode_hex_exact(value, 4),
        ParameterType::Uint256 => decimal_to_uint256(value).map(|bytes| bytes.to_vec()),
        ParameterType::Text => Ok(value.as_bytes().to_vec()),
    }
}

/// `hash_multi_values` is the packed keccak-256 over a typed value list,
/// types and values zipped in declared order
pub fn hash_multi_values(
    types: &[ParameterType],
    values: &[&str],
) -> Result<[u8; 32], ConditionError> {
    if types.len() != values.len() {
        return Err(ConditionError::LengthMismatch);
    }

    let mut packed = Vec::new();
    for (param_type, value) in types.iter().zip(values) {
        packed.extend(pack_parameter(*param_type, value)?);
    }

    Ok(keccak256(&packed))
}

/// `build_condition_key` derives the on-chain condition key:
/// keccak256(template_id ‖ contract_address ‖ fingerprint)
pub fn build_condition_key(
    template_id: &str,
    contract_address: &str,
    fingerprint: &str,
) -> Result<String, ConditionError> {
    let hash = hash_multi_values(
        &[
            ParameterType::Bytes32,
            ParameterType::Address,
            ParameterType::Bytes4,
        ],
        &[template_id, contract_address, fingerprint],
    )?;
    Ok(format!("0x{}", hex::encode(hash)))
}

/// `generate_condition_id` derives one condition instance's on-chain id:
/// keccak256(agreement_id ‖ contract_address ‖ values_hash)
pub fn generate_condition_id(
    agreement_id: &str,
    contract_address: &str,
    values_hash: &str,
) -> Result<String, ConditionError> {
    let hash = hash_multi_values(
        &[
            ParameterType::Bytes32,
            ParameterType::Address,
            ParameterType::Bytes32,
        ],
        &[agreement_id, contract_address, values_hash],
    )?;
    Ok(format!("0x{}", hex::encode(hash)))
}

fn decode_hex_exact(value: &str, expected_len: usize) -> Result<Vec<u8>, ConditionError> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(stripped).map_err(|err| {
        ConditionError::MalformedValue(format!("{}: {}", value, err))
    })?;
    if bytes.len() != expected_len {
        return Err(ConditionError::MalformedValue(format!(
            "{}: expected {} bytes, got {}",
            value,
            expected_len,
            bytes.len()
        )));
    }

    Ok(bytes)
}

/// Big-endian base-256 accumulation of a decimal string into 32 bytes
fn decimal_to_uint256(value: &str) -> Result<[u8; 32], ConditionError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConditionError::MalformedValue(format!(
            "{}: not a decimal integer",
            value
        )));
    }

    let mut out = [0u8; 32];
    for digit in value.bytes() {
        let mut carry = u32::from(digit - b'0');
        for byte in out.iter_mut().rev() {
            let acc = u32::from(*byte) * 10 + carry;
            *byte = (acc & 0xff) as u8;
            carry = acc >> 8;
        }
        if carry != 0 {
            return Err(ConditionError::ValueOutOfRange(value.to_string()));
        }
    }

    Ok(out)
}
