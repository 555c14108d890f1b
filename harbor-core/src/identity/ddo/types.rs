use rst_common::standard::async_trait::async_trait;
use rst_common::standard::serde_json::Value;
use rst_common::with_errors::thiserror::{self, Error};

/// `DdoError` provides all specific error types related with the `DDO`
/// document construction and its integrity proof
///
/// Note that proof *verification* failures never surface here: by contract
/// `validate_proof` collapses every failure into a boolean `false`
#[derive(Debug, PartialEq, Error, Clone)]
pub enum DdoError {
    #[error("empty document: nothing to hash")]
    EmptyDocument,

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unable to sign: {0}")]
    SignError(String),

    #[error("unable to generate keypair: {0}")]
    KeypairError(String),

    #[error("unable to serialize document: {0}")]
    SerializeError(String),

    #[error("unable to parse document: {0}")]
    ParseError(String),
}

/// `ServiceError` provides all specific error types related with a single
/// service record inside the `DDO`
#[derive(Debug, PartialEq, Error, Clone)]
pub enum ServiceError {
    #[error("service record is missing an endpoint")]
    MissingEndpoint,

    #[error("service record is missing a type")]
    MissingType,

    #[error("service did already set")]
    DidAlreadySet,

    #[error("reserved value: {0}")]
    ReservedValue(String),
}

/// `MetadataStoreClient` is the trait boundary for the external metadata
/// store (an HTTP document store in the reference deployment)
///
/// The store keeps the published `DDO` documents; permissioning and
/// persistence are entirely the collaborator's concern. A duplicate id on
/// `put_document` is rejected by the store itself
#[async_trait]
pub trait MetadataStoreClient {
    async fn get_document(&self, id: String) -> Result<Vec<u8>, DdoError>;
    async fn put_document(&self, id: String, document: Vec<u8>) -> Result<(), DdoError>;
    async fn delete_document(&self, id: String) -> Result<(), DdoError>;
    async fn search(&self, query: Value) -> Result<Vec<Vec<u8>>, DdoError>;
}
