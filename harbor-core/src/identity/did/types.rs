use rst_common::with_errors::thiserror::{self, Error};

/// `DidError` provides all specific error types related with the `DID`
/// syntax. Both variants are terminal: a malformed identifier is never
/// retried, it is surfaced straight back to the caller
#[derive(Debug, PartialEq, Error, Clone)]
pub enum DidError {
    #[error("malformed did: {0}")]
    MalformedDID(String),

    #[error("invalid did: {0}")]
    InvalidDID(String),
}
