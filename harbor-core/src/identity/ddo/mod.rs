//! `ddo` is a sub-domain of `identity` holding the `DDO (DID Document)`
//!
//! The document is the aggregate root: it owns an ordered list of public
//! keys, an ordered list of authentication records (either references to a
//! public key id or embedded keys), an ordered list of typed services, and
//! an optional integrity proof signed over the document's canonical hash.
//!
//! The document is populated incrementally (public keys, authentications,
//! services, proof) and is immutable for the purposes of agreement
//! negotiation: an update always produces a new document version
pub mod types;

mod public_key;
pub use public_key::{
    PublicKey, PublicKeyStoreType, AUTHENTICATION_TYPE_RSA, PUBLIC_KEY_TYPE_ETHEREUM_ECDSA,
    PUBLIC_KEY_TYPE_RSA,
};

mod authentication;
pub use authentication::Authentication;

mod service;
pub use service::{Service, ServiceType, ServiceValue};

mod ddo;
pub use ddo::{Proof, DDO, DDO_CONTEXT_URL};
