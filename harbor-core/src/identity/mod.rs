//! `identity` is the sub-domain used to manage asset identity following the
//! `DID Framework`
//!
//! There are two sub-domains in it:
//!
//! - `did` holds the decentralized identifier codec, a URI-like string in the
//!   form of `did:<method>:<id>[/<path>][#<fragment>]`
//! - `ddo` holds the `DDO (DID Document)`, the self-describing document a
//!   `DID` resolves to: embedded or referenced public keys, authentication
//!   records, typed services and a cryptographic integrity proof
pub mod did;
pub mod ddo;
