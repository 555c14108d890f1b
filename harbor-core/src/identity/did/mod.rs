//! `did` is a sub-domain of `identity` holding the decentralized identifier
//! codec
//!
//! A `DID` is an opaque identifier string:
//!
//! ```text
//! did:<method>:<id>[/<path>][#<fragment>]
//! ```
//!
//! The `method` is restricted to `[a-z0-9]+` and the `id` to
//! `[a-zA-Z0-9\-.]+`. Generation sanitizes its inputs by stripping every
//! disallowed character, so parsing is the structural inverse of generation
//! and round-trips for any `DID` produced here.
pub mod types;

mod did;
pub use did::{did_to_id_bytes, id_to_did, DEFAULT_METHOD, DID};
