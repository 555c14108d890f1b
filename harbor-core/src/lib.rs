//! `harbor-core` holds the core business logic for the `harbor` protocol
//!
//! The crate is split into two sub-domains:
//!
//! - `identity` manages the `DID` syntax and the `DDO (DID Document)`,
//!   including its public keys, authentication records, typed services and
//!   the integrity proof used to sign and verify the document
//! - `agreement` manages multi-condition service agreements: the declarative
//!   template (condition graph with dependencies and timeouts), the
//!   deterministic condition key derivation, and the watcher that reacts to
//!   ledger events and drives the per-agreement condition states
//!
//! The ledger itself, the metadata store, the secret store and the purchase
//! counterparty are external collaborators. They appear here only as trait
//! boundaries so that callers can inject their own implementations, and so
//! tests can run against mocks.
pub mod agreement;
pub mod identity;
