//! The service-agreement domain: declarative condition-graph templates,
//! deterministic condition id derivation, and the watcher that drives
//! off-chain reactions to on-chain events.

pub mod keys;
pub mod types;
pub mod watcher;

mod condition;
mod handlers;
mod registry;
mod template;

#[cfg(test)]
pub(crate) mod testutil;

pub use condition::{AgreementEvent, HandlerRef, Parameter, ServiceAgreementCondition};
pub use handlers::{HandlerContext, HandlerFn, HandlerFuture, HandlerKey, HandlerRegistry};
pub use registry::{AgreementRegistry, ConditionState};
pub use template::ServiceAgreementTemplate;
