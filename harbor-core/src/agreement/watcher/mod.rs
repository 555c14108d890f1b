//! The condition-dependency watcher: a reactive projection of
//! ledger-authoritative agreement state.
//!
//! `plan` turns a template into a fully validated subscription set; the
//! watcher runs one polling task per subscription and dispatches each event
//! to its handler exactly once per (agreement, condition, event).

mod plan;
mod watcher;

pub use plan::{
    build_plan, Subscription, TimeoutWatch, WatchPlan, AGREEMENT_SCOPE, MAX_TIMEOUT, MIN_TIMEOUT,
};
pub use watcher::{AgreementWatch, Watcher};
