use std::collections::{BTreeMap, HashSet};
use std::fmt;

use super::super::condition::ServiceAgreementCondition;
use super::super::handlers::{HandlerFn, HandlerRegistry};
use super::super::template::ServiceAgreementTemplate;
use super::super::types::{ActorType, WatcherError};

/// Bounds on any timeout used for abort-triggering, in seconds
pub const MIN_TIMEOUT: u64 = 2;
pub const MAX_TIMEOUT: u64 = 60 * 60 * 24 * 7;

/// Registry scope used for template-level events, which belong to no single
/// condition
pub const AGREEMENT_SCOPE: &str = "serviceAgreement";

/// `TimeoutWatch` is the abort path attached to a condition subscription: if
/// the deadline elapses before the primary event fires, the condition's
/// timeout event handler runs instead
#[derive(Clone)]
pub struct TimeoutWatch {
    /// the condition whose timeout-flagged dependency edge requested this
    pub dependent_name: String,
    pub timeout: u64,
    pub event_name: String,
    pub handler: HandlerFn,
}

/// `Subscription` is one (contract, event) watch for one agreement, with its
/// resolved handler and optional timeout race
#[derive(Clone)]
pub struct Subscription {
    pub contract_name: String,
    pub condition_name: String,
    pub event_name: String,
    pub handler: HandlerFn,
    pub timeout: Option<TimeoutWatch>,
}

/// `WatchPlan` is the fully resolved subscription set for one actor type,
/// every handler and timeout validated before any event traffic
pub struct WatchPlan {
    pub agreement_contract: String,
    pub subscriptions: Vec<Subscription>,
    pub conditions: Vec<ServiceAgreementCondition>,
}

// handlers are opaque closures, so the derive is not available
impl fmt::Debug for WatchPlan {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("WatchPlan")
            .field("agreement_contract", &self.agreement_contract)
            .field("subscriptions", &self.subscriptions.len())
            .field("conditions", &self.conditions.len())
            .finish_non_exhaustive()
    }
}

/// `build_plan` derives the concrete watch plan from a template
///
/// Dependent-timeout pairs accumulate per watched condition (a condition may
/// be timeout-watched by several dependents); the earliest dependent
/// deadline wins the watch. Authoring errors — an unknown dependency name, a
/// timeout outside `[MIN_TIMEOUT, MAX_TIMEOUT]`, a watched condition with no
/// timeout event, an unregistered handler — all fail here, never mid-flight
pub fn build_plan(
    template: &ServiceAgreementTemplate,
    actor_type: ActorType,
    handlers: &HandlerRegistry,
) -> Result<WatchPlan, WatcherError> {
    let conditions = template
        .conditions()
        .map_err(|err| WatcherError::InvalidTemplate(err.to_string()))?;
    let names: HashSet<&str> = conditions.iter().map(|cond| cond.name.as_str()).collect();

    let mut dependants: BTreeMap<String, Vec<(String, u64)>> = BTreeMap::new();
    for condition in &conditions {
        if condition.dependencies.is_empty() || condition.timeout == 0 {
            continue;
        }

        for (dependency, flag) in condition.dependencies.iter().zip(&condition.timeout_flags) {
            if *flag != 1 {
                continue;
            }
            if !names.contains(dependency.as_str()) {
                return Err(WatcherError::UnknownDependency(dependency.clone()));
            }
            if condition.timeout < MIN_TIMEOUT || condition.timeout > MAX_TIMEOUT {
                return Err(WatcherError::TimeoutOutOfRange(format!(
                    "{}: {}",
                    condition.name, condition.timeout
                )));
            }

            dependants
                .entry(dependency.clone())
                .or_default()
                .push((condition.name.clone(), condition.timeout));
        }
    }

    let mut subscriptions = Vec::new();
    for condition in &conditions {
        let mut timeout_watch = None;
        if let Some(dependents) = dependants.get(&condition.name) {
            let timeout_event = condition
                .timeout_event()
                .ok_or(WatcherError::MissingTimeoutEvent(condition.name.clone()))?;

            if let Some((dependent_name, timeout)) =
                dependents.iter().min_by_key(|(_, timeout)| *timeout).cloned()
            {
                timeout_watch = Some(TimeoutWatch {
                    dependent_name,
                    timeout,
                    event_name: timeout_event.name.clone(),
                    handler: handlers.resolve(&timeout_event.handler)?,
                });
            }
        }

        for event in &condition.events {
            if event.actor_type != actor_type || event.is_timeout() {
                continue;
            }

            subscriptions.push(Subscription {
                contract_name: condition.contract_name.clone(),
                condition_name: condition.name.clone(),
                event_name: event.name.clone(),
                handler: handlers.resolve(&event.handler)?,
                timeout: timeout_watch.clone(),
            });
        }
    }

    let agreement_events = template
        .agreement_events()
        .map_err(|err| WatcherError::InvalidTemplate(err.to_string()))?;
    for event in agreement_events {
        if event.actor_type != actor_type {
            continue;
        }

        subscriptions.push(Subscription {
            contract_name: template.contract_name().to_string(),
            condition_name: AGREEMENT_SCOPE.to_string(),
            event_name: event.name.clone(),
            handler: handlers.resolve(&event.handler)?,
            timeout: None,
        });
    }

    Ok(WatchPlan {
        agreement_contract: template.contract_name().to_string(),
        subscriptions,
        conditions,
    })
}
