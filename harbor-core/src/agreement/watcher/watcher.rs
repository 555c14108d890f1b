use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rst_common::standard::serde_json::Value;
use rst_common::with_logging::log::{debug, error, info, warn};
use rst_common::with_tokio::tokio;
use rst_common::with_tokio::tokio::task::JoinHandle;
use rst_common::with_tokio::tokio::time::{self, Instant};

use super::super::handlers::{HandlerContext, HandlerRegistry};
use super::super::keys;
use super::super::registry::{AgreementRegistry, ConditionState};
use super::super::template::ServiceAgreementTemplate;
use super::super::types::{
    ActorType, AgreementStatus, AgreementStatusStore, LedgerGateway, WatcherError,
};
use super::plan::{build_plan, Subscription, AGREEMENT_SCOPE};

/// Event name of the ledger's whole-agreement terminal signal
const AGREEMENT_FULFILLED_EVENT: &str = "AgreementFulfilled";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// `AgreementWatch` owns the running tasks of one watched agreement
///
/// Dropping it does not stop the tasks; `stop` tears down this agreement's
/// subscriptions without touching any other agreement
pub struct AgreementWatch {
    agreement_id: String,
    tasks: Vec<JoinHandle<()>>,
}

impl fmt::Debug for AgreementWatch {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AgreementWatch")
            .field("agreement_id", &self.agreement_id)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl AgreementWatch {
    pub fn agreement_id(&self) -> &str {
        &self.agreement_id
    }

    pub fn stop(&mut self) {
        info!("stopping watch for agreement {}", self.agreement_id);
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// `Watcher` drives the reactive side of service agreements: it subscribes
/// to the events a template declares, filtered by agreement id, and
/// dispatches each one to its resolved handler exactly once
///
/// The ledger gateway and the status store are injected at construction;
/// the watcher holds no global state. It is a reactive projection of
/// ledger-authoritative state and never enforces dependency ordering itself
pub struct Watcher<TGateway, TStore> {
    gateway: Arc<TGateway>,
    store: Arc<TStore>,
    registry: AgreementRegistry,
    poll_interval: Duration,
}

impl<TGateway, TStore> Watcher<TGateway, TStore>
where
    TGateway: LedgerGateway + Send + Sync + 'static,
    TStore: AgreementStatusStore + Send + Sync + 'static,
{
    pub fn new(gateway: TGateway, store: TStore) -> Self {
        Self {
            gateway: Arc::new(gateway),
            store: Arc::new(store),
            registry: AgreementRegistry::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn registry(&self) -> &AgreementRegistry {
        &self.registry
    }

    /// `watch_agreement` registers a fresh agreement instance and spawns one
    /// polling task per planned subscription, plus the whole-agreement
    /// fulfilled watch
    ///
    /// `contract_addresses` maps condition contract names to their on-chain
    /// addresses, used to derive the deterministic condition ids; a missing
    /// address leaves that condition's id empty
    pub async fn watch_agreement(
        &self,
        template: &ServiceAgreementTemplate,
        agreement_id: &str,
        did: &str,
        actor_type: ActorType,
        handlers: &HandlerRegistry,
        contract_addresses: &BTreeMap<String, String>,
    ) -> Result<AgreementWatch, WatcherError> {
        let plan = build_plan(template, actor_type, handlers)?;

        let mut condition_ids = Vec::new();
        for condition in &plan.conditions {
            let condition_id = match contract_addresses.get(&condition.contract_name) {
                Some(address) => {
                    let values_hash = condition
                        .values_hash()
                        .map_err(|err| WatcherError::DerivationError(err.to_string()))?;
                    keys::generate_condition_id(
                        agreement_id,
                        address,
                        &format!("0x{}", hex::encode(values_hash)),
                    )
                    .map_err(|err| WatcherError::DerivationError(err.to_string()))?
                }
                None => String::new(),
            };
            condition_ids.push((condition.name.clone(), condition_id));
        }

        self.registry
            .register(agreement_id, did, template.template_id(), &condition_ids)?;

        let from_block = match self.gateway.latest_block().await {
            Ok(block) => block,
            Err(err) => {
                warn!("unable to read the latest block, watching from 0: {}", err);
                0
            }
        };

        let mut tasks = Vec::new();
        for subscription in plan.subscriptions {
            tasks.push(self.spawn_subscription(subscription, agreement_id, did, from_block));
        }
        tasks.push(self.spawn_agreement_fulfilled(
            plan.agreement_contract,
            agreement_id,
            from_block,
        ));

        info!(
            "watching agreement {} for {} with {} subscriptions",
            agreement_id,
            actor_type.as_str(),
            tasks.len()
        );

        Ok(AgreementWatch {
            agreement_id: agreement_id.to_string(),
            tasks,
        })
    }

    /// `wait_terminal` blocks until the agreement leaves `Pending` or the
    /// limit elapses, returning the last observed status
    pub async fn wait_terminal(
        &self,
        agreement_id: &str,
        limit: Duration,
    ) -> Option<AgreementStatus> {
        let deadline = Instant::now() + limit;
        loop {
            let status = self.registry.status(agreement_id);
            match status {
                Some(current) if current != AgreementStatus::Pending => return status,
                _ if Instant::now() >= deadline => return status,
                _ => time::sleep(Duration::from_millis(20)).await,
            }
        }
    }

    /// One polling task per subscription: poll, dispatch the first matching
    /// log exactly once, then end. A configured timeout races the poll; the
    /// single task makes the race single-execution by construction
    fn spawn_subscription(
        &self,
        subscription: Subscription,
        agreement_id: &str,
        did: &str,
        from_block: u64,
    ) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        let registry = self.registry.clone();
        let poll_interval = self.poll_interval;
        let agreement_id = agreement_id.to_string();
        let did = did.to_string();

        tokio::spawn(async move {
            let deadline = subscription
                .timeout
                .as_ref()
                .map(|watch| Instant::now() + Duration::from_secs(watch.timeout));

            loop {
                let poll = async {
                    time::sleep(poll_interval).await;
                    gateway
                        .poll_events(
                            subscription.contract_name.clone(),
                            subscription.event_name.clone(),
                            agreement_id.clone(),
                            from_block,
                        )
                        .await
                };

                let polled = match deadline {
                    Some(deadline) => tokio::select! {
                        _ = time::sleep_until(deadline) => {
                            dispatch_timeout(&registry, &subscription, &agreement_id, &did).await;
                            return;
                        }
                        polled = poll => polled,
                    },
                    None => poll.await,
                };

                let logs = match polled {
                    Ok(logs) => logs,
                    Err(err) => {
                        warn!(
                            "poll failed for {} {}.{}: {}",
                            agreement_id,
                            subscription.condition_name,
                            subscription.event_name,
                            err
                        );
                        continue;
                    }
                };

                for log in logs {
                    if log.event_name != subscription.event_name
                        || log.agreement_id != agreement_id
                    {
                        continue;
                    }

                    if !registry.record_dispatch(
                        &agreement_id,
                        &subscription.condition_name,
                        &subscription.event_name,
                    ) {
                        debug!(
                            "duplicate delivery dropped for {} {}.{}",
                            agreement_id,
                            subscription.condition_name,
                            subscription.event_name
                        );
                        return;
                    }

                    if subscription.condition_name != AGREEMENT_SCOPE {
                        registry.set_state(
                            &agreement_id,
                            &subscription.condition_name,
                            ConditionState::Fulfilled,
                        );
                    }

                    let ctx = HandlerContext {
                        agreement_id: agreement_id.clone(),
                        did: did.clone(),
                        condition_name: subscription.condition_name.clone(),
                        event_name: subscription.event_name.clone(),
                        payload: log.payload.clone(),
                    };
                    if let Err(err) = (subscription.handler)(ctx).await {
                        error!(
                            "handler failed for {} {}.{}: {}",
                            agreement_id,
                            subscription.condition_name,
                            subscription.event_name,
                            err
                        );
                    }

                    return;
                }
            }
        })
    }

    /// Whole-agreement terminal watch: on the first `AgreementFulfilled` log
    /// mark the agreement fulfilled and persist the durable status
    fn spawn_agreement_fulfilled(
        &self,
        contract_name: String,
        agreement_id: &str,
        from_block: u64,
    ) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        let store = self.store.clone();
        let registry = self.registry.clone();
        let poll_interval = self.poll_interval;
        let agreement_id = agreement_id.to_string();

        tokio::spawn(async move {
            loop {
                time::sleep(poll_interval).await;

                let polled = gateway
                    .poll_events(
                        contract_name.clone(),
                        AGREEMENT_FULFILLED_EVENT.to_string(),
                        agreement_id.clone(),
                        from_block,
                    )
                    .await;
                let logs = match polled {
                    Ok(logs) => logs,
                    Err(err) => {
                        warn!("poll failed for {} fulfillment: {}", agreement_id, err);
                        continue;
                    }
                };

                for log in logs {
                    if log.event_name != AGREEMENT_FULFILLED_EVENT
                        || log.agreement_id != agreement_id
                    {
                        continue;
                    }

                    if !registry.record_dispatch(
                        &agreement_id,
                        AGREEMENT_SCOPE,
                        AGREEMENT_FULFILLED_EVENT,
                    ) {
                        return;
                    }

                    registry.mark_terminal(&agreement_id, AgreementStatus::Fulfilled);
                    if let Err(err) = store
                        .update_status(agreement_id.clone(), AgreementStatus::Fulfilled)
                        .await
                    {
                        error!(
                            "unable to persist fulfilled status for {}: {}",
                            agreement_id, err
                        );
                    }

                    info!("agreement {} fulfilled", agreement_id);
                    return;
                }
            }
        })
    }
}

async fn dispatch_timeout(
    registry: &AgreementRegistry,
    subscription: &Subscription,
    agreement_id: &str,
    did: &str,
) {
    let watch = match &subscription.timeout {
        Some(watch) => watch,
        None => return,
    };

    if !registry.record_dispatch(agreement_id, &subscription.condition_name, &watch.event_name) {
        return;
    }

    registry.set_state(
        agreement_id,
        &subscription.condition_name,
        ConditionState::Aborted,
    );
    warn!(
        "condition {} timed out after {}s on behalf of {}",
        subscription.condition_name, watch.timeout, watch.dependent_name
    );

    let ctx = HandlerContext {
        agreement_id: agreement_id.to_string(),
        did: did.to_string(),
        condition_name: subscription.condition_name.clone(),
        event_name: watch.event_name.clone(),
        payload: Value::Null,
    };
    if let Err(err) = (watch.handler)(ctx).await {
        error!(
            "timeout handler failed for {} {}.{}: {}",
            agreement_id, subscription.condition_name, watch.event_name, err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use mockall::mock;
    use rst_common::standard::async_trait::async_trait;
    use rst_common::standard::serde_json::{json, Value};

    use crate::agreement::testutil::{access_template_document, access_template_with_timeout};
    use crate::agreement::types::{AgreementError, EventLog, StatusRecord, TxReceipt};

    mock!(
        FakeGateway{}

        #[async_trait]
        impl LedgerGateway for FakeGateway {
            async fn send_transaction(
                &self,
                contract_name: String,
                function_name: String,
                args: Value,
            ) -> Result<TxReceipt, AgreementError>;

            async fn poll_events(
                &self,
                contract_name: String,
                event_name: String,
                agreement_id: String,
                from_block: u64,
            ) -> Result<Vec<EventLog>, AgreementError>;

            async fn latest_block(&self) -> Result<u64, AgreementError>;
        }
    );

    mock!(
        FakeStore{}

        #[async_trait]
        impl AgreementStatusStore for FakeStore {
            async fn append_record(&self, record: StatusRecord) -> Result<(), AgreementError>;

            async fn update_status(
                &self,
                agreement_id: String,
                status: AgreementStatus,
            ) -> Result<(), AgreementError>;
        }
    );

    type Ledger = Arc<Mutex<Vec<EventLog>>>;

    fn scripted_gateway(ledger: Ledger) -> MockFakeGateway {
        let mut gateway = MockFakeGateway::new();
        gateway.expect_latest_block().returning(|| Ok(0));
        gateway
            .expect_poll_events()
            .returning(move |contract, event, agreement, _from| {
                let available = ledger.lock().unwrap();
                Ok(available
                    .iter()
                    .filter(|log| {
                        log.contract_name == contract
                            && log.event_name == event
                            && log.agreement_id == agreement
                    })
                    .cloned()
                    .collect())
            });
        gateway
    }

    fn counting_store(updates: Arc<AtomicUsize>) -> MockFakeStore {
        let mut store = MockFakeStore::new();
        store.expect_update_status().returning(move |_, status| {
            assert_eq!(status, AgreementStatus::Fulfilled);
            updates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        store
    }

    fn counting_handlers() -> (HandlerRegistry, Arc<Mutex<HashMap<String, usize>>>) {
        let calls: Arc<Mutex<HashMap<String, usize>>> = Default::default();
        let mut handlers = HandlerRegistry::new();
        let table = [
            ("escrowAccessSecretStoreTemplate", "fulfillLockRewardCondition"),
            ("lockRewardCondition", "fulfillAccessSecretStoreCondition"),
            ("accessSecretStore", "fulfillEscrowRewardCondition"),
            ("accessSecretStore", "refundReward"),
            ("escrowRewardCondition", "verifyRewardTokens"),
        ];
        for (module, function) in table {
            let counter = calls.clone();
            let key = format!("{}.{}", module, function);
            handlers.register(module, function, "0.1", move |_ctx| {
                let counter = counter.clone();
                let key = key.clone();
                async move {
                    *counter.lock().unwrap().entry(key).or_insert(0) += 1;
                    Ok(())
                }
            });
        }
        (handlers, calls)
    }

    fn push_log(ledger: &Ledger, contract: &str, event: &str, agreement_id: &str) {
        ledger.lock().unwrap().push(EventLog {
            contract_name: contract.to_string(),
            event_name: event.to_string(),
            agreement_id: agreement_id.to_string(),
            block_number: 1,
            payload: json!({}),
        });
    }

    async fn wait_for_state(
        registry: &AgreementRegistry,
        agreement_id: &str,
        condition_name: &str,
        expected: ConditionState,
    ) {
        for _ in 0..1000 {
            if registry.get_state(agreement_id, condition_name) == expected {
                return;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "condition {} never reached {:?}",
            condition_name, expected
        );
    }

    fn agreement_id() -> String {
        format!("0x{}", "aa".repeat(32))
    }

    #[tokio::test]
    async fn test_agreement_lifecycle() {
        let ledger: Ledger = Default::default();
        let updates = Arc::new(AtomicUsize::new(0));
        let (handlers, calls) = counting_handlers();

        let watcher = Watcher::new(
            scripted_gateway(ledger.clone()),
            counting_store(updates.clone()),
        )
        .with_poll_interval(Duration::from_millis(10));

        let template = ServiceAgreementTemplate::load(&access_template_document()).unwrap();
        let agreement_id = agreement_id();
        let mut watch = watcher
            .watch_agreement(
                &template,
                &agreement_id,
                "did:op:1234",
                ActorType::Publisher,
                &handlers,
                &BTreeMap::new(),
            )
            .await
            .unwrap();

        let registry = watcher.registry().clone();

        // duplicate deliveries everywhere: each log is pushed twice
        push_log(&ledger, "LockRewardCondition", "Fulfilled", &agreement_id);
        push_log(&ledger, "LockRewardCondition", "Fulfilled", &agreement_id);
        wait_for_state(&registry, &agreement_id, "lockReward", ConditionState::Fulfilled).await;
        assert_eq!(
            registry.get_state(&agreement_id, "accessSecretStore"),
            ConditionState::Unfulfilled
        );
        assert_eq!(
            registry.get_state(&agreement_id, "escrowReward"),
            ConditionState::Unfulfilled
        );

        push_log(&ledger, "AccessSecretStoreCondition", "Fulfilled", &agreement_id);
        wait_for_state(
            &registry,
            &agreement_id,
            "accessSecretStore",
            ConditionState::Fulfilled,
        )
        .await;

        push_log(&ledger, "EscrowReward", "Fulfilled", &agreement_id);
        wait_for_state(&registry, &agreement_id, "escrowReward", ConditionState::Fulfilled).await;

        push_log(
            &ledger,
            "EscrowAccessSecretStoreTemplate",
            "AgreementFulfilled",
            &agreement_id,
        );
        push_log(
            &ledger,
            "EscrowAccessSecretStoreTemplate",
            "AgreementFulfilled",
            &agreement_id,
        );

        let status = watcher
            .wait_terminal(&agreement_id, Duration::from_secs(5))
            .await;
        assert_eq!(status, Some(AgreementStatus::Fulfilled));
        assert_eq!(updates.load(Ordering::SeqCst), 1);

        let calls = calls.lock().unwrap().clone();
        assert_eq!(
            calls.get("lockRewardCondition.fulfillAccessSecretStoreCondition"),
            Some(&1)
        );
        assert_eq!(
            calls.get("accessSecretStore.fulfillEscrowRewardCondition"),
            Some(&1)
        );
        assert_eq!(
            calls.get("escrowRewardCondition.verifyRewardTokens"),
            Some(&1)
        );

        watch.stop();
    }

    #[tokio::test]
    async fn test_timeout_aborts_watched_condition() {
        let ledger: Ledger = Default::default();
        let updates = Arc::new(AtomicUsize::new(0));
        let (handlers, calls) = counting_handlers();

        let watcher = Watcher::new(
            scripted_gateway(ledger.clone()),
            counting_store(updates.clone()),
        )
        .with_poll_interval(Duration::from_millis(10));

        let template =
            ServiceAgreementTemplate::load(&access_template_with_timeout(2)).unwrap();
        let agreement_id = agreement_id();
        let mut watch = watcher
            .watch_agreement(
                &template,
                &agreement_id,
                "did:op:1234",
                ActorType::Publisher,
                &handlers,
                &BTreeMap::new(),
            )
            .await
            .unwrap();

        let registry = watcher.registry().clone();

        // the primary event never arrives; the deadline side of the race
        // must fire exactly once
        wait_for_state(
            &registry,
            &agreement_id,
            "accessSecretStore",
            ConditionState::Aborted,
        )
        .await;

        let calls = calls.lock().unwrap().clone();
        assert_eq!(calls.get("accessSecretStore.refundReward"), Some(&1));
        assert_eq!(
            calls.get("accessSecretStore.fulfillEscrowRewardCondition"),
            None
        );

        watch.stop();
    }

    #[tokio::test]
    async fn test_event_beats_timeout() {
        let ledger: Ledger = Default::default();
        let updates = Arc::new(AtomicUsize::new(0));
        let (handlers, calls) = counting_handlers();

        let watcher = Watcher::new(
            scripted_gateway(ledger.clone()),
            counting_store(updates.clone()),
        )
        .with_poll_interval(Duration::from_millis(10));

        let template =
            ServiceAgreementTemplate::load(&access_template_with_timeout(3600)).unwrap();
        let agreement_id = agreement_id();
        let mut watch = watcher
            .watch_agreement(
                &template,
                &agreement_id,
                "did:op:1234",
                ActorType::Publisher,
                &handlers,
                &BTreeMap::new(),
            )
            .await
            .unwrap();

        let registry = watcher.registry().clone();
        push_log(&ledger, "AccessSecretStoreCondition", "Fulfilled", &agreement_id);
        wait_for_state(
            &registry,
            &agreement_id,
            "accessSecretStore",
            ConditionState::Fulfilled,
        )
        .await;

        let calls = calls.lock().unwrap().clone();
        assert_eq!(
            calls.get("accessSecretStore.fulfillEscrowRewardCondition"),
            Some(&1)
        );
        assert_eq!(calls.get("accessSecretStore.refundReward"), None);

        watch.stop();
    }

    #[tokio::test]
    async fn test_stop_is_scoped_to_one_agreement() {
        let ledger: Ledger = Default::default();
        let updates = Arc::new(AtomicUsize::new(0));
        let (handlers, _calls) = counting_handlers();

        let watcher = Watcher::new(
            scripted_gateway(ledger.clone()),
            counting_store(updates.clone()),
        )
        .with_poll_interval(Duration::from_millis(10));

        let template = ServiceAgreementTemplate::load(&access_template_document()).unwrap();
        let first_id = format!("0x{}", "aa".repeat(32));
        let second_id = format!("0x{}", "bb".repeat(32));

        let mut first = watcher
            .watch_agreement(
                &template,
                &first_id,
                "did:op:1234",
                ActorType::Publisher,
                &handlers,
                &BTreeMap::new(),
            )
            .await
            .unwrap();
        let mut second = watcher
            .watch_agreement(
                &template,
                &second_id,
                "did:op:5678",
                ActorType::Publisher,
                &handlers,
                &BTreeMap::new(),
            )
            .await
            .unwrap();

        first.stop();

        let registry = watcher.registry().clone();
        push_log(&ledger, "LockRewardCondition", "Fulfilled", &first_id);
        push_log(&ledger, "LockRewardCondition", "Fulfilled", &second_id);

        wait_for_state(&registry, &second_id, "lockReward", ConditionState::Fulfilled).await;
        assert_eq!(
            registry.get_state(&first_id, "lockReward"),
            ConditionState::Unfulfilled
        );

        second.stop();
    }

    #[tokio::test]
    async fn test_watch_agreement_rejects_duplicate_id() {
        let ledger: Ledger = Default::default();
        let updates = Arc::new(AtomicUsize::new(0));
        let (handlers, _calls) = counting_handlers();

        let watcher = Watcher::new(
            scripted_gateway(ledger.clone()),
            counting_store(updates.clone()),
        )
        .with_poll_interval(Duration::from_millis(10));

        let template = ServiceAgreementTemplate::load(&access_template_document()).unwrap();
        let agreement_id = agreement_id();
        let mut watch = watcher
            .watch_agreement(
                &template,
                &agreement_id,
                "did:op:1234",
                ActorType::Publisher,
                &handlers,
                &BTreeMap::new(),
            )
            .await
            .unwrap();

        let result = watcher
            .watch_agreement(
                &template,
                &agreement_id,
                "did:op:1234",
                ActorType::Publisher,
                &handlers,
                &BTreeMap::new(),
            )
            .await;
        assert_eq!(
            result.unwrap_err(),
            WatcherError::AgreementAlreadyExists(agreement_id.clone())
        );

        let rendered = format!("{:?}", watch);
        assert!(rendered.contains("AgreementWatch"));
        assert!(rendered.contains(&agreement_id));

        watch.stop();
    }

    #[tokio::test]
    async fn test_condition_ids_derived_when_address_known() {
        let ledger: Ledger = Default::default();
        let updates = Arc::new(AtomicUsize::new(0));
        let (handlers, _calls) = counting_handlers();

        let watcher = Watcher::new(
            scripted_gateway(ledger.clone()),
            counting_store(updates.clone()),
        );

        let template = ServiceAgreementTemplate::load(&access_template_document()).unwrap();
        let agreement_id = agreement_id();
        let mut addresses = BTreeMap::new();
        addresses.insert(
            "LockRewardCondition".to_string(),
            "0x00bd138abd70e2f00903268f3db08f2d25677c9e".to_string(),
        );

        let mut watch = watcher
            .watch_agreement(
                &template,
                &agreement_id,
                "did:op:1234",
                ActorType::Publisher,
                &handlers,
                &addresses,
            )
            .await
            .unwrap();

        let registry = watcher.registry().clone();
        assert_eq!(
            registry.condition_id(&agreement_id, "lockReward"),
            Some("0xd3a5fd33a7b5f1a3d21ff94dc5754687af1a7acf0034fbfd82ccbd4c481f2da5".to_string())
        );
        assert_eq!(
            registry.condition_id(&agreement_id, "escrowReward"),
            Some(String::new())
        );

        watch.stop();
    }
}
