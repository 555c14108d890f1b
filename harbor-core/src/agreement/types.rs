use rst_common::standard::async_trait::async_trait;
use rst_common::standard::serde_json::Value;
use rst_common::standard::uuid::Uuid;
use rst_common::with_errors::thiserror::{self, Error};

/// `ActorType` names the party a handler reacts for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    Publisher,
    Consumer,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::Publisher => "publisher",
            ActorType::Consumer => "consumer",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "publisher" => Some(ActorType::Publisher),
            "consumer" => Some(ActorType::Consumer),
            _ => None,
        }
    }
}

/// `AgreementStatus` is the durable outcome of a whole agreement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgreementStatus {
    Pending,
    Fulfilled,
    Aborted,
}

impl AgreementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgreementStatus::Pending => "pending",
            AgreementStatus::Fulfilled => "fulfilled",
            AgreementStatus::Aborted => "aborted",
        }
    }
}

/// `TxReceipt` is the ledger's answer to a sent transaction
#[derive(Debug, Clone, PartialEq)]
pub struct TxReceipt {
    pub status: bool,
    pub block_number: u64,
}

/// `EventLog` is one decoded ledger log entry, already filtered down to the
/// agreement id it carries
#[derive(Debug, Clone, PartialEq)]
pub struct EventLog {
    pub contract_name: String,
    pub event_name: String,
    pub agreement_id: String,
    pub block_number: u64,
    pub payload: Value,
}

/// `StatusRecord` is the append-only durable record per agreement, persisted
/// through [`AgreementStatusStore`]
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    pub agreement_id: String,
    pub did: String,
    pub service_definition_id: String,
    pub price: u64,
    pub condition_ids: Vec<String>,
    pub status: AgreementStatus,
    pub actor_type: ActorType,
    pub created_at: String,
}

/// `TemplateError` provides all specific error types related with the
/// agreement template document. Every variant is an authoring error raised
/// at load time, before any agreement runs
#[derive(Debug, PartialEq, Error, Clone)]
pub enum TemplateError {
    #[error("invalid template type: {0}")]
    InvalidTemplateType(String),

    #[error("template is missing a value: {0}")]
    MissingValue(String),

    #[error("template value is malformed: {0}")]
    MalformedValue(String),
}

/// `ConditionError` provides all specific error types related with condition
/// parameter packing and id derivation
#[derive(Debug, PartialEq, Error, Clone)]
pub enum ConditionError {
    #[error("malformed value: {0}")]
    MalformedValue(String),

    #[error("value out of range: {0}")]
    ValueOutOfRange(String),

    #[error("unsupported parameter type: {0}")]
    UnsupportedType(String),

    #[error("parameter types and values differ in length")]
    LengthMismatch,
}

/// `WatcherError` provides all specific error types related with building
/// and running the event watch for one agreement
#[derive(Debug, PartialEq, Error, Clone)]
pub enum WatcherError {
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error("unknown dependency: {0}")]
    UnknownDependency(String),

    #[error("condition has no timeout event: {0}")]
    MissingTimeoutEvent(String),

    #[error("timeout out of range: {0}")]
    TimeoutOutOfRange(String),

    #[error("unknown handler: {0}")]
    UnknownHandler(String),

    #[error("agreement already exists: {0}")]
    AgreementAlreadyExists(String),

    #[error("unable to derive condition id: {0}")]
    DerivationError(String),

    #[error("handler failed: {0}")]
    HandlerFailed(String),
}

/// `AgreementError` provides all specific error types surfaced by the
/// external collaborators at the agreement boundary
#[derive(Debug, PartialEq, Error, Clone)]
pub enum AgreementError {
    #[error("agreement already exists: {0}")]
    AgreementAlreadyExists(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("ledger gateway failure: {0}")]
    GatewayError(String),

    #[error("status store failure: {0}")]
    StoreError(String),

    #[error("secret store failure: {0}")]
    SecretStoreError(String),

    #[error("purchase failure: {0}")]
    PurchaseError(String),
}

/// `LedgerGateway` is the trait boundary for the ledger RPC layer
///
/// Sending transactions and decoding raw logs are entirely the
/// collaborator's concern; the watcher only polls decoded logs already
/// filtered by agreement id
#[async_trait]
pub trait LedgerGateway {
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

/// `AgreementStatusStore` is the trait boundary for durable agreement
/// status, an append-only key-value record per agreement id
#[async_trait]
pub trait AgreementStatusStore {
    async fn append_record(&self, record: StatusRecord) -> Result<(), AgreementError>;

    async fn update_status(
        &self,
        agreement_id: String,
        status: AgreementStatus,
    ) -> Result<(), AgreementError>;
}

/// `SecretStoreClient` is the trait boundary for the off-chain key-release
/// service. Permissioning is enforced entirely server-side
#[async_trait]
pub trait SecretStoreClient {
    async fn seal(&self, document_id: String, plaintext: Vec<u8>)
        -> Result<Vec<u8>, AgreementError>;

    async fn release(&self, document_id: String, cipher: Vec<u8>)
        -> Result<Vec<u8>, AgreementError>;
}

/// `PurchaseClient` is the trait boundary for the HTTP purchase
/// counterparty service
#[async_trait]
pub trait PurchaseClient {
    async fn initiate(
        &self,
        did: String,
        agreement_id: String,
        service_definition_id: String,
        signature: String,
        consumer_address: String,
        endpoint: String,
    ) -> Result<(), AgreementError>;
}

/// `generate_agreement_id` produces a fresh caller-supplied 32-byte
/// agreement id as 0x-prefixed hex
pub fn generate_agreement_id() -> String {
    format!(
        "0x{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}
