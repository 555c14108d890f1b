use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rst_common::standard::serde_json::Value;

use super::condition::HandlerRef;
use super::types::WatcherError;

/// `HandlerContext` is everything a handler learns about the dispatch that
/// invoked it
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub agreement_id: String,
    pub did: String,
    pub condition_name: String,
    pub event_name: String,
    pub payload: Value,
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), WatcherError>> + Send>>;
pub type HandlerFn = Arc<dyn Fn(HandlerContext) -> HandlerFuture + Send + Sync>;

/// `HandlerKey` identifies one handler function in the dispatch table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerKey {
    pub module: String,
    pub function: String,
    pub version: String,
}

impl HandlerKey {
    pub fn new(module: &str, function: &str, version: &str) -> Self {
        Self {
            module: module.to_string(),
            function: function.to_string(),
            version: version.to_string(),
        }
    }
}

impl From<&HandlerRef> for HandlerKey {
    fn from(handler_ref: &HandlerRef) -> Self {
        HandlerKey::new(&handler_ref.module, &handler_ref.function, &handler_ref.version)
    }
}

/// `HandlerRegistry` is the dispatch table mapping symbolic handler
/// references to concrete async functions
///
/// Built once at startup; the watcher resolves against it while building a
/// watch plan, so an unknown handler fails before any event traffic arrives
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    table: HashMap<HandlerKey, HandlerFn>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, module: &str, function: &str, version: &str, handler: F)
    where
        F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), WatcherError>> + Send + 'static,
    {
        self.table.insert(
            HandlerKey::new(module, function, version),
            Arc::new(move |ctx| Box::pin(handler(ctx))),
        );
    }

    pub fn resolve(&self, handler_ref: &HandlerRef) -> Result<HandlerFn, WatcherError> {
        self.table
            .get(&HandlerKey::from(handler_ref))
            .cloned()
            .ok_or(WatcherError::UnknownHandler(format!(
                "{}.{} v{}",
                handler_ref.module, handler_ref.function, handler_ref.version
            )))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
