//! Operation, block and streaming-start handler traits + registry.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::HandlerError;
use crate::types::Block;

/// A decoded `custom_json` operation, as delivered to a [`CustomJsonHandler`].
#[derive(Debug, Clone, PartialEq)]
pub struct CustomJsonEvent {
    /// Operation id as recorded on chain (prefix included).
    pub id: String,
    /// Parsed `json` field. When it is an object, `transaction_id` and
    /// `block_num` have been inserted into it.
    pub payload: Value,
    /// First posting authority, else first active authority.
    pub actor: String,
    /// `true` when `actor` came from the active authorities.
    pub active: bool,
    pub transaction_id: String,
    pub block_num: u64,
}

/// Any non-`custom_json` operation, as delivered to an [`OperationHandler`].
#[derive(Debug, Clone, PartialEq)]
pub struct OperationEvent {
    pub op_type: String,
    /// Operation payload with `transaction_id` and `block_num` inserted.
    pub data: Value,
    pub transaction_id: String,
    pub block_num: u64,
}

/// Handler for `custom_json` operations registered under an id.
#[async_trait]
pub trait CustomJsonHandler: Send + Sync {
    async fn handle(&self, event: &CustomJsonEvent) -> Result<(), HandlerError>;
}

/// Handler for operations registered under their raw tag (e.g. `"transfer"`).
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn handle(&self, event: &OperationEvent) -> Result<(), HandlerError>;
}

/// Called once per block, before any of its operations.
#[async_trait]
pub trait BlockHandler: Send + Sync {
    async fn handle_block(&self, block_num: u64, block: &Block) -> Result<(), HandlerError>;
}

/// Called each time the processor switches from catch-up to streaming.
#[async_trait]
pub trait StreamingStartHandler: Send + Sync {
    async fn on_streaming_start(&self, at_block: u64) -> Result<(), HandlerError>;
}

/// Adapter that turns a plain closure into a handler.
///
/// Build one with [`custom_json_fn`], [`operation_fn`], [`block_fn`] or
/// [`streaming_start_fn`]:
///
/// ```
/// use chainstate_core::handler::custom_json_fn;
///
/// let h = custom_json_fn(|event| {
///     println!("{} by {}", event.id, event.actor);
///     Ok(())
/// });
/// # let _ = h;
/// ```
pub struct FnHandler<F>(F);

pub fn custom_json_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&CustomJsonEvent) -> Result<(), HandlerError> + Send + Sync,
{
    FnHandler(f)
}

pub fn operation_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&OperationEvent) -> Result<(), HandlerError> + Send + Sync,
{
    FnHandler(f)
}

pub fn block_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(u64, &Block) -> Result<(), HandlerError> + Send + Sync,
{
    FnHandler(f)
}

pub fn streaming_start_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(u64) -> Result<(), HandlerError> + Send + Sync,
{
    FnHandler(f)
}

#[async_trait]
impl<F> CustomJsonHandler for FnHandler<F>
where
    F: Fn(&CustomJsonEvent) -> Result<(), HandlerError> + Send + Sync,
{
    async fn handle(&self, event: &CustomJsonEvent) -> Result<(), HandlerError> {
        (self.0)(event)
    }
}

#[async_trait]
impl<F> OperationHandler for FnHandler<F>
where
    F: Fn(&OperationEvent) -> Result<(), HandlerError> + Send + Sync,
{
    async fn handle(&self, event: &OperationEvent) -> Result<(), HandlerError> {
        (self.0)(event)
    }
}

#[async_trait]
impl<F> BlockHandler for FnHandler<F>
where
    F: Fn(u64, &Block) -> Result<(), HandlerError> + Send + Sync,
{
    async fn handle_block(&self, block_num: u64, block: &Block) -> Result<(), HandlerError> {
        (self.0)(block_num, block)
    }
}

#[async_trait]
impl<F> StreamingStartHandler for FnHandler<F>
where
    F: Fn(u64) -> Result<(), HandlerError> + Send + Sync,
{
    async fn on_streaming_start(&self, at_block: u64) -> Result<(), HandlerError> {
        (self.0)(at_block)
    }
}

/// Registry of operation, block and streaming-start handlers.
///
/// Keyed handlers are single-occupant: registering the same key twice
/// replaces the earlier handler. Block and streaming-start handlers are
/// lists and are all invoked, in registration order.
///
/// The registry is cheap to clone; the processor keeps it behind an `Arc`
/// and takes a snapshot when a block's dispatch begins.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    prefix: String,
    namespaced: HashMap<String, Arc<dyn CustomJsonHandler>>,
    bare: HashMap<String, Arc<dyn CustomJsonHandler>>,
    operations: HashMap<String, Arc<dyn OperationHandler>>,
    block_handlers: Vec<Arc<dyn BlockHandler>>,
    streaming_start_handlers: Vec<Arc<dyn StreamingStartHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry whose namespaced ids are prefixed with `prefix`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Register a `custom_json` handler under `prefix + id`.
    pub fn on_custom_json(&mut self, id: &str, handler: Arc<dyn CustomJsonHandler>) {
        self.namespaced.insert(format!("{}{id}", self.prefix), handler);
    }

    /// Register a `custom_json` handler under `id` exactly as given.
    pub fn on_custom_json_bare(&mut self, id: impl Into<String>, handler: Arc<dyn CustomJsonHandler>) {
        self.bare.insert(id.into(), handler);
    }

    /// Register a handler for every operation tagged `op_type`.
    pub fn on_operation(&mut self, op_type: impl Into<String>, handler: Arc<dyn OperationHandler>) {
        self.operations.insert(op_type.into(), handler);
    }

    /// Register a block handler (called for every block).
    pub fn on_block(&mut self, handler: Arc<dyn BlockHandler>) {
        self.block_handlers.push(handler);
    }

    /// Register a streaming-start handler.
    pub fn on_streaming_start(&mut self, handler: Arc<dyn StreamingStartHandler>) {
        self.streaming_start_handlers.push(handler);
    }

    /// Find the handler for a `custom_json` id. Namespaced registrations win
    /// over bare ones.
    pub fn custom_json_handler(&self, op_id: &str) -> Option<&Arc<dyn CustomJsonHandler>> {
        self.namespaced.get(op_id).or_else(|| self.bare.get(op_id))
    }

    pub fn operation_handler(&self, op_type: &str) -> Option<&Arc<dyn OperationHandler>> {
        self.operations.get(op_type)
    }

    pub fn block_handlers(&self) -> &[Arc<dyn BlockHandler>] {
        &self.block_handlers
    }

    pub fn streaming_start_handlers(&self) -> &[Arc<dyn StreamingStartHandler>] {
        &self.streaming_start_handlers
    }

    /// Number of keyed handlers (custom_json + generic operations).
    pub fn keyed_len(&self) -> usize {
        self.namespaced.len() + self.bare.len() + self.operations.len()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("prefix", &self.prefix)
            .field("namespaced", &self.namespaced.keys().collect::<Vec<_>>())
            .field("bare", &self.bare.keys().collect::<Vec<_>>())
            .field("operations", &self.operations.keys().collect::<Vec<_>>())
            .field("block_handlers", &self.block_handlers.len())
            .field("streaming_start_handlers", &self.streaming_start_handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counter(Arc<AtomicU32>);

    #[async_trait]
    impl CustomJsonHandler for Counter {
        async fn handle(&self, _e: &CustomJsonEvent) -> Result<(), HandlerError> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn event(id: &str) -> CustomJsonEvent {
        CustomJsonEvent {
            id: id.into(),
            payload: Value::Null,
            actor: "alice".into(),
            active: false,
            transaction_id: "tx".into(),
            block_num: 1,
        }
    }

    #[tokio::test]
    async fn namespaced_key_carries_prefix() {
        let count = Arc::new(AtomicU32::new(0));
        let mut registry = HandlerRegistry::with_prefix("app_");
        registry.on_custom_json("vote", Arc::new(Counter(count.clone())));

        assert!(registry.custom_json_handler("vote").is_none());
        let handler = registry.custom_json_handler("app_vote").unwrap();
        handler.handle(&event("app_vote")).await.unwrap();

        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn namespaced_wins_over_bare() {
        let namespaced = Arc::new(AtomicU32::new(0));
        let bare = Arc::new(AtomicU32::new(0));
        let mut registry = HandlerRegistry::with_prefix("app_");
        registry.on_custom_json_bare("app_vote", Arc::new(Counter(bare.clone())));
        registry.on_custom_json("vote", Arc::new(Counter(namespaced.clone())));

        let handler = registry.custom_json_handler("app_vote").unwrap();
        handler.handle(&event("app_vote")).await.unwrap();

        assert_eq!(namespaced.load(Ordering::Relaxed), 1);
        assert_eq!(bare.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn keyed_registration_replaces() {
        let mut registry = HandlerRegistry::default();
        registry.on_operation("transfer", Arc::new(operation_fn(|_| Ok(()))));
        registry.on_operation("transfer", Arc::new(operation_fn(|_| Ok(()))));
        assert_eq!(registry.keyed_len(), 1);
    }

    #[test]
    fn block_handlers_fan_out() {
        let mut registry = HandlerRegistry::default();
        registry.on_block(Arc::new(block_fn(|_, _| Ok(()))));
        registry.on_block(Arc::new(block_fn(|_, _| Ok(()))));
        assert_eq!(registry.block_handlers().len(), 2);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_registration() {
        let mut live = Arc::new(HandlerRegistry::with_prefix("app_"));
        let snapshot = Arc::clone(&live);

        Arc::make_mut(&mut live)
            .on_custom_json("vote", Arc::new(custom_json_fn(|_| Ok(()))));

        assert!(snapshot.custom_json_handler("app_vote").is_none());
        assert!(live.custom_json_handler("app_vote").is_some());
    }
}
