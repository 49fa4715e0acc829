//! Operation dispatcher. Walks a block and invokes registered handlers.
//!
//! Order within a block is fixed: block handlers first, then every
//! operation of every transaction in recorded order. Operations with no
//! registered handler are skipped silently.

use serde::Deserialize;
use serde_json::Value;

use crate::config::HandlerFaultPolicy;
use crate::error::{HandlerError, ProcessorError};
use crate::handler::{CustomJsonEvent, HandlerRegistry, OperationEvent};
use crate::types::{Block, CustomJsonOperation, Operation, Transaction};

/// Counters for one dispatched block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Operations seen in the block.
    pub operations: usize,
    /// Operations that matched a handler.
    pub dispatched: usize,
    /// Handler faults skipped under [`HandlerFaultPolicy::SkipOperation`].
    pub faults: usize,
}

/// Dispatches blocks to the handlers of a [`HandlerRegistry`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher {
    policy: HandlerFaultPolicy,
}

impl Dispatcher {
    pub fn new(policy: HandlerFaultPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> HandlerFaultPolicy {
        self.policy
    }

    /// Dispatch every operation of `block` to the matching handlers.
    ///
    /// Under [`HandlerFaultPolicy::AbortBlock`] the first handler error stops
    /// the block and is returned; the remaining operations are not seen.
    pub async fn dispatch_block(
        &self,
        registry: &HandlerRegistry,
        block_num: u64,
        block: &Block,
    ) -> Result<DispatchStats, ProcessorError> {
        let mut stats = DispatchStats::default();

        for handler in registry.block_handlers() {
            let result = handler.handle_block(block_num, block).await;
            self.settle(result, block_num, "block", &mut stats)?;
        }

        for tx in &block.transactions {
            for op in &tx.operations {
                stats.operations += 1;
                if op.is_custom_json() {
                    self.dispatch_custom_json(registry, block_num, tx, op, &mut stats)
                        .await?;
                } else if let Some(handler) = registry.operation_handler(&op.op_type) {
                    let event = OperationEvent {
                        op_type: op.op_type.clone(),
                        data: with_origin(op.value.clone(), tx),
                        transaction_id: tx.transaction_id.clone(),
                        block_num: tx.block_num,
                    };
                    stats.dispatched += 1;
                    let result = handler.handle(&event).await;
                    self.settle(result, block_num, &op.op_type, &mut stats)?;
                }
            }
        }

        Ok(stats)
    }

    /// Notify every streaming-start handler.
    pub async fn notify_streaming_start(
        &self,
        registry: &HandlerRegistry,
        at_block: u64,
    ) -> Result<(), ProcessorError> {
        let mut stats = DispatchStats::default();
        for handler in registry.streaming_start_handlers() {
            let result = handler.on_streaming_start(at_block).await;
            self.settle(result, at_block, "streaming_start", &mut stats)?;
        }
        Ok(())
    }

    async fn dispatch_custom_json(
        &self,
        registry: &HandlerRegistry,
        block_num: u64,
        tx: &Transaction,
        op: &Operation,
        stats: &mut DispatchStats,
    ) -> Result<(), ProcessorError> {
        let Some(op_id) = op.value.get("id").and_then(Value::as_str) else {
            return Ok(());
        };
        let Some(handler) = registry.custom_json_handler(op_id) else {
            return Ok(());
        };
        stats.dispatched += 1;

        let result = match decode_custom_json(op_id, &op.value, tx) {
            Ok(event) => handler.handle(&event).await,
            Err(e) => Err(e),
        };
        self.settle(result, block_num, op_id, stats)
    }

    fn settle(
        &self,
        result: Result<(), HandlerError>,
        block_num: u64,
        key: &str,
        stats: &mut DispatchStats,
    ) -> Result<(), ProcessorError> {
        let Err(source) = result else {
            return Ok(());
        };
        match self.policy {
            HandlerFaultPolicy::AbortBlock => Err(ProcessorError::Handler {
                block_num,
                key: key.to_string(),
                source,
            }),
            HandlerFaultPolicy::SkipOperation => {
                stats.faults += 1;
                tracing::warn!(block_num, key, error = %source, "handler fault, operation skipped");
                Ok(())
            }
        }
    }
}

fn decode_custom_json(
    op_id: &str,
    value: &Value,
    tx: &Transaction,
) -> Result<CustomJsonEvent, HandlerError> {
    let malformed = |source| HandlerError::MalformedPayload {
        id: op_id.to_string(),
        source,
    };
    let op = CustomJsonOperation::deserialize(value).map_err(malformed)?;
    let payload: Value = serde_json::from_str(&op.json).map_err(malformed)?;
    let (actor, active) = op
        .actor()
        .map(|(account, active)| (account.to_string(), active))
        .ok_or_else(|| HandlerError::MissingAuthority {
            id: op_id.to_string(),
        })?;

    Ok(CustomJsonEvent {
        id: op.id,
        payload: with_origin(payload, tx),
        actor,
        active,
        transaction_id: tx.transaction_id.clone(),
        block_num: tx.block_num,
    })
}

/// Insert `transaction_id` and `block_num` into an object payload.
fn with_origin(mut value: Value, tx: &Transaction) -> Value {
    if let Value::Object(map) = &mut value {
        map.insert(
            "transaction_id".into(),
            Value::String(tx.transaction_id.clone()),
        );
        map.insert("block_num".into(), Value::from(tx.block_num));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{block_fn, custom_json_fn, operation_fn, CustomJsonHandler};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn custom_json(id: &str, json: &str, posting: &[&str], active: &[&str]) -> Operation {
        Operation::new(
            Operation::CUSTOM_JSON,
            json!({
                "id": id,
                "json": json,
                "required_posting_auths": posting,
                "required_auths": active,
            }),
        )
    }

    fn block(num: u64, txs: Vec<(&str, Vec<Operation>)>) -> Block {
        Block {
            block_id: format!("{num:08x}{}", "0".repeat(32)),
            previous: String::new(),
            timestamp: String::new(),
            witness: String::new(),
            transactions: txs
                .into_iter()
                .map(|(id, operations)| Transaction {
                    transaction_id: id.into(),
                    block_num: num,
                    operations,
                })
                .collect(),
        }
    }

    struct Recorder(Arc<Mutex<Vec<CustomJsonEvent>>>);

    #[async_trait]
    impl CustomJsonHandler for Recorder {
        async fn handle(&self, event: &CustomJsonEvent) -> Result<(), HandlerError> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn namespaced_custom_json_is_decoded_and_enriched() {
        let seen = Arc::new(Mutex::new(vec![]));
        let mut registry = HandlerRegistry::with_prefix("prefix_");
        registry.on_custom_json("vote", Arc::new(Recorder(seen.clone())));

        let b = block(
            7,
            vec![("tx1", vec![custom_json("prefix_vote", r#"{"x":1}"#, &["alice"], &[])])],
        );
        let stats = Dispatcher::default().dispatch_block(&registry, 7, &b).await.unwrap();
        assert_eq!(stats.dispatched, 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].payload,
            json!({"x": 1, "transaction_id": "tx1", "block_num": 7})
        );
        assert_eq!(seen[0].actor, "alice");
        assert!(!seen[0].active);
    }

    #[tokio::test]
    async fn active_authority_sets_flag() {
        let seen = Arc::new(Mutex::new(vec![]));
        let mut registry = HandlerRegistry::with_prefix("app_");
        registry.on_custom_json_bare("game", Arc::new(Recorder(seen.clone())));

        let b = block(3, vec![("tx", vec![custom_json("game", "{}", &[], &["carol", "dave"])])]);
        Dispatcher::default().dispatch_block(&registry, 3, &b).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].actor, "carol");
        assert!(seen[0].active);
    }

    #[tokio::test]
    async fn generic_operation_gets_origin_fields() {
        let seen = Arc::new(Mutex::new(vec![]));
        let sink = seen.clone();
        let mut registry = HandlerRegistry::default();
        registry.on_operation(
            "transfer",
            Arc::new(operation_fn(move |event| {
                sink.lock().unwrap().push(event.data.clone());
                Ok(())
            })),
        );

        let transfer = Operation::new("transfer", json!({"from": "a", "to": "b", "amount": "1.000 HIVE"}));
        let b = block(12, vec![("t9", vec![transfer])]);
        Dispatcher::default().dispatch_block(&registry, 12, &b).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0]["transaction_id"], "t9");
        assert_eq!(seen[0]["block_num"], 12);
        assert_eq!(seen[0]["amount"], "1.000 HIVE");
    }

    #[tokio::test]
    async fn unregistered_operations_are_skipped() {
        let registry = HandlerRegistry::with_prefix("app_");
        let b = block(
            1,
            vec![(
                "tx",
                vec![
                    custom_json("other_app", "not json at all", &["x"], &[]),
                    Operation::new("vote", json!({})),
                ],
            )],
        );
        let stats = Dispatcher::default().dispatch_block(&registry, 1, &b).await.unwrap();
        assert_eq!(stats.operations, 2);
        assert_eq!(stats.dispatched, 0);
    }

    #[tokio::test]
    async fn operations_dispatch_in_recorded_order() {
        let order = Arc::new(Mutex::new(Vec::<String>::new()));
        let mut registry = HandlerRegistry::with_prefix("app_");

        let o = order.clone();
        registry.on_block(Arc::new(block_fn(move |n, _| {
            o.lock().unwrap().push(format!("block {n}"));
            Ok(())
        })));
        let o = order.clone();
        registry.on_custom_json(
            "a",
            Arc::new(custom_json_fn(move |e| {
                o.lock().unwrap().push(format!("{} {}", e.id, e.transaction_id));
                Ok(())
            })),
        );
        let o = order.clone();
        registry.on_operation(
            "vote",
            Arc::new(operation_fn(move |e| {
                o.lock().unwrap().push(format!("vote {}", e.transaction_id));
                Ok(())
            })),
        );

        let b = block(
            5,
            vec![
                ("t1", vec![Operation::new("vote", json!({})), custom_json("app_a", "{}", &["u"], &[])]),
                ("t2", vec![custom_json("app_a", "[1]", &["u"], &[])]),
            ],
        );
        Dispatcher::default().dispatch_block(&registry, 5, &b).await.unwrap();

        assert_eq!(
            *order.lock().unwrap(),
            vec!["block 5", "vote t1", "app_a t1", "app_a t2"]
        );
    }

    #[tokio::test]
    async fn fault_aborts_rest_of_block() {
        let calls = Arc::new(Mutex::new(0u32));
        let c = calls.clone();
        let mut registry = HandlerRegistry::with_prefix("app_");
        registry.on_custom_json(
            "a",
            Arc::new(custom_json_fn(move |e| {
                *c.lock().unwrap() += 1;
                if e.payload["fail"] == true {
                    return Err(HandlerError::failed("rejected"));
                }
                Ok(())
            })),
        );

        let b = block(
            9,
            vec![(
                "tx",
                vec![
                    custom_json("app_a", r#"{"fail":true}"#, &["u"], &[]),
                    custom_json("app_a", r#"{"fail":false}"#, &["u"], &[]),
                ],
            )],
        );
        let err = Dispatcher::new(HandlerFaultPolicy::AbortBlock)
            .dispatch_block(&registry, 9, &b)
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessorError::Handler { block_num: 9, ref key, .. } if key == "app_a"));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn skip_policy_continues_after_fault() {
        let calls = Arc::new(Mutex::new(0u32));
        let c = calls.clone();
        let mut registry = HandlerRegistry::with_prefix("app_");
        registry.on_custom_json(
            "a",
            Arc::new(custom_json_fn(move |_| {
                *c.lock().unwrap() += 1;
                Ok(())
            })),
        );

        let b = block(
            4,
            vec![(
                "tx",
                vec![
                    custom_json("app_a", "{broken", &["u"], &[]),
                    custom_json("app_a", "{}", &[], &[]),
                    custom_json("app_a", "{}", &["u"], &[]),
                ],
            )],
        );
        let stats = Dispatcher::new(HandlerFaultPolicy::SkipOperation)
            .dispatch_block(&registry, 4, &b)
            .await
            .unwrap();

        assert_eq!(stats.faults, 2);
        assert_eq!(stats.dispatched, 3);
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn malformed_json_is_reported_as_payload_error() {
        let mut registry = HandlerRegistry::with_prefix("app_");
        registry.on_custom_json("a", Arc::new(custom_json_fn(|_| Ok(()))));

        let b = block(2, vec![("tx", vec![custom_json("app_a", "{nope", &["u"], &[])])]);
        let err = Dispatcher::default().dispatch_block(&registry, 2, &b).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::MalformedPayload);
    }
}
