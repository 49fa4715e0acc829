//! Processor configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ProcessorError;
use crate::types::StreamMode;

/// What the dispatcher does when a handler returns an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerFaultPolicy {
    /// Stop dispatching the block and end the run with the error.
    /// The cursor stays on the faulting block.
    #[default]
    AbortBlock,
    /// Log the fault and continue with the next operation.
    SkipOperation,
}

/// Configuration for a processor instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// First block to process; usually the caller's last checkpoint.
    #[serde(default = "default_initial_block_number")]
    pub initial_block_number: u64,
    /// Pause between catch-up steps (milliseconds).
    #[serde(default = "default_catch_up_delay_ms")]
    pub catch_up_delay_ms: u64,
    /// Prefix prepended to ids registered as namespaced custom_json handlers.
    #[serde(default = "default_operation_id_prefix")]
    pub operation_id_prefix: String,
    /// Follow the head block or the last irreversible block.
    #[serde(default)]
    pub mode: StreamMode,
    /// How long `stop()` waits for the run to wind down (milliseconds).
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
    /// Blocks fetched concurrently per catch-up step. Blocks are still
    /// dispatched one at a time, in order.
    #[serde(default = "default_catch_up_concurrency")]
    pub catch_up_concurrency: usize,
    #[serde(default)]
    pub handler_fault_policy: HandlerFaultPolicy,
}

fn default_initial_block_number() -> u64 { 1 }
fn default_catch_up_delay_ms() -> u64 { 100 }
fn default_operation_id_prefix() -> String { "chainstate_".into() }
fn default_stop_grace_ms() -> u64 { 1_000 }
fn default_catch_up_concurrency() -> usize { 1 }

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            initial_block_number: default_initial_block_number(),
            catch_up_delay_ms: default_catch_up_delay_ms(),
            operation_id_prefix: default_operation_id_prefix(),
            mode: StreamMode::default(),
            stop_grace_ms: default_stop_grace_ms(),
            catch_up_concurrency: default_catch_up_concurrency(),
            handler_fault_policy: HandlerFaultPolicy::default(),
        }
    }
}

impl ProcessorConfig {
    pub fn catch_up_delay(&self) -> Duration {
        Duration::from_millis(self.catch_up_delay_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Reject settings the processor cannot run with.
    pub fn validate(&self) -> Result<(), ProcessorError> {
        if self.catch_up_concurrency == 0 {
            return Err(ProcessorError::InvalidConfig(
                "catch_up_concurrency must be at least 1".into(),
            ));
        }
        if self.stop_grace_ms == 0 {
            return Err(ProcessorError::InvalidConfig(
                "stop_grace_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
