//! Fluent builder API for creating processors.
//!
//! # Example
//!
//! ```rust,no_run
//! use chainstate_core::{BlockProvider, Processor, StreamMode};
//!
//! # fn build<P: BlockProvider>(provider: P) -> Result<(), chainstate_core::ProcessorError> {
//! let processor = Processor::builder(provider)
//!     .initial_block_number(80_000_000)
//!     .operation_id_prefix("mygame_")
//!     .mode(StreamMode::Irreversible)
//!     .catch_up_concurrency(8)
//!     .on_unexpected_stop(|err| eprintln!("processor died: {err}"))
//!     .build()?;
//! # let _ = processor;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::config::{HandlerFaultPolicy, ProcessorConfig};
use crate::error::ProcessorError;
use crate::processor::{Processor, UnexpectedStopHook};
use crate::provider::BlockProvider;
use crate::types::StreamMode;

/// Fluent builder for [`Processor`].
pub struct ProcessorBuilder<P> {
    provider: P,
    config: ProcessorConfig,
    on_unexpected_stop: Option<UnexpectedStopHook>,
}

impl<P: BlockProvider> ProcessorBuilder<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: ProcessorConfig::default(),
            on_unexpected_stop: None,
        }
    }

    /// Replace the whole configuration, e.g. one loaded from a file.
    pub fn config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the first block to process.
    pub fn initial_block_number(mut self, block: u64) -> Self {
        self.config.initial_block_number = block;
        self
    }

    /// Set the pause between catch-up steps in milliseconds.
    pub fn catch_up_delay_ms(mut self, ms: u64) -> Self {
        self.config.catch_up_delay_ms = ms;
        self
    }

    /// Set the prefix for namespaced custom_json ids.
    pub fn operation_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.operation_id_prefix = prefix.into();
        self
    }

    pub fn mode(mut self, mode: StreamMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set how long `stop()` waits for the run to end.
    pub fn stop_grace_ms(mut self, ms: u64) -> Self {
        self.config.stop_grace_ms = ms;
        self
    }

    /// Set the number of blocks fetched concurrently during catch-up.
    pub fn catch_up_concurrency(mut self, n: usize) -> Self {
        self.config.catch_up_concurrency = n;
        self
    }

    pub fn handler_fault_policy(mut self, policy: HandlerFaultPolicy) -> Self {
        self.config.handler_fault_policy = policy;
        self
    }

    /// Called once, from the run task, when a run ends with a fatal error.
    pub fn on_unexpected_stop(
        mut self,
        hook: impl Fn(&ProcessorError) + Send + Sync + 'static,
    ) -> Self {
        self.on_unexpected_stop = Some(Arc::new(hook));
        self
    }

    /// Validate the configuration and build the processor.
    pub fn build(self) -> Result<Processor<P>, ProcessorError> {
        Processor::from_parts(self.provider, self.config, self.on_unexpected_stop)
    }
}
