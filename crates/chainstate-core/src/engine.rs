//! Cursor & mode controller. Decides which acquisition strategy runs.
//!
//! ```text
//! start ─► CatchUp ──(cursor ≥ head)──► Streaming
//!             ▲                             │
//!             └────────(feed ended)─────────┘
//! ```
//!
//! Both strategies run on the same task, one at a time, and push blocks
//! through [`Engine::dispatch`].

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::catch_up::CatchUp;
use crate::config::ProcessorConfig;
use crate::cursor::Cursor;
use crate::dispatch::Dispatcher;
use crate::error::ProcessorError;
use crate::handler::HandlerRegistry;
use crate::provider::BlockProvider;
use crate::streaming::LiveStream;
use crate::types::{Block, ProcessorState};

/// Why an acquisition strategy returned control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StrategyExit {
    /// A stop was requested.
    Stopped,
    /// Catch-up reached the head for the configured mode.
    CaughtUp,
    /// The live feed ended.
    Disrupted,
}

pub(crate) struct Engine<P> {
    pub(crate) provider: P,
    pub(crate) config: ProcessorConfig,
    pub(crate) cursor: Cursor,
    dispatcher: Dispatcher,
    handlers: RwLock<Arc<HandlerRegistry>>,
    state: watch::Sender<ProcessorState>,
}

impl<P: BlockProvider> Engine<P> {
    pub(crate) fn new(provider: P, config: ProcessorConfig) -> Self {
        let (state, _) = watch::channel(ProcessorState::Idle);
        Self {
            cursor: Cursor::new(config.initial_block_number),
            dispatcher: Dispatcher::new(config.handler_fault_policy),
            handlers: RwLock::new(Arc::new(HandlerRegistry::with_prefix(
                config.operation_id_prefix.clone(),
            ))),
            provider,
            config,
            state,
        }
    }

    /// Head or last irreversible block number, depending on the mode.
    pub(crate) async fn head_or_irreversible(&self) -> Result<u64, ProcessorError> {
        let heads = self.provider.get_chain_heads().await?;
        Ok(heads.for_mode(self.config.mode))
    }

    pub(crate) async fn is_at_real_time(&self) -> Result<bool, ProcessorError> {
        let head = self.head_or_irreversible().await?;
        Ok(self.cursor.is_at_real_time(head))
    }

    // ─── Handlers ────────────────────────────────────────────────────────────

    /// The registry as of now. Later registrations do not affect it.
    pub(crate) fn handlers(&self) -> Arc<HandlerRegistry> {
        Arc::clone(&*self.handlers.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn update_handlers(&self, f: impl FnOnce(&mut HandlerRegistry)) {
        let mut guard = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        f(Arc::make_mut(&mut *guard));
    }

    // ─── State ───────────────────────────────────────────────────────────────

    pub(crate) fn state(&self) -> ProcessorState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe_state(&self) -> watch::Receiver<ProcessorState> {
        self.state.subscribe()
    }

    /// Move to an active state unless a stop is already in progress.
    fn enter(&self, next: ProcessorState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ProcessorState::Stopping || *state == next {
                return false;
            }
            *state = next;
            true
        })
    }

    pub(crate) fn force_state(&self, next: ProcessorState) {
        self.state.send_replace(next);
    }

    // ─── Run loop ────────────────────────────────────────────────────────────

    /// Dispatch one block and advance the cursor past it.
    pub(crate) async fn dispatch(&self, block_num: u64, block: &Block) -> Result<(), ProcessorError> {
        let registry = self.handlers();
        let stats = self
            .dispatcher
            .dispatch_block(&registry, block_num, block)
            .await?;
        self.cursor.advance_past(block_num);
        tracing::debug!(
            block_num,
            operations = stats.operations,
            dispatched = stats.dispatched,
            faults = stats.faults,
            "block processed"
        );
        Ok(())
    }

    /// Alternate between catch-up and streaming until stopped or failed.
    pub(crate) async fn run(&self, token: &CancellationToken) -> Result<(), ProcessorError> {
        loop {
            if token.is_cancelled() {
                return Ok(());
            }
            self.enter(ProcessorState::CatchingUp);
            tracing::info!(
                from = self.cursor.current(),
                mode = %self.config.mode,
                "catching up"
            );
            if CatchUp::new(self).run(token).await? == StrategyExit::Stopped {
                return Ok(());
            }

            if token.is_cancelled() {
                return Ok(());
            }
            self.enter(ProcessorState::Streaming);
            let at_block = self.cursor.current();
            tracing::info!(at_block, "caught up, switching to live stream");
            self.dispatcher
                .notify_streaming_start(&self.handlers(), at_block)
                .await?;

            match LiveStream::new(self).run(token).await? {
                StrategyExit::Disrupted => {
                    tracing::warn!(
                        resume_from = self.cursor.current(),
                        "block stream ended, falling back to catch-up"
                    );
                }
                _ => return Ok(()),
            }
        }
    }
}
