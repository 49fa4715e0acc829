//! `Processor`, the public face of the engine (registration and lifecycle).

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::builder::ProcessorBuilder;
use crate::config::ProcessorConfig;
use crate::engine::Engine;
use crate::error::ProcessorError;
use crate::handler::{
    BlockHandler, CustomJsonHandler, HandlerRegistry, OperationHandler, StreamingStartHandler,
};
use crate::provider::BlockProvider;
use crate::types::ProcessorState;

/// Callback invoked once when a run ends with a fatal error.
pub type UnexpectedStopHook = Arc<dyn Fn(&ProcessorError) + Send + Sync>;

struct RunHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Replays a chain into registered handlers, then follows it live.
///
/// A processor owns its handler registry and cursor; any number of
/// processors can run side by side. `start()` must be called from within a
/// Tokio runtime.
///
/// ```rust,no_run
/// # use chainstate_core::{Processor, BlockProvider};
/// # use chainstate_core::handler::custom_json_fn;
/// # async fn run<P: BlockProvider>(provider: P) -> Result<(), chainstate_core::ProcessorError> {
/// let processor = Processor::builder(provider)
///     .initial_block_number(80_000_000)
///     .operation_id_prefix("mygame_")
///     .build()?;
///
/// processor.register_namespaced("move", custom_json_fn(|event| {
///     println!("{} moved: {}", event.actor, event.payload);
///     Ok(())
/// }));
///
/// processor.start()?;
/// // ... later
/// processor.stop().await;
/// let checkpoint = processor.current_block_number();
/// # let _ = checkpoint;
/// # Ok(())
/// # }
/// ```
pub struct Processor<P: BlockProvider> {
    engine: Arc<Engine<P>>,
    on_unexpected_stop: Option<UnexpectedStopHook>,
    /// Held across the whole of `stop()`, so the handle survives a
    /// dropped `stop()` future.
    run: Mutex<Option<RunHandle>>,
}

impl<P: BlockProvider> Processor<P> {
    /// Create a processor with the given configuration.
    pub fn new(provider: P, config: ProcessorConfig) -> Result<Self, ProcessorError> {
        Self::from_parts(provider, config, None)
    }

    /// Start building a processor with default configuration.
    pub fn builder(provider: P) -> ProcessorBuilder<P> {
        ProcessorBuilder::new(provider)
    }

    pub(crate) fn from_parts(
        provider: P,
        config: ProcessorConfig,
        on_unexpected_stop: Option<UnexpectedStopHook>,
    ) -> Result<Self, ProcessorError> {
        config.validate()?;
        Ok(Self {
            engine: Arc::new(Engine::new(provider, config)),
            on_unexpected_stop,
            run: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.engine.config
    }

    // ─── Registration ────────────────────────────────────────────────────────

    /// Handle `custom_json` operations whose id is `prefix + id`.
    pub fn register_namespaced(&self, id: &str, handler: impl CustomJsonHandler + 'static) {
        self.engine
            .update_handlers(|r| r.on_custom_json(id, Arc::new(handler)));
    }

    /// Handle `custom_json` operations whose id is exactly `id`.
    pub fn register_bare(&self, id: impl Into<String>, handler: impl CustomJsonHandler + 'static) {
        self.engine
            .update_handlers(|r| r.on_custom_json_bare(id, Arc::new(handler)));
    }

    /// Handle every non-`custom_json` operation tagged `op_type`.
    pub fn register_operation(
        &self,
        op_type: impl Into<String>,
        handler: impl OperationHandler + 'static,
    ) {
        self.engine
            .update_handlers(|r| r.on_operation(op_type, Arc::new(handler)));
    }

    /// Called for every block before its operations.
    pub fn on_block(&self, handler: impl BlockHandler + 'static) {
        self.engine.update_handlers(|r| r.on_block(Arc::new(handler)));
    }

    /// Called each time the processor switches to live streaming.
    pub fn on_streaming_start(&self, handler: impl StreamingStartHandler + 'static) {
        self.engine
            .update_handlers(|r| r.on_streaming_start(Arc::new(handler)));
    }

    /// Snapshot of the currently registered handlers.
    pub fn handlers(&self) -> Arc<HandlerRegistry> {
        self.engine.handlers()
    }

    // ─── Position & mode ─────────────────────────────────────────────────────

    /// The next block the processor will process. Persist this to resume.
    pub fn current_block_number(&self) -> u64 {
        self.engine.cursor.current()
    }

    pub fn is_streaming(&self) -> bool {
        self.engine.state() == ProcessorState::Streaming
    }

    pub fn state(&self) -> ProcessorState {
        self.engine.state()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ProcessorState> {
        self.engine.subscribe_state()
    }

    /// Head or last irreversible block number, per the configured mode.
    pub async fn head_or_irreversible(&self) -> Result<u64, ProcessorError> {
        self.engine.head_or_irreversible().await
    }

    /// `true` if the cursor has reached [`head_or_irreversible`](Self::head_or_irreversible).
    pub async fn is_at_real_time(&self) -> Result<bool, ProcessorError> {
        self.engine.is_at_real_time().await
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Start processing from the cursor. Returns immediately; the work runs
    /// on a spawned Tokio task.
    ///
    /// Fails with [`ProcessorError::AlreadyRunning`] while a previous run is
    /// still alive, including one whose `stop()` has not completed.
    pub fn start(&self) -> Result<(), ProcessorError> {
        let Ok(mut run) = self.run.try_lock() else {
            return Err(ProcessorError::AlreadyRunning);
        };
        if let Some(previous) = run.as_ref() {
            if !previous.task.is_finished() {
                return Err(ProcessorError::AlreadyRunning);
            }
        }

        let token = CancellationToken::new();
        self.engine.force_state(ProcessorState::CatchingUp);

        let engine = Arc::clone(&self.engine);
        let hook = self.on_unexpected_stop.clone();
        let run_token = token.clone();
        let task = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(engine.run(&run_token))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(ProcessorError::Task("handler panicked".into())));

            match outcome {
                Ok(()) => {
                    tracing::info!(cursor = engine.cursor.current(), "processor stopped");
                    engine.force_state(ProcessorState::Stopped);
                }
                // A failure that surfaces after a stop was requested ends the
                // run as a requested stop; the hook is not called.
                Err(err) if run_token.is_cancelled() => {
                    tracing::warn!(
                        error = %err,
                        cursor = engine.cursor.current(),
                        "processor stopped with an error after stop was requested"
                    );
                    engine.force_state(ProcessorState::Stopped);
                }
                Err(err) => {
                    tracing::error!(
                        error = %err,
                        cursor = engine.cursor.current(),
                        "processor is unexpectedly stopping"
                    );
                    if let Some(hook) = hook {
                        hook(&err);
                    }
                    engine.force_state(ProcessorState::Failed);
                }
            }
        });

        *run = Some(RunHandle { token, task });
        Ok(())
    }

    /// Request a stop and wait for the run to wind down, at most
    /// `stop_grace_ms`. No block is dispatched after the run observes the
    /// request; a handler already executing is allowed to finish.
    ///
    /// Dropping this future early still cancels the run, but `start()` keeps
    /// failing until the old run has ended.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        let Some(handle) = run.as_mut() else {
            return;
        };

        if !self.engine.state().is_terminal() {
            self.engine.force_state(ProcessorState::Stopping);
        }
        handle.token.cancel();

        let grace = self.engine.config.stop_grace();
        let waited = tokio::time::timeout(grace, &mut handle.task).await;
        match waited {
            Ok(Ok(())) => *run = None,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "processor task aborted");
                self.engine.force_state(ProcessorState::Failed);
                *run = None;
            }
            Err(_) => {
                // The handle stays so a restart cannot overlap the old run.
                tracing::warn!(
                    grace_ms = grace.as_millis() as u64,
                    "processor still winding down after grace period"
                );
            }
        }
    }

    /// Wait until the current run ends and return the final state.
    pub async fn stopped(&self) -> ProcessorState {
        let mut rx = self.engine.subscribe_state();
        let state = match rx.wait_for(|s| !s.is_active()).await {
            Ok(state) => *state,
            Err(_) => self.engine.state(),
        };
        state
    }
}

impl<P: BlockProvider> Drop for Processor<P> {
    fn drop(&mut self) {
        if let Some(handle) = self.run.get_mut().take() {
            handle.token.cancel();
        }
    }
}
