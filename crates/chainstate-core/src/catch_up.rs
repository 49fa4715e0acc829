//! Catch-up strategy: sequential replay of historical blocks.
//!
//! Each step queries the head for the configured mode, fetches up to
//! `catch_up_concurrency` blocks from the cursor, dispatches them strictly in
//! number order, then pauses for `catch_up_delay_ms`. The cursor only moves
//! once a block has been dispatched, so a fetch in flight never lets a later
//! block overtake an earlier one.

use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::engine::{Engine, StrategyExit};
use crate::error::ProcessorError;
use crate::provider::BlockProvider;

pub(crate) struct CatchUp<'a, P> {
    engine: &'a Engine<P>,
}

impl<'a, P: BlockProvider> CatchUp<'a, P> {
    pub(crate) fn new(engine: &'a Engine<P>) -> Self {
        Self { engine }
    }

    pub(crate) async fn run(&self, token: &CancellationToken) -> Result<StrategyExit, ProcessorError> {
        let engine = self.engine;
        let width = engine.config.catch_up_concurrency.max(1);
        let delay = engine.config.catch_up_delay();

        loop {
            if token.is_cancelled() {
                return Ok(StrategyExit::Stopped);
            }

            let head = engine.head_or_irreversible().await?;
            let from = engine.cursor.current();
            if engine.cursor.is_at_real_time(head) {
                return Ok(StrategyExit::CaughtUp);
            }
            let to = head.min(from.saturating_add(width as u64));

            let provider = &engine.provider;
            let mut fetched = stream::iter(from..to)
                .map(move |number| async move {
                    provider.get_block(number).await.map(|block| (number, block))
                })
                .buffered(width);

            while let Some(result) = fetched.next().await {
                let (number, block) = result?;
                engine.dispatch(number, &block).await?;
                if token.is_cancelled() {
                    return Ok(StrategyExit::Stopped);
                }
            }
            tracing::trace!(from, to, head, "catch-up step complete");

            tokio::select! {
                _ = token.cancelled() => return Ok(StrategyExit::Stopped),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
