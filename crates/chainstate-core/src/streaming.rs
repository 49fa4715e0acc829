//! Live streaming strategy: push delivery once caught up.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::engine::{Engine, StrategyExit};
use crate::error::ProcessorError;
use crate::provider::BlockProvider;

pub(crate) struct LiveStream<'a, P> {
    engine: &'a Engine<P>,
}

impl<'a, P: BlockProvider> LiveStream<'a, P> {
    pub(crate) fn new(engine: &'a Engine<P>) -> Self {
        Self { engine }
    }

    /// Consume the feed until it ends, faults, or a stop is requested.
    /// Dropping the feed on return releases the subscription.
    pub(crate) async fn run(&self, token: &CancellationToken) -> Result<StrategyExit, ProcessorError> {
        let engine = self.engine;
        let mut feed = engine
            .provider
            .subscribe_blocks(engine.config.mode, engine.cursor.current())
            .await?;

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(StrategyExit::Stopped),
                next = feed.next() => next,
            };

            let block = match next {
                None => return Ok(StrategyExit::Disrupted),
                Some(Err(e)) => return Err(ProcessorError::StreamFault(e)),
                Some(Ok(block)) => block,
            };

            let number = block.number_from_id()?;
            let expected = engine.cursor.current();
            if number < expected {
                tracing::trace!(number, expected, "skipping already processed block");
                continue;
            }
            if number > expected {
                tracing::warn!(expected, received = number, "gap in live stream");
            }
            engine.dispatch(number, &block).await?;
        }
    }
}
