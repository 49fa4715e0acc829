//! `BlockProvider` trait, the processor's only view of the chain.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::ProviderError;
use crate::types::{Block, ChainHeads, StreamMode};

/// A live feed of blocks.
///
/// `Some(Err(_))` is a stream fault (fatal). The stream returning `None`
/// means the feed ended; the processor falls back to catch-up.
pub type BlockStream = Pin<Box<dyn Stream<Item = Result<Block, ProviderError>> + Send>>;

/// Abstracts over the node or service that serves blocks.
#[async_trait]
pub trait BlockProvider: Send + Sync + 'static {
    /// Fetch the block with the given number.
    async fn get_block(&self, number: u64) -> Result<Block, ProviderError>;

    /// Fetch the current head and last irreversible block numbers.
    async fn get_chain_heads(&self) -> Result<ChainHeads, ProviderError>;

    /// Open a live feed that delivers blocks starting around `from`,
    /// following the head selected by `mode`.
    ///
    /// Duplicate or late deliveries are tolerated; the processor discards
    /// blocks below its cursor.
    async fn subscribe_blocks(&self, mode: StreamMode, from: u64)
        -> Result<BlockStream, ProviderError>;
}

#[async_trait]
impl<P: BlockProvider + ?Sized> BlockProvider for Arc<P> {
    async fn get_block(&self, number: u64) -> Result<Block, ProviderError> {
        (**self).get_block(number).await
    }

    async fn get_chain_heads(&self) -> Result<ChainHeads, ProviderError> {
        (**self).get_chain_heads().await
    }

    async fn subscribe_blocks(
        &self,
        mode: StreamMode,
        from: u64,
    ) -> Result<BlockStream, ProviderError> {
        (**self).subscribe_blocks(mode, from).await
    }
}
