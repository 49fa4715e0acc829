//! `BlockProvider` backed by a Hive node's condenser API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use chainstate_core::{Block, BlockProvider, BlockStream, ChainHeads, ProviderError, StreamMode};

use crate::rpc::HiveRpcClient;

const GET_BLOCK: &str = "condenser_api.get_block";
const GET_DYNAMIC_GLOBAL_PROPERTIES: &str = "condenser_api.get_dynamic_global_properties";

/// Connection settings for [`HiveProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiveProviderConfig {
    /// JSON-RPC endpoint, e.g. `https://api.hive.blog`.
    pub url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// How often the live feed refreshes the head while idle.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_request_timeout_ms() -> u64 { 30_000 }
fn default_poll_interval_ms() -> u64 { 3_000 }

impl HiveProviderConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_timeout_ms: default_request_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Subset of `get_dynamic_global_properties` the processor needs.
#[derive(Debug, Clone, Copy, Deserialize)]
struct DynamicGlobalProperties {
    head_block_number: u64,
    last_irreversible_block_num: u64,
}

impl From<DynamicGlobalProperties> for ChainHeads {
    fn from(props: DynamicGlobalProperties) -> Self {
        Self {
            head_block_number: props.head_block_number,
            last_irreversible_block_num: props.last_irreversible_block_num,
        }
    }
}

/// Serves blocks from a Hive (or Steem-compatible) JSON-RPC node.
pub struct HiveProvider {
    client: Arc<HiveRpcClient>,
    poll_interval: Duration,
}

impl HiveProvider {
    pub fn new(config: HiveProviderConfig) -> Result<Self, ProviderError> {
        let client = HiveRpcClient::new(
            config.url,
            Duration::from_millis(config.request_timeout_ms),
        )?;
        Ok(Self {
            client: Arc::new(client),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    /// Create a provider for `url` with default timeouts.
    pub fn connect(url: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new(HiveProviderConfig::new(url))
    }

    pub fn url(&self) -> &str {
        self.client.url()
    }
}

async fn fetch_block(client: &HiveRpcClient, number: u64) -> Result<Block, ProviderError> {
    let value = client.call_value(GET_BLOCK, vec![json!(number)]).await?;
    block_from_result(number, value)
}

async fn fetch_heads(client: &HiveRpcClient) -> Result<ChainHeads, ProviderError> {
    let props: DynamicGlobalProperties = client
        .call(GET_DYNAMIC_GLOBAL_PROPERTIES, Vec::new())
        .await?;
    Ok(props.into())
}

/// The node answers `null` for blocks it has not produced yet.
fn block_from_result(number: u64, value: Value) -> Result<Block, ProviderError> {
    if value.is_null() {
        return Err(ProviderError::BlockNotFound(number));
    }
    Ok(serde_json::from_value(value)?)
}

#[async_trait]
impl BlockProvider for HiveProvider {
    async fn get_block(&self, number: u64) -> Result<Block, ProviderError> {
        fetch_block(&self.client, number).await
    }

    async fn get_chain_heads(&self) -> Result<ChainHeads, ProviderError> {
        fetch_heads(&self.client).await
    }

    async fn subscribe_blocks(
        &self,
        mode: StreamMode,
        from: u64,
    ) -> Result<BlockStream, ProviderError> {
        let poll = PollState {
            client: Arc::clone(&self.client),
            mode,
            next: from,
            head: None,
            interval: self.poll_interval,
            finished: false,
        };
        tracing::debug!(url = %self.client.url(), %mode, from, "opening polling block feed");
        Ok(futures::stream::unfold(poll, PollState::next_item).boxed())
    }
}

// ─── Polling feed ────────────────────────────────────────────────────────────

/// Cursor of the polling feed. Yields blocks `next..=head` in order,
/// refreshing `head` whenever it runs out.
struct PollState {
    client: Arc<HiveRpcClient>,
    mode: StreamMode,
    next: u64,
    head: Option<u64>,
    interval: Duration,
    finished: bool,
}

impl PollState {
    async fn next_item(mut self) -> Option<(Result<Block, ProviderError>, Self)> {
        loop {
            if self.finished {
                return None;
            }

            match self.head {
                Some(head) if self.next <= head => {
                    let fetched = fetch_block(&self.client, self.next).await;
                    match fetched {
                        Ok(block) => {
                            self.next += 1;
                            return Some((Ok(block), self));
                        }
                        // Reported but not served yet; poll again later.
                        Err(ProviderError::BlockNotFound(_)) => {
                            self.head = Some(self.next.saturating_sub(1));
                        }
                        Err(e) => return Some(self.fail(e)),
                    }
                }
                seen => {
                    if seen.is_some() {
                        tokio::time::sleep(self.interval).await;
                    }
                    let polled = fetch_heads(&self.client).await;
                    match polled {
                        Ok(heads) => {
                            let head = heads.for_mode(self.mode);
                            tracing::trace!(head, next = self.next, "polled chain head");
                            self.head = Some(head);
                        }
                        Err(e) => return Some(self.fail(e)),
                    }
                }
            }
        }
    }

    /// Yield `err` once; the following poll ends the feed.
    fn fail(mut self, err: ProviderError) -> (Result<Block, ProviderError>, Self) {
        self.finished = true;
        (Err(err), self)
    }
}
