//! Shared types for the block processing pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProcessorError;

// ─── Block ────────────────────────────────────────────────────────────────────

/// A block as returned by the provider.
///
/// Only the fields the engine reads are typed; anything else the node
/// returns is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block id; its first eight hex characters encode the block number.
    pub block_id: String,
    /// Id of the parent block.
    #[serde(default)]
    pub previous: String,
    /// Block timestamp as reported by the node (`2024-01-01T00:00:00`).
    #[serde(default)]
    pub timestamp: String,
    /// Producer of the block.
    #[serde(default)]
    pub witness: String,
    /// Transactions in recorded order.
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Decode the block number from the leading eight hex characters of the id.
    pub fn number_from_id(&self) -> Result<u64, ProcessorError> {
        self.block_id
            .get(..8)
            .filter(|prefix| prefix.bytes().all(|b| b.is_ascii_hexdigit()))
            .and_then(|prefix| u64::from_str_radix(prefix, 16).ok())
            .ok_or_else(|| ProcessorError::InvalidBlockId(self.block_id.clone()))
    }
}

// ─── Transaction / Operation ─────────────────────────────────────────────────

/// A transaction inside a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub block_num: u64,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

/// A tagged operation, encoded on the wire as `[tag, payload]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, Value)", into = "(String, Value)")]
pub struct Operation {
    pub op_type: String,
    pub value: Value,
}

impl Operation {
    /// Tag of the application-defined operation family.
    pub const CUSTOM_JSON: &'static str = "custom_json";

    pub fn new(op_type: impl Into<String>, value: Value) -> Self {
        Self {
            op_type: op_type.into(),
            value,
        }
    }

    pub fn is_custom_json(&self) -> bool {
        self.op_type == Self::CUSTOM_JSON
    }
}

impl From<(String, Value)> for Operation {
    fn from((op_type, value): (String, Value)) -> Self {
        Self { op_type, value }
    }
}

impl From<Operation> for (String, Value) {
    fn from(op: Operation) -> Self {
        (op.op_type, op.value)
    }
}

/// Payload of a `custom_json` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomJsonOperation {
    pub id: String,
    /// Application payload, serialized as a JSON string.
    pub json: String,
    #[serde(default)]
    pub required_posting_auths: Vec<String>,
    #[serde(default)]
    pub required_auths: Vec<String>,
}

impl CustomJsonOperation {
    /// Resolve the acting account: first posting authority, else first active
    /// authority. The flag is `true` only for the active-authority case.
    pub fn actor(&self) -> Option<(&str, bool)> {
        if let Some(account) = self.required_posting_auths.first() {
            return Some((account.as_str(), false));
        }
        self.required_auths
            .first()
            .map(|account| (account.as_str(), true))
    }
}

// ─── Chain heads / mode ──────────────────────────────────────────────────────

/// Head and last-irreversible block numbers reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHeads {
    pub head_block_number: u64,
    pub last_irreversible_block_num: u64,
}

impl ChainHeads {
    /// The block number the processor treats as "real time" for `mode`.
    pub fn for_mode(&self, mode: StreamMode) -> u64 {
        match mode {
            StreamMode::Latest => self.head_block_number,
            StreamMode::Irreversible => self.last_irreversible_block_num,
        }
    }
}

/// Which end of the chain the processor follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Follow the head block.
    #[default]
    Latest,
    /// Follow the last irreversible block.
    Irreversible,
}

impl std::fmt::Display for StreamMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::Irreversible => write!(f, "irreversible"),
        }
    }
}

impl std::str::FromStr for StreamMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(Self::Latest),
            "irreversible" => Ok(Self::Irreversible),
            other => Err(format!("unknown mode '{other}' (expected latest|irreversible)")),
        }
    }
}

// ─── ProcessorState ──────────────────────────────────────────────────────────

/// Runtime state of a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessorState {
    /// Constructed, never started.
    Idle,
    /// Replaying historical blocks.
    CatchingUp,
    /// Receiving live blocks from the feed.
    Streaming,
    /// A stop was requested and has not completed yet.
    Stopping,
    /// Stopped on request.
    Stopped,
    /// Stopped by a fatal error.
    Failed,
}

impl ProcessorState {
    /// Returns `true` while a run is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::CatchingUp | Self::Streaming | Self::Stopping)
    }

    /// Returns `true` once a run has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl std::fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::CatchingUp => write!(f, "catching-up"),
            Self::Streaming => write!(f, "streaming"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn block_number_from_id() {
        let block = Block {
            block_id: "04c4b0a3f1a8e2f8f0d0c6b0b7e4b5b6a8c9d0e1".into(),
            previous: String::new(),
            timestamp: String::new(),
            witness: String::new(),
            transactions: vec![],
        };
        assert_eq!(block.number_from_id().unwrap(), 0x04c4_b0a3);
    }

    #[test]
    fn block_number_from_short_id_fails() {
        let block = Block {
            block_id: "04c4".into(),
            previous: String::new(),
            timestamp: String::new(),
            witness: String::new(),
            transactions: vec![],
        };
        assert!(matches!(
            block.number_from_id(),
            Err(ProcessorError::InvalidBlockId(_))
        ));
    }

    #[test]
    fn block_number_from_signed_id_fails() {
        let block = Block {
            block_id: format!("+0000064{}", "0".repeat(32)),
            previous: String::new(),
            timestamp: String::new(),
            witness: String::new(),
            transactions: vec![],
        };
        assert!(matches!(
            block.number_from_id(),
            Err(ProcessorError::InvalidBlockId(_))
        ));
    }

    #[test]
    fn parses_condenser_block() {
        let raw = json!({
            "previous": "0000006300000000000000000000000000000000",
            "timestamp": "2016-03-24T16:10:00",
            "witness": "initminer",
            "transaction_merkle_root": "0000000000000000000000000000000000000000",
            "extensions": [],
            "block_id": "0000006400000000000000000000000000000000",
            "transactions": [{
                "ref_block_num": 99,
                "expiration": "2016-03-24T16:11:00",
                "operations": [
                    ["custom_json", {
                        "required_auths": [],
                        "required_posting_auths": ["alice"],
                        "id": "app_vote",
                        "json": "{\"x\":1}"
                    }],
                    ["vote", {"voter": "bob", "author": "alice", "permlink": "p", "weight": 10000}]
                ],
                "transaction_id": "abc123",
                "block_num": 100,
                "transaction_num": 0
            }]
        });

        let block: Block = serde_json::from_value(raw).unwrap();
        assert_eq!(block.number_from_id().unwrap(), 100);
        assert_eq!(block.transactions.len(), 1);

        let ops = &block.transactions[0].operations;
        assert!(ops[0].is_custom_json());
        assert_eq!(ops[1].op_type, "vote");

        let custom: CustomJsonOperation = serde_json::from_value(ops[0].value.clone()).unwrap();
        assert_eq!(custom.id, "app_vote");
        assert_eq!(custom.actor(), Some(("alice", false)));
    }

    #[test]
    fn actor_falls_back_to_active_authority() {
        let op = CustomJsonOperation {
            id: "x".into(),
            json: "{}".into(),
            required_posting_auths: vec![],
            required_auths: vec!["carol".into(), "dave".into()],
        };
        assert_eq!(op.actor(), Some(("carol", true)));

        let none = CustomJsonOperation {
            required_auths: vec![],
            ..op
        };
        assert_eq!(none.actor(), None);
    }

    #[test]
    fn heads_for_mode() {
        let heads = ChainHeads {
            head_block_number: 110,
            last_irreversible_block_num: 95,
        };
        assert_eq!(heads.for_mode(StreamMode::Latest), 110);
        assert_eq!(heads.for_mode(StreamMode::Irreversible), 95);
    }

    #[test]
    fn mode_parses_from_str_and_serde() {
        assert_eq!("irreversible".parse::<StreamMode>().unwrap(), StreamMode::Irreversible);
        assert!("head".parse::<StreamMode>().is_err());
        let mode: StreamMode = serde_json::from_str("\"latest\"").unwrap();
        assert_eq!(mode, StreamMode::Latest);
    }
}
