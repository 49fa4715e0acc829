//! chainstate-core: block acquisition and operation dispatch for
//! application state machines built on a blockchain.
//!
//! # Architecture
//!
//! ```text
//! ProcessorBuilder → Processor
//!                       └── Engine (one task per run)
//!                             ├── CatchUp      (pull historical blocks, in order)
//!                             ├── LiveStream   (push feed once caught up)
//!                             ├── Cursor       (next block to process)
//!                             └── Dispatcher → HandlerRegistry (user handlers)
//!
//! BlockProvider: get_block / get_chain_heads / subscribe_blocks
//! ```

pub mod builder;
pub mod config;
pub mod cursor;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod processor;
pub mod provider;
pub mod types;

mod catch_up;
mod engine;
mod streaming;

pub use builder::ProcessorBuilder;
pub use config::{HandlerFaultPolicy, ProcessorConfig};
pub use cursor::Cursor;
pub use dispatch::{DispatchStats, Dispatcher};
pub use error::{FailureKind, HandlerError, ProcessorError, ProviderError};
pub use handler::{
    BlockHandler, CustomJsonEvent, CustomJsonHandler, HandlerRegistry, OperationEvent,
    OperationHandler, StreamingStartHandler,
};
pub use processor::{Processor, UnexpectedStopHook};
pub use provider::{BlockProvider, BlockStream};
pub use types::{
    Block, ChainHeads, CustomJsonOperation, Operation, ProcessorState, StreamMode, Transaction,
};
