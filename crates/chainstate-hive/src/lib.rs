//! chainstate-hive: Hive JSON-RPC block provider for chainstate-core.
//!
//! ```rust,no_run
//! use chainstate_core::Processor;
//! use chainstate_hive::HiveProvider;
//!
//! # fn build() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = HiveProvider::connect("https://api.hive.blog")?;
//! let processor = Processor::builder(provider)
//!     .initial_block_number(80_000_000)
//!     .build()?;
//! # let _ = processor;
//! # Ok(())
//! # }
//! ```

pub mod provider;
pub mod rpc;

pub use provider::{HiveProvider, HiveProviderConfig};
pub use rpc::HiveRpcClient;
