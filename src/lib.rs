//! # platform-rs
//!
//! Deterministic block execution engine for a platform chain whose identities
//! and validators are derived from a masternode-backed core chain.
//!
//! ## Architecture
//!
//! - [`platform_config`] - configuration types and protocol constants
//! - [`platform_store`] - authenticated, transactional key-value state
//! - [`platform_abci`] - block execution pipeline driven by lifecycle calls
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use platform_rs::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let core = Arc::new(MemoryCoreChain::new());
//! let store = Arc::new(MemoryStore::in_memory());
//! let mut pipeline = BlockExecutionPipeline::new(AbciConfig::default(), store, core)?;
//!
//! let genesis = pipeline.init_chain(RequestInitChain {
//!     chain_id: "local".to_string(),
//!     initial_height: 1,
//!     time_ms: 0,
//!     initial_core_height: None,
//! })?;
//! println!("genesis app hash {}", genesis.app_hash.to_upper_hex());
//! # Ok(())
//! # }
//! ```

pub use platform_abci;
pub use platform_config;
pub use platform_store;

/// Version of the engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports for driving the pipeline
pub mod prelude {
    pub use platform_abci::messages::{
        RequestBeginBlock, RequestDeliverTx, RequestEndBlock, RequestInitChain,
    };
    pub use platform_abci::{
        AbciApplication, Application, BlockExecutionPipeline, Bytes32, CoreChainView, Error,
        MasternodeEntry, MemoryCoreChain, PipelineState,
    };
    pub use platform_config::{AbciConfig, PlatformConfig};
    pub use platform_store::{AuthenticatedStore, MemoryStore};
}
