//! Core services of the remora daemon: chain configuration, staged-sync
//! accessors, cached chain reads, and the EVM call executor.
//!
//! Everything here sits behind the JSON-RPC handlers and in front of
//! [`remora_kv`]'s remote database client. The split between cooperative
//! I/O contexts and blocking EVM workers lives in [`runtime`];
//! [`executor`] bridges the two.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod blocks;
pub mod cache;
pub mod chain;
pub mod chain_access;
mod error;
pub mod executor;
pub mod node;
pub mod result;
pub mod runtime;
pub mod stages;
pub mod state;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use cache::BlockCache;
pub use chain::ChainConfig;
pub use error::ChainError;
pub use executor::{EvmExecutor, ExecutionError};
pub use node::{NodeConfig, RemoraNode};
pub use result::{error_message, CallResult, StatusCode, PRE_CHECK_ERROR_CODE};
pub use state::{RemoteState, StateError};
pub use types::{BlockWithHash, Transaction};
