//! Assembly of the daemon's execution services.

use std::sync::Arc;

use remora_kv::DatabaseReader;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::info;

use crate::{
    cache::{BlockCache, DEFAULT_BLOCK_CACHE_SIZE},
    chain::ChainConfig,
    error::ChainError,
    executor::EvmExecutor,
    runtime::{BlockingTaskPool, ContextPool},
};

/// Tuning knobs for [`RemoraNode`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeConfig {
    /// Chain the daemon serves.
    pub chain_id: u64,
    /// Workers executing EVM calls.
    pub workers: usize,
    /// Single-threaded I/O contexts.
    pub contexts: usize,
    /// Block cache capacity, in blocks.
    pub cache_size: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self { chain_id: 1, workers: 4, contexts: 2, cache_size: DEFAULT_BLOCK_CACHE_SIZE }
    }
}

/// Shared services behind the RPC handlers: chain config, I/O contexts,
/// EVM workers and the block cache.
#[derive(Debug)]
pub struct RemoraNode {
    config: &'static ChainConfig,
    contexts: ContextPool,
    workers: BlockingTaskPool,
    cache: Arc<BlockCache>,
}

impl RemoraNode {
    /// Builds the service set from `config`.
    pub fn new(config: NodeConfig) -> Result<Self, ChainError> {
        let chain = ChainConfig::lookup(config.chain_id)
            .ok_or(ChainError::UnknownChain(config.chain_id))?;
        let contexts = ContextPool::new(config.contexts)
            .map_err(|err| ChainError::ContextPool(err.to_string()))?;
        let workers = BlockingTaskPool::new(config.workers)
            .map_err(|err| ChainError::WorkerPool(err.to_string()))?;
        info!(
            target: "rpc::eth",
            chain_id = chain.chain_id,
            contexts = config.contexts,
            workers = config.workers,
            cache_size = config.cache_size,
            "node services up"
        );
        Ok(Self {
            config: chain,
            contexts,
            workers,
            cache: Arc::new(BlockCache::new(config.cache_size)),
        })
    }

    /// Vends an executor reading state as of `block_number`.
    pub fn executor<R>(&self, reader: R, block_number: u64) -> EvmExecutor<R>
    where
        R: DatabaseReader + Clone + 'static,
    {
        EvmExecutor::new(self.io_handle(), reader, self.config, self.workers.clone(), block_number)
    }

    /// A handle on the next I/O context, round-robin.
    pub fn io_handle(&self) -> Handle {
        self.contexts.handle()
    }

    /// The chain this node serves.
    pub const fn chain_config(&self) -> &'static ChainConfig {
        self.config
    }

    /// The shared block cache.
    pub fn block_cache(&self) -> &Arc<BlockCache> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::EmptyReader;

    #[test]
    fn unknown_chain_ids_are_rejected() {
        let config = NodeConfig { chain_id: 424_242, ..Default::default() };
        let err = RemoraNode::new(config).unwrap_err();
        assert!(matches!(err, ChainError::UnknownChain(424_242)));
    }

    #[test]
    fn builds_services_and_vends_executors() {
        let node = RemoraNode::new(NodeConfig { chain_id: 5, ..Default::default() }).unwrap();
        assert_eq!(node.chain_config().chain_id, 5);
        assert!(node.block_cache().is_empty());
        let executor = node.executor(EmptyReader, 1234);
        assert_eq!(executor.block_number(), 1234);
    }

    #[test]
    fn config_uses_camel_case_keys() {
        let config: NodeConfig =
            serde_json::from_str(r#"{"chainId":5,"workers":8,"cacheSize":64}"#).unwrap();
        assert_eq!(config.chain_id, 5);
        assert_eq!(config.workers, 8);
        // Missing keys fall back to the defaults.
        assert_eq!(config.contexts, NodeConfig::default().contexts);
        assert_eq!(config.cache_size, 64);
    }
}
