use remora_kv::KvError;

/// Errors from chain data access and daemon assembly.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Remote database failure.
    #[error(transparent)]
    Kv(#[from] KvError),
    /// A stored value failed to decode as RLP.
    #[error(transparent)]
    Rlp(#[from] alloy_rlp::Error),
    /// A stage progress row was malformed.
    #[error("invalid {stage} stage progress value of {len} bytes")]
    InvalidStageProgress {
        /// Stage whose row was read.
        stage: String,
        /// Length of the malformed value.
        len: usize,
    },
    /// A stored hash had the wrong length.
    #[error("invalid hash value of {0} bytes")]
    InvalidHashLength(usize),
    /// A stored block number had the wrong length.
    #[error("invalid block number value of {0} bytes")]
    InvalidNumberLength(usize),
    /// A block id string was neither a known tag nor a number.
    #[error("invalid block id: {0}")]
    InvalidBlockId(String),
    /// No chain config registered for the id.
    #[error("unknown chain id: {0}")]
    UnknownChain(u64),
    /// The I/O context pool could not be built.
    #[error("failed to build the io context pool: {0}")]
    ContextPool(String),
    /// The EVM worker pool could not be built.
    #[error("failed to build the worker pool: {0}")]
    WorkerPool(String),
}
