use tonic::Status;

/// Errors surfaced by the remote KV client.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// Transport failure reported by the stream, surfaced verbatim.
    #[error(transparent)]
    Transport(#[from] Status),
    /// The transaction is closed or was poisoned by an earlier failure.
    #[error("transaction is closed or poisoned")]
    Cancelled,
    /// The peer or the caller violated the request/response contract.
    #[error("remote kv protocol violation: {0}")]
    Protocol(&'static str),
}

impl KvError {
    /// Returns the transport status if this is a transport error.
    pub const fn as_status(&self) -> Option<&Status> {
        match self {
            Self::Transport(status) => Some(status),
            _ => None,
        }
    }
}
