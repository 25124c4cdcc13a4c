//! Scripted stream doubles for exercising the transaction state machine.

use std::collections::VecDeque;

use async_trait::async_trait;
use tonic::Status;

use crate::{client::TxStream, proto};

/// A [`TxStream`] whose behavior is scripted up front.
///
/// `write` records the outbound frame and reports `write_result`; `read`
/// pops the next scripted response, reporting an internal status once the
/// script is exhausted.
#[derive(Debug)]
pub struct MockTxStream {
    /// Outcome of `start`.
    pub start_result: Result<(), Status>,
    /// Outcome of every `write`.
    pub write_result: Result<(), Status>,
    /// Outcome of `end`.
    pub end_result: Result<(), Status>,
    /// Scripted responses, popped front by `read`.
    pub responses: VecDeque<Result<proto::Pair, Status>>,
    /// Every frame passed to `write`, in order.
    pub written: Vec<proto::Cursor>,
}

impl Default for MockTxStream {
    fn default() -> Self {
        Self {
            start_result: Ok(()),
            write_result: Ok(()),
            end_result: Ok(()),
            responses: VecDeque::new(),
            written: Vec::new(),
        }
    }
}

impl MockTxStream {
    /// A stream scripted to answer `read` with the given frames, in order.
    pub fn with_responses(responses: impl IntoIterator<Item = proto::Pair>) -> Self {
        Self {
            responses: responses.into_iter().map(Ok).collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl TxStream for MockTxStream {
    async fn start(&mut self) -> Result<(), Status> {
        self.start_result.clone()
    }

    async fn write(&mut self, request: proto::Cursor) -> Result<(), Status> {
        self.written.push(request);
        self.write_result.clone()
    }

    async fn read(&mut self) -> Result<proto::Pair, Status> {
        self.responses
            .pop_front()
            .unwrap_or_else(|| Err(Status::internal("mock response script exhausted")))
    }

    async fn end(&mut self) -> Result<(), Status> {
        self.end_result.clone()
    }
}

/// The first inbound frame of a transaction, carrying its id.
pub fn tx_id_pair(tx_id: u64) -> proto::Pair {
    proto::Pair { tx_id, ..Default::default() }
}

/// The frame paired with an OPEN, carrying the allocated cursor id.
pub fn cursor_id_pair(cursor_id: u32) -> proto::Pair {
    proto::Pair { cursor_id, ..Default::default() }
}

/// A data frame; both sides empty means end of range.
pub fn kv_pair(k: &[u8], v: &[u8]) -> proto::Pair {
    proto::Pair {
        k: bytes::Bytes::copy_from_slice(k),
        v: bytes::Bytes::copy_from_slice(v),
        ..Default::default()
    }
}
