//! One bidirectional stream against the `remote.KV` service.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{transport::Channel, Status, Streaming};
use tracing::trace;

use crate::proto::{self, kv_client::KvClient};

/// One live bidirectional `Tx` stream.
///
/// At most one write and one read may be pending at any time; the owning
/// [`RemoteTx`](crate::RemoteTx) serializes access. Any non-OK status kills
/// the stream and implementations need not be usable afterwards.
#[async_trait]
pub trait TxStream: Send {
    /// Initiates the stream, completing once the server accepted the call.
    async fn start(&mut self) -> Result<(), Status>;

    /// Sends one request frame, completing once the peer accepted it.
    async fn write(&mut self, request: proto::Cursor) -> Result<(), Status>;

    /// Awaits the next inbound response frame.
    async fn read(&mut self) -> Result<proto::Pair, Status>;

    /// Half-closes the outbound side and awaits server completion.
    async fn end(&mut self) -> Result<(), Status>;
}

/// [`TxStream`] over a real gRPC channel.
///
/// Outbound frames flow through a rendezvous channel wrapped as the request
/// stream; dropping the sender half-closes the call, which is how [`end`]
/// and drop both release the server-side transaction.
///
/// [`end`]: TxStream::end
pub struct GrpcTxStream {
    client: KvClient<Channel>,
    sender: Option<mpsc::Sender<proto::Cursor>>,
    inbound: Option<Streaming<proto::Pair>>,
}

impl GrpcTxStream {
    /// Creates a stream host over an established client.
    pub fn new(client: KvClient<Channel>) -> Self {
        Self { client, sender: None, inbound: None }
    }

    /// Connects to `dst` and wraps the resulting client.
    pub async fn connect(dst: &str) -> Result<Self, tonic::transport::Error> {
        Ok(Self::new(KvClient::connect(dst.to_owned()).await?))
    }
}

#[async_trait]
impl TxStream for GrpcTxStream {
    async fn start(&mut self) -> Result<(), Status> {
        let (sender, receiver) = mpsc::channel(1);
        let response = self.client.tx(ReceiverStream::new(receiver)).await?;
        self.sender = Some(sender);
        self.inbound = Some(response.into_inner());
        trace!(target: "kv::client", "tx stream started");
        Ok(())
    }

    async fn write(&mut self, request: proto::Cursor) -> Result<(), Status> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| Status::failed_precondition("stream not started"))?;
        sender
            .send(request)
            .await
            .map_err(|_| Status::unavailable("tx stream closed by the server"))
    }

    async fn read(&mut self) -> Result<proto::Pair, Status> {
        let inbound = self
            .inbound
            .as_mut()
            .ok_or_else(|| Status::failed_precondition("stream not started"))?;
        match inbound.message().await? {
            Some(pair) => Ok(pair),
            None => Err(Status::internal("tx stream ended before the paired response")),
        }
    }

    async fn end(&mut self) -> Result<(), Status> {
        // Half-close; the server completes the stream in response.
        self.sender = None;
        if let Some(inbound) = self.inbound.as_mut() {
            while inbound.message().await?.is_some() {}
        }
        self.inbound = None;
        trace!(target: "kv::client", "tx stream ended");
        Ok(())
    }
}
