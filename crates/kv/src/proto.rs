//! Wire messages of the execution node's `remote.KV` service.
//!
//! Hand-maintained mirrors of the node's protobuf definitions, so the build
//! carries no protoc dependency. The [`kv_client`] stub is written in the
//! shape `tonic-build` would emit for the same service.

/// One request frame on the `Tx` stream.
///
/// `op` is always set. `bucket_name` accompanies [`Op::Open`] only;
/// `cursor` identifies the target for every post-open operation; `k`/`v`
/// carry the key and, for dup-sort operations, the subkey.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Cursor {
    /// Operation to perform.
    #[prost(enumeration = "Op", tag = "1")]
    pub op: i32,
    /// Target table, set on [`Op::Open`] only.
    #[prost(string, tag = "2")]
    pub bucket_name: ::prost::alloc::string::String,
    /// Server-allocated cursor id, zero on [`Op::Open`].
    #[prost(uint32, tag = "3")]
    pub cursor: u32,
    /// Key argument.
    #[prost(bytes = "bytes", tag = "4")]
    pub k: ::prost::bytes::Bytes,
    /// Subkey argument for dup-sort operations.
    #[prost(bytes = "bytes", tag = "5")]
    pub v: ::prost::bytes::Bytes,
}

/// One response frame on the `Tx` stream.
///
/// The first frame after stream start carries `tx_id`; the frame paired
/// with [`Op::Open`] carries `cursor_id`; data operations carry `k`/`v`,
/// both empty at end of range.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Pair {
    /// Key of the entry the cursor landed on.
    #[prost(bytes = "bytes", tag = "1")]
    pub k: ::prost::bytes::Bytes,
    /// Value of the entry the cursor landed on.
    #[prost(bytes = "bytes", tag = "2")]
    pub v: ::prost::bytes::Bytes,
    /// Server-side transaction id, first frame only.
    #[prost(uint64, tag = "3")]
    pub tx_id: u64,
    /// Allocated cursor id, set in the frame paired with [`Op::Open`].
    #[prost(uint32, tag = "4")]
    pub cursor_id: u32,
}

/// Cursor operations understood by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Op {
    /// Position at the first entry of the table.
    First = 0,
    /// Position at the first duplicate of the current key.
    FirstDup = 1,
    /// Position at the first entry with key >= the given key.
    Seek = 2,
    /// Position at the first value >= subkey under the given key.
    SeekBoth = 3,
    /// Return the entry at the current position.
    Current = 4,
    /// Position at the last entry of the table.
    Last = 6,
    /// Position at the last duplicate of the current key.
    LastDup = 7,
    /// Advance to the next entry.
    Next = 8,
    /// Advance to the next duplicate of the current key.
    NextDup = 9,
    /// Advance to the first duplicate of the next key.
    NextNoDup = 11,
    /// Step back to the previous entry.
    Prev = 12,
    /// Step back to the previous duplicate of the current key.
    PrevDup = 13,
    /// Step back to the last duplicate of the previous key.
    PrevNoDup = 14,
    /// Position at exactly the given key.
    SeekExact = 15,
    /// Position at exactly the given key/subkey pair.
    SeekBothExact = 16,
    /// Allocate a cursor over a table.
    Open = 30,
    /// Release a cursor.
    Close = 31,
}

impl Op {
    /// Protobuf enum value name, as emitted by the server in diagnostics.
    pub const fn as_str_name(&self) -> &'static str {
        match self {
            Self::First => "FIRST",
            Self::FirstDup => "FIRST_DUP",
            Self::Seek => "SEEK",
            Self::SeekBoth => "SEEK_BOTH",
            Self::Current => "CURRENT",
            Self::Last => "LAST",
            Self::LastDup => "LAST_DUP",
            Self::Next => "NEXT",
            Self::NextDup => "NEXT_DUP",
            Self::NextNoDup => "NEXT_NO_DUP",
            Self::Prev => "PREV",
            Self::PrevDup => "PREV_DUP",
            Self::PrevNoDup => "PREV_NO_DUP",
            Self::SeekExact => "SEEK_EXACT",
            Self::SeekBothExact => "SEEK_BOTH_EXACT",
            Self::Open => "OPEN",
            Self::Close => "CLOSE",
        }
    }
}

/// Client stub for the `remote.KV` service.
pub mod kv_client {
    #![allow(unused_variables, dead_code, missing_docs, clippy::let_unit_value)]

    use tonic::codegen::*;

    /// Handle to the node's `remote.KV` service.
    #[derive(Debug, Clone)]
    pub struct KvClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl KvClient<tonic::transport::Channel> {
        /// Attempts to create a new client by connecting to a given endpoint.
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }

    impl<T> KvClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }

        /// Limits the maximum size of a decoded message.
        #[must_use]
        pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_decoding_message_size(limit);
            self
        }

        /// Limits the maximum size of an encoded message.
        #[must_use]
        pub fn max_encoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_encoding_message_size(limit);
            self
        }

        /// Opens the bidirectional stream carrying one server-side read
        /// transaction: [`Cursor`](super::Cursor) requests in,
        /// [`Pair`](super::Pair) responses out, paired in order.
        pub async fn tx(
            &mut self,
            request: impl tonic::IntoStreamingRequest<Message = super::Cursor>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::Pair>>,
            tonic::Status,
        > {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/remote.KV/Tx");
            let mut req = request.into_streaming_request();
            req.extensions_mut().insert(GrpcMethod::new("remote.KV", "Tx"));
            self.inner.streaming(req, path, codec).await
        }
    }
}
