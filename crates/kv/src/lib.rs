//! Client for the execution node's remote key-value interface.
//!
//! All chain data consumed by this daemon lives in a database owned by a
//! remote execution node. Reads are served over one bidirectional gRPC
//! stream per transaction: the stream carries [`proto::Cursor`] requests
//! and [`proto::Pair`] responses in strict request order, and the lifetime
//! of the stream pins a consistent read snapshot on the server.
//!
//! Bottom up:
//! - [`proto`]: wire messages and the `remote.KV/Tx` client stub.
//! - [`client`]: the [`TxStream`] abstraction over one live stream.
//! - [`remote`]: the client-side transaction state machine multiplexing
//!   many logical cursors over one stream.
//! - [`reader`]: the stateless read façade used by the rest of the daemon.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod client;
mod error;
pub mod proto;
pub mod reader;
pub mod remote;
pub mod tables;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use client::{GrpcTxStream, TxStream};
pub use error::KvError;
pub use reader::{DatabaseReader, TxDatabaseReader, Walker};
pub use remote::{RemoteCursor, RemoteTx, TxState};
