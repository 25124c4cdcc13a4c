//! Client-side view of one server-side read transaction.

mod cursor;
mod tx;

pub use cursor::RemoteCursor;
pub use tx::{RemoteTx, TxState};
