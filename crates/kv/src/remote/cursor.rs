use std::sync::{
    atomic::{AtomicU32, Ordering},
    Weak,
};

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::{
    client::TxStream,
    error::KvError,
    proto::{self, Op},
    remote::tx::{TxInner, TxState},
};

/// A server-side iterator over one table, multiplexed on the owning
/// transaction's stream.
///
/// The cursor keeps only a weak reference to its transaction: it cannot
/// prolong the stream's life, and once the transaction leaves
/// [`TxState::Open`] every operation fails with [`KvError::Cancelled`].
/// Each operation is one write/read pair routed through the transaction's
/// serializer.
#[derive(Debug)]
pub struct RemoteCursor<S> {
    tx: Weak<Mutex<TxInner<S>>>,
    table: String,
    cursor_id: AtomicU32,
    dup_sort: bool,
}

impl<S: TxStream> RemoteCursor<S> {
    pub(crate) fn new(
        tx: Weak<Mutex<TxInner<S>>>,
        table: String,
        cursor_id: u32,
        dup_sort: bool,
    ) -> Self {
        Self { tx, table, cursor_id: AtomicU32::new(cursor_id), dup_sort }
    }

    /// The server-allocated cursor id; zero once closed or invalidated.
    pub fn cursor_id(&self) -> u32 {
        self.cursor_id.load(Ordering::Relaxed)
    }

    /// The table this cursor iterates.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Whether the cursor was opened over a dup-sorted table.
    pub const fn is_dup_sort(&self) -> bool {
        self.dup_sort
    }

    pub(crate) fn invalidate(&self) {
        self.cursor_id.store(0, Ordering::Relaxed);
    }

    /// Positions at the first entry with key >= `key`.
    pub async fn seek(&self, key: &[u8]) -> Result<Option<(Bytes, Bytes)>, KvError> {
        self.op(Op::Seek, Some(key), None).await
    }

    /// Positions at exactly `key`.
    pub async fn seek_exact(&self, key: &[u8]) -> Result<Option<(Bytes, Bytes)>, KvError> {
        self.op(Op::SeekExact, Some(key), None).await
    }

    /// Positions at the first entry of the table.
    pub async fn first(&self) -> Result<Option<(Bytes, Bytes)>, KvError> {
        self.op(Op::First, None, None).await
    }

    /// Positions at the last entry of the table.
    pub async fn last(&self) -> Result<Option<(Bytes, Bytes)>, KvError> {
        self.op(Op::Last, None, None).await
    }

    /// Advances to the next entry.
    #[allow(clippy::should_implement_trait)]
    pub async fn next(&self) -> Result<Option<(Bytes, Bytes)>, KvError> {
        self.op(Op::Next, None, None).await
    }

    /// Steps back to the previous entry.
    pub async fn prev(&self) -> Result<Option<(Bytes, Bytes)>, KvError> {
        self.op(Op::Prev, None, None).await
    }

    /// Returns the entry at the current position.
    pub async fn current(&self) -> Result<Option<(Bytes, Bytes)>, KvError> {
        self.op(Op::Current, None, None).await
    }

    /// Positions at the first value >= `subkey` under `key`.
    pub async fn seek_both(
        &self,
        key: &[u8],
        subkey: &[u8],
    ) -> Result<Option<(Bytes, Bytes)>, KvError> {
        self.require_dup_sort()?;
        self.op(Op::SeekBoth, Some(key), Some(subkey)).await
    }

    /// Positions at exactly the `key`/`subkey` pair.
    pub async fn seek_both_exact(
        &self,
        key: &[u8],
        subkey: &[u8],
    ) -> Result<Option<(Bytes, Bytes)>, KvError> {
        self.require_dup_sort()?;
        self.op(Op::SeekBothExact, Some(key), Some(subkey)).await
    }

    /// Advances to the next duplicate of the current key.
    pub async fn next_dup(&self) -> Result<Option<(Bytes, Bytes)>, KvError> {
        self.require_dup_sort()?;
        self.op(Op::NextDup, None, None).await
    }

    /// Advances to the first duplicate of the next key.
    pub async fn next_no_dup(&self) -> Result<Option<(Bytes, Bytes)>, KvError> {
        self.require_dup_sort()?;
        self.op(Op::NextNoDup, None, None).await
    }

    /// Steps back to the previous duplicate of the current key.
    pub async fn prev_dup(&self) -> Result<Option<(Bytes, Bytes)>, KvError> {
        self.require_dup_sort()?;
        self.op(Op::PrevDup, None, None).await
    }

    /// Releases the remote cursor and zeroes the local id.
    pub async fn close(&self) -> Result<(), KvError> {
        let tx = self.tx.upgrade().ok_or(KvError::Cancelled)?;
        let mut tx = tx.lock().await;
        if tx.state != TxState::Open {
            return Err(KvError::Cancelled);
        }
        let cursor = self.cursor_id();
        if cursor == 0 {
            return Err(KvError::Cancelled);
        }
        let request =
            proto::Cursor { op: Op::Close as i32, cursor, ..Default::default() };
        tx.round_trip(request).await?;
        tx.remove(&self.table, self.dup_sort);
        self.invalidate();
        Ok(())
    }

    fn require_dup_sort(&self) -> Result<(), KvError> {
        if self.dup_sort {
            Ok(())
        } else {
            Err(KvError::Protocol("dup-sort operation on a plain cursor"))
        }
    }

    async fn op(
        &self,
        op: Op,
        key: Option<&[u8]>,
        subkey: Option<&[u8]>,
    ) -> Result<Option<(Bytes, Bytes)>, KvError> {
        let tx = self.tx.upgrade().ok_or(KvError::Cancelled)?;
        let mut tx = tx.lock().await;
        if tx.state != TxState::Open {
            return Err(KvError::Cancelled);
        }
        let cursor = self.cursor_id();
        if cursor == 0 {
            return Err(KvError::Cancelled);
        }
        let request = proto::Cursor {
            op: op as i32,
            cursor,
            k: key.map(Bytes::copy_from_slice).unwrap_or_default(),
            v: subkey.map(Bytes::copy_from_slice).unwrap_or_default(),
            ..Default::default()
        };
        let pair = tx.round_trip(request).await?;
        if pair.k.is_empty() && pair.v.is_empty() {
            Ok(None)
        } else {
            Ok(Some((pair.k, pair.v)))
        }
    }
}
