use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    client::TxStream,
    error::KvError,
    proto::{self, Op},
    remote::cursor::RemoteCursor,
};

/// Lifecycle of a [`RemoteTx`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxState {
    /// Created, stream not started.
    Unopened,
    /// Stream start in flight.
    Opening,
    /// Usable; cursors may be allocated and driven.
    Open,
    /// Stream end in flight.
    Closing,
    /// Ended cleanly.
    Closed,
    /// Poisoned by a transport or protocol failure.
    Failed,
}

/// Client-side handle for one server-side read transaction.
///
/// The transaction owns the stream and every cursor it vends. Write/read
/// pairs are serialized in arrival order: concurrent callers queue on the
/// internal lock and the server observes their requests
/// first-come-first-served. Exactly one request is outstanding at any time,
/// and its paired response is consumed before the next request is accepted.
pub struct RemoteTx<S> {
    inner: Arc<Mutex<TxInner<S>>>,
    tx_id: AtomicU64,
}

pub(crate) struct TxInner<S> {
    pub(crate) stream: S,
    pub(crate) state: TxState,
    cursors: HashMap<String, Arc<RemoteCursor<S>>>,
    dup_cursors: HashMap<String, Arc<RemoteCursor<S>>>,
}

impl<S: TxStream> RemoteTx<S> {
    /// Wraps a stream that has not been started yet.
    pub fn new(stream: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TxInner {
                stream,
                state: TxState::Unopened,
                cursors: HashMap::new(),
                dup_cursors: HashMap::new(),
            })),
            tx_id: AtomicU64::new(0),
        }
    }

    /// The server-assigned transaction id.
    ///
    /// Only meaningful after [`open`](Self::open) returned successfully.
    pub fn tx_id(&self) -> u64 {
        self.tx_id.load(Ordering::Relaxed)
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> TxState {
        self.inner.lock().await.state
    }

    /// Starts the stream and harvests the transaction id from the first
    /// inbound frame.
    pub async fn open(&self) -> Result<(), KvError> {
        let mut inner = self.inner.lock().await;
        if inner.state != TxState::Unopened {
            return Err(KvError::Cancelled);
        }
        inner.state = TxState::Opening;
        if let Err(status) = inner.stream.start().await {
            inner.state = TxState::Failed;
            return Err(status.into());
        }
        match inner.stream.read().await {
            Ok(pair) => {
                self.tx_id.store(pair.tx_id, Ordering::Relaxed);
                inner.state = TxState::Open;
                debug!(target: "kv::remote", tx_id = pair.tx_id, "transaction open");
                Ok(())
            }
            Err(status) => {
                inner.state = TxState::Failed;
                Err(status.into())
            }
        }
    }

    /// Ends the stream and releases the server-side snapshot.
    ///
    /// Closing a transaction that never opened, or that already terminated,
    /// only transitions it to [`TxState::Closed`]. Every installed cursor is
    /// invalidated either way.
    pub async fn close(&self) -> Result<(), KvError> {
        let mut inner = self.inner.lock().await;
        inner.invalidate_cursors();
        if inner.state != TxState::Open {
            inner.state = TxState::Closed;
            return Ok(());
        }
        inner.state = TxState::Closing;
        match inner.stream.end().await {
            Ok(()) => {
                inner.state = TxState::Closed;
                debug!(target: "kv::remote", tx_id = self.tx_id(), "transaction closed");
                Ok(())
            }
            Err(status) => {
                inner.state = TxState::Failed;
                Err(status.into())
            }
        }
    }

    /// Returns a cursor over `table`, allocating one remotely on first use.
    ///
    /// Cursors are pooled per table: a repeated request returns the already
    /// installed cursor without a wire round-trip.
    pub async fn cursor(&self, table: &str) -> Result<Arc<RemoteCursor<S>>, KvError> {
        self.new_cursor(table, false).await
    }

    /// Returns a cursor over the dup-sorted `table`.
    pub async fn cursor_dup_sort(&self, table: &str) -> Result<Arc<RemoteCursor<S>>, KvError> {
        self.new_cursor(table, true).await
    }

    async fn new_cursor(
        &self,
        table: &str,
        dup_sort: bool,
    ) -> Result<Arc<RemoteCursor<S>>, KvError> {
        let mut inner = self.inner.lock().await;
        if inner.state != TxState::Open {
            return Err(KvError::Cancelled);
        }
        if let Some(cursor) = inner.pooled(table, dup_sort) {
            return Ok(cursor);
        }
        let request = proto::Cursor {
            op: Op::Open as i32,
            bucket_name: table.to_owned(),
            ..Default::default()
        };
        let pair = inner.round_trip(request).await?;
        if pair.cursor_id == 0 {
            inner.poison();
            return Err(KvError::Protocol("server allocated a zero cursor id"));
        }
        trace!(target: "kv::remote", table, cursor_id = pair.cursor_id, dup_sort, "cursor open");
        let cursor = Arc::new(RemoteCursor::new(
            Arc::downgrade(&self.inner),
            table.to_owned(),
            pair.cursor_id,
            dup_sort,
        ));
        inner.install(cursor.clone(), dup_sort);
        Ok(cursor)
    }
}

impl<S: TxStream> TxInner<S> {
    fn pooled(&self, table: &str, dup_sort: bool) -> Option<Arc<RemoteCursor<S>>> {
        let pool = if dup_sort { &self.dup_cursors } else { &self.cursors };
        pool.get(table).cloned()
    }

    fn install(&mut self, cursor: Arc<RemoteCursor<S>>, dup_sort: bool) {
        let pool = if dup_sort { &mut self.dup_cursors } else { &mut self.cursors };
        pool.insert(cursor.table().to_owned(), cursor);
    }

    pub(crate) fn remove(&mut self, table: &str, dup_sort: bool) {
        let pool = if dup_sort { &mut self.dup_cursors } else { &mut self.cursors };
        pool.remove(table);
    }

    /// One write/read pair on the stream. Any failure poisons the
    /// transaction: pairing can no longer be proven after a broken exchange.
    pub(crate) async fn round_trip(
        &mut self,
        request: proto::Cursor,
    ) -> Result<proto::Pair, KvError> {
        if let Err(status) = self.stream.write(request).await {
            self.poison();
            return Err(status.into());
        }
        match self.stream.read().await {
            Ok(pair) => Ok(pair),
            Err(status) => {
                self.poison();
                Err(status.into())
            }
        }
    }

    pub(crate) fn poison(&mut self) {
        warn!(target: "kv::remote", "transaction poisoned, invalidating cursors");
        self.state = TxState::Failed;
        self.invalidate_cursors();
    }

    fn invalidate_cursors(&mut self) {
        for cursor in self.cursors.values().chain(self.dup_cursors.values()) {
            cursor.invalidate();
        }
        self.cursors.clear();
        self.dup_cursors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{cursor_id_pair, kv_pair, tx_id_pair, MockTxStream};
    use tonic::{Code, Status};

    fn cancelled() -> Status {
        Status::cancelled("cancelled")
    }

    #[tokio::test]
    async fn open_harvests_tx_id() {
        let stream = MockTxStream::with_responses([tx_id_pair(4)]);
        let tx = RemoteTx::new(stream);
        tx.open().await.unwrap();
        assert_eq!(tx.tx_id(), 4);
        assert_eq!(tx.state().await, TxState::Open);
    }

    #[tokio::test]
    async fn open_fails_when_start_fails() {
        let mut stream = MockTxStream::default();
        stream.start_result = Err(cancelled());
        let tx = RemoteTx::new(stream);
        let err = tx.open().await.unwrap_err();
        match err {
            KvError::Transport(status) => assert_eq!(status.code(), Code::Cancelled),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(tx.state().await, TxState::Failed);
    }

    #[tokio::test]
    async fn open_fails_when_first_read_fails() {
        let mut stream = MockTxStream::default();
        stream.responses.push_back(Err(cancelled()));
        let tx = RemoteTx::new(stream);
        let err = tx.open().await.unwrap_err();
        match err {
            KvError::Transport(status) => assert_eq!(status.code(), Code::Cancelled),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn close_without_open_is_idempotent() {
        let tx = RemoteTx::new(MockTxStream::default());
        tx.close().await.unwrap();
        assert_eq!(tx.state().await, TxState::Closed);
        // A second close stays closed.
        tx.close().await.unwrap();
        assert_eq!(tx.state().await, TxState::Closed);
    }

    #[tokio::test]
    async fn close_ends_an_open_transaction() {
        let stream = MockTxStream::with_responses([tx_id_pair(4)]);
        let tx = RemoteTx::new(stream);
        tx.open().await.unwrap();
        tx.close().await.unwrap();
        assert_eq!(tx.state().await, TxState::Closed);
    }

    #[tokio::test]
    async fn close_surfaces_end_failure() {
        let mut stream = MockTxStream::with_responses([tx_id_pair(4)]);
        stream.end_result = Err(cancelled());
        let tx = RemoteTx::new(stream);
        tx.open().await.unwrap();
        let err = tx.close().await.unwrap_err();
        match err {
            KvError::Transport(status) => assert_eq!(status.code(), Code::Cancelled),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(tx.state().await, TxState::Failed);
    }

    #[tokio::test]
    async fn cursor_reports_the_allocated_id() {
        let stream = MockTxStream::with_responses([tx_id_pair(4), cursor_id_pair(0x23)]);
        let tx = RemoteTx::new(stream);
        tx.open().await.unwrap();
        let cursor = tx.cursor("table1").await.unwrap();
        assert_eq!(cursor.cursor_id(), 0x23);
        assert_eq!(cursor.table(), "table1");
        assert!(!cursor.is_dup_sort());
    }

    #[tokio::test]
    async fn cursor_open_sends_the_table_name() {
        let stream = MockTxStream::with_responses([tx_id_pair(4), cursor_id_pair(0x23)]);
        let tx = RemoteTx::new(stream);
        tx.open().await.unwrap();
        tx.cursor("table1").await.unwrap();

        let inner = tx.inner.lock().await;
        let open = &inner.stream.written[0];
        assert_eq!(open.op, Op::Open as i32);
        assert_eq!(open.bucket_name, "table1");
        assert_eq!(open.cursor, 0);
    }

    #[tokio::test]
    async fn cursors_on_distinct_tables_allocate_distinct_ids() {
        let stream =
            MockTxStream::with_responses([tx_id_pair(4), cursor_id_pair(0x23), cursor_id_pair(0x24)]);
        let tx = RemoteTx::new(stream);
        tx.open().await.unwrap();
        let first = tx.cursor("table1").await.unwrap();
        let second = tx.cursor("table2").await.unwrap();
        assert_eq!(first.cursor_id(), 0x23);
        assert_eq!(second.cursor_id(), 0x24);

        // Closing the transaction invalidates both.
        tx.close().await.unwrap();
        assert_eq!(first.cursor_id(), 0);
        assert_eq!(second.cursor_id(), 0);
    }

    #[tokio::test]
    async fn concurrent_cursor_requests_serialize_in_arrival_order() {
        let stream =
            MockTxStream::with_responses([tx_id_pair(4), cursor_id_pair(1), cursor_id_pair(2)]);
        let tx = RemoteTx::new(stream);
        tx.open().await.unwrap();

        let (first, second) = tokio::join!(tx.cursor("table1"), tx.cursor("table2"));
        assert_eq!(first.unwrap().cursor_id(), 1);
        assert_eq!(second.unwrap().cursor_id(), 2);

        // One write/read pair in flight at a time, in arrival order.
        let inner = tx.inner.lock().await;
        assert_eq!(inner.stream.written.len(), 2);
        assert_eq!(inner.stream.written[0].bucket_name, "table1");
        assert_eq!(inner.stream.written[1].bucket_name, "table2");
    }

    #[tokio::test]
    async fn cursor_is_pooled_per_table() {
        let stream = MockTxStream::with_responses([tx_id_pair(4), cursor_id_pair(0x23)]);
        let tx = RemoteTx::new(stream);
        tx.open().await.unwrap();
        let first = tx.cursor("table1").await.unwrap();
        let second = tx.cursor("table1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // Only one OPEN crossed the wire.
        let inner = tx.inner.lock().await;
        assert_eq!(inner.stream.written.len(), 1);
    }

    #[tokio::test]
    async fn dup_sort_cursor_is_pooled_separately() {
        let stream =
            MockTxStream::with_responses([tx_id_pair(4), cursor_id_pair(0x23), cursor_id_pair(0x24)]);
        let tx = RemoteTx::new(stream);
        tx.open().await.unwrap();
        let plain = tx.cursor("table1").await.unwrap();
        let dup = tx.cursor_dup_sort("table1").await.unwrap();
        assert!(!Arc::ptr_eq(&plain, &dup));
        assert!(dup.is_dup_sort());
        assert_eq!(dup.cursor_id(), 0x24);
    }

    #[tokio::test]
    async fn cursor_requires_an_open_transaction() {
        let tx = RemoteTx::new(MockTxStream::default());
        let err = tx.cursor("table1").await.unwrap_err();
        assert!(matches!(err, KvError::Cancelled));
    }

    #[tokio::test]
    async fn cursor_write_failure_poisons_the_transaction() {
        let mut stream = MockTxStream::with_responses([tx_id_pair(4)]);
        stream.write_result = Err(cancelled());
        let tx = RemoteTx::new(stream);
        tx.open().await.unwrap();
        let err = tx.cursor("table1").await.unwrap_err();
        match err {
            KvError::Transport(status) => assert_eq!(status.code(), Code::Cancelled),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(tx.state().await, TxState::Failed);

        // The transaction stays unusable.
        let err = tx.cursor("table2").await.unwrap_err();
        assert!(matches!(err, KvError::Cancelled));
    }

    #[tokio::test]
    async fn cursor_read_failure_poisons_the_transaction() {
        let mut stream = MockTxStream::with_responses([tx_id_pair(4)]);
        stream.responses.push_back(Err(cancelled()));
        let tx = RemoteTx::new(stream);
        tx.open().await.unwrap();
        let err = tx.cursor("table1").await.unwrap_err();
        match err {
            KvError::Transport(status) => assert_eq!(status.code(), Code::Cancelled),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(tx.state().await, TxState::Failed);
    }

    #[tokio::test]
    async fn poisoning_invalidates_live_cursors() {
        let mut stream = MockTxStream::with_responses([tx_id_pair(4), cursor_id_pair(0x23)]);
        stream.responses.push_back(Err(cancelled()));
        let tx = RemoteTx::new(stream);
        tx.open().await.unwrap();
        let cursor = tx.cursor("table1").await.unwrap();
        assert_eq!(cursor.cursor_id(), 0x23);

        // The next allocation dies on the scripted read failure.
        tx.cursor("table2").await.unwrap_err();
        assert_eq!(cursor.cursor_id(), 0);
        let err = cursor.first().await.unwrap_err();
        assert!(matches!(err, KvError::Cancelled));
    }

    #[tokio::test]
    async fn zero_cursor_id_is_a_protocol_error() {
        let stream = MockTxStream::with_responses([tx_id_pair(4), cursor_id_pair(0)]);
        let tx = RemoteTx::new(stream);
        tx.open().await.unwrap();
        let err = tx.cursor("table1").await.unwrap_err();
        assert!(matches!(err, KvError::Protocol(_)));
        assert_eq!(tx.state().await, TxState::Failed);
    }

    #[tokio::test]
    async fn cursor_seek_round_trip() {
        let stream = MockTxStream::with_responses([
            tx_id_pair(4),
            cursor_id_pair(0x23),
            kv_pair(b"key1", b"value1"),
            kv_pair(b"", b""),
        ]);
        let tx = RemoteTx::new(stream);
        tx.open().await.unwrap();
        let cursor = tx.cursor("table1").await.unwrap();

        let entry = cursor.seek(b"key1").await.unwrap();
        let (key, value) = entry.expect("entry expected");
        assert_eq!(key.as_ref(), b"key1");
        assert_eq!(value.as_ref(), b"value1");

        // An all-empty pair is end of range.
        assert!(cursor.next().await.unwrap().is_none());

        let inner = tx.inner.lock().await;
        let seek = &inner.stream.written[1];
        assert_eq!(seek.op, Op::Seek as i32);
        assert_eq!(seek.cursor, 0x23);
        assert_eq!(seek.k.as_ref(), b"key1");
        let next = &inner.stream.written[2];
        assert_eq!(next.op, Op::Next as i32);
    }

    #[tokio::test]
    async fn dup_sort_ops_require_a_dup_sort_cursor() {
        let stream = MockTxStream::with_responses([tx_id_pair(4), cursor_id_pair(0x23)]);
        let tx = RemoteTx::new(stream);
        tx.open().await.unwrap();
        let cursor = tx.cursor("table1").await.unwrap();
        let err = cursor.next_dup().await.unwrap_err();
        assert!(matches!(err, KvError::Protocol(_)));
    }

    #[tokio::test]
    async fn closing_a_cursor_zeroes_its_id_and_leaves_the_pool() {
        let stream = MockTxStream::with_responses([
            tx_id_pair(4),
            cursor_id_pair(0x23),
            kv_pair(b"", b""),
            cursor_id_pair(0x24),
        ]);
        let tx = RemoteTx::new(stream);
        tx.open().await.unwrap();
        let cursor = tx.cursor("table1").await.unwrap();
        cursor.close().await.unwrap();
        assert_eq!(cursor.cursor_id(), 0);

        // A fresh request allocates anew instead of hitting the pool.
        let reopened = tx.cursor("table1").await.unwrap();
        assert_eq!(reopened.cursor_id(), 0x24);
    }
}
