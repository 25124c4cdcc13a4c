//! Stateless read façade over a remote transaction.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{client::TxStream, error::KvError, remote::RemoteTx};

/// Key/value visitor driven by [`DatabaseReader::walk`] and
/// [`DatabaseReader::for_prefix`]. Returning `false` stops the iteration.
pub type Walker<'a> = &'a mut (dyn FnMut(Bytes, Bytes) -> bool + Send);

/// Read-only, stateless access to the remote database.
///
/// Every operation drives a cursor internally; no cursor position leaks
/// across calls, and no cursor is held across suspension points beyond the
/// operation's own round-trips.
#[async_trait]
pub trait DatabaseReader: Send + Sync {
    /// Returns the first entry with key >= `key`, if any.
    async fn get(&self, table: &str, key: &[u8]) -> Result<Option<(Bytes, Bytes)>, KvError>;

    /// Returns the value stored at exactly `key`, empty if absent.
    async fn get_one(&self, table: &str, key: &[u8]) -> Result<Bytes, KvError>;

    /// For a dup-sorted table, returns the first value under `key` that is
    /// >= `subkey`.
    async fn get_both_range(
        &self,
        table: &str,
        key: &[u8],
        subkey: &[u8],
    ) -> Result<Option<Bytes>, KvError>;

    /// Visits entries forward from `start_key` while the first `fixed_bits`
    /// bits of each key match `start_key`'s.
    async fn walk(
        &self,
        table: &str,
        start_key: &[u8],
        fixed_bits: u32,
        visitor: Walker<'_>,
    ) -> Result<(), KvError>;

    /// Visits entries whose key begins with `prefix`.
    async fn for_prefix(
        &self,
        table: &str,
        prefix: &[u8],
        visitor: Walker<'_>,
    ) -> Result<(), KvError>;
}

/// [`DatabaseReader`] backed by a [`RemoteTx`].
pub struct TxDatabaseReader<S> {
    tx: Arc<RemoteTx<S>>,
}

impl<S> TxDatabaseReader<S> {
    /// Wraps an open transaction.
    pub fn new(tx: Arc<RemoteTx<S>>) -> Self {
        Self { tx }
    }

    /// The backing transaction.
    pub fn tx(&self) -> &Arc<RemoteTx<S>> {
        &self.tx
    }
}

impl<S> Clone for TxDatabaseReader<S> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

#[async_trait]
impl<S: TxStream + 'static> DatabaseReader for TxDatabaseReader<S> {
    async fn get(&self, table: &str, key: &[u8]) -> Result<Option<(Bytes, Bytes)>, KvError> {
        let cursor = self.tx.cursor(table).await?;
        cursor.seek(key).await
    }

    async fn get_one(&self, table: &str, key: &[u8]) -> Result<Bytes, KvError> {
        let cursor = self.tx.cursor(table).await?;
        Ok(cursor.seek_exact(key).await?.map(|(_, value)| value).unwrap_or_default())
    }

    async fn get_both_range(
        &self,
        table: &str,
        key: &[u8],
        subkey: &[u8],
    ) -> Result<Option<Bytes>, KvError> {
        let cursor = self.tx.cursor_dup_sort(table).await?;
        Ok(cursor.seek_both(key, subkey).await?.map(|(_, value)| value))
    }

    async fn walk(
        &self,
        table: &str,
        start_key: &[u8],
        fixed_bits: u32,
        visitor: Walker<'_>,
    ) -> Result<(), KvError> {
        let cursor = self.tx.cursor(table).await?;
        let mut entry = cursor.seek(start_key).await?;
        while let Some((key, value)) = entry {
            if !shares_fixed_bits(start_key, &key, fixed_bits) {
                break;
            }
            if !visitor(key, value) {
                break;
            }
            entry = cursor.next().await?;
        }
        Ok(())
    }

    async fn for_prefix(
        &self,
        table: &str,
        prefix: &[u8],
        visitor: Walker<'_>,
    ) -> Result<(), KvError> {
        let cursor = self.tx.cursor(table).await?;
        let mut entry = cursor.seek(prefix).await?;
        while let Some((key, value)) = entry {
            if !key.starts_with(prefix) {
                break;
            }
            if !visitor(key, value) {
                break;
            }
            entry = cursor.next().await?;
        }
        Ok(())
    }
}

/// Whether `a` and `b` agree on their first `fixed_bits` bits.
fn shares_fixed_bits(a: &[u8], b: &[u8], fixed_bits: u32) -> bool {
    if fixed_bits == 0 {
        return true;
    }
    let full = (fixed_bits / 8) as usize;
    let rem = fixed_bits % 8;
    if a.len() < full || b.len() < full || a[..full] != b[..full] {
        return false;
    }
    if rem == 0 {
        return true;
    }
    let mask = !(0xffu8 >> rem);
    match (a.get(full), b.get(full)) {
        (Some(x), Some(y)) => (x ^ y) & mask == 0,
        _ => false,
    }
}
