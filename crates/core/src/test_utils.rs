//! In-memory reader doubles shared across the crate's tests.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use remora_kv::{DatabaseReader, KvError, Walker};

/// A reader with no data at all.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct EmptyReader;

#[async_trait]
impl DatabaseReader for EmptyReader {
    async fn get(&self, _table: &str, _key: &[u8]) -> Result<Option<(Bytes, Bytes)>, KvError> {
        Ok(None)
    }

    async fn get_one(&self, _table: &str, _key: &[u8]) -> Result<Bytes, KvError> {
        Ok(Bytes::new())
    }

    async fn get_both_range(
        &self,
        _table: &str,
        _key: &[u8],
        _subkey: &[u8],
    ) -> Result<Option<Bytes>, KvError> {
        Ok(None)
    }

    async fn walk(
        &self,
        _table: &str,
        _start_key: &[u8],
        _fixed_bits: u32,
        _visitor: Walker<'_>,
    ) -> Result<(), KvError> {
        Ok(())
    }

    async fn for_prefix(
        &self,
        _table: &str,
        _prefix: &[u8],
        _visitor: Walker<'_>,
    ) -> Result<(), KvError> {
        Ok(())
    }
}

/// A reader over fixed, sorted in-memory entries.
#[derive(Clone, Debug, Default)]
pub(crate) struct MapReader {
    entries: HashMap<String, Vec<(Vec<u8>, Vec<u8>)>>,
}

impl MapReader {
    pub(crate) fn insert(
        &mut self,
        table: &str,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) {
        let entries = self.entries.entry(table.to_owned()).or_default();
        entries.push((key.into(), value.into()));
        entries.sort();
    }

    fn table(&self, table: &str) -> &[(Vec<u8>, Vec<u8>)] {
        self.entries.get(table).map(Vec::as_slice).unwrap_or_default()
    }
}

#[async_trait]
impl DatabaseReader for MapReader {
    async fn get(&self, table: &str, key: &[u8]) -> Result<Option<(Bytes, Bytes)>, KvError> {
        Ok(self
            .table(table)
            .iter()
            .find(|(k, _)| k.as_slice() >= key)
            .map(|(k, v)| (Bytes::copy_from_slice(k), Bytes::copy_from_slice(v))))
    }

    async fn get_one(&self, table: &str, key: &[u8]) -> Result<Bytes, KvError> {
        Ok(self
            .table(table)
            .iter()
            .find(|(k, _)| k.as_slice() == key)
            .map(|(_, v)| Bytes::copy_from_slice(v))
            .unwrap_or_default())
    }

    async fn get_both_range(
        &self,
        table: &str,
        key: &[u8],
        subkey: &[u8],
    ) -> Result<Option<Bytes>, KvError> {
        Ok(self
            .table(table)
            .iter()
            .filter(|(k, _)| k.as_slice() == key)
            .find(|(_, v)| v.as_slice() >= subkey)
            .map(|(_, v)| Bytes::copy_from_slice(v)))
    }

    async fn walk(
        &self,
        table: &str,
        start_key: &[u8],
        fixed_bits: u32,
        visitor: Walker<'_>,
    ) -> Result<(), KvError> {
        let full = (fixed_bits / 8) as usize;
        for (k, v) in self.table(table).iter().filter(|(k, _)| k.as_slice() >= start_key) {
            // Byte-granular prefix check is all the tests need here.
            if fixed_bits > 0 && (k.len() < full || k[..full] != start_key[..full]) {
                break;
            }
            if !visitor(Bytes::copy_from_slice(k), Bytes::copy_from_slice(v)) {
                break;
            }
        }
        Ok(())
    }

    async fn for_prefix(
        &self,
        table: &str,
        prefix: &[u8],
        visitor: Walker<'_>,
    ) -> Result<(), KvError> {
        for (k, v) in self.table(table).iter().filter(|(k, _)| k.starts_with(prefix)) {
            if !visitor(Bytes::copy_from_slice(k), Bytes::copy_from_slice(v)) {
                break;
            }
        }
        Ok(())
    }
}
