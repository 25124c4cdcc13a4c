//! Cache-first access to canonical headers and blocks.

use std::sync::Arc;

use alloy_consensus::Header;
use alloy_primitives::B256;
use alloy_rlp::Decodable;
use remora_kv::{tables, DatabaseReader};
use tracing::trace;

use crate::{cache::BlockCache, error::ChainError, types::BlockWithHash};

/// The canonical header hash at `number`, if indexed.
pub async fn canonical_hash<R>(reader: &R, number: u64) -> Result<Option<B256>, ChainError>
where
    R: DatabaseReader + ?Sized,
{
    let value = reader.get_one(tables::CANONICAL_HEADER, &number.to_be_bytes()).await?;
    if value.is_empty() {
        return Ok(None);
    }
    if value.len() != 32 {
        return Err(ChainError::InvalidHashLength(value.len()));
    }
    Ok(Some(B256::from_slice(&value)))
}

/// The height a header hash is indexed under, if any.
pub async fn header_number<R>(reader: &R, hash: B256) -> Result<Option<u64>, ChainError>
where
    R: DatabaseReader + ?Sized,
{
    let value = reader.get_one(tables::HEADER_NUMBER, hash.as_slice()).await?;
    if value.is_empty() {
        return Ok(None);
    }
    if value.len() < 8 {
        return Err(ChainError::InvalidNumberLength(value.len()));
    }
    let mut number = [0u8; 8];
    number.copy_from_slice(&value[..8]);
    Ok(Some(u64::from_be_bytes(number)))
}

/// Reads and decodes the header stored under `number` and `hash`.
pub async fn read_header<R>(
    reader: &R,
    number: u64,
    hash: B256,
) -> Result<Option<Header>, ChainError>
where
    R: DatabaseReader + ?Sized,
{
    let mut key = [0u8; 40];
    key[..8].copy_from_slice(&number.to_be_bytes());
    key[8..].copy_from_slice(hash.as_slice());
    let value = reader.get_one(tables::HEADER, &key).await?;
    if value.is_empty() {
        return Ok(None);
    }
    Ok(Some(Header::decode(&mut value.as_ref())?))
}

/// The canonical header at `number`.
pub async fn header_by_number<R>(reader: &R, number: u64) -> Result<Option<Header>, ChainError>
where
    R: DatabaseReader + ?Sized,
{
    match canonical_hash(reader, number).await? {
        Some(hash) => read_header(reader, number, hash).await,
        None => Ok(None),
    }
}

/// Cache-first read of the canonical block at `number`.
pub async fn block_by_number<R>(
    cache: &BlockCache,
    reader: &R,
    number: u64,
) -> Result<Option<Arc<BlockWithHash>>, ChainError>
where
    R: DatabaseReader + ?Sized,
{
    let Some(hash) = canonical_hash(reader, number).await? else {
        return Ok(None);
    };
    block_by_parts(cache, reader, number, hash).await
}

/// Cache-first read of the block stored under `hash`.
pub async fn block_by_hash<R>(
    cache: &BlockCache,
    reader: &R,
    hash: B256,
) -> Result<Option<Arc<BlockWithHash>>, ChainError>
where
    R: DatabaseReader + ?Sized,
{
    // Hit the cache before paying for the reverse index lookup.
    if let Some(block) = cache.get(&hash) {
        return Ok(Some(block));
    }
    let Some(number) = header_number(reader, hash).await? else {
        return Ok(None);
    };
    block_by_parts(cache, reader, number, hash).await
}

async fn block_by_parts<R>(
    cache: &BlockCache,
    reader: &R,
    number: u64,
    hash: B256,
) -> Result<Option<Arc<BlockWithHash>>, ChainError>
where
    R: DatabaseReader + ?Sized,
{
    if let Some(block) = cache.get(&hash) {
        trace!(target: "rpc::eth", %hash, "block cache hit");
        return Ok(Some(block));
    }
    let Some(header) = read_header(reader, number, hash).await? else {
        return Ok(None);
    };
    let block = Arc::new(BlockWithHash { hash, header });
    cache.insert(hash, block.clone());
    Ok(Some(block))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MapReader;
    use alloy_rlp::Encodable;

    fn seeded_reader(number: u64) -> (MapReader, B256, Header) {
        let header = Header { number, gas_limit: 30_000_000, ..Default::default() };
        let hash = header.hash_slow();
        let mut encoded = Vec::new();
        header.encode(&mut encoded);

        let mut header_key = number.to_be_bytes().to_vec();
        header_key.extend_from_slice(hash.as_slice());

        let mut reader = MapReader::default();
        reader.insert(tables::CANONICAL_HEADER, number.to_be_bytes(), hash.as_slice());
        reader.insert(tables::HEADER_NUMBER, hash.as_slice(), number.to_be_bytes());
        reader.insert(tables::HEADER, header_key, encoded);
        (reader, hash, header)
    }

    #[tokio::test]
    async fn canonical_hash_round_trip() {
        let (reader, hash, _) = seeded_reader(7);
        assert_eq!(canonical_hash(&reader, 7).await.unwrap(), Some(hash));
        assert_eq!(canonical_hash(&reader, 8).await.unwrap(), None);
    }

    #[tokio::test]
    async fn header_by_number_decodes_the_stored_rlp() {
        let (reader, _, header) = seeded_reader(7);
        let read = header_by_number(&reader, 7).await.unwrap().unwrap();
        assert_eq!(read, header);
        assert!(header_by_number(&reader, 8).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn block_by_number_populates_the_cache() {
        let (reader, hash, _) = seeded_reader(7);
        let cache = BlockCache::new(8);
        let first = block_by_number(&cache, &reader, 7).await.unwrap().unwrap();
        assert_eq!(first.hash, hash);
        assert_eq!(cache.len(), 1);

        // The second read is served from the cache.
        let second = block_by_number(&cache, &reader, 7).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn block_by_hash_uses_the_reverse_index() {
        let (reader, hash, header) = seeded_reader(9);
        let cache = BlockCache::new(8);
        let block = block_by_hash(&cache, &reader, hash).await.unwrap().unwrap();
        assert_eq!(block.header, header);
        assert!(block_by_hash(&cache, &reader, B256::ZERO).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_hash_values_are_rejected() {
        let mut reader = MapReader::default();
        reader.insert(tables::CANONICAL_HEADER, 1u64.to_be_bytes(), b"short".as_slice());
        let err = canonical_hash(&reader, 1).await.unwrap_err();
        assert!(matches!(err, ChainError::InvalidHashLength(5)));
    }
}
