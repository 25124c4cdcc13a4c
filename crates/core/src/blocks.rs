//! Named block ids resolved against staged-sync progress.

use alloy_eips::BlockNumberOrTag;
use remora_kv::DatabaseReader;
use tracing::debug;

use crate::{error::ChainError, stages};

/// Height of the `"earliest"` block id.
pub const EARLIEST_BLOCK_NUMBER: u64 = 0;

/// Parses a block id string: a named tag, or a hex or decimal height.
pub fn parse_block_id(id: &str) -> Result<BlockNumberOrTag, ChainError> {
    if let Ok(tag) = id.parse::<BlockNumberOrTag>() {
        return Ok(tag);
    }
    id.parse::<u64>()
        .map(BlockNumberOrTag::Number)
        .map_err(|_| ChainError::InvalidBlockId(id.to_owned()))
}

/// Resolves a named or numeric block id to a height.
///
/// `latest` and `pending` both serve the highest executed block; `safe` and
/// `finalized` map to the fully synced head, the nearest notion this store
/// exposes.
pub async fn block_number<R>(id: BlockNumberOrTag, reader: &R) -> Result<u64, ChainError>
where
    R: DatabaseReader + ?Sized,
{
    let number = match id {
        BlockNumberOrTag::Earliest => EARLIEST_BLOCK_NUMBER,
        BlockNumberOrTag::Latest | BlockNumberOrTag::Pending => {
            latest_block_number(reader).await?
        }
        BlockNumberOrTag::Safe | BlockNumberOrTag::Finalized => {
            current_block_number(reader).await?
        }
        BlockNumberOrTag::Number(number) => number,
    };
    debug!(target: "rpc::eth", %id, number, "resolved block id");
    Ok(number)
}

/// The highest executed block, which is what `latest` serves.
pub async fn latest_block_number<R>(reader: &R) -> Result<u64, ChainError>
where
    R: DatabaseReader + ?Sized,
{
    stages::stage_progress(reader, stages::EXECUTION).await
}

/// The current fully synced head.
pub async fn current_block_number<R>(reader: &R) -> Result<u64, ChainError>
where
    R: DatabaseReader + ?Sized,
{
    stages::stage_progress(reader, stages::FINISH).await
}

/// The highest known header.
pub async fn highest_block_number<R>(reader: &R) -> Result<u64, ChainError>
where
    R: DatabaseReader + ?Sized,
{
    stages::stage_progress(reader, stages::HEADERS).await
}
