//! Staged-sync progress rows.
//!
//! Chain import on the execution node is split into named stages, each
//! persisting how far it got. The rows live in the `SyncStage` bucket as
//! ASCII stage name => 8-byte big-endian block number.

use remora_kv::{tables, DatabaseReader};

use crate::error::ChainError;

/// Stage recording the highest downloaded header.
pub const HEADERS: &str = "Headers";

/// Stage recording the highest executed block.
pub const EXECUTION: &str = "Execution";

/// Stage recording the highest fully synced block.
pub const FINISH: &str = "Finish";

/// Reads the persisted progress of `stage`.
///
/// A missing row means the stage never ran and reads as zero.
pub async fn stage_progress<R>(reader: &R, stage: &str) -> Result<u64, ChainError>
where
    R: DatabaseReader + ?Sized,
{
    let value = reader.get_one(tables::SYNC_STAGE, stage.as_bytes()).await?;
    decode_progress(stage, &value)
}

fn decode_progress(stage: &str, value: &[u8]) -> Result<u64, ChainError> {
    if value.is_empty() {
        return Ok(0);
    }
    if value.len() < 8 {
        return Err(ChainError::InvalidStageProgress { stage: stage.to_owned(), len: value.len() });
    }
    let mut number = [0u8; 8];
    number.copy_from_slice(&value[..8]);
    Ok(u64::from_be_bytes(number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MapReader;

    #[test]
    fn decodes_big_endian_progress() {
        assert_eq!(decode_progress(EXECUTION, &123_456u64.to_be_bytes()).unwrap(), 123_456);
        // Rows may carry trailing stage data; only the number matters here.
        let mut value = 7u64.to_be_bytes().to_vec();
        value.extend_from_slice(b"extra");
        assert_eq!(decode_progress(EXECUTION, &value).unwrap(), 7);
    }

    #[test]
    fn missing_row_reads_as_zero() {
        assert_eq!(decode_progress(FINISH, &[]).unwrap(), 0);
    }

    #[test]
    fn short_rows_are_rejected() {
        let err = decode_progress(HEADERS, &[0, 1, 2]).unwrap_err();
        assert!(matches!(err, ChainError::InvalidStageProgress { len: 3, .. }));
    }

    #[tokio::test]
    async fn reads_the_sync_stage_bucket() {
        let mut reader = MapReader::default();
        reader.insert(remora_kv::tables::SYNC_STAGE, EXECUTION.as_bytes(), 42u64.to_be_bytes());
        assert_eq!(stage_progress(&reader, EXECUTION).await.unwrap(), 42);
        assert_eq!(stage_progress(&reader, FINISH).await.unwrap(), 0);
    }
}
