//! Names and schemas of the remote buckets this daemon reads.
//!
//! The execution node owns the database; these constants only document the
//! slices consumed here. All keys and values are raw bytes on the wire.

/// Staged-sync progress. ASCII stage name => 8-byte big-endian block number.
pub const SYNC_STAGE: &str = "SyncStage";

/// Canonical chain index. 8-byte big-endian block number => header hash.
pub const CANONICAL_HEADER: &str = "CanonicalHeader";

/// Block headers. 8-byte big-endian block number ++ header hash => RLP header.
pub const HEADER: &str = "Header";

/// Reverse header index. Header hash => 8-byte big-endian block number.
pub const HEADER_NUMBER: &str = "HeaderNumber";

/// Current state. Address => field-set encoded account. Contract storage is
/// dup-sorted under address ++ incarnation, each value being the 32-byte
/// slot location followed by the zero-trimmed big-endian word.
pub const PLAIN_STATE: &str = "PlainState";

/// Contract bytecode. Code hash => bytecode.
pub const CODE: &str = "Code";
