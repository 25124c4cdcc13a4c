//! Execution outcomes and their client-visible rendering.

use alloy_primitives::{Bytes, U256};
use revm::primitives::HaltReason;

/// `error_code` value reported when validation rejected the transaction
/// before execution.
pub const PRE_CHECK_ERROR_CODE: i64 = 1000;

/// Selector of the ABI-encoded `Error(string)` revert payload.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Status of a finished EVM execution, using the classic interpreter code
/// values carried in [`CallResult::error_code`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusCode {
    /// Execution finished normally.
    Success = 0,
    /// Generic failure.
    Failure = 1,
    /// Explicit revert; the payload travels back to the caller.
    Revert = 2,
    /// Gas exhausted.
    OutOfGas = 3,
    /// An instruction was invalid in the current context.
    InvalidInstruction = 4,
    /// An undefined opcode was hit.
    UndefinedInstruction = 5,
    /// Stack grew beyond its limit.
    StackOverflow = 6,
    /// Stack popped below empty.
    StackUnderflow = 7,
    /// Jump to a non-JUMPDEST target.
    BadJumpDestination = 8,
    /// Memory access out of bounds.
    InvalidMemoryAccess = 9,
    /// Call stack exceeded its depth limit.
    CallDepthExceeded = 10,
    /// State mutation attempted in a static context.
    StaticModeViolation = 11,
    /// A precompile rejected its input.
    PrecompileFailure = 12,
}

impl StatusCode {
    /// Maps a raw wire code to a known status.
    pub const fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::Success,
            1 => Self::Failure,
            2 => Self::Revert,
            3 => Self::OutOfGas,
            4 => Self::InvalidInstruction,
            5 => Self::UndefinedInstruction,
            6 => Self::StackOverflow,
            7 => Self::StackUnderflow,
            8 => Self::BadJumpDestination,
            9 => Self::InvalidMemoryAccess,
            10 => Self::CallDepthExceeded,
            11 => Self::StaticModeViolation,
            12 => Self::PrecompileFailure,
            _ => return None,
        })
    }

    /// The stable short message for this status. RPC clients match on these
    /// strings; do not reword them.
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Success => "execution successful",
            Self::Failure => "execution failed",
            Self::Revert => "execution reverted",
            Self::OutOfGas => "out of gas",
            Self::InvalidInstruction => "invalid instruction",
            Self::UndefinedInstruction => "invalid opcode",
            Self::StackOverflow => "stack overflow",
            Self::StackUnderflow => "stack underflow",
            Self::BadJumpDestination => "invalid jump destination",
            Self::InvalidMemoryAccess => "invalid memory access",
            Self::CallDepthExceeded => "call depth exceeded",
            Self::StaticModeViolation => "static mode violation",
            Self::PrecompileFailure => "precompile failure",
        }
    }
}

impl From<HaltReason> for StatusCode {
    fn from(reason: HaltReason) -> Self {
        match reason {
            HaltReason::OutOfGas(_) => Self::OutOfGas,
            HaltReason::InvalidFEOpcode => Self::InvalidInstruction,
            HaltReason::OpcodeNotFound | HaltReason::NotActivated => Self::UndefinedInstruction,
            HaltReason::StackOverflow => Self::StackOverflow,
            HaltReason::StackUnderflow => Self::StackUnderflow,
            HaltReason::InvalidJump => Self::BadJumpDestination,
            HaltReason::OutOfOffset => Self::InvalidMemoryAccess,
            HaltReason::CallTooDeep => Self::CallDepthExceeded,
            HaltReason::StateChangeDuringStaticCall | HaltReason::CallNotAllowedInsideStatic => {
                Self::StaticModeViolation
            }
            HaltReason::PrecompileError => Self::PrecompileFailure,
            _ => Self::Failure,
        }
    }
}

/// Outcome of one EVM call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallResult {
    /// 0 on success, [`PRE_CHECK_ERROR_CODE`] when validation rejected the
    /// transaction, otherwise the abort status code.
    pub error_code: i64,
    /// Message of the failed validation rule, if any.
    pub pre_check_error: Option<String>,
    /// Gas remaining after execution.
    pub gas_left: u64,
    /// Gas charged, after refund handling.
    pub gas_used: u64,
    /// Return or revert payload, verbatim.
    pub data: Bytes,
}

impl CallResult {
    /// A validation rejection: code 1000, nothing executed, state untouched.
    pub fn pre_check_failure(message: String) -> Self {
        Self {
            error_code: PRE_CHECK_ERROR_CODE,
            pre_check_error: Some(message),
            ..Default::default()
        }
    }

    /// Whether execution completed successfully.
    pub fn is_success(&self) -> bool {
        self.error_code == StatusCode::Success as i64
    }
}

/// Renders an execution status as a stable human-readable message.
///
/// With `full` set and the status being [`StatusCode::Failure`], a
/// well-formed ABI `Error(string)` payload in `data` is appended to the
/// short form. Anything malformed or truncated silently degrades to the
/// short form; unknown codes come back as `"unknown error code"`.
pub fn error_message(status_code: i64, data: &[u8], full: bool) -> String {
    let Some(status) = StatusCode::from_code(status_code) else {
        return "unknown error code".to_owned();
    };
    if full && status == StatusCode::Failure {
        if let Some(reason) = error_string(data) {
            return format!("execution failed: {reason}");
        }
    }
    status.message().to_owned()
}

/// Decodes an ABI-encoded `Error(string)` payload:
/// selector, 32-byte offset (must be 0x20), 32-byte length, UTF-8 bytes.
fn error_string(data: &[u8]) -> Option<String> {
    if data.len() < 68 || data[..4] != ERROR_STRING_SELECTOR {
        return None;
    }
    if U256::from_be_slice(&data[4..36]) != U256::from(0x20) {
        return None;
    }
    let length = usize::try_from(U256::from_be_slice(&data[36..68])).ok()?;
    let payload = data.get(68..68 + length)?;
    Some(String::from_utf8_lossy(payload).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_data(payload: &[u8], declared_len: usize) -> Vec<u8> {
        let mut data = ERROR_STRING_SELECTOR.to_vec();
        data.extend_from_slice(&U256::from(0x20).to_be_bytes::<32>());
        data.extend_from_slice(&U256::from(declared_len).to_be_bytes::<32>());
        data.extend_from_slice(payload);
        data
    }

    #[test]
    fn failure_with_a_full_error_string() {
        let data = error_data(b"Ownable: caller is not the owner", 32);
        assert_eq!(
            error_message(StatusCode::Failure as i64, &data, true),
            "execution failed: Ownable: caller is not the owner"
        );
    }

    #[test]
    fn failure_without_full_stays_short() {
        let data = error_data(b"Ownable: caller is not the owner", 32);
        assert_eq!(error_message(StatusCode::Failure as i64, &data, false), "execution failed");
    }

    #[test]
    fn truncated_payloads_degrade_to_the_short_form() {
        // Cut inside the selector.
        assert_eq!(error_message(1, &[0x08, 0xc3], true), "execution failed");
        // Cut inside the offset word.
        let data = error_data(b"", 0);
        assert_eq!(error_message(1, &data[..34], true), "execution failed");
        // Cut inside the length word.
        assert_eq!(error_message(1, &data[..52], true), "execution failed");
        // Payload shorter than the declared length.
        let data = error_data(b"Ownable: caller is ", 32);
        assert_eq!(error_message(1, &data, true), "execution failed");
    }

    #[test]
    fn wrong_selector_or_offset_degrades_to_the_short_form() {
        let mut data = error_data(b"Ownable: caller is not the owner", 32);
        data[0] = 0x09;
        assert_eq!(error_message(1, &data, true), "execution failed");

        let mut data = error_data(b"Ownable: caller is not the owner", 32);
        data[35] = 0x40;
        assert_eq!(error_message(1, &data, true), "execution failed");
    }

    #[test]
    fn revert_ignores_the_payload() {
        let data = error_data(b"Ownable: caller is not the owner", 32);
        assert_eq!(error_message(StatusCode::Revert as i64, &data, true), "execution reverted");
        assert_eq!(error_message(StatusCode::Revert as i64, &data, false), "execution reverted");
    }

    #[test]
    fn short_messages_for_every_abort_code() {
        let data = error_data(b"ignored", 7);
        let expected = [
            (3, "out of gas"),
            (4, "invalid instruction"),
            (5, "invalid opcode"),
            (6, "stack overflow"),
            (7, "stack underflow"),
            (8, "invalid jump destination"),
            (9, "invalid memory access"),
            (10, "call depth exceeded"),
            (11, "static mode violation"),
            (12, "precompile failure"),
        ];
        for (code, message) in expected {
            // Non-failure codes never consult the payload.
            assert_eq!(error_message(code, &data, true), message);
            assert_eq!(error_message(code, &data, false), message);
            assert_eq!(error_message(code, &[], true), message);
        }
    }

    #[test]
    fn unknown_codes() {
        assert_eq!(error_message(8888, &[], false), "unknown error code");
        assert_eq!(error_message(-1, &[], true), "unknown error code");
        assert_eq!(error_message(1000, &[], true), "unknown error code");
    }

    #[test]
    fn pre_check_failures_are_not_successes() {
        let result = CallResult::pre_check_failure("intrinsic gas too low: have 0, want 53000".into());
        assert_eq!(result.error_code, PRE_CHECK_ERROR_CODE);
        assert!(!result.is_success());
        assert!(result.data.is_empty());
    }
}
