//! Synchronous EVM execution of single transactions against remote state.
//!
//! A call suspends on the I/O context and resumes when its synchronous body
//! finishes on a worker thread. The body validates the transaction the way
//! the reference client does, then hands the message to the interpreter.
//! Validation messages are part of the external contract: RPC clients match
//! on them, so they are reproduced byte for byte, decimal numerals and
//! lowercase addresses included.

use std::sync::Arc;

use alloy_consensus::Header;
use alloy_eips::eip2930::AccessList;
use alloy_primitives::U256;
use remora_kv::DatabaseReader;
use revm::{
    inspector_handle_register,
    inspectors::NoOpInspector,
    primitives::{
        BlobExcessGasAndPrice, BlockEnv, Env, EnvWithHandlerCfg, EVMError, ExecutionResult,
        ResultAndState, SpecId, TxEnv, TxKind,
    },
    Evm, Inspector,
};
use tokio::runtime::Handle;
use tracing::debug;

use crate::{
    chain::ChainConfig,
    result::{CallResult, StatusCode},
    runtime::BlockingTaskPool,
    state::{RemoteState, StateCache, StateError},
    types::Transaction,
};

/// Base cost of any transaction.
const TX_GAS: u128 = 21_000;
/// Additional cost of a contract creation since Homestead.
const TX_CREATE_GAS: u128 = 32_000;
/// Per zero byte of call data.
const TX_DATA_ZERO_GAS: u128 = 4;
/// Per non-zero byte of call data before Istanbul.
const TX_DATA_NON_ZERO_GAS: u128 = 68;
/// Per non-zero byte of call data since Istanbul.
const TX_DATA_NON_ZERO_GAS_EIP2028: u128 = 16;
/// Per access list address since Berlin.
const ACCESS_LIST_ADDRESS_GAS: u128 = 2_400;
/// Per access list storage key since Berlin.
const ACCESS_LIST_STORAGE_KEY_GAS: u128 = 1_900;
/// Per 32-byte word of init code since Shanghai.
const INIT_CODE_WORD_GAS: u128 = 2;

/// Errors that abort a call outright, as opposed to a failing execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// A state read failed.
    #[error(transparent)]
    State(#[from] StateError),
    /// The interpreter rejected the message outside normal halt handling.
    #[error("evm: {0}")]
    Evm(String),
    /// The worker pool went away before delivering a result.
    #[error("worker exited before returning a result")]
    WorkerGone,
}

impl From<EVMError<StateError>> for ExecutionError {
    fn from(err: EVMError<StateError>) -> Self {
        match err {
            EVMError::Database(err) => Self::State(err),
            other => Self::Evm(other.to_string()),
        }
    }
}

/// Executes single transactions against the chain state at a fixed height.
///
/// The executor itself lives on the I/O side; each call occupies one worker
/// of the pool for the duration of the interpreter run. Dropping a call
/// future does not interrupt the worker, the result is discarded.
pub struct EvmExecutor<R> {
    io: Handle,
    reader: R,
    config: &'static ChainConfig,
    workers: BlockingTaskPool,
    block_number: u64,
    cache: Arc<StateCache>,
}

impl<R> EvmExecutor<R>
where
    R: DatabaseReader + Clone + 'static,
{
    /// Builds an executor reading state as of `block_number`.
    pub fn new(
        io: Handle,
        reader: R,
        config: &'static ChainConfig,
        workers: BlockingTaskPool,
        block_number: u64,
    ) -> Self {
        Self { io, reader, config, workers, block_number, cache: Arc::new(StateCache::default()) }
    }

    /// The state height this executor reads at.
    pub const fn block_number(&self) -> u64 {
        self.block_number
    }

    /// Runs `txn` in the context of `header` without committing anything.
    ///
    /// Validation failures are not errors: they come back as
    /// [`CallResult::pre_check_error`] with code 1000 and untouched state.
    /// `refund` applies the gas refund counter to the reported usage;
    /// `gas_bailout` lets an underfunded sender execute anyway.
    pub async fn call(
        &self,
        header: &Header,
        txn: &Transaction,
        refund: bool,
        gas_bailout: bool,
    ) -> Result<CallResult, ExecutionError> {
        let state = self.state_view();
        let config = self.config;
        let header = header.clone();
        let txn = txn.clone();
        let result_rx = self.workers.spawn(move || {
            execute::<R, NoOpInspector>(state, config, &header, &txn, refund, gas_bailout, None)
        });
        match result_rx.await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::WorkerGone),
        }
    }

    /// Like [`call`](Self::call), wiring `inspector` into the interpreter.
    pub async fn call_inspected<I>(
        &self,
        header: &Header,
        txn: &Transaction,
        refund: bool,
        gas_bailout: bool,
        inspector: I,
    ) -> Result<CallResult, ExecutionError>
    where
        I: Inspector<RemoteState<R>> + Send + 'static,
    {
        let state = self.state_view();
        let config = self.config;
        let header = header.clone();
        let txn = txn.clone();
        let result_rx = self.workers.spawn(move || {
            execute(state, config, &header, &txn, refund, gas_bailout, Some(inspector))
        });
        match result_rx.await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::WorkerGone),
        }
    }

    /// Drops per-call state without tearing the executor down; safe between
    /// successive calls.
    pub fn reset(&self) {
        self.cache.clear();
    }

    fn state_view(&self) -> RemoteState<R> {
        RemoteState::new(self.io.clone(), self.reader.clone(), self.cache.clone())
    }
}

/// The synchronous body: pre-checks, then one interpreter run.
fn execute<R, I>(
    mut state: RemoteState<R>,
    config: &'static ChainConfig,
    header: &Header,
    txn: &Transaction,
    refund: bool,
    gas_bailout: bool,
    inspector: Option<I>,
) -> Result<CallResult, ExecutionError>
where
    R: DatabaseReader + Clone + 'static,
    I: Inspector<RemoteState<R>>,
{
    let spec = config.revision(header.number, header.timestamp);
    if let Some(message) = pre_check(&mut state, header, txn, spec, gas_bailout)? {
        debug!(target: "rpc::eth", %message, "call rejected in pre-check");
        return Ok(CallResult::pre_check_failure(message));
    }

    let env = EnvWithHandlerCfg::new_with_spec_id(
        Box::new(build_env(config, header, txn, gas_bailout)),
        spec,
    );
    let ResultAndState { result, .. } = match inspector {
        Some(inspector) => {
            let mut evm = Evm::builder()
                .with_db(state)
                .with_external_context(inspector)
                .with_env_with_handler_cfg(env)
                .append_handler_register(inspector_handle_register)
                .build();
            evm.transact()?
        }
        None => {
            let mut evm = Evm::builder().with_db(state).with_env_with_handler_cfg(env).build();
            evm.transact()?
        }
    };
    Ok(map_execution_result(result, txn.gas_limit, refund))
}

/// Validates `txn` in the reference client's fixed order, returning the
/// failure message of the first violated rule.
fn pre_check<R>(
    state: &mut RemoteState<R>,
    header: &Header,
    txn: &Transaction,
    spec: SpecId,
    gas_bailout: bool,
) -> Result<Option<String>, ExecutionError>
where
    R: DatabaseReader + Clone + 'static,
{
    let intrinsic = intrinsic_gas(&txn.data, &txn.access_list, txn.is_create(), spec);
    if u128::from(txn.gas_limit) < intrinsic {
        return Ok(Some(format!(
            "intrinsic gas too low: have {}, want {intrinsic}",
            txn.gas_limit
        )));
    }

    let base_fee = header.base_fee_per_gas.map(U256::from);
    if let Some(base_fee) = base_fee {
        if txn.fee_cap() < base_fee {
            return Ok(Some(format!(
                "fee cap less than block base fee: address {:#x}, gasFeeCap: {} baseFee: {base_fee}",
                txn.from,
                txn.fee_cap(),
            )));
        }
    }

    if txn.tip_cap() > txn.fee_cap() {
        return Ok(Some(format!(
            "tip higher than fee cap: address {:#x}, tip: {} gasFeeCap: {}",
            txn.from,
            txn.tip_cap(),
            txn.fee_cap(),
        )));
    }

    let required = U256::from(txn.gas_limit)
        .saturating_mul(txn.effective_gas_price(base_fee))
        .saturating_add(txn.value);
    let balance = state.account(txn.from)?.map(|account| account.balance).unwrap_or_default();
    if balance < required && !gas_bailout {
        return Ok(Some(format!(
            "insufficient funds for gas * price + value: address {:#x} have {balance} want {required}",
            txn.from,
        )));
    }

    Ok(None)
}

/// The gas a transaction pays before any execution.
pub fn intrinsic_gas(data: &[u8], access_list: &AccessList, is_create: bool, spec: SpecId) -> u128 {
    let mut gas = TX_GAS;
    if is_create && spec.is_enabled_in(SpecId::HOMESTEAD) {
        gas += TX_CREATE_GAS;
    }

    let zero_bytes = data.iter().filter(|byte| **byte == 0).count() as u128;
    let non_zero_bytes = data.len() as u128 - zero_bytes;
    let non_zero_gas = if spec.is_enabled_in(SpecId::ISTANBUL) {
        TX_DATA_NON_ZERO_GAS_EIP2028
    } else {
        TX_DATA_NON_ZERO_GAS
    };
    gas += zero_bytes * TX_DATA_ZERO_GAS + non_zero_bytes * non_zero_gas;

    if is_create && spec.is_enabled_in(SpecId::SHANGHAI) {
        gas += INIT_CODE_WORD_GAS * (data.len() as u128).div_ceil(32);
    }

    gas += access_list
        .0
        .iter()
        .map(|item| {
            ACCESS_LIST_ADDRESS_GAS
                + ACCESS_LIST_STORAGE_KEY_GAS * item.storage_keys.len() as u128
        })
        .sum::<u128>();
    gas
}

fn build_env(
    config: &'static ChainConfig,
    header: &Header,
    txn: &Transaction,
    gas_bailout: bool,
) -> Env {
    let mut env = Env::default();
    env.cfg.chain_id = config.chain_id;
    // The pre-check owns fee and balance validation and its messages are
    // the external contract; the interpreter's own copies stay out of the
    // way.
    env.cfg.disable_base_fee = true;
    env.cfg.disable_balance_check = gas_bailout;
    env.cfg.disable_block_gas_limit = true;
    env.cfg.disable_eip3607 = true;

    env.block = BlockEnv {
        number: U256::from(header.number),
        coinbase: header.beneficiary,
        timestamp: U256::from(header.timestamp),
        gas_limit: U256::from(header.gas_limit),
        basefee: U256::from(header.base_fee_per_gas.unwrap_or_default()),
        difficulty: header.difficulty,
        prevrandao: Some(header.mix_hash),
        blob_excess_gas_and_price: header.excess_blob_gas.map(BlobExcessGasAndPrice::new),
    };

    env.tx = TxEnv {
        caller: txn.from,
        gas_limit: txn.gas_limit,
        gas_price: txn.fee_cap(),
        gas_priority_fee: txn.max_priority_fee_per_gas,
        transact_to: txn.to.map(TxKind::Call).unwrap_or(TxKind::Create),
        value: txn.value,
        data: txn.data.clone(),
        nonce: txn.nonce,
        chain_id: Some(config.chain_id),
        access_list: txn.access_list.0.clone(),
        ..Default::default()
    };
    env
}

fn map_execution_result(result: ExecutionResult, gas_limit: u64, refund: bool) -> CallResult {
    match result {
        ExecutionResult::Success { gas_used, gas_refunded, output, .. } => {
            // The interpreter reports usage net of the refund counter; undo
            // that when refunds are off.
            let gas_used = if refund { gas_used } else { gas_used + gas_refunded };
            CallResult {
                error_code: StatusCode::Success as i64,
                pre_check_error: None,
                gas_left: gas_limit.saturating_sub(gas_used),
                gas_used,
                data: output.into_data(),
            }
        }
        ExecutionResult::Revert { gas_used, output } => CallResult {
            error_code: StatusCode::Revert as i64,
            pre_check_error: None,
            gas_left: gas_limit.saturating_sub(gas_used),
            gas_used,
            data: output,
        },
        ExecutionResult::Halt { reason, gas_used } => CallResult {
            error_code: StatusCode::from(reason) as i64,
            pre_check_error: None,
            gas_left: gas_limit.saturating_sub(gas_used),
            gas_used,
            data: Default::default(),
        },
    }
}
