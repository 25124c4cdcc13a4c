//! Remote chain state as seen by the EVM.
//!
//! EVM execution is synchronous and runs on a worker thread, while every
//! state read crosses the wire through the async reader. Each read posts a
//! future onto the owning I/O context and parks the worker on a oneshot
//! until the response lands; the worker thread blocks, the I/O context
//! stays cooperative.

use std::{collections::HashMap, future::Future, sync::Arc};

use alloy_primitives::{Address, Bytes, B256, U256};
use parking_lot::Mutex;
use remora_kv::{tables, DatabaseReader, KvError};
use revm::primitives::{AccountInfo, Bytecode, KECCAK_EMPTY};
use tokio::{runtime::Handle, sync::oneshot};
use tracing::trace;

/// Errors raised by remote state reads.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Remote database failure.
    #[error(transparent)]
    Kv(#[from] KvError),
    /// The owning I/O context went away mid-read.
    #[error("io context dropped while serving a state read")]
    ContextGone,
    /// A stored account failed to decode.
    #[error("invalid field-set account encoding")]
    InvalidAccount,
    /// A stored hash had the wrong length.
    #[error("invalid hash value of {0} bytes")]
    InvalidHashLength(usize),
}

/// An account as stored in the remote `PlainState` bucket.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Account {
    /// Number of transactions sent.
    pub nonce: u64,
    /// Balance in wei.
    pub balance: U256,
    /// Contract incarnation, keying the storage rows.
    pub incarnation: u64,
    /// Code hash, absent for accounts without code.
    pub code_hash: Option<B256>,
}

impl Account {
    /// Decodes the node's field-set storage encoding: a presence mask byte
    /// followed by length-prefixed big-endian fields in mask order.
    pub fn decode(buf: &[u8]) -> Result<Self, StateError> {
        let mut account = Self::default();
        if buf.is_empty() {
            return Ok(account);
        }
        let mask = buf[0];
        let mut pos = 1;
        if mask & 0b0001 != 0 {
            account.nonce = decode_u64(buf, &mut pos)?;
        }
        if mask & 0b0010 != 0 {
            account.balance = decode_u256(buf, &mut pos)?;
        }
        if mask & 0b0100 != 0 {
            account.incarnation = decode_u64(buf, &mut pos)?;
        }
        if mask & 0b1000 != 0 {
            let field = decode_field(buf, &mut pos)?;
            if field.len() != 32 {
                return Err(StateError::InvalidAccount);
            }
            account.code_hash = Some(B256::from_slice(field));
        }
        Ok(account)
    }

    /// View of this account as the EVM expects it.
    pub fn info(&self) -> AccountInfo {
        AccountInfo {
            balance: self.balance,
            nonce: self.nonce,
            code_hash: self.code_hash.unwrap_or(KECCAK_EMPTY),
            code: None,
        }
    }
}

fn decode_field<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a [u8], StateError> {
    let len = *buf.get(*pos).ok_or(StateError::InvalidAccount)? as usize;
    let start = *pos + 1;
    let field = buf.get(start..start + len).ok_or(StateError::InvalidAccount)?;
    *pos = start + len;
    Ok(field)
}

fn decode_u64(buf: &[u8], pos: &mut usize) -> Result<u64, StateError> {
    let field = decode_field(buf, pos)?;
    if field.len() > 8 {
        return Err(StateError::InvalidAccount);
    }
    let mut out = [0u8; 8];
    out[8 - field.len()..].copy_from_slice(field);
    Ok(u64::from_be_bytes(out))
}

fn decode_u256(buf: &[u8], pos: &mut usize) -> Result<U256, StateError> {
    let field = decode_field(buf, pos)?;
    if field.len() > 32 {
        return Err(StateError::InvalidAccount);
    }
    Ok(U256::from_be_slice(field))
}

/// Per-executor read-through cache for accounts and code.
///
/// Cleared by [`EvmExecutor::reset`](crate::executor::EvmExecutor::reset)
/// between successive calls.
#[derive(Debug, Default)]
pub struct StateCache {
    accounts: Mutex<HashMap<Address, Option<Account>>>,
    code: Mutex<HashMap<B256, Bytecode>>,
}

impl StateCache {
    /// Drops every cached entry.
    pub fn clear(&self) {
        self.accounts.lock().clear();
        self.code.lock().clear();
    }
}

/// [`revm::Database`] view over the remote reader.
///
/// Constructed per call by the executor; the cache is shared across the
/// executor's calls until reset.
pub struct RemoteState<R> {
    io: Handle,
    reader: R,
    cache: Arc<StateCache>,
}

impl<R> RemoteState<R> {
    /// Creates a state view reading through `reader` on the `io` context.
    pub fn new(io: Handle, reader: R, cache: Arc<StateCache>) -> Self {
        Self { io, reader, cache }
    }
}

impl<R> RemoteState<R>
where
    R: DatabaseReader + Clone + 'static,
{
    /// Runs a read on the I/O context, blocking the calling worker thread
    /// until the response lands.
    fn block_on_io<T: Send + 'static>(
        &self,
        fut: impl Future<Output = T> + Send + 'static,
    ) -> Result<T, StateError> {
        let (result_tx, result_rx) = oneshot::channel();
        self.io.spawn(async move {
            let _ = result_tx.send(fut.await);
        });
        result_rx.blocking_recv().map_err(|_| StateError::ContextGone)
    }

    /// The decoded account at `address`, read through the cache.
    pub fn account(&self, address: Address) -> Result<Option<Account>, StateError> {
        if let Some(account) = self.cache.accounts.lock().get(&address) {
            return Ok(account.clone());
        }
        let reader = self.reader.clone();
        let encoded = self.block_on_io(async move {
            reader.get_one(tables::PLAIN_STATE, address.as_slice()).await
        })??;
        let account = if encoded.is_empty() { None } else { Some(Account::decode(&encoded)?) };
        trace!(target: "rpc::eth", %address, found = account.is_some(), "account read");
        self.cache.accounts.lock().insert(address, account.clone());
        Ok(account)
    }

    fn read_code(&self, code_hash: B256) -> Result<Bytecode, StateError> {
        if let Some(code) = self.cache.code.lock().get(&code_hash) {
            return Ok(code.clone());
        }
        let reader = self.reader.clone();
        let raw = self.block_on_io(async move {
            reader.get_one(tables::CODE, code_hash.as_slice()).await
        })??;
        let code = Bytecode::new_raw(Bytes(raw));
        self.cache.code.lock().insert(code_hash, code.clone());
        Ok(code)
    }
}

impl<R> revm::Database for RemoteState<R>
where
    R: DatabaseReader + Clone + 'static,
{
    type Error = StateError;

    fn basic(&mut self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        Ok(self.account(address)?.map(|account| account.info()))
    }

    fn code_by_hash(&mut self, code_hash: B256) -> Result<Bytecode, Self::Error> {
        if code_hash == KECCAK_EMPTY {
            return Ok(Bytecode::default());
        }
        self.read_code(code_hash)
    }

    fn storage(&mut self, address: Address, index: U256) -> Result<U256, Self::Error> {
        let Some(account) = self.account(address)? else {
            return Ok(U256::ZERO);
        };
        let mut key = [0u8; 28];
        key[..20].copy_from_slice(address.as_slice());
        key[20..].copy_from_slice(&account.incarnation.to_be_bytes());
        let location = B256::from(index);
        let reader = self.reader.clone();
        let value = self.block_on_io(async move {
            reader.get_both_range(tables::PLAIN_STATE, &key, location.as_slice()).await
        })??;
        // The range seek may land on a later slot of the same contract.
        let Some(value) = value else {
            return Ok(U256::ZERO);
        };
        if value.len() < 32 || value[..32] != location[..] {
            return Ok(U256::ZERO);
        }
        Ok(U256::from_be_slice(&value[32..]))
    }

    fn block_hash(&mut self, number: u64) -> Result<B256, Self::Error> {
        let reader = self.reader.clone();
        let value = self.block_on_io(async move {
            reader.get_one(tables::CANONICAL_HEADER, &number.to_be_bytes()).await
        })??;
        if value.is_empty() {
            return Ok(B256::ZERO);
        }
        if value.len() != 32 {
            return Err(StateError::InvalidHashLength(value.len()));
        }
        Ok(B256::from_slice(&value))
    }
}
