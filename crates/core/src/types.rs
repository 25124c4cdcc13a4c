//! Chain types consumed by the executor and the cached chain accessors.

use alloy_consensus::Header;
use alloy_eips::eip2930::AccessList;
use alloy_primitives::{Address, Bytes, B256, U256};

/// A decoded header together with the hash it is stored under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockWithHash {
    /// Hash the block is indexed by.
    pub hash: B256,
    /// The decoded header.
    pub header: Header,
}

/// The slice of a transaction the call executor consumes.
///
/// For `eth_call`-style requests most fields arrive optional; the accessors
/// fold legacy and EIP-1559 pricing into one view.
#[derive(Clone, Debug, Default)]
pub struct Transaction {
    /// Sender, recovered or supplied by the request.
    pub from: Address,
    /// Recipient; `None` creates a contract.
    pub to: Option<Address>,
    /// Gas the sender is willing to burn.
    pub gas_limit: u64,
    /// Wei transferred to the recipient.
    pub value: U256,
    /// Call data, or init code when creating.
    pub data: Bytes,
    /// `None` lets execution skip the nonce check.
    pub nonce: Option<u64>,
    /// Legacy gas price, mutually exclusive with the 1559 fields.
    pub gas_price: Option<U256>,
    /// EIP-1559 fee cap.
    pub max_fee_per_gas: Option<U256>,
    /// EIP-1559 tip cap.
    pub max_priority_fee_per_gas: Option<U256>,
    /// EIP-2930 access list.
    pub access_list: AccessList,
}

impl Transaction {
    /// Whether this transaction creates a contract.
    pub const fn is_create(&self) -> bool {
        self.to.is_none()
    }

    /// The fee cap: `max_fee_per_gas` for 1559 requests, the legacy gas
    /// price otherwise, zero when neither is set.
    pub fn fee_cap(&self) -> U256 {
        self.max_fee_per_gas.or(self.gas_price).unwrap_or_default()
    }

    /// The tip cap, falling back to the legacy gas price.
    pub fn tip_cap(&self) -> U256 {
        self.max_priority_fee_per_gas.or(self.gas_price).unwrap_or_default()
    }

    /// The price actually charged per gas unit under `base_fee`.
    pub fn effective_gas_price(&self, base_fee: Option<U256>) -> U256 {
        match base_fee {
            Some(base_fee) => (base_fee + self.tip_cap()).min(self.fee_cap()),
            None => self.fee_cap(),
        }
    }
}
