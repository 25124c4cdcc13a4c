//! Chain configurations: process-wide immutable fork schedules.

use revm::primitives::SpecId;

/// Fork schedule and identity of one chain.
///
/// Configs are resolved once through [`ChainConfig::lookup`] and shared by
/// reference for the life of the process; nothing mutates them after
/// startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainConfig {
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Homestead activation height.
    pub homestead_block: Option<u64>,
    /// Tangerine Whistle activation height.
    pub tangerine_block: Option<u64>,
    /// Spurious Dragon activation height.
    pub spurious_dragon_block: Option<u64>,
    /// Byzantium activation height.
    pub byzantium_block: Option<u64>,
    /// Petersburg activation height (Constantinople without EIP-1283).
    pub petersburg_block: Option<u64>,
    /// Istanbul activation height.
    pub istanbul_block: Option<u64>,
    /// Berlin activation height.
    pub berlin_block: Option<u64>,
    /// London activation height; base fees exist from here on.
    pub london_block: Option<u64>,
    /// Paris activation height, where known by height.
    pub merge_block: Option<u64>,
    /// Shanghai activation timestamp.
    pub shanghai_time: Option<u64>,
    /// Cancun activation timestamp.
    pub cancun_time: Option<u64>,
}

impl ChainConfig {
    /// Returns the registered config for `chain_id`.
    pub fn lookup(chain_id: u64) -> Option<&'static Self> {
        match chain_id {
            1 => Some(&MAINNET),
            5 => Some(&GOERLI),
            11_155_111 => Some(&SEPOLIA),
            _ => None,
        }
    }

    /// The EVM revision active for a block at `number` and `timestamp`.
    pub fn revision(&self, number: u64, timestamp: u64) -> SpecId {
        let at = |block: Option<u64>| block.is_some_and(|activation| number >= activation);
        let at_time = |time: Option<u64>| time.is_some_and(|activation| timestamp >= activation);

        if at_time(self.cancun_time) {
            SpecId::CANCUN
        } else if at_time(self.shanghai_time) {
            SpecId::SHANGHAI
        } else if at(self.merge_block) {
            SpecId::MERGE
        } else if at(self.london_block) {
            SpecId::LONDON
        } else if at(self.berlin_block) {
            SpecId::BERLIN
        } else if at(self.istanbul_block) {
            SpecId::ISTANBUL
        } else if at(self.petersburg_block) {
            SpecId::PETERSBURG
        } else if at(self.byzantium_block) {
            SpecId::BYZANTIUM
        } else if at(self.spurious_dragon_block) {
            SpecId::SPURIOUS_DRAGON
        } else if at(self.tangerine_block) {
            SpecId::TANGERINE
        } else if at(self.homestead_block) {
            SpecId::HOMESTEAD
        } else {
            SpecId::FRONTIER
        }
    }
}

/// Ethereum mainnet.
pub static MAINNET: ChainConfig = ChainConfig {
    chain_id: 1,
    homestead_block: Some(1_150_000),
    tangerine_block: Some(2_463_000),
    spurious_dragon_block: Some(2_675_000),
    byzantium_block: Some(4_370_000),
    petersburg_block: Some(7_280_000),
    istanbul_block: Some(9_069_000),
    berlin_block: Some(12_244_000),
    london_block: Some(12_965_000),
    merge_block: Some(15_537_394),
    shanghai_time: Some(1_681_338_455),
    cancun_time: Some(1_710_338_135),
};

/// Goerli testnet. Launched at Petersburg; merged by terminal difficulty,
/// so no merge height is recorded.
pub static GOERLI: ChainConfig = ChainConfig {
    chain_id: 5,
    homestead_block: Some(0),
    tangerine_block: Some(0),
    spurious_dragon_block: Some(0),
    byzantium_block: Some(0),
    petersburg_block: Some(0),
    istanbul_block: Some(1_561_651),
    berlin_block: Some(4_460_644),
    london_block: Some(5_062_605),
    merge_block: None,
    shanghai_time: Some(1_678_832_736),
    cancun_time: Some(1_705_473_120),
};

/// Sepolia testnet. Launched post-London.
pub static SEPOLIA: ChainConfig = ChainConfig {
    chain_id: 11_155_111,
    homestead_block: Some(0),
    tangerine_block: Some(0),
    spurious_dragon_block: Some(0),
    byzantium_block: Some(0),
    petersburg_block: Some(0),
    istanbul_block: Some(0),
    berlin_block: Some(0),
    london_block: Some(0),
    merge_block: Some(1_450_409),
    shanghai_time: Some(1_677_557_088),
    cancun_time: Some(1_706_655_072),
};
