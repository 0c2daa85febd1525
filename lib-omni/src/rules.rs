//! Network Consensus Parameters
//!
//! Per-network constants: the exodus address, the first protocol block,
//! script-type gating heights, feature ids, authorized administrative
//! senders and the hard-coded consensus-hash checkpoints.

use crate::types::{Address, Amount, BlockHeight};

/// Host network flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Main,
    Test,
    Regtest,
}

// Feature ids recognized by activation transactions.
pub const FEATURE_CLASS_C: u16 = 1;
pub const FEATURE_METADEX: u16 = 2;
pub const FEATURE_SENDALL: u16 = 6;
pub const FEATURE_TRADE_ALL_PAIRS: u16 = 8;
pub const FEATURE_FEES: u16 = 9;
pub const FEATURE_STO_V1: u16 = 10;
pub const FEATURE_FREEZING: u16 = 14;
pub const FEATURE_SEND_TO_MANY: u16 = 16;
pub const FEATURE_NONFUNGIBLE: u16 = 17;

/// All feature ids an activation may name.
pub const KNOWN_FEATURES: [u16; 9] = [
    FEATURE_CLASS_C,
    FEATURE_METADEX,
    FEATURE_SENDALL,
    FEATURE_TRADE_ALL_PAIRS,
    FEATURE_FEES,
    FEATURE_STO_V1,
    FEATURE_FREEZING,
    FEATURE_SEND_TO_MANY,
    FEATURE_NONFUNGIBLE,
];

/// Version reported by this client for activation minimum-version checks.
pub const CLIENT_VERSION: u32 = 10;

/// Consensus parameters of one network.
#[derive(Debug, Clone)]
pub struct ConsensusParams {
    pub network: Network,
    /// Collects the developer allocation and issues the protocol tokens.
    pub exodus_address: Address,
    /// First block scanned for protocol transactions.
    pub genesis_block: BlockHeight,
    /// Pay-to-script-hash senders/receivers qualify from this height.
    pub script_hash_block: BlockHeight,
    /// Data-only (Class C) outputs qualify from this height.
    pub null_data_block: BlockHeight,
    /// Senders allowed to issue activations/deactivations.
    pub activation_authorizers: Vec<Address>,
    /// Senders allowed to issue alerts.
    pub alert_authorizers: Vec<Address>,
    /// (height, expected consensus hash) pairs; a mismatch is fatal.
    // TODO: bake in mainnet checkpoint hashes once the state format is frozen
    pub checkpoints: Vec<(BlockHeight, &'static str)>,
    /// Start time of the developer-reward vesting curve (Unix seconds).
    pub exodus_reward_start: u64,
    /// Asymptotic total of the developer reward, in 10^-8 units.
    pub exodus_reward_total: Amount,
}

impl ConsensusParams {
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Main => ConsensusParams {
                network,
                exodus_address: Address::new("1EXoDusjGwvnjZUyKkxZ4UHEf77z6A5S4P"),
                genesis_block: 249_498,
                script_hash_block: 322_000,
                null_data_block: 395_000,
                activation_authorizers: vec![Address::new(
                    "3Fc5gWzEQh1YGeqVXH6E4GDEGgbZJREJQ3",
                )],
                alert_authorizers: vec![Address::new("3Fc5gWzEQh1YGeqVXH6E4GDEGgbZJREJQ3")],
                checkpoints: Vec::new(),
                exodus_reward_start: 1_377_993_874,
                exodus_reward_total: 5_631_623_576_222,
            },
            Network::Test => ConsensusParams {
                network,
                exodus_address: Address::new("mpexoDuSkGGqvqrkrjiFng38QPkJQVFyqv"),
                genesis_block: 263_000,
                script_hash_block: 0,
                null_data_block: 0,
                activation_authorizers: vec![Address::new(
                    "mpDex4kSX4iscrmiEQgLhpDrr9rUdLRx1B",
                )],
                alert_authorizers: vec![Address::new("mpDex4kSX4iscrmiEQgLhpDrr9rUdLRx1B")],
                checkpoints: Vec::new(),
                exodus_reward_start: 1_377_993_874,
                exodus_reward_total: 5_631_623_576_222,
            },
            Network::Regtest => ConsensusParams {
                network,
                exodus_address: Address::new("mpexoDuSkGGqvqrkrjiFng38QPkJQVFyqv"),
                genesis_block: 101,
                script_hash_block: 0,
                null_data_block: 0,
                // regtest accepts no administrative senders unless the
                // operator whitelists one via -omniactivationallowsender
                activation_authorizers: Vec::new(),
                alert_authorizers: Vec::new(),
                checkpoints: Vec::new(),
                exodus_reward_start: 1_377_993_874,
                exodus_reward_total: 5_631_623_576_222,
            },
        }
    }

    pub fn is_main_net(&self) -> bool {
        self.network == Network::Main
    }

    /// Whether pay-to-script-hash scripts qualify at this height.
    pub fn script_hash_allowed(&self, height: BlockHeight) -> bool {
        height >= self.script_hash_block
    }

    /// Whether data-only outputs qualify at this height.
    pub fn null_data_allowed(&self, height: BlockHeight) -> bool {
        height >= self.null_data_block
    }

    /// The expected consensus hash at a checkpoint height, if one is baked
    /// in.
    pub fn checkpoint_at(&self, height: BlockHeight) -> Option<&'static str> {
        self.checkpoints
            .iter()
            .find(|(h, _)| *h == height)
            .map(|(_, hash)| *hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_script_gates() {
        let params = ConsensusParams::for_network(Network::Main);
        assert!(!params.script_hash_allowed(321_999));
        assert!(params.script_hash_allowed(322_000));
        assert!(!params.null_data_allowed(394_999));
        assert!(params.null_data_allowed(395_000));
    }

    #[test]
    fn regtest_gates_are_open() {
        let params = ConsensusParams::for_network(Network::Regtest);
        assert!(params.script_hash_allowed(0));
        assert!(params.null_data_allowed(0));
        assert!(!params.is_main_net());
    }

    #[test]
    fn checkpoint_lookup() {
        let mut params = ConsensusParams::for_network(Network::Regtest);
        params.checkpoints = vec![(500, "aa")];
        assert_eq!(params.checkpoint_at(500), Some("aa"));
        assert_eq!(params.checkpoint_at(501), None);
    }
}
