//! Host-Chain Model
//!
//! The core treats the host node as a source of ordered confirmed blocks, a
//! queryable coin view and a stream of mempool/disconnect notifications.
//! Scripts are modelled at the level the protocol cares about: the
//! destination kind plus the raw material the payload codec needs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount, BlockHash, BlockHeight, TxHash};

/// An output script, reduced to what the protocol inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Script {
    /// Pay-to-pubkey-hash, resolving to an address.
    PubKeyHash(Address),
    /// Pay-to-script-hash, resolving to an address.
    ScriptHash(Address),
    /// Data-only output (OP_RETURN) carrying raw bytes.
    NullData(Vec<u8>),
    /// Bare 1-of-n multisig with raw public keys.
    Multisig { required: u8, pubkeys: Vec<Vec<u8>> },
    /// Anything the protocol never decodes.
    Other,
}

impl Script {
    /// The destination address, for script kinds that have one.
    pub fn address(&self) -> Option<&Address> {
        match self {
            Script::PubKeyHash(addr) | Script::ScriptHash(addr) => Some(addr),
            _ => None,
        }
    }
}

/// Reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: TxHash,
    pub vout: u32,
}

/// A transaction input (script material is resolved via the coin view).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub prevout: OutPoint,
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Native-coin value in base units.
    pub value: Amount,
    pub script: Script,
}

/// A host transaction, as delivered in a connected block or by the mempool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostTransaction {
    pub txid: TxHash,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl HostTransaction {
    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// A confirmed host block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostBlock {
    pub height: BlockHeight,
    pub hash: BlockHash,
    pub prev_hash: BlockHash,
    /// Block timestamp (Unix seconds).
    pub time: u64,
    pub transactions: Vec<HostTransaction>,
}

/// A spendable (or spent) output resolved through the coin view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub value: Amount,
    pub script: Script,
    pub height: BlockHeight,
    pub coinbase: bool,
}

/// Read access to spent outputs.
pub trait CoinView {
    fn get_output(&self, outpoint: &OutPoint) -> Option<Coin>;
}

/// Read access to the host chain.
pub trait ChainView {
    fn tip_height(&self) -> Option<BlockHeight>;
    fn tip_time(&self) -> Option<u64>;
    fn block_at(&self, height: BlockHeight) -> Option<HostBlock>;
    fn is_initial_sync(&self) -> bool;
}

/// Events delivered by the host node, consumed in order by the pipeline.
#[derive(Debug, Clone)]
pub enum HostEvent {
    BlockConnected(HostBlock),
    BlockDisconnected(HostBlock),
    TxAdded(HostTransaction),
    TxRemoved(TxHash),
    ShutdownRequested,
}

// =============================================================================
// IN-MEMORY CHAIN
// =============================================================================

/// An in-memory chain + coin view. Backs the block-file replay mode of the
/// node binary and every pipeline test.
#[derive(Debug, Default, Clone)]
pub struct MemoryChain {
    blocks: Vec<HostBlock>,
    coins: HashMap<OutPoint, Coin>,
    initial_sync: bool,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a spendable output so the parser can resolve senders.
    pub fn add_coin(&mut self, outpoint: OutPoint, coin: Coin) {
        self.coins.insert(outpoint, coin);
    }

    /// Append a block and index every output it creates.
    pub fn push_block(&mut self, block: HostBlock) {
        for tx in &block.transactions {
            for (vout, output) in tx.outputs.iter().enumerate() {
                self.coins.insert(
                    OutPoint {
                        txid: tx.txid,
                        vout: vout as u32,
                    },
                    Coin {
                        value: output.value,
                        script: output.script.clone(),
                        height: block.height,
                        coinbase: tx.is_coinbase(),
                    },
                );
            }
        }
        self.blocks.push(block);
    }

    /// Drop the tip block (host disconnect); coins stay resolvable so the
    /// replay can re-connect it.
    pub fn pop_block(&mut self) -> Option<HostBlock> {
        self.blocks.pop()
    }

    pub fn set_initial_sync(&mut self, initial_sync: bool) {
        self.initial_sync = initial_sync;
    }

    pub fn blocks(&self) -> &[HostBlock] {
        &self.blocks
    }
}

impl CoinView for MemoryChain {
    fn get_output(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.get(outpoint).cloned()
    }
}

impl ChainView for MemoryChain {
    fn tip_height(&self) -> Option<BlockHeight> {
        self.blocks.last().map(|b| b.height)
    }

    fn tip_time(&self) -> Option<u64> {
        self.blocks.last().map(|b| b.time)
    }

    fn block_at(&self, height: BlockHeight) -> Option<HostBlock> {
        self.blocks.iter().find(|b| b.height == height).cloned()
    }

    fn is_initial_sync(&self) -> bool {
        self.initial_sync
    }
}
