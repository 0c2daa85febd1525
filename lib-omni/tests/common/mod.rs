//! Shared test harness: an in-memory host chain driving a full core
//! context, with builders for funded protocol transactions.
#![allow(dead_code)]

use tempfile::TempDir;

use lib_omni::{
    codec::class_c, Address, Amount, BlockHash, BlockHeight, Bucket, Coin, ConsensusParams,
    CoreContext, CoreOptions, HostBlock, HostTransaction, MemoryChain, Network, OutPoint, Payload,
    PropertyId, Script, TxHash, TxInput, TxOutput, PKT_V0,
};
use lib_store::Store;

/// Block times stay below the developer-reward start so balances in tests
/// are exactly what the transactions produce.
pub const BASE_TIME: u64 = 1_300_000_000;

pub struct Harness {
    pub core: CoreContext,
    pub chain: MemoryChain,
    next_height: BlockHeight,
    next_txid: u64,
    _snapshot_dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_args(&[])
    }

    pub fn with_args(args: &[&str]) -> Self {
        let store = Store::open_temporary().unwrap();
        let snapshot_dir = TempDir::new().unwrap();
        let params = ConsensusParams::for_network(Network::Regtest);
        let options = CoreOptions::defaults(Network::Regtest).apply_args(args);
        let core = CoreContext::open(&store, snapshot_dir.path(), params, options).unwrap();
        let first = ConsensusParams::for_network(Network::Regtest).genesis_block;
        Harness {
            core,
            chain: MemoryChain::new(),
            next_height: first,
            next_txid: 1,
            _snapshot_dir: snapshot_dir,
        }
    }

    pub fn next_txid(&mut self) -> TxHash {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&self.next_txid.to_be_bytes());
        self.next_txid += 1;
        TxHash::new(bytes)
    }

    /// Register a spendable coin for `address` and return its outpoint.
    pub fn fund(&mut self, address: &str, value: Amount) -> OutPoint {
        let outpoint = OutPoint {
            txid: self.next_txid(),
            vout: 0,
        };
        self.chain.add_coin(
            outpoint,
            Coin {
                value,
                script: Script::PubKeyHash(Address::new(address)),
                height: 1,
                coinbase: false,
            },
        );
        outpoint
    }

    /// A protocol transaction from `sender` carrying `payload`, with the
    /// given reference outputs appended after the payload output.
    pub fn protocol_tx(
        &mut self,
        sender: &str,
        payload: &Payload,
        references: &[&str],
    ) -> HostTransaction {
        let funding = self.fund(sender, 100_000);
        let mut outputs = vec![class_c::encode(&payload.encode(PKT_V0))];
        for reference in references {
            outputs.push(TxOutput {
                value: 546,
                script: Script::PubKeyHash(Address::new(*reference)),
            });
        }
        HostTransaction {
            txid: self.next_txid(),
            inputs: vec![TxInput { prevout: funding }],
            outputs,
        }
    }

    /// A plain native-coin payment (DEx settlement path).
    pub fn payment_tx(&mut self, sender: &str, recipient: &str, value: Amount) -> HostTransaction {
        let funding = self.fund(sender, value + 1_000);
        HostTransaction {
            txid: self.next_txid(),
            inputs: vec![TxInput { prevout: funding }],
            outputs: vec![TxOutput {
                value,
                script: Script::PubKeyHash(Address::new(recipient)),
            }],
        }
    }

    fn block_hash(height: BlockHeight, salt: u8) -> BlockHash {
        let mut bytes = [0u8; 32];
        bytes[..4].copy_from_slice(&height.to_be_bytes());
        bytes[4] = salt;
        BlockHash::new(bytes)
    }

    /// Mine the given transactions into the next block and process it.
    pub fn mine(&mut self, transactions: Vec<HostTransaction>) -> BlockHeight {
        self.mine_at_time(transactions, BASE_TIME + u64::from(self.next_height) * 600)
    }

    pub fn mine_at_time(
        &mut self,
        transactions: Vec<HostTransaction>,
        time: u64,
    ) -> BlockHeight {
        let height = self.next_height;
        self.next_height += 1;
        let block = HostBlock {
            height,
            hash: Self::block_hash(height, 0),
            prev_hash: Self::block_hash(height.wrapping_sub(1), 0),
            time,
            transactions,
        };
        self.chain.push_block(block.clone());
        self.core.connect_block(&block, &self.chain).unwrap();
        height
    }

    /// Mine empty blocks up to and including `height`.
    pub fn mine_until(&mut self, height: BlockHeight) {
        while self.next_height <= height {
            self.mine(vec![]);
        }
    }

    /// Disconnect the tip block, as the host would on a reorg.
    pub fn disconnect_tip(&mut self) -> HostBlock {
        let block = self.chain.pop_block().unwrap();
        self.core.handle_disconnect(&block);
        self.next_height = block.height;
        block
    }

    /// Re-connect a block (after a disconnect).
    pub fn reconnect(&mut self, block: HostBlock) {
        self.chain.push_block(block.clone());
        self.core.connect_block(&block, &self.chain).unwrap();
        self.next_height = block.height + 1;
    }

    pub fn balance(&self, address: &str, property: PropertyId) -> Amount {
        self.core
            .state
            .tally
            .balance(&Address::new(address), property, Bucket::Available)
    }

    pub fn bucket(&self, address: &str, property: PropertyId, bucket: Bucket) -> Amount {
        self.core
            .state
            .tally
            .balance(&Address::new(address), property, bucket)
    }

    /// Create a fixed-supply property and return its id.
    pub fn create_fixed_property(
        &mut self,
        issuer: &str,
        amount: Amount,
        divisible: bool,
    ) -> PropertyId {
        let expected = self
            .core
            .dbs
            .registry
            .peek_next_id(lib_omni::Ecosystem::Main);
        let tx = self.protocol_tx(
            issuer,
            &Payload::CreatePropertyFixed {
                ecosystem: 1,
                kind: if divisible { 2 } else { 1 },
                prev_property_id: 0,
                category: "Test".to_string(),
                subcategory: "Harness".to_string(),
                name: "Harness Property".to_string(),
                url: String::new(),
                data: String::new(),
                amount,
            },
            &[],
        );
        self.mine(vec![tx]);
        expected
    }

    /// Create a managed non-fungible property and return its id.
    pub fn create_nft_property(&mut self, issuer: &str) -> PropertyId {
        let expected = self
            .core
            .dbs
            .registry
            .peek_next_id(lib_omni::Ecosystem::Main);
        let tx = self.protocol_tx(
            issuer,
            &Payload::CreatePropertyManual {
                ecosystem: 1,
                kind: 5,
                prev_property_id: 0,
                category: "Test".to_string(),
                subcategory: "Harness".to_string(),
                name: "Harness Uniques".to_string(),
                url: String::new(),
                data: String::new(),
            },
            &[],
        );
        self.mine(vec![tx]);
        expected
    }

    /// Create a managed (fungible) property and return its id.
    pub fn create_managed_property(&mut self, issuer: &str) -> PropertyId {
        let expected = self
            .core
            .dbs
            .registry
            .peek_next_id(lib_omni::Ecosystem::Main);
        let tx = self.protocol_tx(
            issuer,
            &Payload::CreatePropertyManual {
                ecosystem: 1,
                kind: 1,
                prev_property_id: 0,
                category: "Test".to_string(),
                subcategory: "Harness".to_string(),
                name: "Harness Managed".to_string(),
                url: String::new(),
                data: String::new(),
            },
            &[],
        );
        self.mine(vec![tx]);
        expected
    }

    /// Grant tokens on a managed property to `recipient`.
    pub fn grant(
        &mut self,
        issuer: &str,
        property: PropertyId,
        recipient: &str,
        amount: Amount,
    ) {
        let tx = self.protocol_tx(
            issuer,
            &Payload::GrantTokens {
                property,
                amount,
                memo: String::new(),
            },
            &[recipient],
        );
        self.mine(vec![tx]);
    }

    /// Total over every address and bucket for a property.
    pub fn total(&self, property: PropertyId) -> Amount {
        self.core.state.tally.total(property)
    }
}
