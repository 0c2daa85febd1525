//! Trade List Store
//!
//! Persisted MetaDEx activity: one record per placed order and one per
//! matched trade, keyed so recent blocks enumerate first and reorg deletion
//! is a prefix walk.

use serde::{Deserialize, Serialize};

use lib_store::{keys, StoreError, Table, WriteBatch};

use crate::types::{Address, Amount, BlockHeight, PropertyId, TxHash};

const PREFIX_ORDER: u8 = b'o';
const PREFIX_MATCH: u8 = b'm';

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub address: Address,
    pub property_for_sale: PropertyId,
    pub property_desired: PropertyId,
    pub block: BlockHeight,
    pub idx: u32,
}

/// A matched trade between two orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Units received by the maker.
    pub amount_maker: Amount,
    /// Units received by the taker (after the fee).
    pub amount_taker: Amount,
    /// Taker fee accrued to the fee cache.
    pub fee: Amount,
}

/// The trade-list store.
pub struct TradeList {
    table: Table,
}

impl TradeList {
    pub fn open(table: Table) -> Self {
        TradeList { table }
    }

    fn order_key(txid: &TxHash) -> Vec<u8> {
        let mut key = vec![PREFIX_ORDER];
        key.extend_from_slice(txid.as_bytes());
        key
    }

    fn match_key(block: BlockHeight, maker: &TxHash, taker: &TxHash) -> Vec<u8> {
        let mut key = vec![PREFIX_MATCH];
        key.extend_from_slice(&keys::be_u32_desc(block));
        key.extend_from_slice(maker.as_bytes());
        key.extend_from_slice(taker.as_bytes());
        key
    }

    pub fn record_order(&self, txid: &TxHash, record: &OrderRecord) -> Result<(), StoreError> {
        self.table.put_value(&Self::order_key(txid), record)
    }

    pub fn order(&self, txid: &TxHash) -> Result<Option<OrderRecord>, StoreError> {
        self.table.get_value(&Self::order_key(txid))
    }

    pub fn record_match(
        &self,
        block: BlockHeight,
        maker: &TxHash,
        taker: &TxHash,
        record: &MatchRecord,
    ) -> Result<(), StoreError> {
        self.table
            .put_value(&Self::match_key(block, maker, taker), record)
    }

    /// Matches recorded in one block as (maker, taker, record).
    pub fn matches_in_block(
        &self,
        block: BlockHeight,
    ) -> Result<Vec<(TxHash, TxHash, MatchRecord)>, StoreError> {
        let mut prefix = vec![PREFIX_MATCH];
        prefix.extend_from_slice(&keys::be_u32_desc(block));
        let mut matches = Vec::new();
        for entry in self.table.scan_prefix(&prefix) {
            let (key, value) = entry?;
            if key.len() != 1 + 4 + 32 + 32 {
                continue;
            }
            let mut maker = [0u8; 32];
            let mut taker = [0u8; 32];
            maker.copy_from_slice(&key[5..37]);
            taker.copy_from_slice(&key[37..69]);
            matches.push((
                TxHash::new(maker),
                TxHash::new(taker),
                lib_store::from_value(&value)?,
            ));
        }
        Ok(matches)
    }

    /// Delete orders and matches recorded at height ≥ `block`.
    pub fn delete_above(&self, block: BlockHeight) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        for entry in self.table.scan_prefix(&[PREFIX_MATCH]) {
            let (key, _) = entry?;
            let entry_block = keys::read_be_u32_desc(&key, 1).unwrap_or(0);
            if entry_block < block {
                break;
            }
            batch.delete(&key);
        }
        for entry in self.table.scan_prefix(&[PREFIX_ORDER]) {
            let (key, value) = entry?;
            let record: OrderRecord = lib_store::from_value(&value)?;
            if record.block >= block {
                batch.delete(&key);
            }
        }
        self.table.apply(batch)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.table.clear()
    }
}
