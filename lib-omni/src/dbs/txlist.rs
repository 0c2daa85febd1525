//! Transaction List Store
//!
//! The persisted outcome of every processed meta-transaction, keyed by
//! tx-id with a (block desc, txid) index for per-block enumeration. Also
//! carries the DEx payment sub-records. The freeze scan over this store
//! drives the reorg controller's full-rescan decision.

use serde::{Deserialize, Serialize};

use lib_store::{keys, StoreError, Table, WriteBatch};

use crate::types::{Address, Amount, BlockHeight, PropertyId, TransactionType, TxHash};

const PREFIX_TX: u8 = b't';
const PREFIX_BLOCK_INDEX: u8 = b'b';
const PREFIX_PAYMENT: u8 = b'p';

/// Outcome record of one meta-transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    pub block: BlockHeight,
    pub idx: u32,
    pub valid: bool,
    pub type_code: u16,
    /// Primary amount of the transaction, zero when not applicable.
    pub amount: Amount,
    /// Rejection code; zero when valid.
    pub reason_code: i32,
    /// Per-property sub-amounts (send-all records one per property moved).
    pub subsends: Vec<(PropertyId, Amount)>,
}

/// A DEx native-coin payment sub-record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub vout: u32,
    pub buyer: Address,
    pub seller: Address,
    pub property: PropertyId,
    pub amount: Amount,
}

/// The tx-list store.
pub struct TxList {
    table: Table,
}

impl TxList {
    pub fn open(table: Table) -> Self {
        TxList { table }
    }

    fn tx_key(txid: &TxHash) -> Vec<u8> {
        let mut key = vec![PREFIX_TX];
        key.extend_from_slice(txid.as_bytes());
        key
    }

    fn block_index_key(block: BlockHeight, txid: &TxHash) -> Vec<u8> {
        let mut key = vec![PREFIX_BLOCK_INDEX];
        key.extend_from_slice(&keys::be_u32_desc(block));
        key.extend_from_slice(txid.as_bytes());
        key
    }

    fn payment_key(block: BlockHeight, txid: &TxHash, seq: u32) -> Vec<u8> {
        let mut key = vec![PREFIX_PAYMENT];
        key.extend_from_slice(&keys::be_u32_desc(block));
        key.extend_from_slice(txid.as_bytes());
        key.extend_from_slice(&keys::be_u32(seq));
        key
    }

    /// Record the outcome of a meta-transaction.
    ///
    /// Reorgs delete all records above the rewind height, so an existing
    /// record with different content indicates double processing.
    pub fn record_tx(&self, txid: &TxHash, record: &TxRecord) -> Result<(), StoreError> {
        if let Some(existing) = self.table.get_value::<TxRecord>(&Self::tx_key(txid))? {
            if existing != *record {
                tracing::warn!(%txid, "tx-list overwrite with differing record");
            }
        }
        self.table.put_value(&Self::tx_key(txid), record)?;
        self.table
            .put(&Self::block_index_key(record.block, txid), b"")?;
        Ok(())
    }

    pub fn get_tx(&self, txid: &TxHash) -> Result<Option<TxRecord>, StoreError> {
        self.table.get_value(&Self::tx_key(txid))
    }

    pub fn contains(&self, txid: &TxHash) -> Result<bool, StoreError> {
        Ok(self.table.get(&Self::tx_key(txid))?.is_some())
    }

    /// Record a DEx payment sub-record; `seq` distinguishes multiple
    /// payments within one transaction.
    pub fn record_payment(
        &self,
        txid: &TxHash,
        block: BlockHeight,
        seq: u32,
        payment: &PaymentRecord,
    ) -> Result<(), StoreError> {
        self.table
            .put_value(&Self::payment_key(block, txid, seq), payment)?;
        self.table.put(&Self::block_index_key(block, txid), b"")?;
        Ok(())
    }

    /// Tx-ids recorded in one block, in key order.
    pub fn txs_in_block(&self, block: BlockHeight) -> Result<Vec<TxHash>, StoreError> {
        let mut prefix = vec![PREFIX_BLOCK_INDEX];
        prefix.extend_from_slice(&keys::be_u32_desc(block));
        let mut txids = Vec::new();
        for entry in self.table.scan_prefix(&prefix) {
            let (key, _) = entry?;
            if key.len() == 1 + 4 + 32 {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(&key[5..]);
                txids.push(TxHash::new(bytes));
            }
        }
        Ok(txids)
    }

    /// Whether any freeze-related transaction is recorded at or above
    /// `block`. Drives the forced-rescan decision on reorg.
    pub fn contains_freeze_txs_at_or_above(
        &self,
        block: BlockHeight,
    ) -> Result<bool, StoreError> {
        for entry in self.table.scan_prefix(&[PREFIX_BLOCK_INDEX]) {
            let (key, _) = entry?;
            let entry_block = keys::read_be_u32_desc(&key, 1).unwrap_or(0);
            if entry_block < block {
                break; // newest first
            }
            if key.len() != 1 + 4 + 32 {
                continue;
            }
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(&key[5..]);
            if let Some(record) = self.get_tx(&TxHash::new(bytes))? {
                if record.valid {
                    if let Some(ty) = TransactionType::from_code(record.type_code) {
                        if ty.is_freeze_related() {
                            return Ok(true);
                        }
                    }
                }
            }
        }
        Ok(false)
    }

    /// Delete every record at height ≥ `block`.
    pub fn delete_above(&self, block: BlockHeight) -> Result<usize, StoreError> {
        let mut batch = WriteBatch::new();
        let mut deleted = 0usize;

        for entry in self.table.scan_prefix(&[PREFIX_BLOCK_INDEX]) {
            let (key, _) = entry?;
            let entry_block = keys::read_be_u32_desc(&key, 1).unwrap_or(0);
            if entry_block < block {
                break;
            }
            if key.len() == 1 + 4 + 32 {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(&key[5..]);
                batch.delete(&Self::tx_key(&TxHash::new(bytes)));
                deleted += 1;
            }
            batch.delete(&key);
        }
        for entry in self.table.scan_prefix(&[PREFIX_PAYMENT]) {
            let (key, _) = entry?;
            let entry_block = keys::read_be_u32_desc(&key, 1).unwrap_or(0);
            if entry_block < block {
                break;
            }
            batch.delete(&key);
        }

        self.table.apply(batch)?;
        Ok(deleted)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.table.clear()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use lib_store::Store;

    fn txlist() -> TxList {
        let store = Store::open_temporary().unwrap();
        TxList::open(store.table("txlist").unwrap())
    }

    fn record(block: BlockHeight, valid: bool, type_code: u16) -> TxRecord {
        TxRecord {
            block,
            idx: 0,
            valid,
            type_code,
            amount: 100,
            reason_code: if valid { 0 } else { -60025 },
            subsends: Vec::new(),
        }
    }

    #[test]
    fn record_and_lookup() {
        let list = txlist();
        let txid = TxHash::new([1; 32]);
        list.record_tx(&txid, &record(100, true, 0)).unwrap();

        let loaded = list.get_tx(&txid).unwrap().unwrap();
        assert!(loaded.valid);
        assert_eq!(loaded.block, 100);
        assert!(list.contains(&txid).unwrap());
        assert_eq!(list.txs_in_block(100).unwrap(), vec![txid]);
        assert!(list.txs_in_block(101).unwrap().is_empty());
    }

    #[test]
    fn delete_above_is_inclusive() {
        let list = txlist();
        list.record_tx(&TxHash::new([1; 32]), &record(100, true, 0))
            .unwrap();
        list.record_tx(&TxHash::new([2; 32]), &record(200, true, 0))
            .unwrap();
        list.record_tx(&TxHash::new([3; 32]), &record(300, true, 0))
            .unwrap();

        let deleted = list.delete_above(200).unwrap();
        assert_eq!(deleted, 2);
        assert!(list.contains(&TxHash::new([1; 32])).unwrap());
        assert!(!list.contains(&TxHash::new([2; 32])).unwrap());
        assert!(!list.contains(&TxHash::new([3; 32])).unwrap());
    }

    #[test]
    fn freeze_scan_finds_valid_freezes_only() {
        let list = txlist();
        list.record_tx(&TxHash::new([1; 32]), &record(100, true, 0))
            .unwrap();
        // invalid freeze below the horizon must not count
        list.record_tx(&TxHash::new([2; 32]), &record(150, false, 185))
            .unwrap();
        assert!(!list.contains_freeze_txs_at_or_above(100).unwrap());

        list.record_tx(&TxHash::new([3; 32]), &record(200, true, 185))
            .unwrap();
        assert!(list.contains_freeze_txs_at_or_above(150).unwrap());
        assert!(!list.contains_freeze_txs_at_or_above(201).unwrap());
    }

    #[test]
    fn payments_roundtrip_and_rollback() {
        let list = txlist();
        let txid = TxHash::new([7; 32]);
        let payment = PaymentRecord {
            vout: 1,
            buyer: Address::new("1Buyer"),
            seller: Address::new("1Seller"),
            property: 1,
            amount: 50,
        };
        list.record_payment(&txid, 120, 1, &payment).unwrap();
        assert_eq!(list.txs_in_block(120).unwrap(), vec![txid]);

        list.delete_above(120).unwrap();
        assert!(list.txs_in_block(120).unwrap().is_empty());
    }
}
