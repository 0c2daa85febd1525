//! Send-To-Owners List Store
//!
//! One record per STO receiver: who received how much of which property in
//! which distributing transaction.

use lib_store::{keys, StoreError, Table, WriteBatch};

use crate::types::{Address, Amount, BlockHeight, PropertyId, TxHash};

const PREFIX_RECEIVE: u8 = b'h';

/// The STO-list store.
pub struct StoList {
    table: Table,
}

impl StoList {
    pub fn open(table: Table) -> Self {
        StoList { table }
    }

    fn receive_key(
        txid: &TxHash,
        address: &Address,
        block: BlockHeight,
        property: PropertyId,
    ) -> Vec<u8> {
        let mut key = vec![PREFIX_RECEIVE];
        key.extend_from_slice(txid.as_bytes());
        keys::push_str(&mut key, address.as_str());
        key.extend_from_slice(&keys::be_u32(block));
        keys::push_varint(&mut key, u64::from(property));
        key
    }

    pub fn record_receive(
        &self,
        txid: &TxHash,
        address: &Address,
        block: BlockHeight,
        property: PropertyId,
        amount: Amount,
    ) -> Result<(), StoreError> {
        self.table
            .put_value(&Self::receive_key(txid, address, block, property), &amount)
    }

    /// All receivers of one distributing transaction.
    pub fn recipients_of(
        &self,
        txid: &TxHash,
    ) -> Result<Vec<(Address, PropertyId, Amount)>, StoreError> {
        let mut prefix = vec![PREFIX_RECEIVE];
        prefix.extend_from_slice(txid.as_bytes());

        let mut recipients = Vec::new();
        for entry in self.table.scan_prefix(&prefix) {
            let (key, value) = entry?;
            let offset = prefix.len();
            let (address, consumed) = match keys::read_str(&key, offset) {
                Some(parsed) => parsed,
                None => continue,
            };
            let property = keys::read_varint(&key, offset + consumed + 4)
                .map(|(v, _)| v as PropertyId)
                .unwrap_or(0);
            recipients.push((
                Address::new(address),
                property,
                lib_store::from_value(&value)?,
            ));
        }
        Ok(recipients)
    }

    /// Delete every record at height ≥ `block`.
    pub fn delete_above(&self, block: BlockHeight) -> Result<usize, StoreError> {
        let mut batch = WriteBatch::new();
        let mut deleted = 0usize;
        for entry in self.table.scan_prefix(&[PREFIX_RECEIVE]) {
            let (key, _) = entry?;
            let offset = 1 + 32;
            let record_block = keys::read_str(&key, offset)
                .and_then(|(_, consumed)| keys::read_be_u32(&key, offset + consumed));
            if let Some(record_block) = record_block {
                if record_block >= block {
                    batch.delete(&key);
                    deleted += 1;
                }
            }
        }
        self.table.apply(batch)?;
        Ok(deleted)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.table.clear()
    }
}
